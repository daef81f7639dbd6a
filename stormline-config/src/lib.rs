//! Loader for workspace configuration with YAML + environment overlays.
//!
//! `stormline.yaml` feeds the typed [`StormlineConfig`]; `STORMLINE__`-prefixed
//! environment variables override individual keys and `${VAR}` placeholders
//! are expanded recursively before deserialisation.
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

const MAXIMUM_ENV_EXPANSION_DEPTH: usize = 8;

#[derive(Debug, Deserialize)]
pub struct StormlineConfig {
    pub version: Option<String>,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
}

#[derive(Debug, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between scheduled ingestion cycles.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Upper bound on the shutdown grace period.
    #[serde(default = "default_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            shutdown_grace_secs: default_grace_secs(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct IngestConfig {
    /// Content channels (subreddits) polled each cycle.
    #[serde(default = "default_channels")]
    pub channels: Vec<String>,
    /// Posts requested per channel per cycle.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// How many channel fetches may be in flight at once.
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            channels: default_channels(),
            page_size: default_page_size(),
            fetch_concurrency: default_fetch_concurrency(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ClassifierConfig {
    /// Frozen linear-model artifact. Absence selects heuristic fallback mode.
    #[serde(default = "default_model_path")]
    pub model_path: String,
    /// Companion feature-transform artifact.
    #[serde(default = "default_vectorizer_path")]
    pub vectorizer_path: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model_path: default_model_path(),
            vectorizer_path: default_vectorizer_path(),
        }
    }
}

fn default_database_url() -> String {
    "sqlite://stormline.db".into()
}
fn default_interval_secs() -> u64 {
    3600
}
fn default_grace_secs() -> u64 {
    30
}
fn default_page_size() -> u32 {
    10
}
fn default_fetch_concurrency() -> usize {
    4
}
fn default_model_path() -> String {
    "models/model.json".into()
}
fn default_vectorizer_path() -> String {
    "models/vectorizer.json".into()
}
fn default_channels() -> Vec<String> {
    [
        "news",
        "worldnews",
        "weather",
        "earthquakes",
        "NaturalDisasters",
        "naturesfury",
        "Preparedness",
        "preppers",
        "EmergencyManagement",
    ]
    .into_iter()
    .map(str::to_owned)
    .collect()
}

fn expand_env_in_value(v: &mut Value) {
    match v {
        Value::String(s) => {
            if s.contains('$') {
                let mut cur = std::mem::take(s);
                for _ in 0..MAXIMUM_ENV_EXPANSION_DEPTH {
                    let expanded = match shellexpand::env(&cur) {
                        Ok(cow) => cow.into_owned(),
                        Err(_) => cur.clone(),
                    };
                    if expanded == cur {
                        break;
                    }
                    cur = expanded;
                }
                *s = cur;
            }
        }
        Value::Array(arr) => arr.iter_mut().for_each(expand_env_in_value),
        Value::Object(obj) => obj.values_mut().for_each(expand_env_in_value),
        _ => {}
    }
}

/// Builder hiding the `config` crate wiring (YAML + env overrides).
pub struct StormlineConfigLoader {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
}

impl Default for StormlineConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl StormlineConfigLoader {
    /// Start with sensible defaults: YAML file + `STORMLINE_` env overrides.
    ///
    /// ```
    /// use stormline_config::StormlineConfigLoader;
    ///
    /// let config = StormlineConfigLoader::new()
    ///     .with_yaml_str("version: '1'")
    ///     .load()
    ///     .expect("valid config");
    ///
    /// assert_eq!(config.version.as_deref(), Some("1"));
    /// assert_eq!(config.scheduler.interval_secs, 3600);
    /// ```
    pub fn new() -> Self {
        let builder =
            Config::builder().add_source(Environment::with_prefix("STORMLINE").separator("__"));
        Self { builder }
    }

    /// Attach a YAML/TOML/JSON file; the `config` crate infers format by suffix.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(true));
        self
    }

    /// Allow tests/CLI to merge inline YAML snippets.
    ///
    /// ```
    /// use stormline_config::StormlineConfigLoader;
    ///
    /// let cfg = StormlineConfigLoader::new()
    ///     .with_yaml_str(
    ///         r#"
    /// version: "test"
    /// ingest:
    ///   channels: ["earthquakes"]
    ///   page_size: 25
    /// "#,
    ///     )
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(cfg.ingest.channels, vec!["earthquakes".to_string()]);
    /// assert_eq!(cfg.ingest.page_size, 25);
    /// ```
    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.builder = self
            .builder
            .add_source(File::from_str(yaml, config::FileFormat::Yaml));
        self
    }

    /// Consume the builder and deserialize the merged sources into typed config.
    ///
    /// The loader combines YAML with `STORMLINE__`-prefixed environment
    /// variables and expands `${VAR}` placeholders before materialising the
    /// strongly typed struct.
    pub fn load(self) -> Result<StormlineConfig, ConfigError> {
        let cfg = self.builder.build()?;

        // Convert to serde_json::Value first, expand environment variables
        // recursively, then deserialize into the typed config.
        let mut v: Value = cfg.try_deserialize()?;
        expand_env_in_value(&mut v);

        let typed: StormlineConfig =
            serde_json::from_value(v).map_err(|e| config::ConfigError::Message(e.to_string()))?;

        Ok(typed)
    }
}
