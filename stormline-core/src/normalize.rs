//! Text normalizer: raw post markup and telemetry noise to clean prose.
//!
//! Deterministic and total. The steps run in a fixed order (decorative
//! symbols, emphasis markup, links, structured technical fragments, then
//! whitespace collapse) before the body extension and the final punctuation
//! pass. If cleaning ever produces an empty string the original title is
//! returned untouched.

use regex::Regex;
use std::sync::OnceLock;

/// Longest body fragment appended to a cleaned title.
const BODY_EXTENSION_CHARS: usize = 300;
/// A body fragment shorter than this is not considered substantive.
const BODY_MIN_SUBSTANTIVE_LEN: usize = 50;

struct Cleaners {
    symbols: Regex,
    arrows: Regex,
    bold: Regex,
    italic: Regex,
    bold_underscore: Regex,
    italic_underscore: Regex,
    strikethrough: Regex,
    code_span: Regex,
    markdown_link: Regex,
    bare_url: Regex,
    magnitude_note: Regex,
    registered_by: Regex,
    iso_timestamp: Regex,
    felt_away: Regex,
    by_people: Regex,
    cited_paren: Regex,
    plus_minus_km: Regex,
    coordinates: Regex,
    whitespace: Regex,
    repeated_dots: Regex,
    repeated_commas: Regex,
}

fn cleaners() -> &'static Cleaners {
    static CLEANERS: OnceLock<Cleaners> = OnceLock::new();
    CLEANERS.get_or_init(|| {
        let re = |pattern: &str| Regex::new(pattern).expect("normalizer pattern");
        Cleaners {
            symbols: re(
                "[\u{1F300}-\u{1F5FF}\u{1F600}-\u{1F64F}\u{1F680}-\u{1F6FF}\u{1F900}-\u{1F9FF}\u{2600}-\u{27BF}\u{FE0F}]",
            ),
            arrows: re("[>→←↑↓►◄▲▼]+"),
            bold: re(r"\*\*([^*]+)\*\*"),
            italic: re(r"\*([^*]+)\*"),
            bold_underscore: re(r"__([^_]+)__"),
            italic_underscore: re(r"_([^_]+)_"),
            strikethrough: re(r"~~([^~]+)~~"),
            code_span: re(r"`([^`]+)`"),
            markdown_link: re(r"\[([^\]]+)\]\([^)]*\)"),
            bare_url: re(r"https?://\S+"),
            magnitude_note: re(r"\([0-9.]+\s*M[a-z]*[,\s]*at\s*[0-9:]+\s*UTC\)"),
            registered_by: re(r"registered by [A-Z,\s]+"),
            iso_timestamp: re(r"[0-9]{4}-[0-9]{2}-[0-9]{2}[T\s][0-9:]+\s*(?:Z|UTC)?"),
            felt_away: re(r"likely felt \d[\d,]* km away"),
            by_people: re(r"by \d[\d,]* people"),
            cited_paren: re(r"\([^)]*(?:localhost|www\.|\.gov|\.org)[^)]*\)"),
            plus_minus_km: re(r"±\s*\d+\s*km"),
            coordinates: re(r"\(-?[0-9.]+,\s*-?[0-9.]+\)"),
            whitespace: re(r"\s+"),
            repeated_dots: re(r"\.{2,}"),
            repeated_commas: re(r",{2,}"),
        }
    })
}

/// Clean a raw title (and optional body) into presentable prose.
///
/// ```
/// let clean = stormline_core::normalize::normalize(
///     "**Earthquake** hits the coast https://example.org/report",
///     "",
/// );
/// assert_eq!(clean, "Earthquake hits the coast.");
/// ```
pub fn normalize(title: &str, body: &str) -> String {
    let c = cleaners();

    let mut text = strip_noise(c, title);

    // Body extension runs only after the title itself is clean, and the
    // fragment is link- and markup-stripped on its own before appending.
    if let Some(fragment) = substantive_body_fragment(c, body) {
        text.push(' ');
        text.push_str(&fragment);
        text = c.whitespace.replace_all(&text, " ").into_owned();
    }

    let mut text = text
        .trim_matches(|ch: char| matches!(ch, ' ' | '.' | ',' | '!' | '-' | ':' | ';'))
        .to_string();

    if text.is_empty() {
        // Guaranteed fallback: never hand downstream an empty string for a
        // non-empty title.
        return title.to_string();
    }

    if !text.ends_with(['.', '!', '?']) {
        text.push('.');
    }

    capitalize_first(&text)
}

/// Steps 1–5: symbols, emphasis, links, technical fragments, collapse.
fn strip_noise(c: &Cleaners, input: &str) -> String {
    let mut text = input.trim().to_string();

    text = c.symbols.replace_all(&text, "").into_owned();
    text = c.arrows.replace_all(&text, "").into_owned();

    text = c.bold.replace_all(&text, "$1").into_owned();
    text = c.italic.replace_all(&text, "$1").into_owned();
    text = c.bold_underscore.replace_all(&text, "$1").into_owned();
    text = c.italic_underscore.replace_all(&text, "$1").into_owned();
    text = c.strikethrough.replace_all(&text, "$1").into_owned();
    text = c.code_span.replace_all(&text, "$1").into_owned();

    text = c.markdown_link.replace_all(&text, "$1").into_owned();
    text = c.bare_url.replace_all(&text, "").into_owned();

    text = c.magnitude_note.replace_all(&text, "").into_owned();
    text = c.registered_by.replace_all(&text, "").into_owned();
    text = c.iso_timestamp.replace_all(&text, "").into_owned();
    text = c.felt_away.replace_all(&text, "").into_owned();
    text = c.by_people.replace_all(&text, "").into_owned();
    text = c.cited_paren.replace_all(&text, "").into_owned();
    text = c.plus_minus_km.replace_all(&text, "").into_owned();
    text = c.coordinates.replace_all(&text, "").into_owned();

    text = c.whitespace.replace_all(&text, " ").into_owned();
    text = c.repeated_dots.replace_all(&text, ".").into_owned();
    text = c.repeated_commas.replace_all(&text, ",").into_owned();

    text.trim().to_string()
}

/// Clean the body on its own and decide whether it is worth appending.
fn substantive_body_fragment(c: &Cleaners, body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    let mut fragment = c.markdown_link.replace_all(trimmed, "$1").into_owned();
    fragment = c.bare_url.replace_all(&fragment, "").into_owned();
    fragment = c.bold.replace_all(&fragment, "$1").into_owned();
    fragment = c.whitespace.replace_all(&fragment, " ").into_owned();
    let fragment = fragment.trim();

    if fragment.len() <= BODY_MIN_SUBSTANTIVE_LEN || is_pointer(fragment) {
        return None;
    }

    Some(fragment.chars().take(BODY_EXTENSION_CHARS).collect())
}

/// Bodies that are just a pointer somewhere else carry no prose worth keeping.
fn is_pointer(fragment: &str) -> bool {
    let lower = fragment.to_lowercase();
    ["full description", "source:", "link:", "http"]
        .iter()
        .any(|prefix| lower.starts_with(prefix))
}

fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_input_same_output() {
        let title = "BREAKING: **Major flood** hits the valley 🌊 https://example.org/x";
        let body = "Water levels keep rising across the region and residents are moving to higher ground.";
        assert_eq!(normalize(title, body), normalize(title, body));
    }

    #[test]
    fn unwraps_emphasis_markup() {
        assert_eq!(
            normalize("**Storm** hits *coastal* __towns__ with `force`", ""),
            "Storm hits coastal towns with force."
        );
    }

    #[test]
    fn strips_links_but_keeps_labels() {
        assert_eq!(
            normalize("[Live updates](https://example.org) on the wildfire", ""),
            "Live updates on the wildfire."
        );
        assert_eq!(
            normalize("Wildfire spreading north https://example.org/a?b=c", ""),
            "Wildfire spreading north."
        );
    }

    #[test]
    fn strips_technical_fragments() {
        let title =
            "Quake near ridge (6.1 Mw, at 03:22 UTC) registered by GFZ, EMSC 2025-11-02T03:22:14 UTC ±12 km (41.2, -124.5)";
        let clean = normalize(title, "");
        assert!(!clean.contains("UTC"), "clean={clean}");
        assert!(!clean.contains("registered by"));
        assert!(!clean.contains("km"));
        assert!(!clean.contains("41.2"));
        assert!(clean.starts_with("Quake near ridge"));
        assert!(clean.ends_with('.'));
    }

    #[test]
    fn collapses_repeated_whitespace_and_punctuation() {
        assert_eq!(
            normalize("Landslide   blocks..  road,,, near pass", ""),
            "Landslide blocks. road, near pass."
        );
    }

    #[test]
    fn appends_substantive_body() {
        let body = "Emergency crews report dozens of homes flooded along the river after the levee failed overnight.";
        let clean = normalize("Flooding in the lowlands", body);
        assert!(clean.starts_with("Flooding in the lowlands Emergency crews"));
        assert!(clean.ends_with('.'));
    }

    #[test]
    fn rejects_short_or_pointer_bodies() {
        assert_eq!(normalize("Flooding in the lowlands", "see below"), "Flooding in the lowlands.");
        assert_eq!(
            normalize(
                "Flooding in the lowlands",
                "Source: the regional office published the full bulletin this morning on its site"
            ),
            "Flooding in the lowlands."
        );
        assert_eq!(
            normalize(
                "Flooding in the lowlands",
                "https://example.org/a-very-long-link-that-is-not-prose-and-should-be-ignored-entirely"
            ),
            "Flooding in the lowlands."
        );
    }

    #[test]
    fn caps_body_extension_length() {
        let body = "a".repeat(600);
        let clean = normalize("Storm damage reported", &body);
        // title + space + 300 chars + trailing period
        assert_eq!(clean.len(), "Storm damage reported".len() + 1 + 300 + 1);
    }

    #[test]
    fn normalizes_trailing_punctuation_and_capitalizes() {
        assert_eq!(normalize("heatwave warning issued!!,.. ", ""), "Heatwave warning issued.");
        assert_eq!(normalize("tsunami advisory lifted", ""), "Tsunami advisory lifted.");
    }

    #[test]
    fn falls_back_to_original_title_when_cleaning_empties() {
        // Nothing but decorative symbols: cleaning strips everything.
        assert_eq!(normalize("🌊🌀", ""), "🌊🌀");
    }

    #[test]
    fn breaking_headline_survives_cleaning() {
        let clean = normalize("BREAKING: Official USGS confirms magnitude 6.5 earthquake", "");
        assert!(!clean.is_empty());
        assert!(clean.to_lowercase().starts_with("breaking"));
        assert!(clean.ends_with('.'));
    }
}
