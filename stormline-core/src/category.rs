//! Keyword-driven disaster category detection.

use crate::Category;

/// Ordered mapping from category to its keyword set. Order is the tie-break:
/// the first category with any match wins.
pub const CATEGORY_KEYWORDS: &[(Category, &[&str])] = &[
    (
        Category::Earthquake,
        &[
            "earthquake",
            "seismic",
            "tremor",
            "quake",
            "magnitude",
            "richter",
            "epicenter",
        ],
    ),
    (
        Category::Flood,
        &[
            "flood",
            "flooding",
            "deluge",
            "inundation",
            "overflow",
            "dam burst",
            "levee",
        ],
    ),
    (
        Category::Fire,
        &[
            "wildfire",
            "forest fire",
            "bushfire",
            "fire",
            "blaze",
            "inferno",
            "burn",
        ],
    ),
    (
        Category::Storm,
        &[
            "hurricane", "typhoon", "cyclone", "tornado", "storm", "tempest", "gale",
        ],
    ),
    (
        Category::Weather,
        &[
            "heatwave",
            "blizzard",
            "drought",
            "extreme weather",
            "severe weather",
        ],
    ),
    (
        Category::Volcanic,
        &[
            "volcano", "volcanic", "eruption", "lava", "ash cloud", "magma",
        ],
    ),
    (
        Category::Landslide,
        &[
            "landslide",
            "mudslide",
            "avalanche",
            "rockslide",
            "debris flow",
        ],
    ),
    (
        Category::Tsunami,
        &["tsunami", "tidal wave", "seismic wave"],
    ),
];

/// Map normalized text to a disaster category.
///
/// Case-insensitive substring match; [`Category::General`] when nothing hits.
///
/// ```
/// use stormline_core::category::detect_category;
/// use stormline_core::Category;
///
/// assert_eq!(
///     detect_category("7.2 magnitude earthquake hits coast"),
///     Category::Earthquake
/// );
/// assert_eq!(detect_category("no keywords here"), Category::General);
/// ```
pub fn detect_category(text: &str) -> Category {
    let lower = text.to_lowercase();
    for (category, keywords) in CATEGORY_KEYWORDS {
        if keywords.iter().any(|k| lower.contains(k)) {
            return *category;
        }
    }
    Category::General
}
