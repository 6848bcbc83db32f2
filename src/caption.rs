use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Name of the derived column holding each row's caption category
pub const CAPTION_CATEGORY_COLUMN: &str = "caption_category";

/// Name of the free-text caption column
pub const CAPTION_TEXT_COLUMN: &str = "text";

/// Classification of a clip's free-text caption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptionCategory {
    None,
    NotEnoughInformation,
    SingleImage,
    NoMovement,
    Accepted,
}

/// Marker substrings checked in priority order; the first one contained in the caption wins.
const MARKERS: &[(&str, CaptionCategory)] = &[
    (
        "Not enough information",
        CaptionCategory::NotEnoughInformation,
    ),
    ("Single image", CaptionCategory::SingleImage),
    ("No movement", CaptionCategory::NoMovement),
];

impl CaptionCategory {
    pub const ALL: [CaptionCategory; 5] = [
        CaptionCategory::None,
        CaptionCategory::NotEnoughInformation,
        CaptionCategory::SingleImage,
        CaptionCategory::NoMovement,
        CaptionCategory::Accepted,
    ];

    /// Derive the category of a caption. Matching is case-sensitive substring containment.
    pub fn from_caption(caption: Option<&str>) -> Self {
        let text = match caption {
            Some(t) if !t.is_empty() => t,
            _ => return CaptionCategory::None,
        };
        MARKERS
            .iter()
            .find(|(marker, _)| text.contains(marker))
            .map(|(_, category)| *category)
            .unwrap_or(CaptionCategory::Accepted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CaptionCategory::None => "none",
            CaptionCategory::NotEnoughInformation => "not_enough_information",
            CaptionCategory::SingleImage => "single_image",
            CaptionCategory::NoMovement => "no_movement",
            CaptionCategory::Accepted => "accepted",
        }
    }
}

impl fmt::Display for CaptionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CaptionCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CaptionCategory::ALL
            .iter()
            .find(|c| c.as_str() == s)
            .copied()
            .ok_or_else(|| format!("Unknown caption category: {}", s))
    }
}
