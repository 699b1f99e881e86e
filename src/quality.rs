//! Quality label normalization.
//!
//! Providers report quality in whatever vocabulary their site uses
//! (`"FHD"`, `"1080"`, `"4K HDR"`, `"Server 3"`). [`normalize`] maps every
//! label onto the canonical [`Quality`] ladder so downstream filtering always
//! has a comparable value.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Canonical resolution ladder, ordered lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Quality {
    #[serde(rename = "360p")]
    P360,
    #[serde(rename = "480p")]
    P480,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "2160p")]
    P2160,
}

impl Quality {
    /// Every rung of the ladder, ascending.
    pub const LADDER: [Quality; 5] = [
        Quality::P360,
        Quality::P480,
        Quality::P720,
        Quality::P1080,
        Quality::P2160,
    ];

    /// Value assigned to labels that match no token.
    pub const FALLBACK: Quality = Quality::P720;

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Quality::P360 => "360p",
            Quality::P480 => "480p",
            Quality::P720 => "720p",
            Quality::P1080 => "1080p",
            Quality::P2160 => "2160p",
        }
    }

    /// Vertical resolution in pixels.
    #[must_use]
    pub fn height(self) -> u32 {
        match self {
            Quality::P360 => 360,
            Quality::P480 => 480,
            Quality::P720 => 720,
            Quality::P1080 => 1080,
            Quality::P2160 => 2160,
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Quality {
    type Err = std::convert::Infallible;

    /// Never fails: unknown labels take the fallback rung.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(normalize(s))
    }
}

/// How a pattern is compared against a label.
#[derive(Debug, Clone, Copy)]
enum Pattern {
    /// Resolution marker, matched anywhere in the label (`"1080p"` in `"1080p.web"`).
    Fragment(&'static str),
    /// Word, matched against a whole alphanumeric token (`"hd"` but not `"hdr"`).
    Word(&'static str),
    /// Space-separated words, matched as consecutive tokens.
    Phrase(&'static str),
}

/// Ordered most-specific first; the first rule with a hit wins.
const RULES: [(&[Pattern], Quality); 5] = [
    (
        &[Pattern::Fragment("2160p"), Pattern::Word("4k"), Pattern::Word("uhd")],
        Quality::P2160,
    ),
    (
        &[
            Pattern::Fragment("1080p"),
            Pattern::Fragment("1080"),
            Pattern::Word("fhd"),
            Pattern::Phrase("full hd"),
        ],
        Quality::P1080,
    ),
    (
        &[Pattern::Fragment("720p"), Pattern::Fragment("720"), Pattern::Word("hd")],
        Quality::P720,
    ),
    (
        &[Pattern::Fragment("480p"), Pattern::Fragment("480"), Pattern::Word("sd")],
        Quality::P480,
    ),
    (
        &[Pattern::Fragment("360p"), Pattern::Fragment("360"), Pattern::Word("cam")],
        Quality::P360,
    ),
];

/// Map an arbitrary provider label onto the canonical ladder.
///
/// A bare number (`"720"`) is read as a resolution and suffixed with `p`
/// before matching. Labels matching nothing, including opaque server names,
/// become [`Quality::FALLBACK`].
#[must_use]
pub fn normalize(label: &str) -> Quality {
    let mut lowered = label.trim().to_lowercase();
    if !lowered.is_empty() && lowered.chars().all(|c| c.is_ascii_digit()) {
        lowered.push('p');
    }

    let tokens: Vec<&str> = lowered
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();

    RULES
        .iter()
        .find(|(patterns, _)| patterns.iter().any(|p| matches(*p, &lowered, &tokens)))
        .map_or(Quality::FALLBACK, |(_, quality)| *quality)
}

fn matches(pattern: Pattern, lowered: &str, tokens: &[&str]) -> bool {
    match pattern {
        Pattern::Fragment(f) => lowered.contains(f),
        Pattern::Word(w) => tokens.iter().any(|t| *t == w),
        Pattern::Phrase(p) => {
            let words: Vec<&str> = p.split(' ').collect();
            tokens.windows(words.len()).any(|window| window == words.as_slice())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_labels_map_to_ladder() {
        assert_eq!(normalize("Full HD"), Quality::P1080);
        assert_eq!(normalize("FHD"), Quality::P1080);
        assert_eq!(normalize("HD"), Quality::P720);
        assert_eq!(normalize("SD"), Quality::P480);
        assert_eq!(normalize("CAM"), Quality::P360);
        assert_eq!(normalize("4K"), Quality::P2160);
        assert_eq!(normalize("UHD"), Quality::P2160);
    }

    #[test]
    fn bare_numbers_are_resolutions() {
        assert_eq!(normalize("1080"), Quality::P1080);
        assert_eq!(normalize("720"), Quality::P720);
        assert_eq!(normalize("480"), Quality::P480);
        assert_eq!(normalize("360"), Quality::P360);
        assert_eq!(normalize("2160"), Quality::P2160);
    }

    #[test]
    fn unknown_labels_fall_back_to_720p() {
        assert_eq!(normalize("WEIRD-LABEL"), Quality::P720);
        assert_eq!(normalize("Server Alpha"), Quality::P720);
        assert_eq!(normalize(""), Quality::P720);
        assert_eq!(normalize("HDR10"), Quality::P720);
    }

    #[test]
    fn most_specific_rule_wins() {
        // "uhd" and "fhd" contain "hd" but must not be classified as 720p
        assert_eq!(normalize("UHD Blu-ray"), Quality::P2160);
        assert_eq!(normalize("fhd web"), Quality::P1080);
        // "full hd" is checked before the bare "hd" word
        assert_eq!(normalize("Stream - Full HD"), Quality::P1080);
        assert_eq!(normalize("2160p HDR"), Quality::P2160);
        assert_eq!(normalize("1080p WEB-DL"), Quality::P1080);
    }

    #[test]
    fn words_match_whole_tokens_only() {
        // "sd" inside "vidsd" is not the SD marker
        assert_eq!(normalize("vidsd"), Quality::P720);
        assert_eq!(normalize("Camera Angle"), Quality::P720);
        assert_eq!(normalize("full hdr"), Quality::P720);
    }

    #[test]
    fn ladder_is_ordered() {
        assert!(Quality::P360 < Quality::P480);
        assert!(Quality::P1080 < Quality::P2160);
        let heights: Vec<u32> = Quality::LADDER.iter().map(|q| q.height()).collect();
        assert_eq!(heights, vec![360, 480, 720, 1080, 2160]);
    }

    #[test]
    fn serializes_as_label() {
        let json = serde_json::to_string(&Quality::P1080).unwrap();
        assert_eq!(json, "\"1080p\"");
        assert_eq!(Quality::P2160.to_string(), "2160p");
    }
}
