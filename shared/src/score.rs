use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Ordinal written for a feature with no record or no score.
pub const WORST_SCORE_ORDINAL: u8 = 5;

/// Five-level transparency grade, A best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TransparencyScore {
    A,
    B,
    C,
    D,
    E,
}

impl TransparencyScore {
    pub const ALL: [TransparencyScore; 5] = [Self::A, Self::B, Self::C, Self::D, Self::E];

    /// Parse a database score letter. Surrounding whitespace is ignored
    /// but letters are case-sensitive: anything but `A`..`E` is no score.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "A" => Some(Self::A),
            "B" => Some(Self::B),
            "C" => Some(Self::C),
            "D" => Some(Self::D),
            "E" => Some(Self::E),
            _ => None,
        }
    }

    /// Numeric value used for choropleth styling: A=1 .. E=5.
    pub const fn ordinal(self) -> u8 {
        match self {
            Self::A => 1,
            Self::B => 2,
            Self::C => 3,
            Self::D => 4,
            Self::E => 5,
        }
    }

    pub const fn letter(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
            Self::E => "E",
        }
    }
}

impl fmt::Display for TransparencyScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.letter())
    }
}

/// Ordinal of an optional score; "no data" maps to the worst value.
pub fn score_ordinal(score: Option<TransparencyScore>) -> u8 {
    score.map_or(WORST_SCORE_ORDINAL, TransparencyScore::ordinal)
}

/// Which score drives the choropleth. The string form doubles as the
/// feature-state key written into the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ScoreAttribute {
    #[default]
    #[serde(rename = "mp_score")]
    MarchesPublics,
    #[serde(rename = "subventions_score")]
    Subventions,
}

impl ScoreAttribute {
    pub const ALL: [ScoreAttribute; 2] = [Self::MarchesPublics, Self::Subventions];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MarchesPublics => "mp_score",
            Self::Subventions => "subventions_score",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::MarchesPublics => "Transparence des Marchés Publics",
            Self::Subventions => "Transparence des Subventions",
        }
    }
}

impl fmt::Display for ScoreAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScoreAttribute {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mp_score" => Ok(Self::MarchesPublics),
            "subventions_score" => Ok(Self::Subventions),
            other => Err(format!("unknown score attribute: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinals_increase_from_best_to_worst() {
        let ordinals: Vec<u8> = TransparencyScore::ALL
            .iter()
            .map(|s| s.ordinal())
            .collect();
        assert_eq!(ordinals, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn missing_score_is_worst() {
        assert_eq!(score_ordinal(None), WORST_SCORE_ORDINAL);
        assert_eq!(score_ordinal(Some(TransparencyScore::B)), 2);
    }

    #[test]
    fn parse_rejects_unknown_letters() {
        assert_eq!(TransparencyScore::parse(" C "), Some(TransparencyScore::C));
        assert_eq!(TransparencyScore::parse("F"), None);
        assert_eq!(TransparencyScore::parse("a"), None);
        assert_eq!(TransparencyScore::parse("c"), None);
        assert_eq!(TransparencyScore::parse(""), None);
    }

    #[test]
    fn score_attribute_serializes_as_feature_state_key() {
        let json = serde_json::to_string(&ScoreAttribute::Subventions).expect("serialize");
        assert_eq!(json, "\"subventions_score\"");
        assert_eq!(
            "mp_score".parse::<ScoreAttribute>(),
            Ok(ScoreAttribute::MarchesPublics)
        );
    }
}
