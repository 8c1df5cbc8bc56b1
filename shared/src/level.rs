use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Administrative tier shown on the map, finest last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Region,
    Departement,
    Commune,
}

impl Level {
    pub const ALL: [Level; 3] = [Level::Region, Level::Departement, Level::Commune];

    /// Map the tile source's `level` property (1, 2, 3) to a tier.
    pub fn from_ordinal(ordinal: i64) -> Option<Self> {
        match ordinal {
            1 => Some(Self::Region),
            2 => Some(Self::Departement),
            3 => Some(Self::Commune),
            _ => None,
        }
    }

    pub const fn ordinal(self) -> i64 {
        match self {
            Self::Region => 1,
            Self::Departement => 2,
            Self::Commune => 3,
        }
    }

    /// Interactive layer ids registered by the map shell. Anything that is not
    /// a commune or departement layer is treated as the region layer.
    pub fn from_layer_id(layer_id: &str) -> Self {
        match layer_id {
            "communes" => Self::Commune,
            "departements" => Self::Departement,
            _ => Self::Region,
        }
    }

    pub const fn layer_id(self) -> &'static str {
        match self {
            Self::Region => "regions",
            Self::Departement => "departements",
            Self::Commune => "communes",
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Region => "region",
            Self::Departement => "departement",
            Self::Commune => "commune",
        }
    }

    /// Collectivity type stored in the `collectivites` table.
    pub const fn collectivite_type(self) -> &'static str {
        match self {
            Self::Region => "REG",
            Self::Departement => "DEP",
            Self::Commune => "COM",
        }
    }

    pub const fn index(self) -> usize {
        match self {
            Self::Region => 0,
            Self::Departement => 1,
            Self::Commune => 2,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "region" | "regions" => Ok(Self::Region),
            "departement" | "departements" => Ok(Self::Departement),
            "commune" | "communes" => Ok(Self::Commune),
            other => Err(format!("unknown administrative level: {other}")),
        }
    }
}
