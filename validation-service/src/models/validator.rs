use serde::{Deserialize, Serialize};
use std::fmt;

/// External validator families the service knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidatorKind {
    Bids,
    Nix,
    Odml,
}

impl ValidatorKind {
    pub const ALL: [ValidatorKind; 3] = [ValidatorKind::Bids, ValidatorKind::Nix, ValidatorKind::Odml];

    pub fn as_str(&self) -> &'static str {
        match self {
            ValidatorKind::Bids => "bids",
            ValidatorKind::Nix => "nix",
            ValidatorKind::Odml => "odml",
        }
    }
}

impl fmt::Display for ValidatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ValidatorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bids" => Ok(ValidatorKind::Bids),
            "nix" => Ok(ValidatorKind::Nix),
            "odml" => Ok(ValidatorKind::Odml),
            _ => Err(format!("Unknown validator: {}", s)),
        }
    }
}
