pub mod alert;
pub mod classifier;
pub mod gate;
pub mod pipeline;
pub mod poll;
pub mod report;
pub mod sequencer;
pub mod state;
#[cfg(test)]
pub(crate) mod testing;

use std::collections::BTreeSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::ScanError;

/// Normalized severity label.
///
/// Declaration order doubles as display order (most severe first), so a
/// `BTreeMap<RiskLevel, _>` iterates High → Informational → anything else.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RiskLevel {
    High,
    Medium,
    Low,
    Informational,
    /// A label the scanner reported that is not one of the known levels.
    /// Stored lower-cased. Never matches a configured policy set.
    Other(String),
}

impl RiskLevel {
    /// Lenient normalization used for scanner-reported labels.
    pub fn normalize(raw: &str) -> Self {
        let lower = raw.trim().to_lowercase();
        match lower.as_str() {
            "high" => RiskLevel::High,
            "medium" => RiskLevel::Medium,
            "low" => RiskLevel::Low,
            "informational" | "info" => RiskLevel::Informational,
            "" => RiskLevel::Other("unknown".to_string()),
            _ => RiskLevel::Other(lower),
        }
    }

    /// Parses a comma-separated list of labels into a set.
    /// Blank input yields an empty set.
    pub fn parse_set(raw: &str) -> Result<BTreeSet<RiskLevel>, ScanError> {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(RiskLevel::from_str)
            .collect()
    }
}

impl FromStr for RiskLevel {
    type Err = ScanError;

    /// Strict parse for configured labels: unknown labels are rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match RiskLevel::normalize(s) {
            RiskLevel::Other(_) => Err(ScanError::config(format!(
                "unknown risk level '{}' (expected high, medium, low or informational)",
                s.trim()
            ))),
            level => Ok(level),
        }
    }
}

impl TryFrom<String> for RiskLevel {
    type Error = ScanError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RiskLevel> for String {
    fn from(level: RiskLevel) -> Self {
        level.to_string()
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::High => write!(f, "High"),
            RiskLevel::Medium => write!(f, "Medium"),
            RiskLevel::Low => write!(f, "Low"),
            RiskLevel::Informational => write!(f, "Informational"),
            RiskLevel::Other(label) => {
                let mut chars = label.chars();
                match chars.next() {
                    Some(first) => write!(f, "{}{}", first.to_uppercase(), chars.as_str()),
                    None => Ok(()),
                }
            }
        }
    }
}

/// One stage of the scan lifecycle, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Spider,
    AjaxSpider,
    Passive,
    Active,
}

impl Phase {
    pub const ORDER: [Phase; 4] = [Phase::Spider, Phase::AjaxSpider, Phase::Passive, Phase::Active];
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Spider => write!(f, "Spider"),
            Phase::AjaxSpider => write!(f, "AJAX Spider"),
            Phase::Passive => write!(f, "Passive Scan"),
            Phase::Active => write!(f, "Active Scan"),
        }
    }
}
