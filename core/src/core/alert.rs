use serde::{Deserialize, Serialize};

use crate::core::RiskLevel;

/// Rendered in place of a summary when the alert's risk level is not configured for summarization.
pub const NOT_SUMMARIZED_TEXT: &str = "*No summary generated for this alert based on configuration.*";

/// One finding as reported by the scanner's alerts view.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Alert {
    pub name: String,
    pub risk: String,
    pub confidence: String,
    pub description: String,
    pub url: String,
    pub solution: String,
    pub param: String,
    pub evidence: String,
    pub reference: String,
    #[serde(rename = "cweid")]
    pub cwe_id: String,
    #[serde(rename = "pluginId")]
    pub plugin_id: String,
}

impl Alert {
    pub fn risk_level(&self) -> RiskLevel {
        RiskLevel::normalize(&self.risk)
    }

    /// Plain-text rendering of the alert, used both in the report and as
    /// summarization input.
    pub fn detail_text(&self) -> String {
        let mut lines = vec![
            format!("Name: {}", or_default(&self.name, "Unnamed alert")),
            format!("Risk: {}", or_default(&self.risk, "Unknown")),
        ];
        if !self.confidence.is_empty() {
            lines.push(format!("Confidence: {}", self.confidence));
        }
        lines.push(format!("URL: {}", or_default(&self.url, "Unknown")));
        if !self.param.is_empty() {
            lines.push(format!("Parameter: {}", self.param));
        }
        if !self.evidence.is_empty() {
            lines.push(format!("Evidence: {}", self.evidence));
        }
        if !self.cwe_id.is_empty() && self.cwe_id != "-1" && self.cwe_id != "0" {
            lines.push(format!("CWE: {}", self.cwe_id));
        }
        lines.push(format!("Description: {}", or_default(&self.description, "No description")));
        lines.push(format!("Solution: {}", or_default(&self.solution, "No solution provided")));
        lines.join("\n")
    }
}

fn or_default<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.trim().is_empty() { fallback } else { value.trim() }
}

/// What the classifier attached to a retained alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Summary {
    Summarized(String),
    NotSummarized,
    /// Summarization was requested but the gateway failed.
    Unavailable(String),
}

impl Summary {
    /// The generated text, if any.
    pub fn text(&self) -> Option<&str> {
        match self {
            Summary::Summarized(text) => Some(text),
            _ => None,
        }
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Summary::Summarized(text) => write!(f, "{}", text),
            Summary::NotSummarized => write!(f, "{}", NOT_SUMMARIZED_TEXT),
            Summary::Unavailable(reason) => write!(f, "*Summary unavailable: {}*", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedAlert {
    pub alert: Alert,
    pub summary: Summary,
    /// True when the alert matched a fail-on level.
    pub counted: bool,
}
