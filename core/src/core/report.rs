use std::collections::BTreeMap;
use std::path::Path;

use log::warn;

use crate::core::alert::{Alert, ClassifiedAlert};
use crate::core::classifier::Classification;
use crate::core::RiskLevel;
use crate::errors::ScanError;
use crate::modules::summarizer::{Summarizer, SummaryKind};
use crate::utils::write_atomic;
use crate::SinkRef;

const SEPARATOR: &str = "----------------------------------------";

/// The compiled outcome of one run. Persisted once, never updated.
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub entries: Vec<ClassifiedAlert>,
    /// Counts over every raw alert, including ignored and capped ones.
    pub histogram: BTreeMap<RiskLevel, usize>,
    pub total_processed: usize,
    pub fail_count: usize,
    /// Pages the AJAX spider reached, as fetched after that phase.
    pub ajax_urls: Vec<String>,
    /// Statistics followed by the aggregate summary; this is what gets published.
    pub narrative: String,
}

impl ScanReport {
    pub fn render(&self) -> String {
        let mut out = String::from("# Security Scan Report\n\n");

        if self.entries.is_empty() {
            out.push_str("No alerts retained.\n\n");
        }
        for (i, entry) in self.entries.iter().enumerate() {
            out.push_str(&format!("### Alert {}\n\n", i + 1));
            out.push_str(&entry.alert.detail_text());
            out.push_str("\n\n**Summary:**\n\n");
            out.push_str(&entry.summary.to_string());
            out.push_str(&format!("\n\n{}\n\n", SEPARATOR));
        }

        if !self.ajax_urls.is_empty() {
            out.push_str("## AJAX Spider Results\n\n");
            for url in &self.ajax_urls {
                out.push_str(&format!("- {}\n", url));
            }
            out.push('\n');
        }

        out.push_str("## Final Summary\n\n");
        out.push_str(&self.narrative);
        out.push('\n');
        out
    }

    /// Rewrites the artifact at `path` in one step.
    pub fn persist(&self, path: &Path) -> Result<(), ScanError> {
        write_atomic(path, &self.render()).map_err(|source| ScanError::Report {
            path: path.display().to_string(),
            source,
        })
    }
}

pub fn risk_histogram(alerts: &[Alert]) -> BTreeMap<RiskLevel, usize> {
    let mut histogram = BTreeMap::new();
    for alert in alerts {
        *histogram.entry(alert.risk_level()).or_insert(0) += 1;
    }
    histogram
}

fn statistics_block(histogram: &BTreeMap<RiskLevel, usize>, total_processed: usize, fail_count: usize) -> String {
    let mut out = String::from("### Alerts by risk level (all alerts)\n\n");
    if histogram.is_empty() {
        out.push_str("- None\n");
    }
    for (level, count) in histogram {
        out.push_str(&format!("- {}: {}\n", level, count));
    }
    out.push_str("\n### Alerts processed\n\n");
    out.push_str(&format!("- Processed: {}\n", total_processed));
    out.push_str(&format!("- Fail-on matches: {}\n", fail_count));
    out
}

/// Builds the report, asks for the aggregate summary, and writes the artifact.
pub struct ReportCompiler<'a> {
    summarizer: &'a dyn Summarizer,
    sink: SinkRef,
}

impl<'a> ReportCompiler<'a> {
    pub fn new(summarizer: &'a dyn Summarizer, sink: SinkRef) -> Self {
        Self { summarizer, sink }
    }

    pub async fn compile(
        &self,
        classification: &Classification,
        raw_alerts: &[Alert],
        ajax_urls: &[String],
        output: &Path,
    ) -> Result<ScanReport, ScanError> {
        let histogram = risk_histogram(raw_alerts);
        let stats = statistics_block(&histogram, classification.total_processed, classification.fail_count);

        let summaries: Vec<&str> = classification
            .retained
            .iter()
            .filter_map(|entry| entry.summary.text())
            .collect();

        let mut request = stats.clone();
        if !summaries.is_empty() {
            request.push_str("\n### Alert summaries\n\n");
            request.push_str(&summaries.join("\n\n---\n\n"));
            request.push('\n');
        }

        self.sink.on_log("phase", "[*] Generating final summary...");
        let overall = match self.summarizer.summarize(SummaryKind::Aggregate, &request).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Aggregate summarization failed: {}", e);
                self.sink.on_log("warn", &format!("[!] Final summary unavailable: {}", e));
                format!("*Aggregate summary unavailable: {}*", e)
            }
        };

        let report = ScanReport {
            entries: classification.retained.clone(),
            histogram,
            total_processed: classification.total_processed,
            fail_count: classification.fail_count,
            ajax_urls: ajax_urls.to_vec(),
            narrative: format!("{}\n{}", stats, overall),
        };

        report.persist(output)?;
        self.sink.on_log("success", &format!("[+] Report written to {}", output.display()));
        Ok(report)
    }
}
