use std::path::Path;

use log::warn;

use crate::core::classifier::AlertClassifier;
use crate::core::gate::GateDecision;
use crate::core::report::{ReportCompiler, ScanReport};
use crate::core::sequencer::{PhaseSequencer, PollSettings};
use crate::core::state::PhaseState;
use crate::core::Phase;
use crate::errors::ScanError;
use crate::modules::summarizer::Summarizer;
use crate::modules::zap::ScannerApi;
use crate::notifications::Notifier;
use crate::{ScanConfig, SinkRef};

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub phases: Vec<(Phase, PhaseState)>,
    pub report: ScanReport,
    pub gate: GateDecision,
    /// Whether the notifier accepted the report.
    pub published: bool,
}

/// One full run against a live scanner: phases, classification, report,
/// gate, then publication.
pub struct ScanPipeline<'a> {
    config: &'a ScanConfig,
    scanner: &'a dyn ScannerApi,
    summarizer: &'a dyn Summarizer,
    notifier: Option<&'a dyn Notifier>,
    sink: SinkRef,
    polls: PollSettings,
}

impl<'a> ScanPipeline<'a> {
    pub fn new(
        config: &'a ScanConfig,
        scanner: &'a dyn ScannerApi,
        summarizer: &'a dyn Summarizer,
        sink: SinkRef,
    ) -> Self {
        Self {
            config,
            scanner,
            summarizer,
            notifier: None,
            sink,
            polls: PollSettings::default(),
        }
    }

    pub fn with_notifier(mut self, notifier: &'a dyn Notifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_poll_settings(mut self, polls: PollSettings) -> Self {
        self.polls = polls;
        self
    }

    pub async fn run(&self) -> Result<RunOutcome, ScanError> {
        self.config.validate()?;

        let sequence = PhaseSequencer::new(self.scanner, self.config, self.sink.clone())
            .with_poll_settings(self.polls)
            .run()
            .await?;

        self.sink.on_log("phase", "[*] Classifying alerts...");
        let classification = AlertClassifier::new(self.config, self.summarizer, self.sink.clone())
            .classify(&sequence.alerts)
            .await;
        self.sink.on_log(
            "info",
            &format!(
                "[*] {} alert(s) processed, {} retained, {} fail-on match(es)",
                classification.total_processed,
                classification.retained.len(),
                classification.fail_count
            ),
        );

        let report = ReportCompiler::new(self.summarizer, self.sink.clone())
            .compile(&classification, &sequence.alerts, &sequence.ajax_urls, Path::new(&self.config.output))
            .await?;

        // Only decided once the artifact is on disk.
        let gate = GateDecision::from_fail_count(report.fail_count);
        let published = self.publish(&report.narrative).await;

        Ok(RunOutcome {
            phases: sequence.phases,
            report,
            gate,
            published,
        })
    }

    async fn publish(&self, markdown: &str) -> bool {
        let Some(notifier) = self.notifier else {
            return false;
        };
        match notifier.publish(markdown).await {
            Ok(()) => {
                self.sink.on_log("success", "[+] Comment posted successfully!");
                true
            }
            Err(e) => {
                warn!("Notification failed: {}", e);
                self.sink.on_log("warn", &format!("[!] Failed to post comment: {}", e));
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::{alert, FakeScanner, RecordingNotifier, RecordingSink, StubSummarizer};
    use crate::core::RiskLevel;
    use crate::PhaseToggles;

    fn config(output: &Path) -> ScanConfig {
        ScanConfig {
            target: "http://app.local".to_string(),
            summarize_levels: RiskLevel::parse_set("high").unwrap(),
            ignore_levels: RiskLevel::parse_set("informational").unwrap(),
            fail_on_levels: RiskLevel::parse_set("high").unwrap(),
            alerts_limit: 5,
            output: output.to_string_lossy().to_string(),
            ..Default::default()
        }
    }

    fn scanner() -> FakeScanner {
        FakeScanner {
            alerts: vec![alert("High", "A"), alert("Informational", "B"), alert("High", "C")],
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_run_fails_gate_after_writing_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("security_report.txt");
        let config = config(&path);
        let scanner = scanner();
        let summarizer = StubSummarizer::default();
        let notifier = RecordingNotifier::default();

        let outcome = ScanPipeline::new(&config, &scanner, &summarizer, RecordingSink::new_ref())
            .with_notifier(&notifier)
            .run()
            .await
            .unwrap();

        assert_eq!(outcome.gate, GateDecision::Fail { matches: 2 });
        assert_eq!(outcome.report.entries.len(), 2);
        assert_eq!(outcome.report.histogram.get(&RiskLevel::Informational), Some(&1));
        assert!(path.exists());
        assert!(outcome.published);
        assert_eq!(notifier.published(), vec![outcome.report.narrative.clone()]);
        assert_eq!(outcome.report.ajax_urls, vec!["http://app.local/ajax".to_string()]);
        assert!(std::fs::read_to_string(&path).unwrap().contains("- http://app.local/ajax"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_policy_passes_gate() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(&dir.path().join("r.txt"));
        config.summarize_levels.clear();
        config.fail_on_levels.clear();
        let scanner = scanner();
        let summarizer = StubSummarizer::default();

        let outcome = ScanPipeline::new(&config, &scanner, &summarizer, RecordingSink::new_ref())
            .run()
            .await
            .unwrap();

        assert_eq!(outcome.gate, GateDecision::Pass);
        assert!(!outcome.published);
        assert!(outcome.report.entries.iter().all(|e| e.summary.text().is_none()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_notifier_failure_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir.path().join("r.txt"));
        let scanner = scanner();
        let summarizer = StubSummarizer::default();
        let notifier = RecordingNotifier { fail: true, ..Default::default() };
        let sink = RecordingSink::shared();

        let outcome = ScanPipeline::new(&config, &scanner, &summarizer, sink.clone())
            .with_notifier(&notifier)
            .run()
            .await
            .unwrap();

        assert!(!outcome.published);
        assert!(outcome.gate.is_failure());
        assert!(sink.logs().iter().any(|(level, m)| level == "warn" && m.contains("Failed to post comment")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scanner_failure_leaves_no_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("r.txt");
        let config = config(&path);
        let scanner = FakeScanner { fail_on: Some("active_status"), ..scanner() };
        let summarizer = StubSummarizer::default();

        let result = ScanPipeline::new(&config, &scanner, &summarizer, RecordingSink::new_ref())
            .run()
            .await;

        assert!(matches!(result, Err(ScanError::ScannerUnavailable { .. })));
        assert!(!path.exists());
        assert!(summarizer.requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_config_never_contacts_scanner() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(&dir.path().join("r.txt"));
        config.phases = PhaseToggles { spider: false, ajax_spider: false, passive: false, active: false };
        let scanner = scanner();
        let summarizer = StubSummarizer::default();

        let result = ScanPipeline::new(&config, &scanner, &summarizer, RecordingSink::new_ref())
            .run()
            .await;

        assert!(matches!(result, Err(ScanError::Configuration(_))));
        assert!(scanner.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_alerts_reach_sink_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir.path().join("r.txt"));
        let scanner = scanner();
        let summarizer = StubSummarizer::default();
        let sink = RecordingSink::shared();

        ScanPipeline::new(&config, &scanner, &summarizer, sink.clone())
            .run()
            .await
            .unwrap();

        assert_eq!(sink.alert_names(), vec!["A".to_string(), "C".to_string()]);
    }
}
