use log::{debug, warn};

use crate::core::alert::{Alert, ClassifiedAlert, Summary};
use crate::modules::summarizer::{Summarizer, SummaryKind};
use crate::{ScanConfig, SinkRef};

/// Result of one classification pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classification {
    /// Retained alerts in scanner order.
    pub retained: Vec<ClassifiedAlert>,
    /// Non-ignored alerts that were processed before the cap was hit.
    pub total_processed: usize,
    /// Processed alerts whose risk matched a fail-on level.
    pub fail_count: usize,
}

/// Applies the configured risk policy to the scanner's raw alerts.
///
/// Precedence per alert: ignore, then the processing cap, then fail-on
/// counting and summarization. Summaries are requested one at a time.
pub struct AlertClassifier<'a> {
    config: &'a ScanConfig,
    summarizer: &'a dyn Summarizer,
    sink: SinkRef,
}

impl<'a> AlertClassifier<'a> {
    pub fn new(config: &'a ScanConfig, summarizer: &'a dyn Summarizer, sink: SinkRef) -> Self {
        Self { config, summarizer, sink }
    }

    pub async fn classify(&self, raw_alerts: &[Alert]) -> Classification {
        let mut result = Classification::default();

        for alert in raw_alerts {
            let level = alert.risk_level();

            if self.config.ignore_levels.contains(&level) {
                debug!("Ignoring {} alert '{}'", level, alert.name);
                continue;
            }

            if result.total_processed == self.config.alerts_limit {
                self.sink.on_log(
                    "warn",
                    &format!("[!] Alert limit ({}) reached, remaining alerts skipped", self.config.alerts_limit),
                );
                break;
            }
            result.total_processed += 1;

            let counted = self.config.fail_on_levels.contains(&level);
            if counted {
                result.fail_count += 1;
            }

            let summary = if self.config.summarize_levels.contains(&level) {
                self.summarize(alert).await
            } else {
                Summary::NotSummarized
            };

            let classified = ClassifiedAlert {
                alert: alert.clone(),
                summary,
                counted,
            };
            self.sink.on_alert(&classified);
            result.retained.push(classified);
        }

        result
    }

    async fn summarize(&self, alert: &Alert) -> Summary {
        self.sink.on_log("debug", &format!("[*] Summarizing '{}'", alert.name));
        match self.summarizer.summarize(SummaryKind::Alert, &alert.detail_text()).await {
            Ok(text) => Summary::Summarized(text),
            Err(e) => {
                warn!("Summarization failed for '{}': {}", alert.name, e);
                self.sink.on_log("warn", &format!("[!] Summary unavailable for '{}': {}", alert.name, e));
                Summary::Unavailable(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::{alert, RecordingSink, StubSummarizer};
    use crate::core::RiskLevel;
    use std::collections::BTreeSet;

    fn levels(raw: &str) -> BTreeSet<RiskLevel> {
        RiskLevel::parse_set(raw).unwrap()
    }

    fn policy(summarize: &str, ignore: &str, fail_on: &str, limit: usize) -> ScanConfig {
        ScanConfig {
            target: "http://app.local".to_string(),
            summarize_levels: levels(summarize),
            ignore_levels: levels(ignore),
            fail_on_levels: levels(fail_on),
            alerts_limit: limit,
            ..Default::default()
        }
    }

    fn sample() -> Vec<Alert> {
        vec![alert("High", "A"), alert("Informational", "B"), alert("High", "C")]
    }

    fn names(c: &Classification) -> Vec<&str> {
        c.retained.iter().map(|r| r.alert.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_ignore_summarize_and_fail_on() {
        let config = policy("high", "informational", "high", 5);
        let summarizer = StubSummarizer::default();
        let result = AlertClassifier::new(&config, &summarizer, RecordingSink::new_ref())
            .classify(&sample())
            .await;

        assert_eq!(names(&result), vec!["A", "C"]);
        assert_eq!(result.total_processed, 2);
        assert_eq!(result.fail_count, 2);
        assert!(result.retained.iter().all(|r| r.counted));
        assert!(result.retained.iter().all(|r| matches!(r.summary, Summary::Summarized(_))));
        assert_eq!(summarizer.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_summaries_requested_one_per_alert_in_order() {
        let config = policy("high,low", "informational", "", 5);
        let summarizer = StubSummarizer::default();
        let raw = vec![alert("High", "A"), alert("Informational", "B"), alert("Low", "D"), alert("High", "C")];

        AlertClassifier::new(&config, &summarizer, RecordingSink::new_ref())
            .classify(&raw)
            .await;

        let requests = summarizer.requests();
        assert!(requests.iter().all(|(kind, _)| *kind == SummaryKind::Alert));
        let order: Vec<&str> = requests
            .iter()
            .map(|(_, text)| text.lines().next().unwrap_or_default())
            .collect();
        assert_eq!(order, vec!["Name: A", "Name: D", "Name: C"]);
    }

    #[tokio::test]
    async fn test_limit_stops_pass() {
        let config = policy("high", "informational", "high", 1);
        let summarizer = StubSummarizer::default();
        let result = AlertClassifier::new(&config, &summarizer, RecordingSink::new_ref())
            .classify(&sample())
            .await;

        assert_eq!(names(&result), vec!["A"]);
        assert_eq!(result.total_processed, 1);
        assert_eq!(result.fail_count, 1);
        assert_eq!(summarizer.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_policy_retains_with_sentinel() {
        let config = policy("", "informational", "", 5);
        let summarizer = StubSummarizer::default();
        let result = AlertClassifier::new(&config, &summarizer, RecordingSink::new_ref())
            .classify(&sample())
            .await;

        assert_eq!(result.retained.len(), 2);
        assert!(result.retained.iter().all(|r| r.summary == Summary::NotSummarized));
        assert_eq!(result.fail_count, 0);
        assert!(summarizer.requests().is_empty());
    }

    #[tokio::test]
    async fn test_ignore_takes_precedence_over_everything() {
        let config = policy("high", "high", "high", 0);
        let summarizer = StubSummarizer::default();
        let sink = RecordingSink::shared();
        let result = AlertClassifier::new(&config, &summarizer, sink.clone())
            .classify(&[alert("High", "A"), alert("HIGH", "B")])
            .await;

        assert!(result.retained.is_empty());
        assert_eq!(result.total_processed, 0);
        assert_eq!(result.fail_count, 0);
        assert!(summarizer.requests().is_empty());
        // The cap of 0 was never hit because nothing non-ignored was seen.
        assert!(sink.logs().iter().all(|(_, m)| !m.contains("limit")));
    }

    #[tokio::test]
    async fn test_zero_limit_retains_nothing() {
        let config = policy("", "", "high", 0);
        let summarizer = StubSummarizer::default();
        let result = AlertClassifier::new(&config, &summarizer, RecordingSink::new_ref())
            .classify(&sample())
            .await;

        assert!(result.retained.is_empty());
        assert_eq!(result.fail_count, 0);
    }

    #[tokio::test]
    async fn test_retained_never_exceeds_limit_and_keeps_order() {
        let raw: Vec<Alert> = (0..20)
            .map(|i| alert(["High", "Medium", "Low", "Informational"][i % 4], &format!("n{:02}", i)))
            .collect();
        let summarizer = StubSummarizer::default();

        for limit in [0, 1, 3, 7, 50] {
            let config = policy("medium", "low", "high", limit);
            let result = AlertClassifier::new(&config, &summarizer, RecordingSink::new_ref())
                .classify(&raw)
                .await;

            assert!(result.retained.len() <= limit);
            assert!(result.retained.iter().all(|r| r.alert.risk_level() != RiskLevel::Low));
            let got = names(&result);
            let mut sorted = got.clone();
            sorted.sort();
            assert_eq!(got, sorted, "order changed for limit {}", limit);
        }
    }

    #[tokio::test]
    async fn test_classification_is_idempotent() {
        let config = policy("high,medium", "informational", "high", 10);
        let raw = vec![
            alert("Medium", "X"),
            alert("High", "Y"),
            alert("Informational", "Z"),
            alert("Low", "W"),
        ];
        let summarizer = StubSummarizer::default();
        let classifier = AlertClassifier::new(&config, &summarizer, RecordingSink::new_ref());

        let first = classifier.classify(&raw).await;
        let second = classifier.classify(&raw).await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_summary_failure_degrades_per_alert() {
        let config = policy("high", "", "", 10);
        let summarizer = StubSummarizer { fail_when: Some("Name: A"), ..Default::default() };
        let result = AlertClassifier::new(&config, &summarizer, RecordingSink::new_ref())
            .classify(&[alert("High", "A"), alert("High", "C")])
            .await;

        assert!(matches!(result.retained[0].summary, Summary::Unavailable(_)));
        assert_eq!(result.retained[1].summary, Summary::Summarized("summary of Name: C".to_string()));
    }

    #[tokio::test]
    async fn test_unknown_risk_matches_no_set() {
        let config = policy("high,medium,low,informational", "", "high", 10);
        let summarizer = StubSummarizer::default();
        let result = AlertClassifier::new(&config, &summarizer, RecordingSink::new_ref())
            .classify(&[alert("Critical", "odd")])
            .await;

        assert_eq!(result.total_processed, 1);
        assert_eq!(result.fail_count, 0);
        assert_eq!(result.retained[0].summary, Summary::NotSummarized);
    }
}
