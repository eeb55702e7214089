//! Fakes shared by the unit tests of the pipeline pieces.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::core::alert::{Alert, ClassifiedAlert};
use crate::errors::{GatewayError, ScanError};
use crate::modules::summarizer::{Summarizer, SummaryKind};
use crate::modules::zap::ScannerApi;
use crate::notifications::Notifier;
use crate::{ScanEventSink, SinkRef};

pub fn alert(risk: &str, name: &str) -> Alert {
    Alert {
        name: name.to_string(),
        risk: risk.to_string(),
        url: format!("http://app.local/{}", name.to_lowercase().replace(' ', "-")),
        description: format!("{} description", name),
        solution: format!("Fix {}", name),
        ..Default::default()
    }
}

/// Scripted scanner. Status sequences repeat their last value once
/// exhausted; an empty sequence means "already finished".
#[derive(Default)]
pub struct FakeScanner {
    pub spider_progress: Vec<u32>,
    pub active_progress: Vec<u32>,
    pub passive_remaining: Vec<u64>,
    pub ajax_statuses: Vec<String>,
    pub alerts: Vec<Alert>,
    pub fail_on: Option<&'static str>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeScanner {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, name: &str) -> Result<usize, ScanError> {
        let mut calls = self.calls.lock().unwrap();
        calls.push(name.to_string());
        if self.fail_on == Some(name) {
            return Err(ScanError::unavailable(name, "injected failure"));
        }
        Ok(calls.iter().filter(|c| *c == name).count() - 1)
    }

    fn scripted<T: Clone>(seq: &[T], index: usize, finished: T) -> T {
        seq.get(index).or(seq.last()).cloned().unwrap_or(finished)
    }
}

#[async_trait]
impl ScannerApi for FakeScanner {
    async fn access_url(&self, _target: &str) -> Result<(), ScanError> {
        self.record("access_url").map(|_| ())
    }

    async fn spider_scan(&self, _target: &str) -> Result<String, ScanError> {
        self.record("spider_scan").map(|_| "0".to_string())
    }

    async fn spider_status(&self, _scan_id: &str) -> Result<u32, ScanError> {
        let i = self.record("spider_status")?;
        Ok(Self::scripted(&self.spider_progress, i, 100))
    }

    async fn ajax_spider_scan(&self, _target: &str) -> Result<(), ScanError> {
        self.record("ajax_spider_scan").map(|_| ())
    }

    async fn ajax_spider_status(&self) -> Result<String, ScanError> {
        let i = self.record("ajax_spider_status")?;
        Ok(Self::scripted(&self.ajax_statuses, i, "stopped".to_string()))
    }

    async fn ajax_spider_stop(&self) -> Result<(), ScanError> {
        self.record("ajax_spider_stop").map(|_| ())
    }

    async fn ajax_spider_results(&self, _start: usize, _count: usize) -> Result<Vec<String>, ScanError> {
        self.record("ajax_spider_results")?;
        Ok(vec!["http://app.local/ajax".to_string()])
    }

    async fn passive_records_remaining(&self) -> Result<u64, ScanError> {
        let i = self.record("passive_records_remaining")?;
        Ok(Self::scripted(&self.passive_remaining, i, 0))
    }

    async fn active_scan(&self, _target: &str) -> Result<String, ScanError> {
        self.record("active_scan").map(|_| "1".to_string())
    }

    async fn active_status(&self, _scan_id: &str) -> Result<u32, ScanError> {
        let i = self.record("active_status")?;
        Ok(Self::scripted(&self.active_progress, i, 100))
    }

    async fn alerts(&self, start: usize, count: usize) -> Result<Vec<Alert>, ScanError> {
        self.record("alerts")?;
        let start = start.min(self.alerts.len());
        let end = (start + count).min(self.alerts.len());
        Ok(self.alerts[start..end].to_vec())
    }

    async fn hosts(&self) -> Result<Vec<String>, ScanError> {
        self.record("hosts")?;
        Ok(vec!["app.local".to_string()])
    }
}

/// Deterministic summarizer that remembers every request.
#[derive(Default)]
pub struct StubSummarizer {
    /// Requests whose text contains this marker fail.
    pub fail_when: Option<&'static str>,
    pub requests: Mutex<Vec<(SummaryKind, String)>>,
}

impl StubSummarizer {
    pub fn requests(&self) -> Vec<(SummaryKind, String)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Summarizer for StubSummarizer {
    async fn summarize(&self, kind: SummaryKind, text: &str) -> Result<String, GatewayError> {
        self.requests.lock().unwrap().push((kind, text.to_string()));
        if let Some(marker) = self.fail_when {
            if text.contains(marker) {
                return Err(GatewayError::Status { status: 503, body: "overloaded".to_string() });
            }
        }
        match kind {
            SummaryKind::Alert => Ok(format!("summary of {}", text.lines().next().unwrap_or(""))),
            SummaryKind::Aggregate => Ok("Overall the application needs attention.".to_string()),
        }
    }
}

#[derive(Default)]
pub struct RecordingSink {
    logs: Mutex<Vec<(String, String)>>,
    alerts: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn new_ref() -> SinkRef {
        Arc::new(Self::default())
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn logs(&self) -> Vec<(String, String)> {
        self.logs.lock().unwrap().clone()
    }

    pub fn alert_names(&self) -> Vec<String> {
        self.alerts.lock().unwrap().clone()
    }
}

impl ScanEventSink for RecordingSink {
    fn on_log(&self, level: &str, message: &str) {
        self.logs.lock().unwrap().push((level.to_string(), message.to_string()));
    }

    fn on_progress(&self, _phase: &str, _current: usize, _total: usize) {}

    fn on_alert(&self, alert: &ClassifiedAlert) {
        self.alerts.lock().unwrap().push(alert.alert.name.clone());
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub fail: bool,
    pub published: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn published(&self) -> Vec<String> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn publish(&self, markdown: &str) -> Result<(), GatewayError> {
        self.published.lock().unwrap().push(markdown.to_string());
        if self.fail {
            Err(GatewayError::Status { status: 404, body: "Not Found".to_string() })
        } else {
            Ok(())
        }
    }
}
