pub mod core;
pub mod errors;
pub mod modules;
pub mod notifications;
pub mod utils;

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use url::Url;

pub use crate::core::alert::{Alert, ClassifiedAlert, Summary, NOT_SUMMARIZED_TEXT};
pub use crate::core::classifier::{AlertClassifier, Classification};
pub use crate::core::gate::{should_fail, GateDecision};
pub use crate::core::pipeline::{RunOutcome, ScanPipeline};
pub use crate::core::poll::{poll_until, PollOutcome, PollSpec};
pub use crate::core::report::{ReportCompiler, ScanReport};
pub use crate::core::sequencer::{PhaseSequencer, PollSettings, SequenceOutcome};
pub use crate::core::state::{PhaseState, PhaseTracker};
pub use crate::core::{Phase, RiskLevel};
pub use crate::errors::{GatewayError, ScanError};
pub use crate::modules::summarizer::{OpenAiSummarizer, SummarizerSettings, Summarizer, SummaryKind, UnconfiguredSummarizer};
pub use crate::modules::supervisor::ScannerProcess;
pub use crate::modules::zap::{ScannerApi, ZapClient};
pub use crate::notifications::{GithubNotifier, GithubSettings, Notifier};

/// Which scan phases to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PhaseToggles {
    pub spider: bool,
    pub ajax_spider: bool,
    pub passive: bool,
    pub active: bool,
}

impl Default for PhaseToggles {
    fn default() -> Self {
        Self {
            spider: true,
            ajax_spider: true,
            passive: true,
            active: true,
        }
    }
}

impl PhaseToggles {
    pub fn is_enabled(&self, phase: Phase) -> bool {
        match phase {
            Phase::Spider => self.spider,
            Phase::AjaxSpider => self.ajax_spider,
            Phase::Passive => self.passive,
            Phase::Active => self.active,
        }
    }

    pub fn enabled(&self) -> Vec<Phase> {
        Phase::ORDER.iter().copied().filter(|p| self.is_enabled(*p)).collect()
    }

    pub fn any(&self) -> bool {
        self.spider || self.ajax_spider || self.passive || self.active
    }
}

/// Where the scanner lives and how to launch it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScannerSettings {
    /// Scanner launcher (e.g. `zap.sh`). When unset and `launch` is off, an
    /// already running scanner at `host:port` is used and left running.
    pub zap_path: Option<String>,
    /// Start a daemon even without `zap_path`, discovering the launcher in
    /// `./tools` or on `PATH`.
    pub launch: bool,
    pub host: String,
    pub port: u16,
    pub api_key: Option<String>,
    pub startup_timeout: u64,
    pub request_timeout: u64,
    /// Seconds a launched daemon gets to exit after the shutdown request.
    pub shutdown_grace: u64,
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self {
            zap_path: None,
            launch: false,
            host: "localhost".to_string(),
            port: 8080,
            api_key: None,
            startup_timeout: 60,
            request_timeout: 60,
            shutdown_grace: 10,
        }
    }
}

impl ScannerSettings {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}/", self.host, self.port)
    }

    /// True when this run owns the daemon's lifetime.
    pub fn launches_daemon(&self) -> bool {
        self.launch || self.zap_path.as_deref().is_some_and(|p| !p.trim().is_empty())
    }

    pub fn api_key_ref(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.is_empty())
    }
}

/// Everything a run needs, fixed before the scanner is contacted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScanConfig {
    pub target: String,
    pub phases: PhaseToggles,
    pub summarize_levels: BTreeSet<RiskLevel>,
    pub ignore_levels: BTreeSet<RiskLevel>,
    pub fail_on_levels: BTreeSet<RiskLevel>,
    pub alerts_limit: usize,
    /// AJAX spider wall-clock limit, seconds.
    pub ajax_timeout: u64,
    pub output: String,
    pub scanner: ScannerSettings,
    pub verbose: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            target: String::new(),
            phases: PhaseToggles::default(),
            summarize_levels: BTreeSet::new(),
            ignore_levels: BTreeSet::new(),
            fail_on_levels: BTreeSet::new(),
            alerts_limit: 100,
            ajax_timeout: 120,
            output: "security_report.txt".to_string(),
            scanner: ScannerSettings::default(),
            verbose: false,
        }
    }
}

impl ScanConfig {
    /// Reads a JSON config file; missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScanError> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .map_err(|e| ScanError::config(format!("cannot read '{}': {}", path.display(), e)))?;
        serde_json::from_str(&data)
            .map_err(|e| ScanError::config(format!("invalid config '{}': {}", path.display(), e)))
    }

    pub fn validate(&self) -> Result<(), ScanError> {
        if !self.phases.any() {
            return Err(ScanError::config("at least one scan phase must be enabled"));
        }

        let target = self.target.trim();
        if target.is_empty() {
            return Err(ScanError::config("no target URL specified"));
        }
        let parsed = Url::parse(target)
            .map_err(|e| ScanError::config(format!("invalid target URL '{}': {}", target, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ScanError::config(format!(
                "target URL must use http or https, got '{}'",
                parsed.scheme()
            )));
        }

        if self.phases.ajax_spider && self.ajax_timeout == 0 {
            return Err(ScanError::config("AJAX spider timeout must be greater than zero"));
        }
        if self.output.trim().is_empty() {
            return Err(ScanError::config("report output path is empty"));
        }
        Ok(())
    }
}

/// Output abstraction for the scan pipeline.
pub trait ScanEventSink: Send + Sync {
    fn on_log(&self, level: &str, message: &str);
    fn on_progress(&self, phase: &str, current: usize, total: usize);
    fn on_alert(&self, alert: &ClassifiedAlert);
}

pub type SinkRef = Arc<dyn ScanEventSink>;

/// Terminal output sink for CLI usage.
pub struct ConsoleSink {
    verbose: bool,
}

impl ConsoleSink {
    pub fn new_ref(verbose: bool) -> SinkRef {
        Arc::new(Self { verbose })
    }
}

impl ScanEventSink for ConsoleSink {
    fn on_log(&self, level: &str, message: &str) {
        use colored::*;
        use std::io::Write;
        let colored = match level {
            "success" => message.green().to_string(),
            "error"   => message.red().to_string(),
            "warn"    => message.yellow().to_string(),
            "phase"   => message.bright_cyan().bold().to_string(),
            "debug"   => {
                if !self.verbose { return; }
                message.dimmed().to_string()
            }
            _         => message.to_string(),
        };
        print!("{}\r\n", colored);
        std::io::stdout().flush().ok();
    }

    fn on_progress(&self, phase: &str, current: usize, total: usize) {
        use colored::*;
        use std::io::Write;
        if total > 0 {
            print!("{}\r\n", format!("[*] {} ({}/{})", phase, current, total).bright_cyan());
        } else {
            print!("{}\r\n", format!("[*] {}", phase).bright_cyan());
        }
        std::io::stdout().flush().ok();
    }

    fn on_alert(&self, classified: &ClassifiedAlert) {
        use colored::*;
        use std::io::Write;
        let alert = &classified.alert;
        let level = alert.risk_level();
        let label = match level {
            RiskLevel::High => level.to_string().red().bold(),
            RiskLevel::Medium => level.to_string().yellow().bold(),
            RiskLevel::Low => level.to_string().blue(),
            _ => level.to_string().dimmed(),
        };
        let marker = if classified.counted { "[!]".red().bold() } else { "[+]".green().bold() };
        print!("{} [{}] {}\r\n", marker, label, alert.name.white());
        print!("    URL: {}\r\n", alert.url.dimmed());
        std::io::stdout().flush().ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> ScanConfig {
        ScanConfig {
            target: "http://localhost:3000".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = ScanConfig::default();
        assert_eq!(config.alerts_limit, 100);
        assert_eq!(config.ajax_timeout, 120);
        assert_eq!(config.scanner.base_url(), "http://localhost:8080/");
        assert_eq!(config.phases.enabled().len(), 4);
    }

    #[test]
    fn test_validate_rejects_all_phases_disabled() {
        let mut config = valid_config();
        config.phases = PhaseToggles { spider: false, ajax_spider: false, passive: false, active: false };
        match config.validate() {
            Err(ScanError::Configuration(msg)) => assert!(msg.contains("at least one scan phase")),
            other => panic!("expected configuration error, got {:?}", other),
        }
    }

    #[test]
    fn test_launches_daemon() {
        let mut scanner = ScannerSettings::default();
        assert!(!scanner.launches_daemon());
        scanner.zap_path = Some("  ".to_string());
        assert!(!scanner.launches_daemon());
        scanner.launch = true;
        assert!(scanner.launches_daemon());
        scanner = ScannerSettings { zap_path: Some("/opt/zap/zap.sh".to_string()), ..Default::default() };
        assert!(scanner.launches_daemon());
    }

    #[test]
    fn test_validate_target() {
        assert!(valid_config().validate().is_ok());

        let mut config = valid_config();
        config.target = "ftp://example.com".to_string();
        assert!(config.validate().is_err());

        config.target = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_from_json_uses_defaults() {
        let json = r#"{
            "target": "https://app.example",
            "phases": { "ajaxSpider": false },
            "summarizeLevels": ["High", "medium"],
            "failOnLevels": ["HIGH"],
            "scanner": { "port": 8090 }
        }"#;
        let config: ScanConfig = serde_json::from_str(json).unwrap();
        assert!(config.phases.spider);
        assert!(!config.phases.ajax_spider);
        assert!(config.summarize_levels.contains(&RiskLevel::Medium));
        assert!(config.fail_on_levels.contains(&RiskLevel::High));
        assert!(config.ignore_levels.is_empty());
        assert_eq!(config.scanner.port, 8090);
        assert_eq!(config.scanner.host, "localhost");
    }

    #[test]
    fn test_config_rejects_unknown_risk_label() {
        let json = r#"{ "target": "https://app.example", "ignoreLevels": ["noise"] }"#;
        assert!(serde_json::from_str::<ScanConfig>(json).is_err());
    }

    #[test]
    fn test_load_missing_file_is_configuration_error() {
        let err = ScanConfig::load("/nonexistent/zapsentry.json").unwrap_err();
        assert!(matches!(err, ScanError::Configuration(_)));
    }
}
