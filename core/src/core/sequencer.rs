use log::{info, warn};
use tokio::time::{sleep, Duration};

use crate::core::alert::Alert;
use crate::core::poll::{poll_until, PollOutcome, PollSpec};
use crate::core::state::{PhaseState, PhaseTracker};
use crate::core::Phase;
use crate::errors::ScanError;
use crate::modules::zap::ScannerApi;
use crate::{ScanConfig, SinkRef};

/// Entries fetched from the AJAX spider once it finishes.
pub const AJAX_RESULTS_PAGE: usize = 10;
const ALERTS_PAGE: usize = 500;

/// Poll cadence per phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub spider_interval: Duration,
    pub ajax_interval: Duration,
    pub passive_interval: Duration,
    /// Active scans run much longer, so they are polled less often.
    pub active_interval: Duration,
    /// Pause after opening the target and after starting the spider,
    /// so the scanner's sites tree can catch up.
    pub settle_delay: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            spider_interval: Duration::from_secs(2),
            ajax_interval: Duration::from_secs(2),
            passive_interval: Duration::from_secs(2),
            active_interval: Duration::from_secs(5),
            settle_delay: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SequenceOutcome {
    /// Final state of every phase, in execution order.
    pub phases: Vec<(Phase, PhaseState)>,
    pub ajax_urls: Vec<String>,
    pub hosts: Vec<String>,
    pub alerts: Vec<Alert>,
}

/// Drives the scanner through spider → AJAX spider → passive → active.
///
/// Phases run strictly one after another. Only the AJAX spider has a
/// deadline; every other wait is bounded by the scanner itself. Any failed
/// control-surface call aborts the sequence.
pub struct PhaseSequencer<'a> {
    scanner: &'a dyn ScannerApi,
    config: &'a ScanConfig,
    sink: SinkRef,
    polls: PollSettings,
    tracker: PhaseTracker,
}

impl<'a> PhaseSequencer<'a> {
    pub fn new(scanner: &'a dyn ScannerApi, config: &'a ScanConfig, sink: SinkRef) -> Self {
        Self {
            scanner,
            config,
            sink,
            polls: PollSettings::default(),
            tracker: PhaseTracker::new(),
        }
    }

    pub fn with_poll_settings(mut self, polls: PollSettings) -> Self {
        self.polls = polls;
        self
    }

    pub async fn run(mut self) -> Result<SequenceOutcome, ScanError> {
        if !self.config.phases.any() {
            return Err(ScanError::config("at least one scan phase must be enabled"));
        }

        let config = self.config;
        let target = config.target.trim();
        self.sink.on_log("phase", &format!("[*] Accessing target {}", target));
        self.scanner.access_url(target).await?;
        sleep(self.polls.settle_delay).await;

        let mut ajax_urls = Vec::new();

        for phase in Phase::ORDER {
            if !config.phases.is_enabled(phase) {
                self.sink.on_log("debug", &format!("[-] {} disabled, skipping", phase));
                continue;
            }

            self.tracker.advance(phase, PhaseState::Running);
            self.sink.on_log("phase", &format!("[*] {} started", phase));

            let final_state = match phase {
                Phase::Spider => self.run_spider(target).await?,
                Phase::AjaxSpider => {
                    let (state, urls) = self.run_ajax_spider(target).await?;
                    ajax_urls = urls;
                    state
                }
                Phase::Passive => self.run_passive().await?,
                Phase::Active => self.run_active(target).await?,
            };

            self.tracker.advance(phase, final_state);
            debug_assert!(self.tracker.state(phase).is_finished());
            info!("{} finished: {}", phase, final_state);
            match final_state {
                PhaseState::TimedOut => {
                    self.sink.on_log("warn", &format!("[!] {} timed out, continuing", phase))
                }
                _ => self.sink.on_log("success", &format!("[+] {} completed", phase)),
            }
        }

        let hosts = self.scanner.hosts().await?;
        self.sink.on_log("info", &format!("[*] Hosts: {}", hosts.join(", ")));

        let alerts = self.fetch_alerts().await?;
        self.sink.on_log("info", &format!("[*] Scanner reported {} alert(s)", alerts.len()));

        Ok(SequenceOutcome {
            phases: self.tracker.snapshot(),
            ajax_urls,
            hosts,
            alerts,
        })
    }

    async fn run_spider(&self, target: &str) -> Result<PhaseState, ScanError> {
        let scan_id = self.scanner.spider_scan(target).await?;
        sleep(self.polls.settle_delay).await;
        self.wait_for_progress(Phase::Spider, &scan_id, self.polls.spider_interval).await
    }

    async fn run_active(&self, target: &str) -> Result<PhaseState, ScanError> {
        let scan_id = self.scanner.active_scan(target).await?;
        self.wait_for_progress(Phase::Active, &scan_id, self.polls.active_interval).await
    }

    /// Polls the spider or active-scan percentage until it reports 100.
    async fn wait_for_progress(
        &self,
        phase: Phase,
        scan_id: &str,
        interval: Duration,
    ) -> Result<PhaseState, ScanError> {
        let scanner = self.scanner;
        let sink = &self.sink;
        let label = format!("{} progress %", phase);
        let label = label.as_str();
        poll_until(
            PollSpec::every(interval),
            || async move {
                let progress = match phase {
                    Phase::Active => scanner.active_status(scan_id).await?,
                    _ => scanner.spider_status(scan_id).await?,
                };
                sink.on_progress(label, progress as usize, 100);
                Ok::<_, ScanError>(progress)
            },
            |progress| *progress >= 100,
        )
        .await?;
        Ok(PhaseState::Completed)
    }

    async fn run_ajax_spider(&self, target: &str) -> Result<(PhaseState, Vec<String>), ScanError> {
        self.scanner.ajax_spider_scan(target).await?;

        let scanner = self.scanner;
        let sink = &self.sink;
        let spec = PollSpec::every(self.polls.ajax_interval)
            .with_deadline(Duration::from_secs(self.config.ajax_timeout));

        let outcome = poll_until(
            spec,
            || async move {
                let status = scanner.ajax_spider_status().await?;
                sink.on_progress(&format!("AJAX Spider status: {}", status), 0, 0);
                Ok::<_, ScanError>(status)
            },
            |status| !status.eq_ignore_ascii_case("running"),
        )
        .await?;

        match outcome {
            PollOutcome::Completed(_) => {
                let urls = self.scanner.ajax_spider_results(0, AJAX_RESULTS_PAGE).await?;
                for url in &urls {
                    self.sink.on_log("debug", &format!("    AJAX: {}", url));
                }
                Ok((PhaseState::Completed, urls))
            }
            PollOutcome::TimedOut(_) => {
                warn!("AJAX spider exceeded {}s, stopping it", self.config.ajax_timeout);
                if let Err(e) = self.scanner.ajax_spider_stop().await {
                    warn!("Failed to stop AJAX spider: {}", e);
                }
                let urls = match self.scanner.ajax_spider_results(0, AJAX_RESULTS_PAGE).await {
                    Ok(urls) => urls,
                    Err(e) => {
                        warn!("No partial AJAX results: {}", e);
                        Vec::new()
                    }
                };
                Ok((PhaseState::TimedOut, urls))
            }
        }
    }

    async fn run_passive(&self) -> Result<PhaseState, ScanError> {
        let scanner = self.scanner;
        let sink = &self.sink;
        poll_until(
            PollSpec::every(self.polls.passive_interval),
            || async move {
                let remaining = scanner.passive_records_remaining().await?;
                sink.on_progress(&format!("Records to passive scan: {}", remaining), 0, 0);
                Ok::<_, ScanError>(remaining)
            },
            |remaining| *remaining == 0,
        )
        .await?;
        Ok(PhaseState::Completed)
    }

    async fn fetch_alerts(&self) -> Result<Vec<Alert>, ScanError> {
        let mut alerts = Vec::new();
        loop {
            let page = self.scanner.alerts(alerts.len(), ALERTS_PAGE).await?;
            let fetched = page.len();
            alerts.extend(page);
            if fetched < ALERTS_PAGE {
                break;
            }
        }
        Ok(alerts)
    }
}
