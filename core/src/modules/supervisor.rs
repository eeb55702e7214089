use std::process::Stdio;

use log::{debug, info, warn};
use tokio::process::{Child, Command};
use tokio::time::{timeout, Duration};

use crate::core::poll::{poll_until, PollSpec};
use crate::errors::ScanError;
use crate::modules::zap::ZapClient;
use crate::utils;
use crate::{ScannerSettings, SinkRef};

const PROBE_INTERVAL: Duration = Duration::from_secs(1);

/// A running scanner, either launched by us or attached to.
///
/// A launched daemon must be released with [`ScannerProcess::stop`] on every
/// exit path; if the value is dropped without it, the child is killed.
pub struct ScannerProcess {
    child: Option<Child>,
    client: ZapClient,
    sink: SinkRef,
    shutdown_grace: Duration,
}

impl ScannerProcess {
    /// Starts the daemon when a launcher is configured or `launch` is set,
    /// otherwise attaches to `host:port`, then waits for the liveness probe.
    /// On probe failure a launched daemon is stopped before the error is
    /// returned.
    pub async fn launch(settings: &ScannerSettings, sink: SinkRef) -> Result<Self, ScanError> {
        let base_url = settings.base_url();
        let client = ZapClient::new(&base_url, settings.api_key_ref(), settings.request_timeout)?;

        let child = if settings.launches_daemon() {
            Some(spawn_daemon(settings, &sink)?)
        } else {
            sink.on_log("info", &format!("[*] Using running scanner at {}", base_url));
            None
        };

        let mut process = Self {
            child,
            client,
            sink,
            shutdown_grace: Duration::from_secs(settings.shutdown_grace),
        };
        if let Err(e) = process.wait_until_alive(Duration::from_secs(settings.startup_timeout)).await {
            process.stop().await;
            return Err(e);
        }
        Ok(process)
    }

    pub fn client(&self) -> &ZapClient {
        &self.client
    }

    /// True when this process owns the daemon's lifetime.
    pub fn is_managed(&self) -> bool {
        self.child.is_some()
    }

    async fn wait_until_alive(&self, limit: Duration) -> Result<(), ScanError> {
        let client = &self.client;
        let outcome = poll_until(
            PollSpec::every(PROBE_INTERVAL).with_deadline(limit),
            || async move { Ok::<_, ScanError>(client.is_alive().await) },
            |alive| *alive,
        )
        .await?;

        if outcome.is_completed() {
            self.sink.on_log("success", "[+] ZAP is up and running!");
            Ok(())
        } else {
            Err(ScanError::unavailable(
                client.base_url(),
                format!("no response within {}s", limit.as_secs()),
            ))
        }
    }

    /// Stops a daemon we launched; attached scanners are left running.
    pub async fn stop(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };

        if let Err(e) = self.client.shutdown().await {
            debug!("Shutdown request failed, killing instead: {}", e);
        }
        match timeout(self.shutdown_grace, child.wait()).await {
            Ok(Ok(status)) => info!("Scanner exited with {}", status),
            _ => {
                warn!("Scanner did not exit within {}s, killing it", self.shutdown_grace.as_secs());
                child.kill().await.ok();
            }
        }
        self.sink.on_log("info", "[*] ZAP server stopped.");
    }
}

impl Drop for ScannerProcess {
    fn drop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            let _ = child.start_kill();
        }
    }
}

fn spawn_daemon(settings: &ScannerSettings, sink: &SinkRef) -> Result<Child, ScanError> {
    let requested = settings.zap_path.as_deref().map(str::trim).filter(|p| !p.is_empty());
    let binary = utils::get_scanner_path(requested).ok_or_else(|| match requested {
        Some(path) => ScanError::config(format!("scanner launcher '{}' not found", path)),
        None => ScanError::config("no ZAP launcher found in ./tools or on PATH"),
    })?;
    debug!("Launching scanner from {}", binary);

    sink.on_log("phase", &format!("[*] Starting ZAP daemon on port {}...", settings.port));

    let port = settings.port.to_string();
    let key_config = settings.api_key_ref().map(|key| format!("api.key={}", key));
    let mut args = vec!["-daemon", "-host", settings.host.as_str(), "-port", port.as_str(), "-config"];
    args.push(key_config.as_deref().unwrap_or("api.disablekey=true"));

    Command::new(&binary)
        .args(&args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ScanError::unavailable(binary, e))
}
