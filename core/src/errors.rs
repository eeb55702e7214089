use thiserror::Error;

/// Fatal outcomes of a scan run.
///
/// Phase timeouts and gate failures are not errors: the first is carried by
/// `PhaseState::TimedOut`, the second by `GateDecision::Fail`.
#[derive(Error, Debug)]
pub enum ScanError {
    /// Invalid or missing configuration, raised before the scanner is contacted.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Liveness probe failed or a control-surface call failed mid-run.
    #[error("Scanner unavailable ({endpoint}): {reason}")]
    ScannerUnavailable {
        endpoint: String,
        reason: String,
    },

    /// The report artifact could not be persisted.
    #[error("Failed to write report '{path}': {source}")]
    Report {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl ScanError {
    pub fn config(reason: impl Into<String>) -> Self {
        ScanError::Configuration(reason.into())
    }

    pub fn unavailable(endpoint: impl Into<String>, reason: impl ToString) -> Self {
        ScanError::ScannerUnavailable {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }
}

/// Failures of the summarization and notification collaborators.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("gateway not configured")]
    NotConfigured,

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status}: {body}")]
    Status {
        status: u16,
        body: String,
    },

    #[error("malformed response: {0}")]
    Malformed(String),
}
