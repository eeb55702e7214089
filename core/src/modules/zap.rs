use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, ClientBuilder};
use serde_json::Value;
use url::Url;

use crate::core::alert::Alert;
use crate::errors::ScanError;

const API_KEY_HEADER: &str = "x-zap-api-key";

/// The slice of the scanner's control surface the sequencer drives.
#[async_trait]
pub trait ScannerApi: Send + Sync {
    /// Proxies a request to `target` so the scanner has something in its sites tree.
    async fn access_url(&self, target: &str) -> Result<(), ScanError>;

    /// Starts a traditional spider; returns the scan handle.
    async fn spider_scan(&self, target: &str) -> Result<String, ScanError>;
    async fn spider_status(&self, scan_id: &str) -> Result<u32, ScanError>;

    async fn ajax_spider_scan(&self, target: &str) -> Result<(), ScanError>;
    /// `"running"` while the crawl is in progress, `"stopped"` afterwards.
    async fn ajax_spider_status(&self) -> Result<String, ScanError>;
    async fn ajax_spider_stop(&self) -> Result<(), ScanError>;
    /// URLs visited by the AJAX spider, `count` entries from `start`.
    async fn ajax_spider_results(&self, start: usize, count: usize) -> Result<Vec<String>, ScanError>;

    async fn passive_records_remaining(&self) -> Result<u64, ScanError>;

    /// Starts an active scan; returns the scan handle.
    async fn active_scan(&self, target: &str) -> Result<String, ScanError>;
    async fn active_status(&self, scan_id: &str) -> Result<u32, ScanError>;

    /// One page of every alert the scanner holds, in scanner order.
    async fn alerts(&self, start: usize, count: usize) -> Result<Vec<Alert>, ScanError>;
    async fn hosts(&self) -> Result<Vec<String>, ScanError>;
}

/// ZAP JSON API client.
pub struct ZapClient {
    inner: Client,
    base: Url,
}

impl ZapClient {
    pub fn new(base_url: &str, api_key: Option<&str>, timeout_seconds: u64) -> Result<Self, ScanError> {
        let base = Url::parse(base_url)
            .map_err(|e| ScanError::config(format!("invalid scanner address '{}': {}", base_url, e)))?;

        let mut default_headers = HeaderMap::new();
        if let Some(key) = api_key.filter(|k| !k.is_empty()) {
            let value = HeaderValue::from_str(key)
                .map_err(|_| ScanError::config("scanner API key contains invalid characters"))?;
            default_headers.insert(API_KEY_HEADER, value);
        }

        let inner = ClientBuilder::new()
            .timeout(Duration::from_secs(timeout_seconds))
            .default_headers(default_headers)
            .build()
            .map_err(|e| ScanError::unavailable(base_url, e))?;

        Ok(Self { inner, base })
    }

    pub fn base_url(&self) -> &str {
        self.base.as_str()
    }

    /// Liveness probe: the API root answers 200 once the daemon is up.
    pub async fn is_alive(&self) -> bool {
        match self.inner.get(self.base.clone()).timeout(Duration::from_secs(5)).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    /// Asks the daemon to shut itself down.
    pub async fn shutdown(&self) -> Result<(), ScanError> {
        self.call("core/action/shutdown", &[]).await.map(|_| ())
    }

    async fn call(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<Value, ScanError> {
        let mut url = self
            .base
            .join(&format!("JSON/{}/", endpoint))
            .map_err(|e| ScanError::unavailable(endpoint, e))?;
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params);
        }
        debug!("ZAP API call: {}", endpoint);

        let response = self
            .inner
            .get(url)
            .send()
            .await
            .map_err(|e| ScanError::unavailable(endpoint, e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| ScanError::unavailable(endpoint, e))?;
        if !status.is_success() {
            return Err(ScanError::unavailable(
                endpoint,
                format!("HTTP {}: {}", status.as_u16(), body.trim()),
            ));
        }

        serde_json::from_str(&body)
            .map_err(|e| ScanError::unavailable(endpoint, format!("invalid JSON: {}", e)))
    }
}

/// Reads `field` as a string; ZAP encodes most numbers as strings.
fn string_field(value: &Value, field: &str, endpoint: &str) -> Result<String, ScanError> {
    match value.get(field) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(ScanError::unavailable(endpoint, format!("missing '{}' in response", field))),
    }
}

fn numeric_field(value: &Value, field: &str, endpoint: &str) -> Result<u64, ScanError> {
    let raw = string_field(value, field, endpoint)?;
    raw.trim()
        .parse()
        .map_err(|_| ScanError::unavailable(endpoint, format!("non-numeric '{}': {}", field, raw)))
}

/// Pulls the request URL out of a raw request header ("GET http://x/ HTTP/1.1").
fn request_url(message: &Value) -> Option<String> {
    let header = message.get("requestHeader")?.as_str()?;
    let first_line = header.lines().next()?;
    first_line.split_whitespace().nth(1).map(|s| s.to_string())
}

#[async_trait]
impl ScannerApi for ZapClient {
    async fn access_url(&self, target: &str) -> Result<(), ScanError> {
        self.call("core/action/accessUrl", &[("url", target)]).await.map(|_| ())
    }

    async fn spider_scan(&self, target: &str) -> Result<String, ScanError> {
        let endpoint = "spider/action/scan";
        let v = self.call(endpoint, &[("url", target)]).await?;
        string_field(&v, "scan", endpoint)
    }

    async fn spider_status(&self, scan_id: &str) -> Result<u32, ScanError> {
        let endpoint = "spider/view/status";
        let v = self.call(endpoint, &[("scanId", scan_id)]).await?;
        Ok(numeric_field(&v, "status", endpoint)?.min(100) as u32)
    }

    async fn ajax_spider_scan(&self, target: &str) -> Result<(), ScanError> {
        self.call("ajaxSpider/action/scan", &[("url", target)]).await.map(|_| ())
    }

    async fn ajax_spider_status(&self) -> Result<String, ScanError> {
        let endpoint = "ajaxSpider/view/status";
        let v = self.call(endpoint, &[]).await?;
        string_field(&v, "status", endpoint)
    }

    async fn ajax_spider_stop(&self) -> Result<(), ScanError> {
        self.call("ajaxSpider/action/stop", &[]).await.map(|_| ())
    }

    async fn ajax_spider_results(&self, start: usize, count: usize) -> Result<Vec<String>, ScanError> {
        let endpoint = "ajaxSpider/view/results";
        let start = start.to_string();
        let count = count.to_string();
        let v = self.call(endpoint, &[("start", start.as_str()), ("count", count.as_str())]).await?;
        let results = v
            .get("results")
            .and_then(|r| r.as_array())
            .ok_or_else(|| ScanError::unavailable(endpoint, "missing 'results' in response"))?;
        Ok(results.iter().filter_map(request_url).collect())
    }

    async fn passive_records_remaining(&self) -> Result<u64, ScanError> {
        let endpoint = "pscan/view/recordsToScan";
        let v = self.call(endpoint, &[]).await?;
        numeric_field(&v, "recordsToScan", endpoint)
    }

    async fn active_scan(&self, target: &str) -> Result<String, ScanError> {
        let endpoint = "ascan/action/scan";
        let v = self.call(endpoint, &[("url", target)]).await?;
        string_field(&v, "scan", endpoint)
    }

    async fn active_status(&self, scan_id: &str) -> Result<u32, ScanError> {
        let endpoint = "ascan/view/status";
        let v = self.call(endpoint, &[("scanId", scan_id)]).await?;
        Ok(numeric_field(&v, "status", endpoint)?.min(100) as u32)
    }

    async fn alerts(&self, start: usize, count: usize) -> Result<Vec<Alert>, ScanError> {
        let endpoint = "core/view/alerts";
        let start = start.to_string();
        let count = count.to_string();
        let v = self
            .call(endpoint, &[("start", start.as_str()), ("count", count.as_str())])
            .await?;
        let alerts = v
            .get("alerts")
            .cloned()
            .ok_or_else(|| ScanError::unavailable(endpoint, "missing 'alerts' in response"))?;
        serde_json::from_value(alerts).map_err(|e| ScanError::unavailable(endpoint, e))
    }

    async fn hosts(&self) -> Result<Vec<String>, ScanError> {
        let endpoint = "core/view/hosts";
        let v = self.call(endpoint, &[]).await?;
        let hosts = v
            .get("hosts")
            .and_then(|h| h.as_array())
            .ok_or_else(|| ScanError::unavailable(endpoint, "missing 'hosts' in response"))?;
        Ok(hosts.iter().filter_map(|h| h.as_str().map(|s| s.to_string())).collect())
    }
}
