use async_trait::async_trait;
use reqwest::Client;

use crate::errors::GatewayError;

/// Publishes the final report to an external review surface.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, markdown: &str) -> Result<(), GatewayError>;
}

#[derive(Debug, Clone)]
pub struct GithubSettings {
    pub token: String,
    /// `owner/repo`
    pub repo: String,
    pub pr_number: u64,
    pub api_base: String,
}

impl GithubSettings {
    pub fn new(token: impl Into<String>, repo: impl Into<String>, pr_number: u64) -> Self {
        Self {
            token: token.into(),
            repo: repo.into(),
            pr_number,
            api_base: "https://api.github.com".to_string(),
        }
    }
}

/// Posts the report as a pull-request comment.
pub struct GithubNotifier {
    client: Client,
    settings: GithubSettings,
}

impl GithubNotifier {
    pub fn new(settings: GithubSettings) -> Self {
        Self { client: Client::new(), settings }
    }

    fn comments_url(&self) -> String {
        format!(
            "{}/repos/{}/issues/{}/comments",
            self.settings.api_base.trim_end_matches('/'),
            self.settings.repo,
            self.settings.pr_number
        )
    }
}

#[async_trait]
impl Notifier for GithubNotifier {
    async fn publish(&self, markdown: &str) -> Result<(), GatewayError> {
        let response = self
            .client
            .post(self.comments_url())
            .bearer_auth(&self.settings.token)
            .header(reqwest::header::ACCEPT, "application/vnd.github.v3+json")
            .header(reqwest::header::USER_AGENT, "zapsentry")
            .json(&serde_json::json!({ "body": markdown }))
            .send()
            .await?;

        let status = response.status().as_u16();
        if status == 201 {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(GatewayError::Status { status, body })
        }
    }
}
