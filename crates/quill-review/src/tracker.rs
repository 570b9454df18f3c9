//! Jira ticket lookup.

use std::time::Duration;

use async_trait::async_trait;
use quill_core::{QuillError, TicketConfig, TicketContext};
use serde::Deserialize;

use crate::services::TicketTracker;

#[derive(Deserialize)]
struct Issue {
    fields: IssueFields,
}

#[derive(Deserialize)]
struct IssueFields {
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

/// Jira REST v2 client using basic auth (account email + API token).
///
/// # Examples
///
/// ```
/// use quill_core::TicketConfig;
/// use quill_review::tracker::JiraClient;
///
/// let config = TicketConfig {
///     enabled: true,
///     base_url: Some("https://acme.atlassian.net/".into()),
///     ..TicketConfig::default()
/// };
/// let client = JiraClient::new(&config).unwrap();
/// assert_eq!(
///     client.issue_url("PAY-12"),
///     "https://acme.atlassian.net/rest/api/2/issue/PAY-12?fields=summary,description"
/// );
/// ```
pub struct JiraClient {
    http: reqwest::Client,
    base_url: String,
    email: Option<String>,
    api_token: Option<String>,
}

impl JiraClient {
    /// Build a client from ticket configuration.
    ///
    /// # Errors
    ///
    /// Returns [`QuillError::Config`] without a base URL, or
    /// [`QuillError::Tracker`] if the HTTP client cannot be built.
    pub fn new(config: &TicketConfig) -> Result<Self, QuillError> {
        let base_url = config
            .base_url
            .as_deref()
            .map(|u| u.trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
            .ok_or_else(|| QuillError::Config("ticket.base_url is required".into()))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| QuillError::Tracker(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url,
            email: config.email.clone(),
            api_token: config.resolved_api_token(),
        })
    }

    /// REST URL for issue `id`.
    pub fn issue_url(&self, id: &str) -> String {
        format!(
            "{}/rest/api/2/issue/{id}?fields=summary,description",
            self.base_url
        )
    }
}

#[async_trait]
impl TicketTracker for JiraClient {
    async fn fetch_ticket(&self, id: &str) -> Result<TicketContext, QuillError> {
        let mut request = self
            .http
            .get(self.issue_url(id))
            .header("Accept", "application/json");
        if let Some(token) = &self.api_token {
            let user = self.email.as_deref().unwrap_or_default();
            request = request.basic_auth(user, Some(token));
        }

        let response = request
            .send()
            .await
            .map_err(|e| QuillError::Tracker(format!("failed to fetch {id}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(QuillError::Tracker(format!(
                "Jira API error {status} for {id}: {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let issue: Issue = response
            .json()
            .await
            .map_err(|e| QuillError::Tracker(format!("failed to parse {id}: {e}")))?;
        Ok(issue.into_ticket())
    }
}

impl Issue {
    fn into_ticket(self) -> TicketContext {
        TicketContext {
            summary: self.fields.summary.unwrap_or_default(),
            description: self.fields.description.unwrap_or_default(),
        }
    }
}
