use crate::config::JiraConfig;
use serde_json::Value;
use std::future::Future;
use thiserror::Error;

/// Jira REST API v3 endpoints, relative to the site base URL
mod endpoints {
    pub const SEARCH: &str = "/rest/api/3/search/jql";

    pub fn changelog(issue_key: &str) -> String {
        format!("/rest/api/3/issue/{issue_key}/changelog")
    }
}

const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(90);

#[derive(Debug, Error)]
pub enum JiraError {
    #[error("Jira rejected the credentials (HTTP {0}). Check JIRA_EMAIL and JIRA_API_TOKEN.")]
    Unauthorized(u16),
    #[error("Jira request failed with HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Could not reach Jira: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Unexpected response from Jira: {0}")]
    Decode(String),
}

impl JiraError {
    /// Errors after which no further request can succeed in this run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, JiraError::Unauthorized(_) | JiraError::Network(_))
    }
}

/// One page request against the JQL search endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub jql: String,
    pub fields: Vec<String>,
    pub start_at: u64,
    pub max_results: u64,
    pub next_page_token: Option<String>,
}

/// Raw page access to the Jira API. Each call returns the page body as JSON.
pub trait JiraApi {
    fn search_page(
        &self,
        request: &SearchRequest,
    ) -> impl Future<Output = Result<Value, JiraError>> + Send;

    fn changelog_page(
        &self,
        issue_key: &str,
        start_at: u64,
        max_results: u64,
    ) -> impl Future<Output = Result<Value, JiraError>> + Send;
}

/// `JiraApi` over HTTPS with basic auth (account email + API token)
pub struct HttpJiraApi {
    client: reqwest::Client,
    base_url: String,
    email: String,
    api_token: String,
}

impl HttpJiraApi {
    pub fn new(config: &JiraConfig) -> Result<Self, JiraError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(HttpJiraApi {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            email: config.email.clone(),
            api_token: config.api_token.clone(),
        })
    }

    async fn read_json(response: reqwest::Response) -> Result<Value, JiraError> {
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(JiraError::Unauthorized(status.as_u16()));
        }
        let text = response.text().await?;
        if !status.is_success() {
            return Err(JiraError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        serde_json::from_str(&text).map_err(|e| JiraError::Decode(e.to_string()))
    }
}

impl JiraApi for HttpJiraApi {
    async fn search_page(&self, request: &SearchRequest) -> Result<Value, JiraError> {
        let mut body = serde_json::json!({
            "jql": request.jql,
            "fields": request.fields,
        });
        if let Some(token) = &request.next_page_token {
            body["nextPageToken"] = Value::String(token.clone());
        }

        tracing::debug!(start_at = request.start_at, jql = %request.jql, "searching issues");
        let response = self
            .client
            .post(format!("{}{}", self.base_url, endpoints::SEARCH))
            .basic_auth(&self.email, Some(&self.api_token))
            .header("Accept", "application/json")
            .query(&[
                ("startAt", request.start_at),
                ("maxResults", request.max_results),
            ])
            .json(&body)
            .send()
            .await?;
        Self::read_json(response).await
    }

    async fn changelog_page(
        &self,
        issue_key: &str,
        start_at: u64,
        max_results: u64,
    ) -> Result<Value, JiraError> {
        tracing::debug!(issue_key, start_at, "fetching changelog");
        let response = self
            .client
            .get(format!("{}{}", self.base_url, endpoints::changelog(issue_key)))
            .basic_auth(&self.email, Some(&self.api_token))
            .header("Accept", "application/json")
            .query(&[("startAt", start_at), ("maxResults", max_results)])
            .send()
            .await?;
        Self::read_json(response).await
    }
}
