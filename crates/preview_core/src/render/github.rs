//! Rendering through the GitHub markdown API.
//!
//! https://docs.github.com/en/rest/markdown/markdown

use super::ConversionError;
use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Upper bound for a single API round trip.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

const USER_AGENT: &str = concat!("mdpreview/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Serialize)]
struct MarkdownRequest<'a> {
    text: &'a str,
    mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// Converts markdown with the GitHub API in `gfm` mode.
#[derive(Clone)]
pub struct GitHubConverter {
    client: reqwest::Client,
    api_url: String,
    token: Option<String>,
}

impl std::fmt::Debug for GitHubConverter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubConverter")
            .field("api_url", &self.api_url)
            .field("authenticated", &self.token.is_some())
            .finish()
    }
}

impl GitHubConverter {
    /// Creates a converter talking to `api_url`, e.g. [`DEFAULT_API_URL`] or a
    /// GitHub Enterprise endpoint. Requests are anonymous unless `token` is set.
    pub fn new(api_url: impl Into<String>, token: Option<String>) -> Result<Self, ConversionError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub async fn render(&self, text: &str, context: Option<&str>) -> Result<String, ConversionError> {
        let body = MarkdownRequest {
            text,
            mode: "gfm",
            context,
        };

        let mut request = self
            .client
            .post(format!("{}/markdown", self.api_url))
            .header(ACCEPT, "application/vnd.github+json")
            .json(&body);

        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let message = match response.json::<ApiError>().await {
                Ok(err) => err.message,
                Err(_) => status.canonical_reason().unwrap_or("unknown error").to_string(),
            };
            tracing::debug!(%status, %message, "GitHub markdown API rejected the request");
            return Err(ConversionError::Status { status, message });
        }

        Ok(response.text().await?)
    }
}
