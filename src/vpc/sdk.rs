//! HTTP layer for VPC REST API calls

use super::QueryParams;
use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// API version date sent when the caller didn't pick one
pub const DEFAULT_API_VERSION: &str = "2024-04-30";

/// API generation sent when the caller didn't pick one
pub const DEFAULT_GENERATION: &str = "2";

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Sanitize response body for logging
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut end = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..end], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// Connection parameters for one region endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VpcParams {
    pub service_url: String,
    /// API version date; `None` uses [`DEFAULT_API_VERSION`]
    pub version: Option<String>,
    /// API generation; `None` uses [`DEFAULT_GENERATION`]
    pub generation: Option<String>,
}

impl VpcParams {
    /// Query pairs every request carries
    fn base_query(&self) -> Vec<(&str, &str)> {
        vec![
            (
                "version",
                self.version.as_deref().unwrap_or(DEFAULT_API_VERSION),
            ),
            (
                "generation",
                self.generation.as_deref().unwrap_or(DEFAULT_GENERATION),
            ),
        ]
    }
}

/// VPC API client bound to one set of connection parameters
pub struct VpcSdk {
    client: Client,
    params: VpcParams,
}

impl VpcSdk {
    pub fn new(params: VpcParams) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("ibmvpc/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        tracing::debug!("VPC SDK client created for {}", params.service_url);

        Ok(Self { client, params })
    }

    pub fn params(&self) -> &VpcParams {
        &self.params
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.params.service_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// List one page of a collection
    pub async fn list(
        &self,
        path: &str,
        token: &str,
        start: Option<&str>,
        params: &QueryParams,
    ) -> Result<Value> {
        // Caller params replace the version/generation defaults instead of repeating them
        let mut query: Vec<(&str, &str)> = self
            .params
            .base_query()
            .into_iter()
            .filter(|(k, _)| !params.contains_key(*k))
            .collect();
        if let Some(start) = start {
            query.push(("start", start));
        }
        query.extend(
            params
                .iter()
                .filter(|(k, _)| k.as_str() != "start")
                .map(|(k, v)| (k.as_str(), v.as_str())),
        );

        self.get_json(&self.url(path), token, &query).await
    }

    /// URL of one resource in a collection, with `id` encoded as a single path segment
    pub fn resource_url(&self, path: &str, id: &str) -> Result<Url> {
        let mut url = Url::parse(&self.url(path)).context("Invalid service URL")?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("Service URL cannot have path segments"))?
            .pop_if_empty()
            .push(id);
        Ok(url)
    }

    /// Fetch a single resource by ID
    pub async fn get(&self, path: &str, id: &str, token: &str) -> Result<Value> {
        let url = self.resource_url(path, id)?;
        let query = self.params.base_query();
        self.get_json(url.as_str(), token, &query).await
    }

    async fn get_json(&self, url: &str, token: &str, query: &[(&str, &str)]) -> Result<Value> {
        tracing::debug!("GET {} {:?}", url, query);

        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read response body")?;

        if !status.is_success() {
            // Security: Only log sanitized/truncated error body to avoid leaking sensitive data
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&body));
            return Err(anyhow::anyhow!("API request failed: {}", status));
        }

        serde_json::from_str(&body).context("Failed to parse response JSON")
    }
}

/// Format a VPC API error for display
/// Security: Sanitizes error messages to avoid leaking sensitive API details
pub fn format_vpc_error(error: &anyhow::Error) -> String {
    let error_str = error.to_string();

    if error_str.contains("401") {
        return "Authentication failed. Check IBMCLOUD_API_KEY.".to_string();
    }
    if error_str.contains("403") {
        return "Permission denied. Check your IAM access policies.".to_string();
    }
    if error_str.contains("404") {
        return "Resource not found.".to_string();
    }
    if error_str.contains("429") {
        return "Rate limit exceeded. Please try again later.".to_string();
    }
    if error_str.contains("400") {
        return "Invalid request. Check your parameters.".to_string();
    }
    if error_str.contains("500") || error_str.contains("503") {
        return "VPC service temporarily unavailable. Please try again.".to_string();
    }
    if error_str.contains("API request failed") {
        return "Request failed. Check your network connection and try again.".to_string();
    }

    let sanitized = error_str
        .chars()
        .filter(|c| c.is_ascii_graphic() || *c == ' ')
        .take(80)
        .collect::<String>();

    if sanitized.len() < error_str.len() {
        format!("{}...", sanitized)
    } else {
        sanitized
    }
}
