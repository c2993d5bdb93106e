//! Shared HTTP utilities for talking to the provider REST API.

use std::time::Duration;

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Default timeout for API requests. Forking a large chain can take minutes.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Create an HTTP client configured for the provider API.
pub fn create_client() -> Result<reqwest::Client, anyhow::Error> {
    reqwest::Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .build()
        .context("Failed to create HTTP client")
}

/// Send `request` and deserialize its JSON body.
///
/// # Arguments
/// * `request` - The prepared request, headers included
/// * `action` - What the request does, used as the error prefix (e.g. `Failed to create TestNet`)
///
/// # Returns
/// The deserialized body. An empty body deserializes from `null`. Non-success
/// statuses fail with the message the API returned.
pub async fn send_json<T: DeserializeOwned>(
    request: reqwest::RequestBuilder,
    action: &str,
) -> Result<T, anyhow::Error> {
    let response = request
        .send()
        .await
        .with_context(|| format!("{action}: request could not be sent"))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .with_context(|| format!("{action}: failed to read response body"))?;

    if !status.is_success() {
        tracing::debug!(%status, body = %body, "API error response");
        anyhow::bail!("{action}: {}", error_message(&body));
    }

    let body = if body.trim().is_empty() { "null" } else { body.as_str() };
    serde_json::from_str(body).with_context(|| format!("{action}: invalid response body"))
}

/// Message of an API error body: `error.message` when present, the raw body otherwise.
pub fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message() {
        assert_eq!(
            error_message(r#"{"error":{"id":"x","message":"Invalid access key"}}"#),
            "Invalid access key"
        );
        assert_eq!(error_message(r#"{"status":"bad"}"#), r#"{"status":"bad"}"#);
        assert_eq!(error_message("Bad Gateway"), "Bad Gateway");
    }
}
