//! Outbound HTTP seam. Providers build a [`ProviderRequest`]; a [`Transport`]
//! delivers it and hands back status plus decoded body.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::error::ProviderError;

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRequest {
    /// Display name of the provider, for error attribution
    pub provider: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Value,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderReply {
    pub status: u16,
    /// JSON body, or the raw text as a string value when it was not JSON
    pub body: Value,
}

impl ProviderReply {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(&self, request: ProviderRequest) -> Result<ProviderReply, ProviderError>;
}

/// reqwest-backed transport shared by every provider.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, request: ProviderRequest) -> Result<ProviderReply, ProviderError> {
        let ProviderRequest {
            provider,
            url,
            headers,
            body,
            timeout,
        } = request;

        let mut builder = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .timeout(timeout)
            .json(&body);
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout {
                    provider: provider.clone(),
                    ms: timeout.as_millis(),
                }
            } else {
                ProviderError::Transport {
                    provider: provider.clone(),
                    message: e.to_string(),
                }
            }
        })?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| ProviderError::Transport {
            provider: provider.clone(),
            message: e.to_string(),
        })?;
        debug!("{} response ({}): {}", provider, status, text);

        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
        Ok(ProviderReply { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_range() {
        assert!(ProviderReply::ok(json!({})).is_success());
        assert!(
            !ProviderReply {
                status: 500,
                body: json!("boom")
            }
            .is_success()
        );
    }

    #[tokio::test]
    async fn unreachable_host_is_a_transport_error() {
        let transport = HttpTransport::new();
        let request = ProviderRequest {
            provider: "Local".into(),
            // Port 9 (discard) on localhost is closed in test environments.
            url: "http://127.0.0.1:9/v1/chat/completions".into(),
            headers: vec![],
            body: json!({}),
            timeout: Duration::from_secs(5),
        };
        match transport.post(request).await {
            Err(ProviderError::Transport { provider, .. }) => assert_eq!(provider, "Local"),
            Err(ProviderError::Timeout { .. }) => {}
            other => panic!("expected transport error, got {other:?}"),
        }
    }
}
