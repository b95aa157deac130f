//! Renderer backed by a remote headless-browser service.
//!
//! Speaks the `/content` contract of browserless-style Chrome services:
//! the service loads the page in a fresh browser context, waits for the
//! requested settle condition, and answers with the serialized DOM.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{ScrapeError, ScrapeResult};
use crate::rendering::RenderSession;
use crate::security::RenderEndpoint;
use crate::traits::renderer::{RenderedPage, Renderer, SettleCondition};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ContentRequest<'a> {
    url: &'a str,
    goto_options: GotoOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    wait_for_timeout: Option<u64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GotoOptions {
    wait_until: &'static str,
    timeout: u64,
}

/// Remote headless renderer.
pub struct RemoteRenderer {
    client: Client,
    endpoint: RenderEndpoint,
}

impl RemoteRenderer {
    pub fn new(endpoint: RenderEndpoint) -> ScrapeResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| ScrapeError::Setup(e.to_string()))?;
        Ok(Self { client, endpoint })
    }

    /// Use a preconfigured HTTP client.
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    fn content_url(&self) -> String {
        format!("{}/content", self.endpoint.base_url)
    }
}

fn request_body(url: &str, settle: SettleCondition, timeout: Duration) -> ContentRequest<'_> {
    let timeout_ms = timeout.as_millis() as u64;
    match settle {
        SettleCondition::NetworkIdle => ContentRequest {
            url,
            goto_options: GotoOptions {
                wait_until: "networkidle2",
                timeout: timeout_ms,
            },
            wait_for_timeout: None,
        },
        SettleCondition::Delay(delay) => ContentRequest {
            url,
            goto_options: GotoOptions {
                wait_until: "load",
                timeout: timeout_ms,
            },
            wait_for_timeout: Some(delay.as_millis() as u64),
        },
    }
}

#[async_trait]
impl Renderer for RemoteRenderer {
    async fn render(
        &self,
        session: &RenderSession,
        url: &str,
        settle: SettleCondition,
        timeout: Duration,
    ) -> ScrapeResult<RenderedPage> {
        debug!(session_id = session.id(), url = %url, ?settle, "Remote render starting");

        let mut request = self
            .client
            .post(self.content_url())
            .timeout(timeout)
            .json(&request_body(url, settle, timeout));
        if let Some(token) = &self.endpoint.token {
            request = request.query(&[("token", token.expose())]);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ScrapeError::Timeout {
                    url: url.to_string(),
                    after_ms: timeout.as_millis() as u64,
                }
            } else {
                warn!(url = %url, error = %e, "Render service request failed");
                ScrapeError::Render {
                    url: url.to_string(),
                    message: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ScrapeError::Render {
                url: url.to_string(),
                message: format!("render service returned {}: {}", status, body),
            });
        }

        // Status of the rendered document itself, when the service reports it
        let page_status = response
            .headers()
            .get("x-response-code")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u16>().ok());

        let html = response.text().await.map_err(|e| {
            if e.is_timeout() {
                ScrapeError::Timeout {
                    url: url.to_string(),
                    after_ms: timeout.as_millis() as u64,
                }
            } else {
                ScrapeError::Render {
                    url: url.to_string(),
                    message: e.to_string(),
                }
            }
        })?;

        if let Some(code) = page_status.filter(|c| *c >= 400) {
            return Err(ScrapeError::Status {
                url: url.to_string(),
                status: code,
            });
        }

        Ok(RenderedPage {
            url: url.to_string(),
            html,
            status: page_status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_idle_body() {
        let body = request_body(
            "https://example.com",
            SettleCondition::NetworkIdle,
            Duration::from_secs(15),
        );
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["url"], "https://example.com");
        assert_eq!(json["gotoOptions"]["waitUntil"], "networkidle2");
        assert_eq!(json["gotoOptions"]["timeout"], 15_000);
        assert!(json.get("waitForTimeout").is_none());
    }

    #[test]
    fn test_fixed_delay_body() {
        let body = request_body(
            "https://example.com",
            SettleCondition::Delay(Duration::from_millis(1500)),
            Duration::from_secs(10),
        );
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["gotoOptions"]["waitUntil"], "load");
        assert_eq!(json["waitForTimeout"], 1500);
    }
}
