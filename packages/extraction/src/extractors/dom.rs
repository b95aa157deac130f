//! Static fetch strategy: HTTP GET + DOM walk.

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{ScrapeError, ScrapeResult};
use crate::security::{blocked_by_guard, guard_client, UrlValidator, MAX_REDIRECTS};
use crate::text::visible_text;
use crate::traits::extractor::{ExtractionMethod, Extractor, PageText};

/// Browser-like User-Agent; many sites reject obvious bots outright.
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Fetches the server-rendered HTML and extracts its visible text.
///
/// No JavaScript runs, so script-rendered pages come back thin; the
/// fallback policy decides when that warrants a headless attempt.
pub struct DomExtractor {
    client: Client,
    validator: Option<UrlValidator>,
}

impl DomExtractor {
    /// Create a new DOM extractor with default settings.
    pub fn new() -> ScrapeResult<Self> {
        let client = Self::client_builder()
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(|e| ScrapeError::Setup(e.to_string()))?;

        Ok(Self {
            client,
            validator: None,
        })
    }

    fn client_builder() -> ClientBuilder {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            reqwest::header::HeaderValue::from_static("en-US,en;q=0.5"),
        );

        Client::builder()
            .user_agent(DEFAULT_USER_AGENT)
            .default_headers(headers)
    }

    /// Set a custom HTTP client.
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// Enforce `validator` on every redirect hop and DNS answer.
    ///
    /// Rebuilds the HTTP client, replacing any set with [`with_client`](Self::with_client).
    pub fn with_validator(self, validator: UrlValidator) -> ScrapeResult<Self> {
        let client = guard_client(Self::client_builder(), &validator)
            .build()
            .map_err(|e| ScrapeError::Setup(e.to_string()))?;
        Ok(self.with_guarded_client(client, validator))
    }

    /// Use a client already built with [`guard_client`], keeping the final-URL check.
    pub fn with_guarded_client(mut self, client: Client, validator: UrlValidator) -> Self {
        self.client = client;
        self.validator = Some(validator);
        self
    }

    fn classify(url: &str, timeout: Duration, e: reqwest::Error) -> ScrapeError {
        if let Some(blocked) = blocked_by_guard(&e) {
            ScrapeError::Security(blocked)
        } else if e.is_timeout() {
            ScrapeError::Timeout {
                url: url.to_string(),
                after_ms: timeout.as_millis() as u64,
            }
        } else {
            ScrapeError::Transport {
                url: url.to_string(),
                message: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl Extractor for DomExtractor {
    async fn extract(&self, url: &str, timeout: Duration) -> ScrapeResult<PageText> {
        debug!(url = %url, timeout_ms = timeout.as_millis() as u64, "DOM fetch starting");

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                warn!(url = %url, error = %e, "DOM fetch failed");
                Self::classify(url, timeout, e)
            })?;

        let final_url = response.url().clone();
        if let Some(validator) = &self.validator {
            validator.validate_url(&final_url)?;
        }

        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let html = response
            .text()
            .await
            .map_err(|e| Self::classify(url, timeout, e))?;

        let content = visible_text(&html);
        debug!(
            url = %final_url,
            html_bytes = html.len(),
            text_chars = content.chars().count(),
            "DOM fetch completed"
        );

        Ok(PageText::new(final_url.as_str(), content).with_status(status.as_u16()))
    }

    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Dom
    }
}
