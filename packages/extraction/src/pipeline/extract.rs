//! Content extraction entry point.
//!
//! ```text
//! extract(url)
//!   ├─ force_headless? ──────────────────────────────┐
//!   ├─ DomExtractor ── ok & >= min chars ─► method=dom│
//!   │        └─ failed / thin ───────────────────────┤
//!   └─ HeadlessExtractor ◄──────────────────────────┘
//!            ├─ ok ─► method=headless
//!            └─ failed ─► thin dom text if any, else ExtractError
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ExtractError, ScrapeError, ScrapeResult};
use crate::pipeline::strategy::{
    fallback_reason, ExtractOptions, FallbackReason, DEFAULT_MIN_CONTENT_CHARS,
};
use crate::traits::extractor::{ExtractionMethod, Extractor, PageText};

/// Timeouts and thresholds for [`ContentExtractor`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Budget for the static fetch
    pub dom_timeout: Duration,

    /// Budget for the headless attempt (session wait + render)
    pub headless_timeout: Duration,

    /// Minimum visible-text length for the static fetch to be accepted
    pub min_content_chars: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            dom_timeout: Duration::from_secs(10),
            headless_timeout: Duration::from_secs(15),
            min_content_chars: DEFAULT_MIN_CONTENT_CHARS,
        }
    }
}

/// Successful extraction.
#[derive(Debug, Clone)]
pub struct Extraction {
    /// Visible text
    pub content: String,

    /// Strategy that produced `content`
    pub method: ExtractionMethod,

    /// Final URL after redirects
    pub url: String,

    pub http_status: Option<u16>,

    /// Why the headless path was attempted, if it was
    pub fallback: Option<FallbackReason>,

    pub elapsed: Duration,
}

/// Dual-strategy extractor: static fetch first, headless when the policy
/// says so.
pub struct ContentExtractor {
    dom: Arc<dyn Extractor>,
    headless: Option<Arc<dyn Extractor>>,
    config: ExtractorConfig,
}

impl ContentExtractor {
    /// Create an extractor with only the static strategy.
    ///
    /// Fallback attempts fail with `HeadlessUnavailable` until a headless
    /// strategy is attached.
    pub fn new(dom: Arc<dyn Extractor>) -> Self {
        Self {
            dom,
            headless: None,
            config: ExtractorConfig::default(),
        }
    }

    /// Attach the headless strategy.
    pub fn with_headless(mut self, headless: Arc<dyn Extractor>) -> Self {
        self.headless = Some(headless);
        self
    }

    pub fn with_config(mut self, config: ExtractorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    pub fn has_headless(&self) -> bool {
        self.headless.is_some()
    }

    /// Extract the visible text of `url`.
    pub async fn extract(
        &self,
        url: &str,
        options: &ExtractOptions,
    ) -> Result<Extraction, ExtractError> {
        let started = Instant::now();

        let primary = if options.force_headless {
            None
        } else {
            Some(self.dom.extract(url, self.config.dom_timeout).await)
        };

        let reason = match fallback_reason(options, primary.as_ref(), self.config.min_content_chars)
        {
            None => {
                // Policy only accepts a successful primary
                if let Some(Ok(page)) = primary {
                    return Ok(self.finish(page, self.dom.method(), None, started));
                }
                FallbackReason::PrimaryFailed
            }
            Some(reason) => reason,
        };

        match &primary {
            Some(Err(e)) => warn!(url = %url, error = %e, %reason, "Falling back to headless"),
            _ => info!(url = %url, %reason, "Falling back to headless"),
        }

        let Some(headless) = &self.headless else {
            return self.give_up(url, primary, ScrapeError::HeadlessUnavailable, reason, started);
        };

        match headless.extract(url, self.config.headless_timeout).await {
            Ok(page) => {
                // A blank render is no better than thin static text
                if page.content.is_empty() {
                    if let Some(Ok(dom_page)) = &primary {
                        if !dom_page.content.is_empty() {
                            let dom_page = dom_page.clone();
                            return Ok(self.finish(
                                dom_page,
                                self.dom.method(),
                                Some(reason),
                                started,
                            ));
                        }
                    }
                }
                Ok(self.finish(page, headless.method(), Some(reason), started))
            }
            Err(e) => self.give_up(url, primary, e, reason, started),
        }
    }

    fn give_up(
        &self,
        url: &str,
        primary: Option<ScrapeResult<PageText>>,
        fallback: ScrapeError,
        reason: FallbackReason,
        started: Instant,
    ) -> Result<Extraction, ExtractError> {
        match primary {
            Some(Ok(page)) if !page.content.is_empty() => {
                warn!(
                    url = %url,
                    error = %fallback,
                    chars = page.char_len(),
                    "Headless attempt failed, keeping thin static content"
                );
                Ok(self.finish(page, self.dom.method(), Some(reason), started))
            }
            Some(Ok(_)) | None => Err(ExtractError {
                primary: None,
                fallback,
            }),
            Some(Err(primary)) => Err(ExtractError {
                primary: Some(primary),
                fallback,
            }),
        }
    }

    fn finish(
        &self,
        page: PageText,
        method: ExtractionMethod,
        fallback: Option<FallbackReason>,
        started: Instant,
    ) -> Extraction {
        let elapsed = started.elapsed();
        info!(
            url = %page.url,
            method = %method,
            chars = page.char_len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Content extracted"
        );
        Extraction {
            content: page.content,
            method,
            url: page.url,
            http_status: page.http_status,
            fallback,
            elapsed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockExtractor;

    fn rich_text() -> String {
        "Volunteer opportunities are listed below. ".repeat(50)
    }

    fn extractor(dom: &Arc<MockExtractor>, headless: &Arc<MockExtractor>) -> ContentExtractor {
        ContentExtractor::new(dom.clone()).with_headless(headless.clone())
    }

    #[tokio::test]
    async fn test_static_page_uses_dom() {
        let dom = Arc::new(MockExtractor::dom().with_text(rich_text()));
        let headless = Arc::new(MockExtractor::headless());

        let result = extractor(&dom, &headless)
            .extract("https://example.com", &ExtractOptions::default())
            .await
            .unwrap();

        assert_eq!(result.method, ExtractionMethod::Dom);
        assert!(result.fallback.is_none());
        assert_eq!(headless.call_count(), 0);
    }

    #[tokio::test]
    async fn test_thin_page_falls_back_to_headless() {
        let dom = Arc::new(MockExtractor::dom().with_text("x".repeat(40)));
        let headless = Arc::new(MockExtractor::headless().with_text(rich_text()));

        let result = extractor(&dom, &headless)
            .extract("https://spa.example.com", &ExtractOptions::default())
            .await
            .unwrap();

        assert_eq!(result.method, ExtractionMethod::Headless);
        assert_eq!(result.fallback, Some(FallbackReason::ThinContent { chars: 40 }));
        assert_eq!(headless.call_count(), 1);
    }

    #[tokio::test]
    async fn test_primary_failure_falls_back() {
        let dom = Arc::new(MockExtractor::dom().with_error(ScrapeError::Status {
            url: "https://example.com".into(),
            status: 403,
        }));
        let headless = Arc::new(MockExtractor::headless().with_text(rich_text()));

        let result = extractor(&dom, &headless)
            .extract("https://example.com", &ExtractOptions::default())
            .await
            .unwrap();

        assert_eq!(result.method, ExtractionMethod::Headless);
        assert_eq!(result.fallback, Some(FallbackReason::PrimaryFailed));
    }

    #[tokio::test]
    async fn test_force_headless_skips_primary() {
        let dom = Arc::new(MockExtractor::dom().with_text(rich_text()));
        let headless = Arc::new(MockExtractor::headless().with_text(rich_text()));

        let result = extractor(&dom, &headless)
            .extract("https://example.com", &ExtractOptions::forced_headless())
            .await
            .unwrap();

        assert_eq!(result.method, ExtractionMethod::Headless);
        assert_eq!(dom.call_count(), 0);
    }

    #[tokio::test]
    async fn test_both_fail_reports_both() {
        let dom = Arc::new(MockExtractor::dom().with_error(ScrapeError::Timeout {
            url: "https://example.com".into(),
            after_ms: 10_000,
        }));
        let headless = Arc::new(
            MockExtractor::headless()
                .with_error(ScrapeError::ResourceExhausted { waited_ms: 5000 }),
        );

        let err = extractor(&dom, &headless)
            .extract("https://example.com", &ExtractOptions::default())
            .await
            .unwrap_err();

        assert!(err.primary.as_ref().unwrap().is_timeout());
        assert!(err.fallback.is_resource_exhausted());
        assert_eq!(err.details()["timed_out"], true);
    }

    #[tokio::test]
    async fn test_thin_content_kept_when_headless_fails() {
        let dom = Arc::new(MockExtractor::dom().with_text("short but real"));
        let headless = Arc::new(MockExtractor::headless().with_error(ScrapeError::Render {
            url: "https://example.com".into(),
            message: "crashed".into(),
        }));

        let result = extractor(&dom, &headless)
            .extract("https://example.com", &ExtractOptions::default())
            .await
            .unwrap();

        assert_eq!(result.method, ExtractionMethod::Dom);
        assert_eq!(result.content, "short but real");
        assert_eq!(headless.call_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_static_and_failed_headless_is_error() {
        let dom = Arc::new(MockExtractor::dom().with_text(""));
        let headless = Arc::new(MockExtractor::headless().with_error(ScrapeError::Render {
            url: "https://example.com".into(),
            message: "crashed".into(),
        }));

        let err = extractor(&dom, &headless)
            .extract("https://example.com", &ExtractOptions::default())
            .await
            .unwrap_err();

        assert!(err.primary.is_none());
        assert_eq!(err.reason(), "render");
    }

    #[tokio::test]
    async fn test_no_headless_configured() {
        let dom = Arc::new(MockExtractor::dom().with_error(ScrapeError::Transport {
            url: "https://example.com".into(),
            message: "connection refused".into(),
        }));

        let err = ContentExtractor::new(dom)
            .extract("https://example.com", &ExtractOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err.reason(), "headless_unavailable");
        assert_eq!(err.primary.as_ref().unwrap().reason(), "transport");
    }
}
