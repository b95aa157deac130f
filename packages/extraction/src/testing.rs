//! Testing utilities including mock implementations.
//!
//! These let applications exercise the extraction pipeline without any
//! network access or browser service.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::error::{ScrapeError, ScrapeResult};
use crate::rendering::RenderSession;
use crate::traits::extractor::{ExtractionMethod, Extractor, PageText};
use crate::traits::renderer::{RenderedPage, Renderer, SettleCondition};

/// A mock extraction strategy.
///
/// Queued errors are returned first, one per call; after that every call
/// returns the configured text. With neither configured, calls fail with a
/// transport error.
pub struct MockExtractor {
    method: ExtractionMethod,

    /// Text returned once the error queue is drained
    text: Option<String>,

    /// One-shot errors, returned in order
    errors: Arc<RwLock<VecDeque<ScrapeError>>>,

    /// Simulated latency
    delay: Option<Duration>,

    /// URLs requested, for assertions
    calls: Arc<RwLock<Vec<String>>>,
}

impl MockExtractor {
    pub fn new(method: ExtractionMethod) -> Self {
        Self {
            method,
            text: None,
            errors: Arc::new(RwLock::new(VecDeque::new())),
            delay: None,
            calls: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Mock of the static strategy.
    pub fn dom() -> Self {
        Self::new(ExtractionMethod::Dom)
    }

    /// Mock of the headless strategy.
    pub fn headless() -> Self {
        Self::new(ExtractionMethod::Headless)
    }

    /// Return `text` for every call (after queued errors).
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Queue an error for the next call.
    pub fn with_error(self, error: ScrapeError) -> Self {
        self.errors.write().unwrap().push_back(error);
        self
    }

    /// Wait `delay` before answering. A delay longer than the caller's
    /// timeout yields a timeout error.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// URLs passed to `extract`, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.read().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.read().unwrap().len()
    }
}

#[async_trait]
impl Extractor for MockExtractor {
    async fn extract(&self, url: &str, timeout: Duration) -> ScrapeResult<PageText> {
        self.calls.write().unwrap().push(url.to_string());

        if let Some(delay) = self.delay {
            if delay > timeout {
                tokio::time::sleep(timeout).await;
                return Err(ScrapeError::Timeout {
                    url: url.to_string(),
                    after_ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = self.errors.write().unwrap().pop_front() {
            return Err(error);
        }

        match &self.text {
            Some(text) => Ok(PageText::new(url, text.clone()).with_status(200)),
            None => Err(ScrapeError::Transport {
                url: url.to_string(),
                message: "no mock response configured".to_string(),
            }),
        }
    }

    fn method(&self) -> ExtractionMethod {
        self.method
    }
}

/// Record of a call made to the mock renderer.
#[derive(Debug, Clone)]
pub struct MockRenderCall {
    pub session_id: u64,
    pub url: String,
    pub settle: SettleCondition,
}

/// A mock headless backend that serves fixed HTML.
pub struct MockRenderer {
    html: String,
    delay: Option<Duration>,
    fail_with: Option<String>,
    calls: Arc<RwLock<Vec<MockRenderCall>>>,
}

impl MockRenderer {
    pub fn new(html: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            delay: None,
            fail_with: None,
            calls: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Hold the session for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail every render with `message`.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.fail_with = Some(message.into());
        self
    }

    pub fn calls(&self) -> Vec<MockRenderCall> {
        self.calls.read().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.read().unwrap().len()
    }
}

#[async_trait]
impl Renderer for MockRenderer {
    async fn render(
        &self,
        session: &RenderSession,
        url: &str,
        settle: SettleCondition,
        _timeout: Duration,
    ) -> ScrapeResult<RenderedPage> {
        self.calls.write().unwrap().push(MockRenderCall {
            session_id: session.id(),
            url: url.to_string(),
            settle,
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = &self.fail_with {
            return Err(ScrapeError::Render {
                url: url.to_string(),
                message: message.clone(),
            });
        }

        Ok(RenderedPage {
            url: url.to_string(),
            html: self.html.clone(),
            status: Some(200),
        })
    }
}
