//! Headless render strategy.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::error::{ScrapeError, ScrapeResult};
use crate::rendering::SessionPool;
use crate::text::visible_text;
use crate::traits::extractor::{ExtractionMethod, Extractor, PageText};
use crate::traits::renderer::{Renderer, SettleCondition};

/// Renders the page in a pooled headless session, then applies the same
/// visible-text rule as [`DomExtractor`](crate::DomExtractor).
///
/// The time budget covers both waiting for a session and rendering.
pub struct HeadlessExtractor {
    renderer: Arc<dyn Renderer>,
    pool: Arc<SessionPool>,
    settle: SettleCondition,
}

impl HeadlessExtractor {
    pub fn new(renderer: Arc<dyn Renderer>, pool: Arc<SessionPool>) -> Self {
        Self {
            renderer,
            pool,
            settle: SettleCondition::default(),
        }
    }

    /// Set the settle condition.
    pub fn with_settle(mut self, settle: SettleCondition) -> Self {
        self.settle = settle;
        self
    }

    pub fn pool(&self) -> &Arc<SessionPool> {
        &self.pool
    }
}

#[async_trait]
impl Extractor for HeadlessExtractor {
    async fn extract(&self, url: &str, timeout: Duration) -> ScrapeResult<PageText> {
        let started = Instant::now();
        let session = self.pool.acquire().await?;

        let remaining = timeout.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            return Err(ScrapeError::Timeout {
                url: url.to_string(),
                after_ms: timeout.as_millis() as u64,
            });
        }

        info!(
            url = %url,
            session_id = session.id(),
            budget_ms = remaining.as_millis() as u64,
            "Headless render starting"
        );

        let rendered = tokio::time::timeout(
            remaining,
            self.renderer.render(&session, url, self.settle, remaining),
        )
        .await
        .map_err(|_| ScrapeError::Timeout {
            url: url.to_string(),
            after_ms: timeout.as_millis() as u64,
        })??;

        // Release the slot before the CPU-bound DOM walk
        drop(session);

        let content = visible_text(&rendered.html);
        debug!(
            url = %rendered.url,
            text_chars = content.chars().count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Headless render completed"
        );

        let page = PageText::new(rendered.url, content);
        Ok(match rendered.status {
            Some(status) => page.with_status(status),
            None => page,
        })
    }

    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Headless
    }
}
