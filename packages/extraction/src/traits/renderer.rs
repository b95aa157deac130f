//! Renderer trait: loads a page in an isolated browsing session.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::ScrapeResult;
use crate::rendering::RenderSession;

/// When a rendered page is considered settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleCondition {
    /// Wait until the network has been idle
    NetworkIdle,
    /// Wait a fixed delay after load
    Delay(Duration),
}

impl Default for SettleCondition {
    fn default() -> Self {
        SettleCondition::NetworkIdle
    }
}

/// Settled document produced by a renderer.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub url: String,
    pub html: String,
    pub status: Option<u16>,
}

/// Headless browser backend.
///
/// A render call is only valid while the caller holds a [`RenderSession`]
/// leased from the pool; the session bounds how many renders run at once.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(
        &self,
        session: &RenderSession,
        url: &str,
        settle: SettleCondition,
        timeout: Duration,
    ) -> ScrapeResult<RenderedPage>;
}
