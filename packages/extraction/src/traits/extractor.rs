//! Extractor trait: one strategy for turning a URL into visible text.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::ScrapeResult;

/// Which strategy produced a page's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMethod {
    /// Static HTTP fetch + DOM walk
    Dom,
    /// Headless render + DOM walk
    Headless,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::Dom => "dom",
            ExtractionMethod::Headless => "headless",
        }
    }
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExtractionMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dom" => Ok(ExtractionMethod::Dom),
            "headless" => Ok(ExtractionMethod::Headless),
            other => Err(format!("unknown extraction method: {}", other)),
        }
    }
}

/// Visible text produced by one strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    /// Final URL after redirects
    pub url: String,

    /// Visible text, whitespace-collapsed
    pub content: String,

    /// HTTP status of the document response, when known
    pub http_status: Option<u16>,
}

impl PageText {
    pub fn new(url: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            content: content.into(),
            http_status: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    /// Length in characters.
    pub fn char_len(&self) -> usize {
        crate::text::char_count(&self.content)
    }
}

/// A single extraction strategy.
///
/// Implementations must honor `timeout` for the whole attempt and must not
/// retain resources past the returned future.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Fetch `url` and return its visible text.
    async fn extract(&self, url: &str, timeout: Duration) -> ScrapeResult<PageText>;

    /// The method recorded for content produced by this strategy.
    fn method(&self) -> ExtractionMethod;

    /// Get the extractor name (for logging).
    fn name(&self) -> &str {
        self.method().as_str()
    }
}
