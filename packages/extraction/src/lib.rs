//! Page Content Extraction Library
//!
//! Turns a URL into the visible text of the page, using a cheap static
//! fetch first and a pooled headless render when the static result is
//! unusable.
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use extraction::{
//!     ContentExtractor, DomExtractor, ExtractOptions, HeadlessExtractor, RemoteRenderer,
//!     RenderEndpoint, SessionPool,
//! };
//!
//! let pool = Arc::new(SessionPool::new(5, Duration::from_secs(5)));
//! let renderer = RemoteRenderer::new(RenderEndpoint::new("http://chrome:3000"))?;
//! let extractor = ContentExtractor::new(Arc::new(DomExtractor::new()?))
//!     .with_headless(Arc::new(HeadlessExtractor::new(Arc::new(renderer), pool)));
//!
//! let page = extractor.extract("https://example.com", &ExtractOptions::default()).await?;
//! println!("{} chars via {}", page.content.len(), page.method);
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Strategy and renderer abstractions
//! - [`extractors`] - Static and headless strategies
//! - [`rendering`] - Session pool and the remote render backend
//! - [`pipeline`] - Fallback policy and the dual-strategy entry point
//! - [`security`] - Credential handling and SSRF protection
//! - [`testing`] - Mock implementations for testing

pub mod error;
pub mod extractors;
pub mod pipeline;
pub mod rendering;
pub mod security;
pub mod testing;
pub mod text;
pub mod traits;

pub use error::{ExtractError, ScrapeError, ScrapeResult, SecurityError, SecurityResult};
pub use extractors::{DomExtractor, HeadlessExtractor};
pub use pipeline::{
    fallback_reason, ContentExtractor, ExtractOptions, Extraction, ExtractorConfig,
    FallbackReason, DEFAULT_MIN_CONTENT_CHARS,
};
pub use rendering::{RemoteRenderer, RenderSession, SessionPool};
pub use security::{
    blocked_by_guard, guard_client, redirect_policy, GuardedResolver, RenderEndpoint,
    SecretString, UrlValidator, MAX_REDIRECTS,
};
pub use text::visible_text;
pub use traits::{
    extractor::{ExtractionMethod, Extractor, PageText},
    renderer::{RenderedPage, Renderer, SettleCondition},
};
