//! Extraction pipeline: fallback policy and the dual-strategy entry point.

pub mod extract;
pub mod strategy;

pub use extract::{ContentExtractor, Extraction, ExtractorConfig};
pub use strategy::{fallback_reason, ExtractOptions, FallbackReason, DEFAULT_MIN_CONTENT_CHARS};
