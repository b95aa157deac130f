//! Typed errors for the extraction library.
//!
//! Uses `thiserror` for library errors (not `anyhow`) so callers can
//! classify failures (timeouts, pool exhaustion, HTTP status) without
//! string matching.

use serde_json::json;
use thiserror::Error;

/// Errors from a single extraction strategy attempt.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Security validation failed (blocked scheme, host or redirect target)
    #[error("security error: {0}")]
    Security(#[from] SecurityError),

    /// The server answered with a non-success status
    #[error("HTTP {status} fetching {url}")]
    Status { url: String, status: u16 },

    /// Transport-level failure (connect, TLS, body read)
    #[error("HTTP error fetching {url}: {message}")]
    Transport { url: String, message: String },

    /// The attempt exceeded its time budget
    #[error("timeout after {after_ms}ms fetching {url}")]
    Timeout { url: String, after_ms: u64 },

    /// No render session became free within the acquisition timeout
    #[error("headless pool exhausted after waiting {waited_ms}ms")]
    ResourceExhausted { waited_ms: u64 },

    /// The render service failed or returned an unusable document
    #[error("render failed for {url}: {message}")]
    Render { url: String, message: String },

    /// Headless rendering is not configured for this deployment
    #[error("headless rendering unavailable")]
    HeadlessUnavailable,

    /// Client construction or other setup failure
    #[error("client setup failed: {0}")]
    Setup(String),
}

impl ScrapeError {
    /// Short machine-readable reason used in job error details.
    pub fn reason(&self) -> &'static str {
        match self {
            ScrapeError::Security(_) => "blocked",
            ScrapeError::Status { .. } => "http_status",
            ScrapeError::Transport { .. } => "transport",
            ScrapeError::Timeout { .. } => "timeout",
            ScrapeError::ResourceExhausted { .. } => "resource_exhausted",
            ScrapeError::Render { .. } => "render",
            ScrapeError::HeadlessUnavailable => "headless_unavailable",
            ScrapeError::Setup(_) => "setup",
        }
    }

    /// HTTP status carried by this error, if any.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            ScrapeError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ScrapeError::Timeout { .. })
    }

    pub fn is_resource_exhausted(&self) -> bool {
        matches!(self, ScrapeError::ResourceExhausted { .. })
    }
}

/// Terminal failure of [`ContentExtractor::extract`](crate::ContentExtractor::extract).
///
/// Carries both strategy outcomes so the job record can explain what
/// happened on each path.
#[derive(Debug, Error)]
#[error("scrape failed: {fallback}")]
pub struct ExtractError {
    /// Primary (static fetch) failure; `None` when the primary path was
    /// skipped or produced content that was too thin to use.
    pub primary: Option<ScrapeError>,

    /// The error that ended the attempt (headless failure, or the primary
    /// failure when no fallback could run).
    pub fallback: ScrapeError,
}

impl ExtractError {
    /// Reason of the decisive failure.
    pub fn reason(&self) -> &'static str {
        self.fallback.reason()
    }

    /// Structured diagnostics for the job record.
    pub fn details(&self) -> serde_json::Value {
        let http_status = self
            .fallback
            .http_status()
            .or_else(|| self.primary.as_ref().and_then(ScrapeError::http_status));
        let timed_out = self.fallback.is_timeout()
            || self.primary.as_ref().is_some_and(ScrapeError::is_timeout);

        json!({
            "reason": self.reason(),
            "http_status": http_status,
            "timed_out": timed_out,
            "resource_exhausted": self.fallback.is_resource_exhausted(),
            "primary_error": self.primary.as_ref().map(|e| e.to_string()),
            "fallback_error": self.fallback.to_string(),
        })
    }
}

/// Security-related errors, primarily for SSRF protection.
#[derive(Debug, Clone, Error)]
pub enum SecurityError {
    /// URL scheme not allowed (e.g., file://, ftp://)
    #[error("disallowed URL scheme: {0}")]
    DisallowedScheme(String),

    /// Host is blocked (e.g., localhost, metadata hosts)
    #[error("blocked host: {0}")]
    BlockedHost(String),

    /// IP in blocked CIDR range (e.g., 10.0.0.0/8)
    #[error("blocked IP range: {0}")]
    BlockedCidr(String),

    /// URL has no host
    #[error("URL has no host")]
    NoHost,

    /// DNS resolution failed
    #[error("DNS resolution failed: {0}")]
    DnsResolution(String),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

/// Result type alias for single-strategy operations.
pub type ScrapeResult<T> = std::result::Result<T, ScrapeError>;

/// Result type alias for security operations.
pub type SecurityResult<T> = std::result::Result<T, SecurityError>;
