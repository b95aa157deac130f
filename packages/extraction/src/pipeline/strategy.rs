//! Fallback decision policy.
//!
//! Decides, from the outcome of the static fetch, whether to escalate to
//! headless rendering. Kept as a pure function so the rule can be tested
//! without any network.

use std::fmt;

use crate::error::ScrapeResult;
use crate::traits::extractor::PageText;

/// Default minimum visible-text length (characters) for a static fetch
/// to be accepted.
pub const DEFAULT_MIN_CONTENT_CHARS: usize = 100;

/// Caller-supplied extraction options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Skip the static fetch and render headless directly
    pub force_headless: bool,
}

impl ExtractOptions {
    pub fn forced_headless() -> Self {
        Self {
            force_headless: true,
        }
    }
}

/// Why the headless path was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    /// The caller asked for headless rendering
    Forced,
    /// The static fetch failed outright
    PrimaryFailed,
    /// The static fetch returned too little text
    ThinContent { chars: usize },
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::Forced => f.write_str("forced"),
            FallbackReason::PrimaryFailed => f.write_str("primary_failed"),
            FallbackReason::ThinContent { chars } => write!(f, "thin_content({} chars)", chars),
        }
    }
}

/// Decide whether to fall back to headless rendering.
///
/// `primary` is `None` when the static fetch was not attempted. Returns
/// `None` when the static result should be used as-is.
pub fn fallback_reason(
    options: &ExtractOptions,
    primary: Option<&ScrapeResult<PageText>>,
    min_content_chars: usize,
) -> Option<FallbackReason> {
    if options.force_headless {
        return Some(FallbackReason::Forced);
    }

    match primary {
        None | Some(Err(_)) => Some(FallbackReason::PrimaryFailed),
        Some(Ok(page)) => {
            let chars = page.char_len();
            if chars < min_content_chars {
                Some(FallbackReason::ThinContent { chars })
            } else {
                None
            }
        }
    }
}
