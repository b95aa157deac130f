//! Extraction strategies.
//!
//! - `DomExtractor` - static HTTP fetch, no JavaScript
//! - `HeadlessExtractor` - pooled headless render for script-built pages

mod dom;
mod headless;

pub use dom::DomExtractor;
pub use headless::HeadlessExtractor;
