//! Kernel module - server infrastructure and dependencies.

pub mod ai;
pub mod backoff;
pub mod deps;
pub mod jobs;
pub mod test_dependencies;
pub mod traits;

pub use ai::OpenAIAdapter;
pub use backoff::BackoffConfig;
pub use deps::ServerDeps;
pub use test_dependencies::{MockAI, MockSchemaFetcher, TestDependencies};
pub use traits::*;

/// Default model for structuring.
pub const GPT_4O_MINI: &str = "gpt-4o-mini";
