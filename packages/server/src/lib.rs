// Parse Server - API Core
//
// Accepts a URL and a schema reference, extracts the page text, structures it
// with a language model and serves the result by polling.
//
// Job lifecycle lives in kernel/jobs; structuring lives in domains/parsing.

pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::*;
