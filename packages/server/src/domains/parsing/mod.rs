//! Parsing domain: turn extracted page text into schema-conforming JSON.

pub mod prompts;
pub mod schema;
pub mod structurer;
pub mod validation;

pub use schema::{CachedSchemaFetcher, HttpSchemaFetcher, SchemaDescriptor, SchemaFetchError};
pub use structurer::{StructureError, Structurer, StructurerConfig};
