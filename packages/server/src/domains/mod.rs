// Business domains
pub mod parsing;
