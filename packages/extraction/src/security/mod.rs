//! Credential handling and SSRF protection.

mod credentials;
mod net_guard;
mod url_validator;

pub use credentials::{RenderEndpoint, SecretString};
pub use net_guard::{
    blocked_by_guard, guard_client, redirect_policy, GuardedResolver, MAX_REDIRECTS,
};
pub use url_validator::UrlValidator;
