//! Connection-time SSRF enforcement for reqwest clients.
//!
//! [`UrlValidator`] checks a URL lexically. These pieces apply the same
//! rules while a request is in flight: every redirect hop is validated
//! before it is followed, and every DNS answer is screened before a
//! socket is opened.

use std::error::Error as StdError;
use std::net::SocketAddr;
use std::sync::Arc;

use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use reqwest::redirect::Policy;
use reqwest::ClientBuilder;
use tracing::warn;

use super::UrlValidator;
use crate::error::SecurityError;

type BoxError = Box<dyn StdError + Send + Sync>;

/// Redirect hops followed before giving up.
pub const MAX_REDIRECTS: usize = 5;

/// Redirect policy that validates each hop's URL before following it.
pub fn redirect_policy(validator: UrlValidator, max_redirects: usize) -> Policy {
    Policy::custom(move |attempt| {
        if attempt.previous().len() > max_redirects {
            return attempt.error("too many redirects");
        }
        match validator.validate_url(attempt.url()) {
            Ok(()) => attempt.follow(),
            Err(e) => {
                warn!(url = %attempt.url(), error = %e, "Blocked redirect hop");
                attempt.error(e)
            }
        }
    })
}

/// Apply the per-hop redirect policy and the screening resolver to `builder`.
pub fn guard_client(builder: ClientBuilder, validator: &UrlValidator) -> ClientBuilder {
    builder
        .redirect(redirect_policy(validator.clone(), MAX_REDIRECTS))
        .dns_resolver(Arc::new(GuardedResolver::new(validator.clone())))
}

/// The [`SecurityError`] behind a failed request, if the guard refused it.
pub fn blocked_by_guard(err: &reqwest::Error) -> Option<SecurityError> {
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(security) = cause.downcast_ref::<SecurityError>() {
            return Some(security.clone());
        }
        source = cause.source();
    }
    None
}

/// DNS resolver that refuses answers pointing into blocked ranges.
///
/// Hostnames are resolved again at connect time, so a name that passed
/// submission-time checks cannot be rebound to an internal address.
pub struct GuardedResolver {
    validator: UrlValidator,
    inner: Arc<dyn Resolve>,
}

impl GuardedResolver {
    /// Screen answers from the system resolver.
    pub fn new(validator: UrlValidator) -> Self {
        Self::with_inner(validator, Arc::new(SystemResolver))
    }

    /// Screen answers from `inner`.
    pub fn with_inner(validator: UrlValidator, inner: Arc<dyn Resolve>) -> Self {
        Self { validator, inner }
    }
}

impl Resolve for GuardedResolver {
    fn resolve(&self, name: Name) -> Resolving {
        Box::pin(screened(self.validator.clone(), self.inner.clone(), name))
    }
}

async fn screened(
    validator: UrlValidator,
    inner: Arc<dyn Resolve>,
    name: Name,
) -> Result<Addrs, BoxError> {
    let host = name.as_str().to_string();
    let addrs: Vec<SocketAddr> = inner.resolve(name).await?.collect();
    let addrs = validator.check_resolved(&host, addrs).inspect_err(|e| {
        warn!(host = %host, error = %e, "Refused DNS answer");
    })?;
    Ok(Box::new(addrs.into_iter()))
}

/// getaddrinfo through tokio's blocking pool.
struct SystemResolver;

impl Resolve for SystemResolver {
    fn resolve(&self, name: Name) -> Resolving {
        Box::pin(lookup(name.as_str().to_string()))
    }
}

async fn lookup(host: String) -> Result<Addrs, BoxError> {
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host.as_str(), 0)).await?.collect();
    Ok(Box::new(addrs.into_iter()))
}
