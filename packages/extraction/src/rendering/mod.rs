//! Headless rendering: session pool and renderer backends.

mod pool;
mod remote;

pub use pool::{RenderSession, SessionPool};
pub use remote::RemoteRenderer;
