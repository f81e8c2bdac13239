mod backend;
mod error;

pub use backend::{CheckoutGuard, CommitInfo, GitBackend};
pub use error::{BackendError, Result};
