//! API interaction layer.
//!
//! - [`retry`]: bounded exponential backoff around a single remote call,
//!   parametrized by an explicit transient-error predicate.

pub mod retry;

pub use retry::{RetryConfig, retry_call};
