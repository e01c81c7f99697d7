//! Error types for the access layer.

use thiserror::Error;

/// Failure reported by a remote document store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
  /// The store could not be reached or timed out.
  #[error("store unavailable: {0}")]
  Unavailable(String),

  #[error("permission denied: {0}")]
  PermissionDenied(String),

  #[error("document not found: {collection}/{id}")]
  NotFound { collection: String, id: String },

  /// A write was rejected as a whole (e.g. a batch commit).
  #[error("write aborted: {0}")]
  Aborted(String),

  #[error("internal store error: {0}")]
  Internal(String),
}

impl RemoteError {
  /// Whether a caller-side retry could plausibly succeed.
  ///
  /// Nothing in this crate retries; this only informs callers layering
  /// their own backoff on top.
  pub fn is_retryable(&self) -> bool {
    matches!(self, Self::Unavailable(_) | Self::Aborted(_))
  }
}

/// Errors surfaced by the access layer to its callers.
#[derive(Debug, Error)]
pub enum DataError {
  #[error("remote store error: {0}")]
  Remote(#[from] RemoteError),

  /// A listener failed after it was established.
  #[error("subscription {key} failed: {source}")]
  Subscription {
    key: String,
    #[source]
    source: RemoteError,
  },

  /// One or more chunk commits of a batch write failed.
  ///
  /// Chunks are committed independently, so chunks not counted in `failed`
  /// may already be persisted. The error does not say which ones.
  #[error("batch write failed: {failed} of {total} chunk commits failed")]
  BatchAggregate { failed: usize, total: usize },

  #[error("invalid argument: {0}")]
  InvalidArgument(String),

  #[error("failed to decode document: {0}")]
  Decode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DataError>;
