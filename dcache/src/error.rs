//! Error types for cache operations.

use std::error::Error as StdError;
use std::sync::Arc;

use thiserror::Error;

use crate::store::StoreError;

/// Error returned by an origin read function.
pub type OriginError = Box<dyn StdError + Send + Sync>;

/// Error type surfaced to cache callers.
///
/// `CacheError` is `Clone` because a single in-flight read may serve many
/// concurrent callers; every waiter receives the same terminal result.
/// Wrapped sources are shared through `Arc` for that reason.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// The caller's context was cancelled while waiting for a result.
    #[error("timeout")]
    Timeout,

    /// An empty payload was decoded into a target that cannot express
    /// absence. Use `Option<T>` to receive absent values.
    #[error("nil value")]
    Nil,

    /// Payload or envelope serialization failed.
    #[error("codec error: {0}")]
    Codec(#[source] Arc<dyn StdError + Send + Sync>),

    /// The remote store returned an error for an operation whose failure
    /// cannot be swallowed (an explicit `set`).
    #[error("remote store error: {0}")]
    Store(#[source] Arc<StoreError>),

    /// The origin read function failed. The original error is available
    /// through [`std::error::Error::source`] and can be downcast.
    #[error("origin read error: {0}")]
    Origin(#[source] Arc<dyn StdError + Send + Sync>),

    /// No remote store was configured on the builder.
    #[error("remote store not configured; call store() before build()")]
    MissingStore,

    /// An in-process read flight was aborted before producing a result.
    /// This indicates a runtime shutdown race and should not be observed
    /// in normal operation.
    #[error("cache flight aborted")]
    Aborted,
}

impl CacheError {
    pub(crate) fn codec<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        CacheError::Codec(Arc::new(err))
    }

    pub(crate) fn origin(err: OriginError) -> Self {
        CacheError::Origin(Arc::from(err))
    }
}

impl From<StoreError> for CacheError {
    fn from(err: StoreError) -> Self {
        CacheError::Store(Arc::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_error_is_downcastable() {
        let source: OriginError = Box::new(std::io::Error::other("db down"));
        let err = CacheError::origin(source);
        match err {
            CacheError::Origin(inner) => {
                assert!(inner.downcast_ref::<std::io::Error>().is_some());
            }
            other => panic!("expected Origin, got {other:?}"),
        }
    }

    #[test]
    fn errors_are_cloneable() {
        let err = CacheError::origin(Box::new(std::io::Error::other("x")));
        let clone = err.clone();
        assert_eq!(err.to_string(), clone.to_string());
    }
}
