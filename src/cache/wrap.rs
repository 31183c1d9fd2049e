//! Higher-order cache wrapping for async operations.

use super::CacheManager;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Wrap `operation` so each call first consults `cache`
///
/// The key for a call is `key_fn(&args)`. On a miss the operation runs and a
/// successful result is stored for `ttl` (or the manager default). Errors are
/// returned unchanged and never cached.
///
/// ```rust,no_run
/// # use bulwark_core::cache::{cached, CacheManager};
/// # use bulwark_core::config::CacheConfig;
/// # use std::sync::Arc;
/// # async fn example() {
/// let cache = Arc::new(CacheManager::new(&CacheConfig::default()));
/// let lookup = cached(
///     cache,
///     |user_id: &u64| format!("profile:{user_id}"),
///     None,
///     |user_id: u64| async move { Ok::<_, std::io::Error>(format!("user-{user_id}")) },
/// );
/// let profile = lookup(7).await;
/// # let _ = profile;
/// # }
/// ```
pub fn cached<A, T, E, K, F, Fut>(
    cache: Arc<CacheManager>,
    key_fn: K,
    ttl: Option<Duration>,
    operation: F,
) -> impl Fn(A) -> BoxFuture<'static, Result<T, E>> + Send + Sync
where
    A: Send + 'static,
    T: Serialize + DeserializeOwned + Send + 'static,
    E: Send + 'static,
    K: Fn(&A) -> String + Send + Sync + 'static,
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    let operation = Arc::new(operation);

    move |args: A| {
        let key = key_fn(&args);
        let cache = Arc::clone(&cache);
        let operation = Arc::clone(&operation);

        async move {
            if let Some(hit) = cache.get::<T>(&key).await {
                return Ok(hit);
            }

            let value = operation(args).await?;
            if let Err(e) = cache.set(&key, &value, ttl) {
                warn!(key = %key, error = %e, "Failed to cache wrapped result");
            }
            Ok(value)
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_cached_runs_operation_once_per_key() {
        let cache = Arc::new(CacheManager::new(&CacheConfig::default()));
        let calls = Arc::new(AtomicU32::new(0));

        let square = {
            let calls = Arc::clone(&calls);
            cached(
                Arc::clone(&cache),
                |n: &u64| format!("square:{n}"),
                None,
                move |n: u64| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async move { Ok::<_, String>(n * n) }
                },
            )
        };

        assert_eq!(square(4).await, Ok(16));
        assert_eq!(square(4).await, Ok(16));
        assert_eq!(square(5).await, Ok(25));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let cache = Arc::new(CacheManager::new(&CacheConfig::default()));
        let calls = Arc::new(AtomicU32::new(0));

        let flaky = {
            let calls = Arc::clone(&calls);
            cached(
                Arc::clone(&cache),
                |_: &()| "flaky".to_string(),
                None,
                move |_: ()| {
                    let attempt = calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if attempt == 0 {
                            Err("unavailable".to_string())
                        } else {
                            Ok(attempt)
                        }
                    }
                },
            )
        };

        assert!(flaky(()).await.is_err());
        assert_eq!(flaky(()).await, Ok(1));
        assert_eq!(flaky(()).await, Ok(1));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
