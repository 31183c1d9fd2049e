//! Integration tests for the composed resilience layer

use async_trait::async_trait;
use bulwark_core::cache::InMemoryDistributedCache;
use bulwark_core::config::BulwarkConfig;
use bulwark_core::layer::{ResilienceLayer, CACHE_COMPONENT};
use bulwark_core::resilience::{CircuitBreakerError, CircuitState};
use bulwark_core::semantic::{Generated, InMemorySemanticRecordStore, SemanticRecordStore};
use bulwark_core::transaction::{StoreError, TransactionError, TransactionOptions, TransactionalStore};
use futures::FutureExt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_test_writer()
        .try_init();
}

fn layer_with(
    config: BulwarkConfig,
    distributed: Option<Arc<InMemoryDistributedCache>>,
) -> (ResilienceLayer, Arc<InMemorySemanticRecordStore>) {
    let durable = Arc::new(InMemorySemanticRecordStore::new());
    let layer = ResilienceLayer::from_config(
        config,
        distributed.map(|d| d as Arc<dyn bulwark_core::DistributedCacheClient>),
        Arc::clone(&durable) as Arc<dyn SemanticRecordStore>,
    )
    .expect("default configuration is valid");
    (layer, durable)
}

async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn test_low_confidence_results_are_regenerated() {
    init_logging();
    let (layer, durable) = layer_with(BulwarkConfig::default(), None);
    let semantic = layer.semantic_cache();
    let calls = AtomicU32::new(0);

    for _ in 0..2 {
        let result = semantic
            .get_or_create("Summarize this contract", "model-a", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, std::convert::Infallible>(Generated {
                    response: "maybe".to_string(),
                    confidence: 0.5,
                })
            })
            .await
            .unwrap();
        assert!(!result.from_cache);
    }

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(durable.is_empty());
    assert_eq!(semantic.stats().skipped_low_confidence, 2);
}

#[tokio::test]
async fn test_confident_results_survive_memory_loss() {
    init_logging();
    let (layer, durable) = layer_with(BulwarkConfig::default(), None);
    let semantic = layer.semantic_cache();
    let calls = AtomicU32::new(0);

    let generate = || async {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok::<_, std::convert::Infallible>(Generated {
            response: vec!["clause 4".to_string()],
            confidence: 0.93,
        })
    };

    let first = semantic
        .get_or_create("Find risky clauses", "model-a", generate)
        .await
        .unwrap();
    assert!(!first.from_cache);
    assert_eq!(durable.len(), 1);

    // Whitespace and case are normalized before hashing
    let second = semantic
        .get_or_create("  find   RISKY clauses ", "model-a", generate)
        .await
        .unwrap();
    assert!(second.from_cache);

    layer.cache().clear(None).await;
    let third = semantic
        .get_or_create("Find risky clauses", "model-a", generate)
        .await
        .unwrap();
    assert!(third.from_cache);
    assert_eq!(third.response, vec!["clause 4".to_string()]);

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let stats = semantic.stats();
    assert_eq!(stats.memory_hits, 1);
    assert_eq!(stats.durable_hits, 1);
}

#[tokio::test]
async fn test_distributed_outage_opens_cache_breaker_and_degrades_to_memory() {
    init_logging();
    let distributed = Arc::new(InMemoryDistributedCache::new());
    let (layer, _) = layer_with(BulwarkConfig::default(), Some(Arc::clone(&distributed)));
    let cache = layer.cache();

    cache.set("session:1", &"alice", None).unwrap();
    settle().await;
    assert!(distributed.peek("bulwark:session:1").is_some());

    distributed.set_available(false);
    let threshold = layer
        .config()
        .circuit_breakers
        .config_for_component(CACHE_COMPONENT)
        .failure_threshold;
    for i in 0..threshold {
        assert_eq!(cache.get::<String>(&format!("missing:{i}")).await, None);
    }

    let breaker = layer.dependency_breaker(CACHE_COMPONENT);
    assert_eq!(breaker.state(), CircuitState::Open);

    let calls_before = distributed.operation_count();
    assert_eq!(cache.get::<String>("missing:again").await, None);
    assert_eq!(distributed.operation_count(), calls_before);

    assert_eq!(cache.get::<String>("session:1").await.as_deref(), Some("alice"));
    assert!(!cache.health_check().await);
}

#[tokio::test]
async fn test_dependency_breaker_fails_fast_once_open() {
    init_logging();
    let mut config = BulwarkConfig::default();
    config.circuit_breakers.default_config.failure_threshold = 2;
    let (layer, _) = layer_with(config, None);
    let inference = layer.dependency_breaker("inference");
    let calls = AtomicU32::new(0);

    for _ in 0..2 {
        let result: Result<(), _> = inference
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>("model server returned 503")
            })
            .await;
        assert!(matches!(result, Err(CircuitBreakerError::OperationFailed(_))));
    }

    let rejected = inference
        .execute(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, &str>(())
        })
        .await;
    assert!(matches!(rejected, Err(ref e) if e.is_circuit_open()));
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let metrics = layer.circuit_breakers().get_system_metrics();
    assert_eq!(metrics.total_failures(), 2);
}

/// Store whose first `deadlocks` commits fail with a deadlock
#[derive(Default)]
struct DeadlockingStore {
    deadlocks: AtomicU32,
    commits: AtomicU32,
}

#[async_trait]
impl TransactionalStore for DeadlockingStore {
    type Tx = Vec<String>;

    async fn begin(&self, _options: &TransactionOptions) -> Result<Self::Tx, StoreError> {
        Ok(Vec::new())
    }

    async fn commit(&self, _tx: Self::Tx) -> Result<(), StoreError> {
        let remaining = self.deadlocks.load(Ordering::SeqCst);
        if remaining > 0 {
            self.deadlocks.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::from_sqlstate("40P01", "deadlock detected"));
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&self, _tx: Self::Tx) -> Result<(), StoreError> {
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_runner_retries_with_configured_limits() {
    init_logging();
    let mut config = BulwarkConfig::default();
    config.retry.max_retries = 1;
    let (layer, _) = layer_with(config, None);

    let store = Arc::new(DeadlockingStore {
        deadlocks: AtomicU32::new(1),
        ..Default::default()
    });
    let runner = layer.transaction_runner(Arc::clone(&store));
    let started = tokio::time::Instant::now();

    let value = runner
        .with_retryable_transaction_default(|tx| {
            async move {
                tx.push("debit:7".to_string());
                Ok(tx.len())
            }
            .boxed()
        })
        .await
        .unwrap();
    assert_eq!(value, 1);
    assert_eq!(store.commits.load(Ordering::SeqCst), 1);
    assert!(started.elapsed() >= Duration::from_millis(100));
    assert!(started.elapsed() < Duration::from_millis(200));

    store.deadlocks.store(5, Ordering::SeqCst);
    let err = runner
        .with_retryable_transaction_default(|_tx| async { Ok(()) }.boxed())
        .await
        .unwrap_err();
    assert!(matches!(err, TransactionError::Deadlock { attempts: 2, .. }));
}
