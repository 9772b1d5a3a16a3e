//! Bounded OCR engine pool
//!
//! Every scan is served by a pre-initialized engine instance with exclusive
//! access for the duration of the call. Acquisition is FIFO-fair and
//! cancel-safe: a caller that gives up waiting leaves the queue with no side
//! effects. A handle lost to a fatal engine error is discarded and replaced
//! asynchronously with backoff, so capacity degrades instead of the process
//! crashing. The pool is the only synchronization point in the pipeline.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{EngineError, OcrEngine, Recognition};

/// Builds one recognizer instance; called at startup and for replacements
pub type EngineFactory =
    Arc<dyn Fn() -> Result<Box<dyn OcrEngine>, EngineError> + Send + Sync>;

/// Pool sizing and replacement behavior
#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// Number of engine handles to keep alive
    pub size: usize,
    /// Initial delay before rebuilding a lost handle
    pub replace_backoff: Duration,
    /// Upper bound for the replacement backoff
    pub replace_backoff_cap: Duration,
    /// How many rebuild attempts before giving up on a slot
    pub replace_attempts: u32,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            size: 2,
            replace_backoff: Duration::from_millis(500),
            replace_backoff_cap: Duration::from_secs(30),
            replace_attempts: 5,
        }
    }
}

/// Why an acquire did not produce a lease
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AcquireError {
    /// No handle became available before the deadline
    #[error("no engine handle became available within {0:?}")]
    Timeout(Duration),
    /// The pool no longer grants leases
    #[error("engine pool is shutting down")]
    ShuttingDown,
}

/// One live recognizer instance owned by the pool
struct EngineHandle {
    id: Uuid,
    engine: Box<dyn OcrEngine>,
    created_at: Instant,
}

impl EngineHandle {
    fn new(engine: Box<dyn OcrEngine>) -> Self {
        Self {
            id: Uuid::new_v4(),
            engine,
            created_at: Instant::now(),
        }
    }
}

struct PoolInner {
    /// Handles currently in the Ready state
    ready: Mutex<VecDeque<EngineHandle>>,
    /// One permit per ready handle; closed on shutdown
    permits: Arc<Semaphore>,
    /// Handles alive in any state (ready or leased out)
    live: AtomicUsize,
    /// Leases currently outstanding
    in_flight: AtomicUsize,
    shutting_down: AtomicBool,
    factory: EngineFactory,
    settings: PoolSettings,
}

impl PoolInner {
    fn spawn_replacement(inner: &Arc<PoolInner>) {
        let inner = Arc::clone(inner);
        match tokio::runtime::Handle::try_current() {
            Ok(rt) => {
                rt.spawn(async move { replace_slot(inner).await });
            }
            Err(_) => warn!("no async runtime available to replace a lost engine handle"),
        }
    }
}

/// Rebuild one pool slot with exponential backoff
async fn replace_slot(inner: Arc<PoolInner>) {
    let mut delay = inner.settings.replace_backoff;
    let attempts = inner.settings.replace_attempts;
    for attempt in 1..=attempts {
        if inner.shutting_down.load(Ordering::SeqCst) {
            return;
        }
        tokio::time::sleep(delay).await;

        let factory = Arc::clone(&inner.factory);
        match tokio::task::spawn_blocking(move || factory()).await {
            Ok(Ok(engine)) => {
                if inner.shutting_down.load(Ordering::SeqCst) {
                    return;
                }
                let handle = EngineHandle::new(engine);
                info!(
                    "Replacement engine handle {} ready (attempt {})",
                    handle.id, attempt
                );
                inner.ready.lock().push_back(handle);
                inner.live.fetch_add(1, Ordering::SeqCst);
                inner.permits.add_permits(1);
                return;
            }
            Ok(Err(e)) => warn!("Engine replacement attempt {} failed: {}", attempt, e),
            Err(e) => warn!("Engine replacement attempt {} panicked: {}", attempt, e),
        }

        delay = (delay * 2).min(inner.settings.replace_backoff_cap);
    }
    error!(
        "Could not replace lost engine handle after {} attempts; pool capacity stays reduced",
        attempts
    );
}

/// Bounded pool of pre-initialized OCR engine handles
#[derive(Clone)]
pub struct EnginePool {
    inner: Arc<PoolInner>,
}

impl EnginePool {
    /// Construct and prime all handles.
    ///
    /// A handle that fails to initialize is not enqueued; the pool starts
    /// with reduced capacity and schedules a rebuild for that slot. With zero
    /// successful handles the pool stays up but reports itself unavailable.
    pub async fn initialize(factory: EngineFactory, settings: PoolSettings) -> Self {
        let inner = Arc::new(PoolInner {
            ready: Mutex::new(VecDeque::new()),
            permits: Arc::new(Semaphore::new(0)),
            live: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            shutting_down: AtomicBool::new(false),
            factory,
            settings,
        });

        for slot in 0..inner.settings.size {
            let factory = Arc::clone(&inner.factory);
            match tokio::task::spawn_blocking(move || factory()).await {
                Ok(Ok(engine)) => {
                    let handle = EngineHandle::new(engine);
                    debug!("Engine handle {} initialized (slot {})", handle.id, slot);
                    inner.ready.lock().push_back(handle);
                    inner.live.fetch_add(1, Ordering::SeqCst);
                    inner.permits.add_permits(1);
                }
                Ok(Err(e)) => {
                    warn!("Engine handle for slot {} failed to initialize: {}", slot, e);
                    PoolInner::spawn_replacement(&inner);
                }
                Err(e) => {
                    warn!("Engine initialization for slot {} panicked: {}", slot, e);
                    PoolInner::spawn_replacement(&inner);
                }
            }
        }

        let capacity = inner.live.load(Ordering::SeqCst);
        if capacity == 0 {
            warn!("Engine pool started with zero capacity; scans will be unavailable until a handle comes up");
        } else {
            info!(
                "Engine pool ready with {}/{} handle(s)",
                capacity, inner.settings.size
            );
        }

        Self { inner }
    }

    /// Wait for a ready handle, up to `wait`.
    ///
    /// Waiters are served in FIFO order. Dropping the returned future before
    /// it resolves removes the caller from the queue without side effects.
    pub async fn acquire(&self, wait: Duration) -> Result<EngineLease, AcquireError> {
        if self.inner.shutting_down.load(Ordering::SeqCst) {
            return Err(AcquireError::ShuttingDown);
        }

        let permits = Arc::clone(&self.inner.permits);
        let permit = match tokio::time::timeout(wait, permits.acquire_owned()).await {
            Err(_) => return Err(AcquireError::Timeout(wait)),
            Ok(Err(_)) => return Err(AcquireError::ShuttingDown),
            Ok(Ok(permit)) => permit,
        };

        // A shutdown can drain the ready queue between permit grant and pop.
        let Some(handle) = self.inner.ready.lock().pop_front() else {
            return Err(AcquireError::ShuttingDown);
        };

        self.inner.in_flight.fetch_add(1, Ordering::SeqCst);
        debug!("Engine handle {} acquired", handle.id);

        Ok(EngineLease {
            inner: Arc::clone(&self.inner),
            handle: Some(handle),
            permit: Some(permit),
            poisoned: false,
        })
    }

    /// Readiness predicate for external health checks: at least one handle
    /// is alive and the pool accepts leases.
    pub fn is_ready(&self) -> bool {
        !self.inner.shutting_down.load(Ordering::SeqCst)
            && self.inner.live.load(Ordering::SeqCst) > 0
    }

    /// Handles alive in any state
    pub fn capacity(&self) -> usize {
        self.inner.live.load(Ordering::SeqCst)
    }

    /// Leases currently outstanding
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// Stop granting leases, wait for in-flight work up to `drain_timeout`,
    /// then terminate every remaining handle.
    pub async fn shutdown(&self, drain_timeout: Duration) {
        if self.inner.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Engine pool shutting down");
        self.inner.permits.close();

        // Coarse polling is fine here; drain only runs once at shutdown.
        let deadline = Instant::now() + drain_timeout;
        while self.inner.in_flight.load(Ordering::SeqCst) > 0 {
            if Instant::now() >= deadline {
                warn!(
                    "Drain timeout elapsed with {} lease(s) still in flight",
                    self.inner.in_flight.load(Ordering::SeqCst)
                );
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let terminated = {
            let mut ready = self.inner.ready.lock();
            let count = ready.len();
            ready.clear();
            count
        };
        self.inner.live.store(0, Ordering::SeqCst);
        info!(
            "Engine pool shutdown complete ({} handle(s) terminated)",
            terminated
        );
    }
}

/// Scoped lease on one engine handle.
///
/// Dropping the lease returns the handle to the pool exactly once, on every
/// exit path. A fatal engine error, a panicked recognition, or an orphaned
/// call (the caller timed out mid-recognition) poisons the lease instead:
/// the handle is terminated and a replacement is scheduled.
pub struct EngineLease {
    inner: Arc<PoolInner>,
    handle: Option<EngineHandle>,
    permit: Option<OwnedSemaphorePermit>,
    poisoned: bool,
}

impl EngineLease {
    /// Identifier of the leased handle, if it is still held
    pub fn engine_id(&self) -> Option<Uuid> {
        self.handle.as_ref().map(|h| h.id)
    }

    /// Run recognition on the leased engine.
    ///
    /// The engine call runs on the blocking thread pool so recognition
    /// latency never stalls the async runtime. If this future is dropped
    /// before the call returns, the underlying engine call cannot be
    /// interrupted; the handle is treated as orphaned and replaced.
    pub async fn recognize(&mut self, image: Vec<u8>) -> Result<Recognition, EngineError> {
        let mut handle = self
            .handle
            .take()
            .ok_or_else(|| EngineError::EngineLost("handle already lost".to_string()))?;

        let join = tokio::task::spawn_blocking(move || {
            let result = handle.engine.recognize(&image);
            (handle, result)
        })
        .await;

        match join {
            Ok((handle, result)) => match result {
                Err(e) if e.is_fatal() => {
                    warn!(
                        "Engine handle {} raised a fatal error after {:?}: {}",
                        handle.id,
                        handle.created_at.elapsed(),
                        e
                    );
                    self.poisoned = true;
                    Err(e)
                }
                other => {
                    self.handle = Some(handle);
                    other
                }
            },
            Err(e) => {
                self.poisoned = true;
                Err(EngineError::EngineLost(format!(
                    "recognition task panicked: {e}"
                )))
            }
        }
    }

    /// Permanently remove the held handle from the pool slot
    fn discard_slot(&mut self) {
        if let Some(permit) = self.permit.take() {
            permit.forget();
        }
        // During shutdown the pool already wrote off every handle.
        if self.inner.shutting_down.load(Ordering::SeqCst) {
            return;
        }
        let remaining = self.inner.live.fetch_sub(1, Ordering::SeqCst) - 1;
        warn!(
            "Engine handle terminated, {} handle(s) remaining",
            remaining
        );
        PoolInner::spawn_replacement(&self.inner);
    }
}

impl std::fmt::Debug for EngineLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineLease")
            .field("engine_id", &self.engine_id())
            .field("poisoned", &self.poisoned)
            .finish_non_exhaustive()
    }
}

impl Drop for EngineLease {
    fn drop(&mut self) {
        match self.handle.take() {
            Some(handle) if !self.poisoned => {
                debug!("Engine handle {} released", handle.id);
                self.inner.ready.lock().push_back(handle);
                // The permit field drops after this body, reopening the slot.
            }
            _ => self.discard_slot(),
        }
        self.inner.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mock::{ConcurrencyProbe, MockEngine};

    fn text_factory(text: &str) -> EngineFactory {
        let text = text.to_string();
        Arc::new(move || Ok(Box::new(MockEngine::with_text(text.clone())) as Box<dyn OcrEngine>))
    }

    fn settings(size: usize) -> PoolSettings {
        PoolSettings {
            size,
            replace_backoff: Duration::from_millis(10),
            replace_backoff_cap: Duration::from_millis(40),
            replace_attempts: 3,
        }
    }

    #[tokio::test]
    async fn test_initialize_full_capacity() {
        let pool = EnginePool::initialize(text_factory("hi"), settings(2)).await;
        assert!(pool.is_ready());
        assert_eq!(pool.capacity(), 2);
        assert_eq!(pool.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_initialize_with_one_failed_handle() {
        let built = Arc::new(AtomicUsize::new(0));
        let built_clone = Arc::clone(&built);
        let factory: EngineFactory = Arc::new(move || {
            if built_clone.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(EngineError::Init("model missing".to_string()))
            } else {
                Ok(Box::new(MockEngine::with_text("ok")) as Box<dyn OcrEngine>)
            }
        });
        let mut cfg = settings(3);
        // Keep the rebuild far away so we observe the degraded state
        cfg.replace_backoff = Duration::from_secs(30);
        let pool = EnginePool::initialize(factory, cfg).await;

        assert!(pool.is_ready());
        assert_eq!(pool.capacity(), 2);
    }

    #[tokio::test]
    async fn test_zero_capacity_pool_reports_unavailable() {
        let factory: EngineFactory =
            Arc::new(|| Err(EngineError::Init("no model anywhere".to_string())));
        let mut cfg = settings(2);
        cfg.replace_attempts = 0;
        let pool = EnginePool::initialize(factory, cfg).await;

        assert!(!pool.is_ready());
        let err = pool.acquire(Duration::from_millis(20)).await.unwrap_err();
        assert!(matches!(err, AcquireError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_acquire_release_roundtrip() {
        let pool = EnginePool::initialize(text_factory("hello"), settings(1)).await;

        let mut lease = pool.acquire(Duration::from_millis(100)).await.unwrap();
        assert_eq!(pool.in_flight(), 1);
        let recognition = lease.recognize(b"img".to_vec()).await.unwrap();
        assert_eq!(recognition.text, "hello");
        drop(lease);

        assert_eq!(pool.in_flight(), 0);
        // Same handle is ready again
        let lease = pool.acquire(Duration::from_millis(100)).await.unwrap();
        assert!(lease.engine_id().is_some());
    }

    #[tokio::test]
    async fn test_lease_debug_reports_handle_state() {
        let pool = EnginePool::initialize(text_factory("x"), settings(1)).await;

        let lease = pool.acquire(Duration::from_millis(100)).await.unwrap();
        let rendered = format!("{lease:?}");
        assert!(rendered.contains("EngineLease"));
        assert!(rendered.contains(&lease.engine_id().unwrap().to_string()));
        assert!(rendered.contains("poisoned: false"));
    }

    #[tokio::test]
    async fn test_acquire_times_out_when_saturated() {
        let pool = EnginePool::initialize(text_factory("x"), settings(1)).await;

        let _held = pool.acquire(Duration::from_millis(100)).await.unwrap();
        let err = pool.acquire(Duration::from_millis(50)).await.unwrap_err();
        assert_eq!(err, AcquireError::Timeout(Duration::from_millis(50)));
    }

    #[tokio::test]
    async fn test_abandoned_waiter_leaves_no_side_effects() {
        let pool = EnginePool::initialize(text_factory("x"), settings(1)).await;

        let held = pool.acquire(Duration::from_millis(100)).await.unwrap();
        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire(Duration::from_secs(30)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        waiter.abort();
        let _ = waiter.await;

        drop(held);
        // The abandoned waiter must not have consumed the freed slot
        let lease = pool.acquire(Duration::from_millis(200)).await;
        assert!(lease.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_exclusive_use_single_handle() {
        let probe = Arc::new(ConcurrencyProbe::default());
        let factory: EngineFactory = {
            let probe = Arc::clone(&probe);
            Arc::new(move || {
                Ok(Box::new(
                    MockEngine::with_text("serial")
                        .with_delay(Duration::from_millis(30))
                        .with_probe(Arc::clone(&probe)),
                ) as Box<dyn OcrEngine>)
            })
        };
        let pool = EnginePool::initialize(factory, settings(1)).await;

        let mut tasks = Vec::new();
        for _ in 0..4 {
            let pool = pool.clone();
            tasks.push(tokio::spawn(async move {
                let mut lease = pool.acquire(Duration::from_secs(5)).await.unwrap();
                lease.recognize(b"img".to_vec()).await.unwrap()
            }));
        }
        for task in tasks {
            assert_eq!(task.await.unwrap().text, "serial");
        }

        assert_eq!(probe.calls(), 4);
        assert_eq!(probe.max_concurrency(), 1);
    }

    #[tokio::test]
    async fn test_recoverable_error_returns_handle() {
        let factory: EngineFactory =
            Arc::new(|| Ok(Box::new(MockEngine::failing("blurry")) as Box<dyn OcrEngine>));
        let pool = EnginePool::initialize(factory, settings(1)).await;

        let mut lease = pool.acquire(Duration::from_millis(100)).await.unwrap();
        let err = lease.recognize(b"img".to_vec()).await.unwrap_err();
        assert!(!err.is_fatal());
        drop(lease);

        // Handle survived the failure and is available again
        assert_eq!(pool.capacity(), 1);
        assert!(pool.acquire(Duration::from_millis(100)).await.is_ok());
    }

    #[tokio::test]
    async fn test_fatal_error_discards_and_replaces() {
        let built = Arc::new(AtomicUsize::new(0));
        let built_clone = Arc::clone(&built);
        let factory: EngineFactory = Arc::new(move || {
            let engine: Box<dyn OcrEngine> =
                if built_clone.fetch_add(1, Ordering::SeqCst) == 0 {
                    Box::new(MockEngine::fatal("crashed"))
                } else {
                    Box::new(MockEngine::with_text("recovered"))
                };
            Ok(engine)
        });
        let pool = EnginePool::initialize(factory, settings(1)).await;

        let mut lease = pool.acquire(Duration::from_millis(100)).await.unwrap();
        let err = lease.recognize(b"img".to_vec()).await.unwrap_err();
        assert!(err.is_fatal());
        drop(lease);
        assert_eq!(pool.capacity(), 0);

        // Replacement restores capacity after the backoff window
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(pool.capacity(), 1);
        let mut lease = pool.acquire(Duration::from_millis(200)).await.unwrap();
        assert_eq!(
            lease.recognize(b"img".to_vec()).await.unwrap().text,
            "recovered"
        );
    }

    #[tokio::test]
    async fn test_shutdown_refuses_new_acquires() {
        let pool = EnginePool::initialize(text_factory("x"), settings(2)).await;
        pool.shutdown(Duration::from_millis(100)).await;

        assert!(!pool.is_ready());
        let err = pool.acquire(Duration::from_millis(50)).await.unwrap_err();
        assert_eq!(err, AcquireError::ShuttingDown);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_shutdown_waits_for_in_flight_lease() {
        let factory: EngineFactory = Arc::new(|| {
            Ok(Box::new(
                MockEngine::with_text("slow").with_delay(Duration::from_millis(50)),
            ) as Box<dyn OcrEngine>)
        });
        let pool = EnginePool::initialize(factory, settings(1)).await;

        let worker = {
            let pool = pool.clone();
            tokio::spawn(async move {
                let mut lease = pool.acquire(Duration::from_millis(100)).await.unwrap();
                lease.recognize(b"img".to_vec()).await.unwrap()
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        pool.shutdown(Duration::from_secs(1)).await;
        assert_eq!(pool.in_flight(), 0);
        assert_eq!(worker.await.unwrap().text, "slow");
    }
}
