//! In-memory resource stores.
//!
//! [`InMemoryResourceStore`] gives each record its own async mutex. A
//! decrement waits at most `lock_wait` for that mutex and reports
//! [`DecrementOutcome::ContentionBlocked`] when the wait runs out, mirroring a
//! database row lock with a lock timeout. Once the lock is held the check,
//! subtraction and receipt append run without an await in between, so a
//! dropped future never leaves a half-applied decrement behind.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::time::Duration;
use tally_core::environment::{Clock, SystemClock};
use tally_core::{
    DecrementOutcome, Quantity, Receipt, ReceiptId, Rejection, ResourceId, ResourceRecord,
    ResourceStore, SeedMode, StoreError, StoreFuture,
};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

/// Default time a decrement waits for a record lock.
pub const DEFAULT_LOCK_WAIT: Duration = Duration::from_millis(100);

#[derive(Debug)]
struct Slot {
    record: ResourceRecord,
    receipts: Vec<Receipt>,
}

/// Exclusive hold on one record, obtained with [`InMemoryResourceStore::hold`].
///
/// While it is alive every decrement of the record reports contention.
#[derive(Debug)]
pub struct RecordLock {
    _guard: OwnedMutexGuard<Slot>,
}

/// Thread-safe in-memory [`ResourceStore`] with per-record locking.
pub struct InMemoryResourceStore {
    records: RwLock<HashMap<ResourceId, Arc<Mutex<Slot>>>>,
    next_receipt: AtomicI64,
    lock_wait: Duration,
    clock: Arc<dyn Clock>,
}

impl InMemoryResourceStore {
    /// Create an empty store using the system clock and [`DEFAULT_LOCK_WAIT`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            next_receipt: AtomicI64::new(1),
            lock_wait: DEFAULT_LOCK_WAIT,
            clock: Arc::new(SystemClock),
        }
    }

    /// Set how long a decrement waits for a record lock.
    #[must_use]
    pub const fn with_lock_wait(mut self, lock_wait: Duration) -> Self {
        self.lock_wait = lock_wait;
        self
    }

    /// Use `clock` for receipt timestamps.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The configured lock wait.
    #[must_use]
    pub const fn lock_wait(&self) -> Duration {
        self.lock_wait
    }

    /// Take the lock on `id` and keep it until the returned guard is dropped.
    ///
    /// Returns `None` if the record does not exist.
    pub async fn hold(&self, id: ResourceId) -> Option<RecordLock> {
        let slot = self.slot(id).await?;
        Some(RecordLock {
            _guard: slot.lock_owned().await,
        })
    }

    async fn slot(&self, id: ResourceId) -> Option<Arc<Mutex<Slot>>> {
        self.records.read().await.get(&id).cloned()
    }
}

impl Default for InMemoryResourceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryResourceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryResourceStore")
            .field("lock_wait", &self.lock_wait)
            .finish_non_exhaustive()
    }
}

impl ResourceStore for InMemoryResourceStore {
    fn decrement(&self, id: ResourceId, amount: Quantity) -> StoreFuture<'_, DecrementOutcome> {
        Box::pin(async move {
            let Some(slot) = self.slot(id).await else {
                return Ok(DecrementOutcome::Rejected(Rejection::NotFound));
            };
            let Ok(mut slot) = tokio::time::timeout(self.lock_wait, slot.lock()).await else {
                return Ok(DecrementOutcome::ContentionBlocked);
            };

            let available = slot.record.quantity;
            let Some(remaining) = available.checked_sub(amount) else {
                return Ok(DecrementOutcome::Rejected(Rejection::Insufficient {
                    available,
                }));
            };

            let receipt = Receipt {
                id: ReceiptId::new(self.next_receipt.fetch_add(1, Ordering::SeqCst)),
                resource_id: id,
                amount,
                timestamp: self.clock.now(),
            };
            slot.record.quantity = remaining;
            slot.receipts.push(receipt.clone());

            Ok(DecrementOutcome::Applied { remaining, receipt })
        })
    }

    fn get(&self, id: ResourceId) -> StoreFuture<'_, Option<ResourceRecord>> {
        Box::pin(async move {
            let Some(slot) = self.slot(id).await else {
                return Ok(None);
            };
            let record = slot.lock().await.record.clone();
            Ok(Some(record))
        })
    }

    fn receipts(&self, id: ResourceId) -> StoreFuture<'_, Vec<Receipt>> {
        Box::pin(async move {
            let Some(slot) = self.slot(id).await else {
                return Ok(Vec::new());
            };
            let receipts = slot.lock().await.receipts.clone();
            Ok(receipts)
        })
    }

    fn seed(&self, records: Vec<ResourceRecord>, mode: SeedMode) -> StoreFuture<'_, usize> {
        Box::pin(async move {
            let mut written = 0;
            let mut resets = Vec::new();

            {
                let mut map = self.records.write().await;
                for record in records {
                    match map.entry(record.id) {
                        Entry::Vacant(entry) => {
                            entry.insert(Arc::new(Mutex::new(Slot {
                                record,
                                receipts: Vec::new(),
                            })));
                            written += 1;
                        },
                        Entry::Occupied(entry) if mode == SeedMode::Reset => {
                            resets.push((Arc::clone(entry.get()), record));
                        },
                        Entry::Occupied(_) => {},
                    }
                }
            }

            // Record locks are taken only after the map lock is released
            for (slot, record) in resets {
                let mut slot = slot.lock().await;
                slot.record = record;
                // Receipts describe decrements from the previous initial quantity
                slot.receipts.clear();
                written += 1;
            }

            Ok(written)
        })
    }
}

/// Store wrapper that reports contention a fixed number of times, or fails.
///
/// Every decrement is counted, so tests can assert how often the engine
/// reached the store.
pub struct ScriptedStore {
    inner: Arc<dyn ResourceStore>,
    contended_remaining: AtomicU32,
    failure: Option<StoreError>,
    calls: AtomicU32,
}

impl ScriptedStore {
    /// Report `ContentionBlocked` for the first `contended_times` decrements,
    /// then delegate to `inner`.
    #[must_use]
    pub fn new(inner: Arc<dyn ResourceStore>, contended_times: u32) -> Self {
        Self {
            inner,
            contended_remaining: AtomicU32::new(contended_times),
            failure: None,
            calls: AtomicU32::new(0),
        }
    }

    /// Fail every decrement with `error`.
    #[must_use]
    pub fn failing(inner: Arc<dyn ResourceStore>, error: StoreError) -> Self {
        Self {
            inner,
            contended_remaining: AtomicU32::new(0),
            failure: Some(error),
            calls: AtomicU32::new(0),
        }
    }

    /// Number of decrements received so far.
    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for ScriptedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedStore")
            .field("contended_remaining", &self.contended_remaining)
            .field("failure", &self.failure)
            .field("calls", &self.calls)
            .finish_non_exhaustive()
    }
}

impl ResourceStore for ScriptedStore {
    fn decrement(&self, id: ResourceId, amount: Quantity) -> StoreFuture<'_, DecrementOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(error) = &self.failure {
            let error = error.clone();
            return Box::pin(async move { Err(error) });
        }

        let contended = self
            .contended_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if contended {
            return Box::pin(async { Ok(DecrementOutcome::ContentionBlocked) });
        }

        self.inner.decrement(id, amount)
    }

    fn get(&self, id: ResourceId) -> StoreFuture<'_, Option<ResourceRecord>> {
        self.inner.get(id)
    }

    fn receipts(&self, id: ResourceId) -> StoreFuture<'_, Vec<Receipt>> {
        self.inner.receipts(id)
    }

    fn seed(&self, records: Vec<ResourceRecord>, mode: SeedMode) -> StoreFuture<'_, usize> {
        self.inner.seed(records, mode)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::panic)] // Test code uses expect for clear failure messages
mod tests {
    use super::*;
    use crate::mocks::test_clock;

    fn item(quantity: u64) -> ResourceRecord {
        ResourceRecord::new(ResourceId::new(1), "Item A", Quantity::new(quantity))
    }

    async fn seeded(quantity: u64) -> InMemoryResourceStore {
        let store = InMemoryResourceStore::new().with_clock(Arc::new(test_clock()));
        store
            .seed(vec![item(quantity)], SeedMode::InsertMissing)
            .await
            .expect("seed should succeed");
        store
    }

    #[tokio::test]
    async fn test_decrement_applies_and_writes_receipt() {
        let store = seeded(10).await;

        let outcome = store
            .decrement(ResourceId::new(1), Quantity::new(3))
            .await
            .expect("decrement should succeed");

        let DecrementOutcome::Applied { remaining, receipt } = outcome else {
            panic!("expected Applied, got {outcome:?}");
        };
        assert_eq!(remaining, Quantity::new(7));
        assert_eq!(receipt.amount, Quantity::new(3));
        assert_eq!(receipt.resource_id, ResourceId::new(1));
        assert_eq!(receipt.timestamp, test_clock().now());

        let receipts = store
            .receipts(ResourceId::new(1))
            .await
            .expect("receipts should load");
        assert_eq!(receipts, vec![receipt]);
    }

    #[tokio::test]
    async fn test_decrement_to_exactly_zero() {
        let store = seeded(2).await;

        let outcome = store
            .decrement(ResourceId::new(1), Quantity::new(2))
            .await
            .expect("decrement should succeed");

        assert!(matches!(
            outcome,
            DecrementOutcome::Applied { remaining, .. } if remaining.is_zero()
        ));
    }

    #[tokio::test]
    async fn test_insufficient_writes_nothing() {
        let store = seeded(1).await;

        let outcome = store
            .decrement(ResourceId::new(1), Quantity::new(2))
            .await
            .expect("decrement should succeed");

        assert_eq!(
            outcome,
            DecrementOutcome::Rejected(Rejection::Insufficient {
                available: Quantity::new(1)
            })
        );
        let record = store
            .get(ResourceId::new(1))
            .await
            .expect("get should succeed")
            .expect("record should exist");
        assert_eq!(record.quantity, Quantity::new(1));
        assert!(
            store
                .receipts(ResourceId::new(1))
                .await
                .expect("receipts should load")
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_unknown_record_is_not_found() {
        let store = seeded(1).await;

        let outcome = store
            .decrement(ResourceId::new(42), Quantity::new(1))
            .await
            .expect("decrement should succeed");

        assert_eq!(outcome, DecrementOutcome::Rejected(Rejection::NotFound));
        assert_eq!(
            store.get(ResourceId::new(42)).await.expect("get should succeed"),
            None
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_held_lock_reports_contention() {
        let store = seeded(5).await;
        let lock = store.hold(ResourceId::new(1)).await.expect("record exists");

        let outcome = store
            .decrement(ResourceId::new(1), Quantity::new(1))
            .await
            .expect("decrement should succeed");
        assert_eq!(outcome, DecrementOutcome::ContentionBlocked);

        drop(lock);
        let outcome = store
            .decrement(ResourceId::new(1), Quantity::new(1))
            .await
            .expect("decrement should succeed");
        assert!(matches!(outcome, DecrementOutcome::Applied { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_waiting_on_held_record_leaves_others_available() {
        let store = Arc::new(seeded(5).await);
        store
            .seed(
                vec![ResourceRecord::new(ResourceId::new(2), "Item B", Quantity::new(5))],
                SeedMode::InsertMissing,
            )
            .await
            .expect("seed should succeed");
        let lock = store.hold(ResourceId::new(1)).await.expect("record exists");

        let seeding = tokio::spawn({
            let store = Arc::clone(&store);
            async move { store.seed(vec![item(50)], SeedMode::Reset).await }
        });
        tokio::task::yield_now().await;

        let outcome = tokio::time::timeout(
            Duration::from_secs(1),
            store.decrement(ResourceId::new(2), Quantity::new(1)),
        )
        .await
        .expect("decrement of another record should not wait for the reset")
        .expect("decrement should succeed");
        assert!(matches!(outcome, DecrementOutcome::Applied { .. }));

        let blocked = store
            .decrement(ResourceId::new(1), Quantity::new(1))
            .await
            .expect("decrement should succeed");
        assert_eq!(blocked, DecrementOutcome::ContentionBlocked);

        drop(lock);
        let written = seeding
            .await
            .expect("seed task should not panic")
            .expect("seed should succeed");
        assert_eq!(written, 1);
        let record = store
            .get(ResourceId::new(1))
            .await
            .expect("get should succeed")
            .expect("record should exist");
        assert_eq!(record.quantity, Quantity::new(50));
    }

    #[tokio::test]
    async fn test_seed_modes() {
        let store = seeded(10).await;
        store
            .decrement(ResourceId::new(1), Quantity::new(4))
            .await
            .expect("decrement should succeed");

        let written = store
            .seed(vec![item(10)], SeedMode::InsertMissing)
            .await
            .expect("seed should succeed");
        assert_eq!(written, 0);
        let record = store.get(ResourceId::new(1)).await.expect("get should succeed");
        assert_eq!(record.map(|r| r.quantity), Some(Quantity::new(6)));

        let written = store
            .seed(vec![item(10)], SeedMode::Reset)
            .await
            .expect("seed should succeed");
        assert_eq!(written, 1);
        let record = store.get(ResourceId::new(1)).await.expect("get should succeed");
        assert_eq!(record.map(|r| r.quantity), Some(Quantity::new(10)));
        assert!(
            store
                .receipts(ResourceId::new(1))
                .await
                .expect("receipts should load")
                .is_empty()
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_decrements_never_oversell() {
        let store = Arc::new(seeded(50).await.with_lock_wait(Duration::from_secs(5)));

        let tasks = (0..80).map(|_| {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.decrement(ResourceId::new(1), Quantity::new(1)).await })
        });
        let results = futures::future::join_all(tasks).await;

        let applied = results
            .into_iter()
            .map(|r| r.expect("task should not panic").expect("decrement should succeed"))
            .filter(|o| matches!(o, DecrementOutcome::Applied { .. }))
            .count();
        assert_eq!(applied, 50);

        let receipts = store
            .receipts(ResourceId::new(1))
            .await
            .expect("receipts should load");
        assert_eq!(receipts.len(), 50);
    }

    #[tokio::test]
    async fn test_scripted_contention_then_delegates() {
        let scripted = ScriptedStore::new(Arc::new(seeded(5).await), 2);

        for _ in 0..2 {
            let outcome = scripted
                .decrement(ResourceId::new(1), Quantity::new(1))
                .await
                .expect("decrement should succeed");
            assert_eq!(outcome, DecrementOutcome::ContentionBlocked);
        }
        let outcome = scripted
            .decrement(ResourceId::new(1), Quantity::new(1))
            .await
            .expect("decrement should succeed");
        assert!(matches!(outcome, DecrementOutcome::Applied { .. }));
        assert_eq!(scripted.calls(), 3);
    }

    #[tokio::test]
    async fn test_scripted_failure() {
        let scripted = ScriptedStore::failing(
            Arc::new(seeded(5).await),
            StoreError::Database("boom".to_string()),
        );

        let result = scripted.decrement(ResourceId::new(1), Quantity::new(1)).await;

        assert_eq!(result, Err(StoreError::Database("boom".to_string())));
        assert_eq!(scripted.calls(), 1);
    }
}
