use super::*;
use crate::block::{Block, BlockPatch, Temperature};
use crate::store::{
    BlockStore, ChangeKind, SqliteBlockStore, StoreChange, StoreError, StoreSnapshot,
    TickCommit,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

fn patch(id: &str, x: f64, y: f64, load: f64) -> BlockPatch {
    BlockPatch {
        id: id.to_string(),
        x: Some(x),
        y: Some(y),
        width: Some(100.0),
        height: Some(100.0),
        dynamic_load: Some(load),
        temperature: None,
    }
}

fn block(id: &str, x: f64, load: f64, temperature: Temperature) -> Block {
    Block {
        id: id.to_string(),
        x,
        y: 0.0,
        width: 100.0,
        height: 100.0,
        dynamic_load: load,
        temperature,
    }
}

async fn store_with(patches: &[BlockPatch]) -> Arc<SqliteBlockStore> {
    let store = Arc::new(SqliteBlockStore::new(":memory:").unwrap());
    for p in patches {
        store.upsert_merge(p).await.unwrap();
    }
    store
}

fn coordinator(store: Arc<dyn BlockStore>) -> TickCoordinator {
    TickCoordinator::new(store, TickConfig::default())
}

async fn temperature_of(store: &SqliteBlockStore, id: &str) -> Temperature {
    store
        .load_all()
        .await
        .unwrap()
        .into_iter()
        .find(|b| b.id == id)
        .map(|b| b.temperature)
        .unwrap()
}

#[tokio::test]
async fn test_isolated_block_reaches_fixed_point_in_one_tick() {
    let store = store_with(&[patch("solo", 0.0, 0.0, 50.0)]).await;
    let coordinator = coordinator(store.clone());

    let first = coordinator.run_tick().await.unwrap();
    assert_eq!(first.written, 1);
    assert_eq!(temperature_of(&store, "solo").await, Temperature::Measured(24.5));

    // Stays put while isolated and load-constant
    for _ in 0..3 {
        let report = coordinator.run_tick().await.unwrap();
        assert_eq!(report.written, 0);
        assert_eq!(report.suppressed, 1);
    }
    assert_eq!(temperature_of(&store, "solo").await, Temperature::Measured(24.5));
}

#[tokio::test]
async fn test_idle_unset_block_stays_at_ambient_without_write() {
    let store = store_with(&[patch("idle", 0.0, 0.0, 0.0)]).await;
    let coordinator = coordinator(store.clone());

    let report = coordinator.run_tick().await.unwrap();
    assert_eq!(report.written, 0);
    assert_eq!(report.suppressed, 1);
    assert_eq!(temperature_of(&store, "idle").await, Temperature::Unset);
}

#[tokio::test]
async fn test_sub_threshold_change_is_not_written() {
    let mut warm = patch("warm", 0.0, 0.0, 50.0);
    warm.temperature = Some(24.45);
    let store = store_with(&[warm]).await;
    let revision_before = store.read_snapshot().await.unwrap().revision;

    let report = coordinator(store.clone()).run_tick().await.unwrap();
    assert_eq!(report.written, 0);

    let after = store.read_snapshot().await.unwrap();
    assert_eq!(after.revision, revision_before);
    assert_eq!(after.blocks[0].temperature, Temperature::Measured(24.45));
}

#[test]
fn test_threshold_boundaries() {
    // Next value for an isolated half-loaded block is 24.5
    let plan = compute_updates(&[
        block("near", 0.0, 50.0, Temperature::Measured(24.42)),
        block("far", 1000.0, 50.0, Temperature::Measured(24.38)),
    ]);

    assert!(approx(plan.computed[0].temperature, 24.5));
    assert_eq!(plan.suppressed, 1);
    assert_eq!(plan.writes.len(), 1);
    assert_eq!(plan.writes[0].id, "far");
}

#[test]
fn test_updates_are_simultaneous() {
    // A (load 100) and B (load 0) overlap; both start at ambient
    let blocks = vec![
        block("a", 0.0, 100.0, Temperature::Unset),
        block("b", 50.0, 0.0, Temperature::Unset),
    ];
    let plan = compute_updates(&blocks);

    // A: 0.6 * 30 + 0.4 * 20 = 26, cooled to 25.4
    assert!(approx(plan.computed[0].temperature, 25.4));
    // B uses A's pre-tick 20, not 25.4: stays at 20
    assert!(approx(plan.computed[1].temperature, 20.0));

    assert_eq!(plan.writes.len(), 1);
    assert_eq!(plan.writes[0].id, "a");

    // Order of the snapshot does not matter
    let reversed: Vec<Block> = blocks.iter().rev().cloned().collect();
    let plan_rev = compute_updates(&reversed);
    assert!(approx(plan_rev.computed[0].temperature, 20.0));
    assert!(approx(plan_rev.computed[1].temperature, 25.4));
}

#[tokio::test]
async fn test_heat_spreads_on_following_tick() {
    let store = store_with(&[patch("a", 0.0, 0.0, 100.0), patch("b", 50.0, 0.0, 0.0)]).await;
    let coordinator = coordinator(store.clone());

    coordinator.run_tick().await.unwrap();
    assert_eq!(temperature_of(&store, "b").await, Temperature::Unset);

    let report = coordinator.run_tick().await.unwrap();
    assert_eq!(report.written, 1);
    // B: 0.6 * 20 + 0.4 * 25.4 = 22.16, cooled to 21.944
    assert!(approx(temperature_of(&store, "b").await.value(), 21.944));
    // A: 0.6 * 30 + 0.4 * 20 = 26 again, unchanged
    assert!(approx(temperature_of(&store, "a").await.value(), 25.4));
}

#[tokio::test]
async fn test_tick_only_writes_temperature() {
    let store = store_with(&[patch("a", 12.5, -7.0, 80.0), patch("b", 60.0, 30.0, 10.0)]).await;
    let before = store.load_all().await.unwrap();

    coordinator(store.clone()).run_tick().await.unwrap();

    let after = store.load_all().await.unwrap();
    assert_eq!(before.len(), after.len());
    for (b, a) in before.iter().zip(after.iter()) {
        assert_eq!(b.id, a.id);
        assert_eq!(b.x, a.x);
        assert_eq!(b.y, a.y);
        assert_eq!(b.width, a.width);
        assert_eq!(b.height, a.height);
        assert_eq!(b.dynamic_load, a.dynamic_load);
    }
}

#[tokio::test]
async fn test_empty_collection_is_noop() {
    let store = store_with(&[]).await;
    let mut changes = store.subscribe();

    let report = coordinator(store.clone()).run_tick().await.unwrap();
    assert_eq!(report, TickReport::default());
    assert!(changes.try_recv().is_err());
}

/// Store that applies an external edit right after every snapshot read
struct InterleavingStore {
    inner: SqliteBlockStore,
    edit: BlockPatch,
}

#[async_trait]
impl BlockStore for InterleavingStore {
    async fn read_snapshot(&self) -> Result<StoreSnapshot, StoreError> {
        let snapshot = self.inner.read_snapshot().await?;
        self.inner.upsert_merge(&self.edit).await?;
        Ok(snapshot)
    }

    async fn commit_temperatures(&self, commit: TickCommit) -> Result<usize, StoreError> {
        self.inner.commit_temperatures(commit).await
    }

    async fn upsert_merge(&self, patch: &BlockPatch) -> Result<(), StoreError> {
        self.inner.upsert_merge(patch).await
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        self.inner.delete(id).await
    }

    async fn clear_all(&self) -> Result<usize, StoreError> {
        self.inner.clear_all().await
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.inner.subscribe()
    }
}

#[tokio::test]
async fn test_concurrent_edit_aborts_whole_tick() {
    let inner = SqliteBlockStore::new(":memory:").unwrap();
    inner.upsert_merge(&patch("a", 0.0, 0.0, 100.0)).await.unwrap();
    inner.upsert_merge(&patch("b", 1000.0, 0.0, 100.0)).await.unwrap();

    let mut moved = BlockPatch::new("b");
    moved.x = Some(2000.0);
    let store = Arc::new(InterleavingStore { inner, edit: moved });

    let err = coordinator(store.clone()).run_tick().await.unwrap_err();
    assert!(matches!(err, TickError::Commit(StoreError::Conflict { .. })));
    assert!(err.is_conflict());

    // Edit survived, no temperature from the aborted tick was written
    let blocks = store.inner.load_all().await.unwrap();
    assert!(blocks.iter().all(|b| b.temperature == Temperature::Unset));
    assert_eq!(blocks.iter().find(|b| b.id == "b").unwrap().x, 2000.0);
}

/// Store whose backend is unreachable
struct FailingStore {
    changes: broadcast::Sender<StoreChange>,
}

#[async_trait]
impl BlockStore for FailingStore {
    async fn read_snapshot(&self) -> Result<StoreSnapshot, StoreError> {
        Err(StoreError::Backend("connection refused".to_string()))
    }

    async fn commit_temperatures(&self, _commit: TickCommit) -> Result<usize, StoreError> {
        Err(StoreError::Backend("connection refused".to_string()))
    }

    async fn upsert_merge(&self, _patch: &BlockPatch) -> Result<(), StoreError> {
        Err(StoreError::Backend("connection refused".to_string()))
    }

    async fn delete(&self, _id: &str) -> Result<bool, StoreError> {
        Err(StoreError::Backend("connection refused".to_string()))
    }

    async fn clear_all(&self) -> Result<usize, StoreError> {
        Err(StoreError::Backend("connection refused".to_string()))
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}

#[tokio::test]
async fn test_backend_failure_is_reported_not_conflict() {
    let (changes, _) = broadcast::channel(4);
    let store = Arc::new(FailingStore { changes });

    let err = coordinator(store).run_tick().await.unwrap_err();
    assert!(matches!(err, TickError::Read(StoreError::Backend(_))));
    assert!(!err.is_conflict());
}

#[tokio::test]
async fn test_tick_loop_commits_periodically() {
    let store = store_with(&[patch("solo", 0.0, 0.0, 50.0)]).await;
    let mut changes = store.subscribe();

    for policy in [
        SchedulePolicy::FixedDelay,
        SchedulePolicy::FixedRate,
        SchedulePolicy::Overlapping,
    ] {
        let mut reset = BlockPatch::new("solo");
        reset.temperature = Some(20.0);
        store.upsert_merge(&reset).await.unwrap();

        let config = TickConfig {
            interval_ms: 10,
            policy,
        };
        let coordinator = Arc::new(TickCoordinator::new(store.clone(), config));
        let handle = tokio::spawn(coordinator.run_tick_loop());

        let tick_change = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let change = changes.recv().await.unwrap();
                if change.kind == ChangeKind::Tick {
                    return change;
                }
            }
        })
        .await
        .expect("no tick committed");
        handle.abort();

        assert_eq!(tick_change.kind, ChangeKind::Tick);
        assert_eq!(temperature_of(&store, "solo").await, Temperature::Measured(24.5));
    }
}
