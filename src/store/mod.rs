// Block storage: transactional snapshot reads, conditional temperature
// commits, merge writes and change notification.

mod sqlite;

pub use sqlite::SqliteBlockStore;

use crate::block::{Block, BlockPatch};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;


/// Consistent point-in-time read of the whole block collection
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StoreSnapshot {
    /// Collection revision the snapshot was read at
    pub revision: u64,

    /// All blocks, ordered by id
    pub blocks: Vec<Block>,
}

impl StoreSnapshot {
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// Temperature write produced by a tick
#[derive(Clone, Debug, PartialEq)]
pub struct TemperatureWrite {
    pub id: String,
    pub temperature: f64,
}

/// Conditional temperature commit produced by one tick
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TickCommit {
    /// Revision of the snapshot the tick read
    pub read_revision: u64,

    /// Temperatures to persist
    pub writes: Vec<TemperatureWrite>,

    /// Every block's computed temperature, persisted or not. Travels on the
    /// change notification so the tick's broadcast shows its in-memory result.
    pub computed: Vec<TemperatureWrite>,
}

/// What kind of committed mutation produced a change notification
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Upsert,
    Delete,
    Clear,
    Tick,
}

/// Change notification sent after every committed mutation
#[derive(Clone, Debug, PartialEq)]
pub struct StoreChange {
    /// Collection revision after the commit
    pub revision: u64,
    pub kind: ChangeKind,

    /// Computed temperatures of the tick that produced this change
    pub computed: Option<Arc<[TemperatureWrite]>>,
}

impl StoreChange {
    pub fn new(revision: u64, kind: ChangeKind) -> Self {
        Self {
            revision,
            kind,
            computed: None,
        }
    }
}

/// Store errors
#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    /// The collection changed between the transactional read and the commit
    Conflict { expected: u64, actual: u64 },
    /// A record targeted by a transactional write no longer exists
    MissingRecord(String),
    /// Underlying storage failure
    Backend(String),
}

impl StoreError {
    /// Conflicts are retryable: the next tick reads fresh state
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. } | StoreError::MissingRecord(_))
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Conflict { expected, actual } => write!(
                f,
                "collection modified concurrently (read at revision {}, now {})",
                expected, actual
            ),
            StoreError::MissingRecord(id) => write!(f, "block '{}' no longer exists", id),
            StoreError::Backend(msg) => write!(f, "store backend error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// Shared block collection.
///
/// The store owns the collection; callers never cache it across operations.
/// `read_snapshot` + `commit_temperatures` form one optimistic transaction:
/// the commit applies only if nothing was committed since the read revision.
/// Implementations keep blocking I/O off the async worker threads.
/// Merge writes, deletes and clears are independent of any running tick.
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Read the full collection as one consistent snapshot.
    async fn read_snapshot(&self) -> Result<StoreSnapshot, StoreError>;

    /// Write temperatures for the transaction opened by `read_snapshot`.
    ///
    /// All-or-nothing: fails with [`StoreError::Conflict`] if the collection
    /// revision moved past `commit.read_revision`, or
    /// [`StoreError::MissingRecord`] if a target record vanished. A commit
    /// with no writes is a no-op. Returns the number of records written.
    async fn commit_temperatures(&self, commit: TickCommit) -> Result<usize, StoreError>;

    /// Merge the present fields of `patch` into the record, creating it if absent.
    async fn upsert_merge(&self, patch: &BlockPatch) -> Result<(), StoreError>;

    /// Remove a record. Returns false if it did not exist.
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;

    /// Remove every record in one transaction. Returns the number removed.
    async fn clear_all(&self) -> Result<usize, StoreError>;

    /// Subscribe to committed-change notifications.
    fn subscribe(&self) -> broadcast::Receiver<StoreChange>;

    /// Non-transactional read of all blocks
    async fn load_all(&self) -> Result<Vec<Block>, StoreError> {
        Ok(self.read_snapshot().await?.blocks)
    }
}
