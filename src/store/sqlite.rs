//! Block persistence using SQLite.
//!
//! A single-row `meta` table carries the collection revision. Every committed
//! mutation bumps it inside the same SQL transaction, which is what tick
//! commits are conditioned on. Statements run on tokio's blocking pool so a
//! slow disk never stalls the broadcaster or connection tasks.

use super::{
    BlockStore, ChangeKind, StoreChange, StoreError, StoreSnapshot, TemperatureWrite, TickCommit,
};
use crate::block::{Block, BlockPatch, Temperature};
use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection, Row, TransactionBehavior};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tokio::task;
use tracing::debug;

/// Capacity of the change-notification channel
const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Persists blocks in SQLite and publishes change notifications.
pub struct SqliteBlockStore {
    conn: Arc<Mutex<Connection>>,
    changes: broadcast::Sender<StoreChange>,
}

impl SqliteBlockStore {
    /// Opens (or creates) the SQLite database and ensures the tables exist.
    ///
    /// Pass `":memory:"` for a private in-memory database.
    pub fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open block DB at {}", db_path))?;
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            changes,
        };
        store.create_tables()?;
        Ok(store)
    }

    fn create_tables(&self) -> Result<()> {
        let conn = lock(&self.conn)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS blocks (
                id           TEXT PRIMARY KEY,
                x            REAL NOT NULL,
                y            REAL NOT NULL,
                width        REAL NOT NULL,
                height       REAL NOT NULL,
                dynamic_load REAL NOT NULL,
                temperature  REAL
            );
            CREATE TABLE IF NOT EXISTS meta (
                key   TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            );
            INSERT OR IGNORE INTO meta (key, value) VALUES ('revision', 0);",
        )
        .context("Failed to create block tables")?;
        Ok(())
    }

    /// Run `op` against the connection on the blocking pool
    async fn with_conn<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        task::spawn_blocking(move || {
            let mut guard = lock(&conn)?;
            op(&mut *guard)
        })
        .await
        .map_err(|e| StoreError::Backend(format!("store task failed: {}", e)))?
    }

    /// Send a change notification. No receivers is fine.
    fn notify(&self, change: StoreChange) {
        debug!(revision = change.revision, kind = ?change.kind, "Store change committed");
        let _ = self.changes.send(change);
    }
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>, StoreError> {
    conn.lock()
        .map_err(|_| StoreError::Backend("connection mutex poisoned".to_string()))
}

fn current_revision(conn: &Connection) -> rusqlite::Result<u64> {
    conn.query_row("SELECT value FROM meta WHERE key = 'revision'", [], |row| {
        row.get::<_, i64>(0)
    })
    .map(|v| v as u64)
}

fn bump_revision(conn: &Connection) -> rusqlite::Result<u64> {
    conn.execute("UPDATE meta SET value = value + 1 WHERE key = 'revision'", [])?;
    current_revision(conn)
}

fn block_from_row(row: &Row<'_>) -> rusqlite::Result<Block> {
    Ok(Block {
        id: row.get(0)?,
        x: row.get(1)?,
        y: row.get(2)?,
        width: row.get(3)?,
        height: row.get(4)?,
        dynamic_load: row.get(5)?,
        temperature: Temperature::from(row.get::<_, Option<f64>>(6)?),
    })
}

#[async_trait]
impl BlockStore for SqliteBlockStore {
    async fn read_snapshot(&self) -> Result<StoreSnapshot, StoreError> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;

            let revision = current_revision(&tx)?;
            let blocks = {
                let mut stmt = tx.prepare(
                    "SELECT id, x, y, width, height, dynamic_load, temperature
                     FROM blocks ORDER BY id ASC",
                )?;
                let rows = stmt.query_map([], block_from_row)?;
                let blocks = rows.collect::<rusqlite::Result<Vec<Block>>>()?;
                blocks
            };
            tx.commit()?;

            Ok(StoreSnapshot { revision, blocks })
        })
        .await
    }

    async fn commit_temperatures(&self, commit: TickCommit) -> Result<usize, StoreError> {
        if commit.writes.is_empty() {
            return Ok(0);
        }

        let TickCommit {
            read_revision,
            writes,
            computed,
        } = commit;

        let (written, revision) = self
            .with_conn(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

                let actual = current_revision(&tx)?;
                if actual != read_revision {
                    // Dropping the transaction rolls it back
                    return Err(StoreError::Conflict {
                        expected: read_revision,
                        actual,
                    });
                }

                {
                    let mut stmt =
                        tx.prepare("UPDATE blocks SET temperature = ?1 WHERE id = ?2")?;
                    for write in &writes {
                        if stmt.execute(params![write.temperature, write.id])? == 0 {
                            return Err(StoreError::MissingRecord(write.id.clone()));
                        }
                    }
                }

                let revision = bump_revision(&tx)?;
                tx.commit()?;
                Ok((writes.len(), revision))
            })
            .await?;

        self.notify(StoreChange {
            revision,
            kind: ChangeKind::Tick,
            computed: Some(computed.into()),
        });
        Ok(written)
    }

    async fn upsert_merge(&self, patch: &BlockPatch) -> Result<(), StoreError> {
        let patch = patch.clone();
        let revision = self
            .with_conn(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

                tx.execute(
                    "INSERT INTO blocks (id, x, y, width, height, dynamic_load, temperature)
                     VALUES (?1, COALESCE(?2, 0.0), COALESCE(?3, 0.0), COALESCE(?4, 0.0),
                             COALESCE(?5, 0.0), COALESCE(?6, 0.0), ?7)
                     ON CONFLICT(id) DO UPDATE SET
                         x            = COALESCE(?2, x),
                         y            = COALESCE(?3, y),
                         width        = COALESCE(?4, width),
                         height       = COALESCE(?5, height),
                         dynamic_load = COALESCE(?6, dynamic_load),
                         temperature  = COALESCE(?7, temperature)",
                    params![
                        patch.id,
                        patch.x,
                        patch.y,
                        patch.width,
                        patch.height,
                        patch.dynamic_load,
                        patch.temperature
                    ],
                )?;

                let revision = bump_revision(&tx)?;
                tx.commit()?;
                Ok(revision)
            })
            .await?;

        self.notify(StoreChange::new(revision, ChangeKind::Upsert));
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let id = id.to_string();
        let revision = self
            .with_conn(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

                let removed = tx.execute("DELETE FROM blocks WHERE id = ?1", params![id])?;
                if removed == 0 {
                    return Ok(None);
                }

                let revision = bump_revision(&tx)?;
                tx.commit()?;
                Ok(Some(revision))
            })
            .await?;

        match revision {
            Some(revision) => {
                self.notify(StoreChange::new(revision, ChangeKind::Delete));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn clear_all(&self) -> Result<usize, StoreError> {
        let (removed, revision) = self
            .with_conn(|conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

                let removed = tx.execute("DELETE FROM blocks", [])?;
                if removed == 0 {
                    return Ok((0, None));
                }

                let revision = bump_revision(&tx)?;
                tx.commit()?;
                Ok((removed, Some(revision)))
            })
            .await?;

        if let Some(revision) = revision {
            self.notify(StoreChange::new(revision, ChangeKind::Clear));
        }
        Ok(removed)
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}
