use crate::block::{Block, Temperature};
use crate::store::{BlockStore, StoreChange, StoreError, StoreSnapshot, TemperatureWrite};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Full-collection state pushed to every subscriber
#[derive(Clone, Debug, Serialize)]
pub struct BlocksUpdated {
    /// Store revision the blocks were read at
    pub revision: u64,
    pub blocks: Vec<Block>,
    pub timestamp: DateTime<Utc>,
}

impl From<StoreSnapshot> for BlocksUpdated {
    fn from(snapshot: StoreSnapshot) -> Self {
        Self {
            revision: snapshot.revision,
            blocks: snapshot.blocks,
            timestamp: Utc::now(),
        }
    }
}

impl BlocksUpdated {
    /// Replace stored temperatures with a tick's computed ones
    fn overlay(&mut self, computed: &[TemperatureWrite]) {
        let computed: HashMap<&str, f64> = computed
            .iter()
            .map(|w| (w.id.as_str(), w.temperature))
            .collect();

        for block in &mut self.blocks {
            if let Some(&temperature) = computed.get(block.id.as_str()) {
                block.temperature = Temperature::Measured(temperature);
            }
        }
    }
}

/// Republishes the entire block collection after every committed change.
///
/// No diffing and no per-subscriber filtering: each change notification
/// from the store produces one full broadcast.
pub struct StateBroadcaster {
    store: Arc<dyn BlockStore>,

    /// Broadcast channel for full-state updates
    updates_tx: broadcast::Sender<BlocksUpdated>,

    /// Highest revision already published
    last_published: AtomicU64,
}

impl StateBroadcaster {
    pub fn new(store: Arc<dyn BlockStore>, capacity: usize) -> Self {
        let (updates_tx, _) = broadcast::channel(capacity.max(1));
        Self {
            store,
            updates_tx,
            last_published: AtomicU64::new(0),
        }
    }

    /// Subscribe to full-state updates
    pub fn subscribe(&self) -> broadcast::Receiver<BlocksUpdated> {
        self.updates_tx.subscribe()
    }

    /// Current collection, for subscribers that just connected
    pub async fn current(&self) -> Result<BlocksUpdated, StoreError> {
        Ok(self.store.read_snapshot().await?.into())
    }

    /// Read the collection and broadcast it to all subscribers
    pub async fn publish(&self) -> Result<u64, StoreError> {
        let update = self.current().await?;
        Ok(self.send(update))
    }

    fn send(&self, update: BlocksUpdated) -> u64 {
        let revision = update.revision;
        self.last_published.fetch_max(revision, Ordering::SeqCst);

        // No subscribers is fine
        let receivers = self.updates_tx.send(update).unwrap_or(0);
        debug!(revision, receivers, "Broadcast blocks");

        revision
    }

    /// Handle one change notification. Returns false for duplicates that
    /// an earlier broadcast already covered.
    ///
    /// A tick change is published with that tick's computed temperatures,
    /// including the ones too small to be written, as long as nothing else
    /// was committed after it. Otherwise the stored state is published.
    pub async fn handle_change(&self, change: &StoreChange) -> Result<bool, StoreError> {
        if change.revision <= self.last_published.load(Ordering::SeqCst) {
            debug!(revision = change.revision, "Change already broadcast, skipping");
            return Ok(false);
        }

        let mut update = self.current().await?;
        if let Some(computed) = &change.computed {
            if update.revision == change.revision {
                update.overlay(computed);
            }
        }

        self.send(update);
        Ok(true)
    }

    /// Subscribe to store changes now and process them on a background task
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let changes = self.store.subscribe();
        let broadcaster = Arc::clone(self);
        tokio::spawn(async move { broadcaster.run(changes).await })
    }

    /// Process store change notifications until the store goes away
    pub async fn run(&self, mut changes: broadcast::Receiver<StoreChange>) {
        info!("State broadcaster started");

        loop {
            match changes.recv().await {
                Ok(change) => {
                    if let Err(e) = self.handle_change(&change).await {
                        error!(revision = change.revision, error = %e, "Failed to broadcast blocks");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Store change notifications lagged, resyncing");
                    if let Err(e) = self.publish().await {
                        error!(error = %e, "Failed to resync blocks");
                    }
                }
                Err(broadcast::error::RecvError::Closed) => {
                    warn!("Store change channel closed");
                    break;
                }
            }
        }
    }
}
