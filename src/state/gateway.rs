use crate::block::{BlockPatch, PatchError};
use crate::store::{BlockStore, StoreError};
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Gateway errors
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayError {
    InvalidPatch(PatchError),
    Store(StoreError),
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::InvalidPatch(e) => write!(f, "invalid block edit: {}", e),
            GatewayError::Store(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for GatewayError {}

impl From<PatchError> for GatewayError {
    fn from(err: PatchError) -> Self {
        GatewayError::InvalidPatch(err)
    }
}

impl From<StoreError> for GatewayError {
    fn from(err: StoreError) -> Self {
        GatewayError::Store(err)
    }
}

/// Applies externally originated edits to the block store.
///
/// None of these operations join a tick's transaction; a tick that read
/// before an edit commits is aborted by the store's revision check.
#[derive(Clone)]
pub struct MutationGateway {
    store: Arc<dyn BlockStore>,
}

impl MutationGateway {
    pub fn new(store: Arc<dyn BlockStore>) -> Self {
        Self { store }
    }

    /// Merge the present fields onto the record, creating it if absent
    pub async fn upsert_merge(&self, patch: &BlockPatch) -> Result<(), GatewayError> {
        patch.validate()?;
        self.store.upsert_merge(patch).await?;
        Ok(())
    }

    /// Remove a block; deleting an unknown id is not an error
    pub async fn delete(&self, id: &str) -> Result<bool, GatewayError> {
        let removed = self.store.delete(id).await?;
        if removed {
            info!(block_id = %id, "Block deleted");
        }
        Ok(removed)
    }

    /// Remove every block atomically
    pub async fn clear_all(&self) -> Result<usize, GatewayError> {
        let removed = self.store.clear_all().await?;
        info!(removed, "Cleared all blocks");
        Ok(removed)
    }
}
