use crate::block::{Block, BlockPatch};
use crate::state::BlocksUpdated;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Client → Server message types
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Upsert-merge a block
    #[serde(rename = "edit_block")]
    EditBlock { block: BlockPatch },
    #[serde(rename = "delete_block")]
    DeleteBlock { id: String },
    #[serde(rename = "clear_all")]
    ClearAll,
}

/// Server → Client: full block collection
#[derive(Debug, Clone, Serialize)]
pub struct BlocksUpdatedMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub revision: u64,
    pub blocks: Vec<Block>,
    pub timestamp: DateTime<Utc>,
}

impl From<BlocksUpdated> for BlocksUpdatedMessage {
    fn from(update: BlocksUpdated) -> Self {
        Self {
            msg_type: "blocks_updated".to_string(),
            revision: update.revision,
            blocks: update.blocks,
            timestamp: update.timestamp,
        }
    }
}
