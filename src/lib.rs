// Block data model
pub mod block;

// Neighbor detection, heat model and tick coordination
pub mod thermal;

// Block storage (transactional reads/writes, change notification)
pub mod store;

// Mutation gateway and state broadcasting
pub mod state;

// WebSocket subscription management
pub mod subscription;

// HTTP and WebSocket APIs
pub mod api;

// Configuration loading
pub mod config;

pub use block::{Block, BlockPatch, Temperature, AMBIENT_TEMPERATURE};
