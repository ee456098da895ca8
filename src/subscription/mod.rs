// WebSocket subscription management

pub mod manager;
pub mod protocol;
pub mod registry;

pub use manager::ConnectionManager;
pub use protocol::{BlocksUpdatedMessage, ClientMessage};
pub use registry::SubscriberRegistry;
