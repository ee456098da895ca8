// Mutation gateway and full-state broadcasting

mod broadcaster;
mod gateway;

pub use broadcaster::{BlocksUpdated, StateBroadcaster};
pub use gateway::{GatewayError, MutationGateway};
