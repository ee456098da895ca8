use crate::state::{BlocksUpdated, GatewayError, MutationGateway};
use crate::subscription::protocol::{BlocksUpdatedMessage, ClientMessage};
use axum::extract::ws::{Message, WebSocket};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Manages a single WebSocket connection: forwards full-state broadcasts
/// and routes client edits to the mutation gateway
pub struct ConnectionManager {
    connection_id: Uuid,
    gateway: MutationGateway,
}

impl ConnectionManager {
    pub fn new(connection_id: Uuid, gateway: MutationGateway) -> Self {
        Self {
            connection_id,
            gateway,
        }
    }

    /// Handle WebSocket connection lifecycle
    ///
    /// `initial` is sent before any broadcast so a new subscriber starts
    /// from the current collection.
    pub async fn handle(
        self,
        mut socket: WebSocket,
        mut updates_rx: broadcast::Receiver<BlocksUpdated>,
        initial: Option<BlocksUpdated>,
    ) {
        info!(connection_id = %self.connection_id, "WebSocket connection established");

        if let Some(update) = initial {
            if let Err(e) = self.send_blocks(&mut socket, update).await {
                error!(connection_id = %self.connection_id, error = %e, "Failed to send initial blocks");
                return;
            }
        }

        loop {
            tokio::select! {
                // Handle incoming client messages
                Some(msg) = socket.recv() => {
                    match msg {
                        Ok(Message::Text(text)) => {
                            self.handle_client_message(&text).await;
                        }
                        Ok(Message::Close(_)) => {
                            info!(connection_id = %self.connection_id, "WebSocket client disconnected");
                            break;
                        }
                        Ok(Message::Ping(data)) => {
                            if let Err(e) = socket.send(Message::Pong(data)).await {
                                error!(error = %e, "Failed to send pong");
                                break;
                            }
                        }
                        Ok(_) => {
                            // Ignore binary, pong messages
                        }
                        Err(e) => {
                            warn!(connection_id = %self.connection_id, error = %e, "WebSocket error");
                            break;
                        }
                    }
                }

                // Forward full-state broadcasts
                result = updates_rx.recv() => {
                    match result {
                        Ok(update) => {
                            if let Err(e) = self.send_blocks(&mut socket, update).await {
                                error!(error = %e, "Failed to send blocks update");
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            // Every broadcast is the full collection; the next one catches up
                            warn!(skipped = skipped, "WebSocket lagged, skipped updates");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            error!("Blocks broadcast channel closed");
                            break;
                        }
                    }
                }

                else => {
                    break;
                }
            }
        }

        info!(connection_id = %self.connection_id, "WebSocket connection closed");
    }

    /// Parse and apply a client frame. Malformed frames and failed edits
    /// are logged and dropped; nothing is sent back to the client.
    async fn handle_client_message(&self, text: &str) {
        let msg: ClientMessage = match serde_json::from_str(text) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(connection_id = %self.connection_id, error = %e, "Malformed client message dropped");
                return;
            }
        };

        if let Err(e) = self.apply(msg).await {
            error!(connection_id = %self.connection_id, error = %e, "Block edit dropped");
        }
    }

    /// Route a client message to the matching gateway operation
    pub async fn apply(&self, msg: ClientMessage) -> Result<(), GatewayError> {
        match msg {
            ClientMessage::EditBlock { block } => {
                debug!(block_id = %block.id, "Client edited block");
                self.gateway.upsert_merge(&block).await
            }
            ClientMessage::DeleteBlock { id } => self.gateway.delete(&id).await.map(|_| ()),
            ClientMessage::ClearAll => self.gateway.clear_all().await.map(|_| ()),
        }
    }

    /// Send full collection to client
    async fn send_blocks(&self, socket: &mut WebSocket, update: BlocksUpdated) -> anyhow::Result<()> {
        let msg = BlocksUpdatedMessage::from(update);
        let json = serde_json::to_string(&msg)?;
        socket.send(Message::Text(json)).await?;
        Ok(())
    }
}
