use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

/// Tracks live WebSocket subscribers.
///
/// Connection lifecycle only decides who receives broadcasts; it never
/// touches block state.
pub struct SubscriberRegistry {
    /// connection_id -> connected_at
    connections: DashMap<Uuid, DateTime<Utc>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Register a new connection and return its id
    pub fn register(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.connections.insert(id, Utc::now());
        id
    }

    /// Remove a connection. Returns when it had connected, if known.
    pub fn unregister(&self, id: &Uuid) -> Option<DateTime<Utc>> {
        self.connections.remove(id).map(|(_, connected_at)| connected_at)
    }

    pub fn count(&self) -> usize {
        self.connections.len()
    }
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_unregister() {
        let registry = SubscriberRegistry::new();
        let a = registry.register();
        let b = registry.register();
        assert_ne!(a, b);
        assert_eq!(registry.count(), 2);

        assert!(registry.unregister(&a).is_some());
        assert_eq!(registry.count(), 1);

        // Second unregister is a no-op
        assert!(registry.unregister(&a).is_none());
        assert_eq!(registry.count(), 1);
    }
}
