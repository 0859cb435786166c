//! Event fan-out over live connections.
//!
//! Each gateway connection registers an unbounded sender here. Delivery is
//! best-effort: a frame for a closed or missing connection is dropped, and
//! callers never block on a slow consumer.

use std::collections::HashMap;

use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use hitch_shared::ServerEvent;

use crate::subscriptions::{Subscription, Target};

struct Connection {
    subscription: Subscription,
    sender: mpsc::UnboundedSender<ServerEvent>,
}

pub struct FanoutRouter {
    connections: RwLock<HashMap<Uuid, Connection>>,
}

impl FanoutRouter {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    pub async fn register(&self, subscription: Subscription, sender: mpsc::UnboundedSender<ServerEvent>) {
        let mut connections = self.connections.write().await;
        connections.insert(subscription.connection_id, Connection { subscription, sender });
    }

    pub async fn unregister(&self, connection_id: Uuid) {
        let mut connections = self.connections.write().await;
        connections.remove(&connection_id);
    }

    /// Send one event to every connection matching the target. Returns how
    /// many connections actually took the frame.
    pub async fn deliver(&self, target: &Target, event: &ServerEvent) -> usize {
        let connections = self.connections.read().await;
        let mut delivered = 0;
        for conn in connections.values() {
            if !conn.subscription.matches(target) {
                continue;
            }
            if conn.sender.send(event.clone()).is_ok() {
                delivered += 1;
            } else {
                // Receiver already dropped; gateway teardown will unregister.
                tracing::debug!(
                    connection_id = %conn.subscription.connection_id,
                    "dropping frame for closed connection"
                );
            }
        }
        delivered
    }

    /// How many live connections match the target. Used to tell a final
    /// disconnect apart from one of several devices going away.
    pub async fn connection_count(&self, target: &Target) -> usize {
        let connections = self.connections.read().await;
        connections
            .values()
            .filter(|c| c.subscription.matches(target))
            .count()
    }
}

impl Default for FanoutRouter {
    fn default() -> Self {
        Self::new()
    }
}
