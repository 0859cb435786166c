use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role a connection declared at handshake. A connection only ever receives
/// what its role entitles it to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Driver,
    Admin,
}

/// Addressing target for one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Customer(String),
    Driver(String),
    Admins,
}

/// Identity of one live connection. An entity reconnecting gets a fresh
/// `connection_id`, so the same driver can hold several subscriptions at once.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub connection_id: Uuid,
    pub role: Role,
    pub entity_id: String,
}

impl Subscription {
    pub fn new(role: Role, entity_id: String) -> Self {
        Self {
            connection_id: Uuid::new_v4(),
            role,
            entity_id,
        }
    }

    pub fn matches(&self, target: &Target) -> bool {
        match target {
            Target::Customer(id) => self.role == Role::Customer && self.entity_id == *id,
            Target::Driver(id) => self.role == Role::Driver && self.entity_id == *id,
            Target::Admins => self.role == Role::Admin,
        }
    }
}
