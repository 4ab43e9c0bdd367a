//! Node configuration

use std::time::Duration;

use ledger_core::{Balance, ReplicaId, BROKER_INITIAL_BALANCE};
use ledger_state::ReplicaConfig;

/// Registry service name replicas register under
pub const DEFAULT_SERVICE_NAME: &str = "ledger";

/// Replica node configuration
#[derive(Clone, Debug)]
pub struct NodeConfig {
    /// Replica identity, used as the clock coordinate
    pub replica_id: ReplicaId,
    /// Registry qualifier; peers with the same qualifier are treated as self
    pub qualifier: String,
    /// Registry service name
    pub service_name: String,
    /// TCP bind address
    pub bind_addr: String,
    /// Seed balance of the broker account
    pub broker_balance: Balance,
    /// Accept writes on startup
    pub start_active: bool,
    /// Bound on each snapshot push to a peer
    pub gossip_timeout: Duration,
    /// Bound on client requests
    pub request_timeout: Duration,
    /// Push the log to peers after each successful write
    pub gossip_on_write: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            replica_id: ReplicaId::new("A"),
            qualifier: "A".into(),
            service_name: DEFAULT_SERVICE_NAME.into(),
            bind_addr: "127.0.0.1:0".into(),
            broker_balance: BROKER_INITIAL_BALANCE,
            start_active: true,
            gossip_timeout: Duration::from_secs(1),
            request_timeout: Duration::from_secs(5),
            gossip_on_write: true,
        }
    }
}

impl NodeConfig {
    /// Configuration for a replica whose qualifier matches its id
    pub fn new(replica_id: impl Into<ReplicaId>) -> Self {
        let replica_id = replica_id.into();
        NodeConfig {
            qualifier: replica_id.as_str().to_owned(),
            replica_id,
            ..NodeConfig::default()
        }
    }

    pub fn with_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = qualifier.into();
        self
    }

    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    pub fn with_bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = addr.into();
        self
    }

    pub fn with_broker_balance(mut self, balance: Balance) -> Self {
        self.broker_balance = balance;
        self
    }

    pub fn with_start_active(mut self, active: bool) -> Self {
        self.start_active = active;
        self
    }

    pub fn with_gossip_timeout(mut self, timeout: Duration) -> Self {
        self.gossip_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_gossip_on_write(mut self, enabled: bool) -> Self {
        self.gossip_on_write = enabled;
        self
    }

    /// State-level part of the configuration
    pub fn replica_config(&self) -> ReplicaConfig {
        ReplicaConfig::default()
            .with_broker_balance(self.broker_balance)
            .with_start_active(self.start_active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_uses_id_as_qualifier() {
        let config = NodeConfig::new("B");
        assert_eq!(config.replica_id.as_str(), "B");
        assert_eq!(config.qualifier, "B");
        assert_eq!(config.service_name, DEFAULT_SERVICE_NAME);
    }

    #[test]
    fn test_builder() {
        let config = NodeConfig::new("C")
            .with_broker_balance(50)
            .with_start_active(false)
            .with_gossip_timeout(Duration::from_millis(200));

        let replica = config.replica_config();
        assert_eq!(replica.broker_balance, 50);
        assert!(!replica.start_active);
        assert_eq!(config.gossip_timeout, Duration::from_millis(200));
    }
}
