//! Service registry used for peer discovery

use std::collections::HashMap;

use parking_lot::RwLock;

use ledger_core::LedgerResult;

/// One registered service instance
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceEntry {
    pub address: String,
    pub qualifier: String,
}

/// Name service the replicas register with and look each other up in
pub trait Registry: Send + Sync {
    fn register(&self, service: &str, address: &str, qualifier: &str) -> LedgerResult<()>;

    /// Instances of `service`, optionally restricted to one qualifier
    ///
    /// Unknown services and qualifiers yield an empty list.
    fn lookup(&self, service: &str, qualifier: Option<&str>) -> LedgerResult<Vec<ServiceEntry>>;

    fn unregister(&self, service: &str, address: &str) -> LedgerResult<()>;
}

/// Process-local registry
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    services: RwLock<HashMap<String, Vec<ServiceEntry>>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        InMemoryRegistry::default()
    }

    /// Total number of registered instances
    pub fn len(&self) -> usize {
        self.services.read().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Registry for InMemoryRegistry {
    fn register(&self, service: &str, address: &str, qualifier: &str) -> LedgerResult<()> {
        let mut services = self.services.write();
        let entries = services.entry(service.to_owned()).or_default();

        // Re-registering an address replaces its qualifier
        entries.retain(|e| e.address != address);
        entries.push(ServiceEntry {
            address: address.to_owned(),
            qualifier: qualifier.to_owned(),
        });

        tracing::debug!(service, address, qualifier, "service registered");
        Ok(())
    }

    fn lookup(&self, service: &str, qualifier: Option<&str>) -> LedgerResult<Vec<ServiceEntry>> {
        let services = self.services.read();
        let Some(entries) = services.get(service) else {
            return Ok(Vec::new());
        };

        Ok(entries
            .iter()
            .filter(|e| qualifier.map_or(true, |q| e.qualifier == q))
            .cloned()
            .collect())
    }

    fn unregister(&self, service: &str, address: &str) -> LedgerResult<()> {
        let mut services = self.services.write();
        if let Some(entries) = services.get_mut(service) {
            entries.retain(|e| e.address != address);
            if entries.is_empty() {
                services.remove(service);
            }
        }
        tracing::debug!(service, address, "service unregistered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let registry = InMemoryRegistry::new();
        registry.register("ledger", "10.0.0.1:7000", "A").unwrap();
        registry.register("ledger", "10.0.0.2:7000", "B").unwrap();

        assert_eq!(registry.lookup("ledger", None).unwrap().len(), 2);

        let b = registry.lookup("ledger", Some("B")).unwrap();
        assert_eq!(b.len(), 1);
        assert_eq!(b[0].address, "10.0.0.2:7000");
    }

    #[test]
    fn test_unknown_lookups_are_empty() {
        let registry = InMemoryRegistry::new();
        registry.register("ledger", "10.0.0.1:7000", "A").unwrap();

        assert!(registry.lookup("ledger", Some("Z")).unwrap().is_empty());
        assert!(registry.lookup("other", None).unwrap().is_empty());
    }

    #[test]
    fn test_reregister_replaces() {
        let registry = InMemoryRegistry::new();
        registry.register("ledger", "10.0.0.1:7000", "A").unwrap();
        registry.register("ledger", "10.0.0.1:7000", "A2").unwrap();

        assert_eq!(registry.len(), 1);
        assert!(registry.lookup("ledger", Some("A")).unwrap().is_empty());
    }

    #[test]
    fn test_unregister() {
        let registry = InMemoryRegistry::new();
        registry.register("ledger", "10.0.0.1:7000", "A").unwrap();
        registry.unregister("ledger", "10.0.0.1:7000").unwrap();
        registry.unregister("ledger", "10.0.0.9:7000").unwrap();

        assert!(registry.is_empty());
    }
}
