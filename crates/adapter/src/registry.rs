use crate::builtin::{
    CommandAdapter, GitHistoryAdapter, SarifAdapter, VerificationReportAdapter,
};
use crate::{Adapter, AdapterDescriptor};
use std::collections::BTreeMap;
use std::sync::Arc;

pub type AdapterConstructor = Arc<dyn Fn() -> Arc<dyn Adapter> + Send + Sync>;

/// Explicit mapping from stable adapter type id to a constructor, populated
/// at program start. There is no runtime discovery.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    constructors: BTreeMap<String, AdapterConstructor>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the adapters shipped in this crate.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("sarif", || Arc::new(SarifAdapter) as Arc<dyn Adapter>);
        registry.register("command", || Arc::new(CommandAdapter) as Arc<dyn Adapter>);
        registry.register("git-history", || {
            Arc::new(GitHistoryAdapter) as Arc<dyn Adapter>
        });
        registry.register("verification-report", || {
            Arc::new(VerificationReportAdapter) as Arc<dyn Adapter>
        });
        registry
    }

    /// Later registrations under the same id replace earlier ones.
    pub fn register<F>(&mut self, type_id: impl Into<String>, constructor: F)
    where
        F: Fn() -> Arc<dyn Adapter> + Send + Sync + 'static,
    {
        self.constructors
            .insert(type_id.into(), Arc::new(constructor));
    }

    pub fn contains(&self, type_id: &str) -> bool {
        self.constructors.contains_key(type_id)
    }

    pub fn create(&self, type_id: &str) -> Option<Arc<dyn Adapter>> {
        self.constructors.get(type_id).map(|ctor| ctor())
    }

    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    pub fn descriptors(&self) -> Vec<AdapterDescriptor> {
        self.constructors.values().map(|ctor| ctor().describe()).collect()
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("types", &self.constructors.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn builtins_are_registered_in_key_order() {
        let registry = AdapterRegistry::with_builtins();
        assert_eq!(
            registry.types().collect::<Vec<_>>(),
            vec!["command", "git-history", "sarif", "verification-report"]
        );
        for descriptor in registry.descriptors() {
            assert!(registry.contains(descriptor.id));
        }
        assert!(registry.create("nope").is_none());
    }
}
