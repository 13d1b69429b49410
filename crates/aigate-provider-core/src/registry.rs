use std::collections::HashMap;
use std::sync::Arc;

use crate::adapter::Adapter;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("registry/unknown-provider: {0}")]
    UnknownProvider(String),
}

/// Provider-name → Adapter mapping, built once at startup and never
/// mutated afterwards (§4.1). O(1) lookup.
#[derive(Default, Clone)]
pub struct AdapterRegistry {
    providers: HashMap<String, Arc<dyn Adapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Arc<dyn Adapter>) {
        self.providers.insert(adapter.name().to_string(), adapter);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Adapter>, RegistryError> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownProvider(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{ChunkSink, ExecuteOutcome, Health, StreamCompletion};
    use crate::errors::ProviderResult;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::time::Instant;

    struct StubAdapter(&'static str);

    #[async_trait]
    impl Adapter for StubAdapter {
        fn name(&self) -> &str {
            self.0
        }

        async fn execute(
            &self,
            _request_body: Value,
            _upstream_model: &str,
            _deadline: Instant,
        ) -> ProviderResult<ExecuteOutcome> {
            unimplemented!()
        }

        async fn execute_streaming(
            &self,
            _request_body: Value,
            _upstream_model: &str,
            _deadline: Instant,
            _sink: &(dyn ChunkSink),
        ) -> ProviderResult<StreamCompletion> {
            unimplemented!()
        }

        async fn health(&self) -> Health {
            Health {
                reachable: true,
                recent_latency: None,
                last_error: None,
            }
        }
    }

    #[test]
    fn lookup_succeeds_for_registered_name() {
        let mut registry = AdapterRegistry::new();
        registry.register(Arc::new(StubAdapter("openai")));
        assert!(registry.get("openai").is_ok());
    }

    #[test]
    fn lookup_fails_for_unknown_name() {
        let registry = AdapterRegistry::new();
        let err = registry.get("nope").unwrap_err();
        assert!(matches!(err, RegistryError::UnknownProvider(name) if name == "nope"));
    }
}
