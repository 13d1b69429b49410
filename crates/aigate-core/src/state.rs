use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::bus::StreamingEventBus;
use crate::gateway::Gateway;
use crate::quota::QuotaEnforcer;
use crate::trace::TraceStore;
use crate::usage::UsageSink;

/// Looks up a secret (provider API key, admin key hash) by name without the
/// core depending on whatever secrets backend hosts them. Mirrors the
/// teacher's separation between `AppState` and its credential store: the
/// core reads through a callback rather than owning the secret material.
pub type SecretLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Process-wide hot-reloadable state (grounded on the teacher's
/// `ArcSwap`-based `AppState`). `gateway` is swapped wholesale on a route
/// reload since `Gateway` bundles the `Router` and its route metadata
/// together; the request-scoped collaborators underneath it (quota, usage,
/// trace, bus) are shared across reloads and never rebuilt.
pub struct AppState {
    pub gateway: ArcSwap<Gateway>,
    pub quota: Arc<QuotaEnforcer>,
    pub usage: Arc<UsageSink>,
    pub trace: Arc<TraceStore>,
    pub bus: Arc<StreamingEventBus>,
    pub secrets: SecretLookup,
}

impl AppState {
    pub fn new(
        gateway: Gateway,
        quota: Arc<QuotaEnforcer>,
        usage: Arc<UsageSink>,
        trace: Arc<TraceStore>,
        bus: Arc<StreamingEventBus>,
        secrets: SecretLookup,
    ) -> Self {
        Self {
            gateway: ArcSwap::from_pointee(gateway),
            quota,
            usage,
            trace,
            bus,
            secrets,
        }
    }

    /// Atomically replaces the active `Gateway`, e.g. after an admin-driven
    /// route table or breaker parameter change. In-flight requests keep
    /// running against the `Gateway` they already loaded; only requests
    /// that load it after this call see the new routes.
    pub fn apply_gateway(&self, gateway: Gateway) {
        self.gateway.store(Arc::new(gateway));
    }

    pub fn gateway(&self) -> Arc<Gateway> {
        self.gateway.load_full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use aigate_provider_core::AdapterRegistry;
    use aigate_router::{Router, RouterConfig, RouteTable};
    use aigate_storage::InMemoryStore;

    fn gateway() -> Gateway {
        let store: Arc<dyn aigate_storage::Store> = Arc::new(InMemoryStore::new());
        let router = Arc::new(Router::new(
            Arc::new(AdapterRegistry::new()),
            RouteTable::new(),
            |_| aigate_common::BreakerParams::default(),
            RouterConfig::default(),
        ));
        Gateway::new(
            router,
            HashMap::new(),
            Arc::new(QuotaEnforcer::new(store.clone())),
            Arc::new(UsageSink::new(store.clone(), true)),
            Arc::new(TraceStore::new(store)),
            Arc::new(StreamingEventBus::new()),
        )
    }

    #[test]
    fn apply_gateway_swaps_the_active_instance() {
        let store: Arc<dyn aigate_storage::Store> = Arc::new(InMemoryStore::new());
        let quota = Arc::new(QuotaEnforcer::new(store.clone()));
        let usage = Arc::new(UsageSink::new(store.clone(), true));
        let trace = Arc::new(TraceStore::new(store));
        let bus = Arc::new(StreamingEventBus::new());
        let secrets: SecretLookup = Arc::new(|_: &str| None);

        let state = AppState::new(gateway(), quota, usage, trace, bus, secrets);
        let first = Arc::as_ptr(&state.gateway());
        state.apply_gateway(gateway());
        let second = Arc::as_ptr(&state.gateway());
        assert_ne!(first, second);
    }
}
