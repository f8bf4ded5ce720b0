//! Protocol adapter contract and registry.
//!
//! An adapter turns one carrier callback into a [`UssdRequest`]. It owns
//! session lifecycle on the way in: it decides whether the callback starts a
//! new dialog (and registers a fresh [`Session`](crate::session::Session)) or
//! continues one (and fails with `SessionNotFound` if the store no longer
//! has it).

use std::collections::HashMap;
use std::sync::Arc;

use ussd_common::{Error, Result};

use crate::adapters::africastalking::{AfricasTalkingAdapter, ADAPTER_NAME as AFRICASTALKING};
use crate::request::{TransportRequest, UssdRequest};
use crate::response::BufferedResponse;
use crate::session::SessionStore;

/// Translates transport requests into normalized requests.
pub trait ProtocolAdapter: Send + Sync {
    /// Registry name of this adapter.
    fn name(&self) -> &'static str;

    /// Parse `transport`, attach or create its session, and bind the request
    /// to `response`.
    ///
    /// Errors returned here are treated as protocol faults: the subscriber
    /// gets a "session closed" reply.
    fn create_request<'a>(
        &self,
        response: &'a mut BufferedResponse,
        transport: &TransportRequest,
        store: &dyn SessionStore,
    ) -> Result<UssdRequest<'a>>;
}

/// Named adapters available at engine construction.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn ProtocolAdapter>>,
}

impl AdapterRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the bundled adapters.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(AFRICASTALKING, Arc::new(AfricasTalkingAdapter::new()));
        registry
    }

    /// Register `adapter` under `name`. The first registration of a name
    /// wins; returns `false` if the name was already taken.
    pub fn register(&mut self, name: impl Into<String>, adapter: Arc<dyn ProtocolAdapter>) -> bool {
        let name = name.into();
        if self.adapters.contains_key(&name) {
            tracing::warn!(adapter = %name, "Adapter already registered, keeping the first");
            return false;
        }
        self.adapters.insert(name, adapter);
        true
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn ProtocolAdapter>> {
        self.adapters
            .get(name)
            .cloned()
            .ok_or_else(|| Error::AdapterNotFound(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.adapters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("adapters", &self.names())
            .finish()
    }
}
