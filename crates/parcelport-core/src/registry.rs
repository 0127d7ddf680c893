use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::adapter::{AdapterContext, CarrierAdapter};
use crate::adapters::CanonicalHttpAdapter;
use crate::auth_fallback::{AuthFallbackClient, HttpTokenExchanger};
use crate::capability::{CapabilitySet, Requirement};
use crate::config::CoreConfig;
use crate::http_client::HttpClient;
use crate::CarrierError;

/// Adapter plus the transport its calls go through.
#[derive(Clone)]
struct RegisteredCarrier {
    adapter: Arc<dyn CarrierAdapter>,
    http: Arc<dyn HttpClient>,
    auth_fallback: bool,
}

/// Carrier snapshot used by the `carriers` CLI command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdapterSnapshot {
    pub id: String,
    pub capabilities: CapabilitySet,
    pub requirements: Vec<Requirement>,
    pub auth_fallback: bool,
}

/// Adapter registry keyed by adapter id.
pub struct AdapterRegistry {
    carriers: HashMap<String, RegisteredCarrier>,
    default_http: Arc<dyn HttpClient>,
}

impl AdapterRegistry {
    /// `default_http` serves every adapter registered without its own transport.
    pub fn new(default_http: Arc<dyn HttpClient>) -> Self {
        Self {
            carriers: HashMap::new(),
            default_http,
        }
    }

    /// Builds one [`CanonicalHttpAdapter`] per configured carrier. Carriers with
    /// a fallback section get their own [`AuthFallbackClient`] around `transport`,
    /// so token caches are never shared between carriers.
    pub fn from_config(config: &CoreConfig, transport: Arc<dyn HttpClient>) -> Self {
        let mut registry = Self::new(Arc::clone(&transport));

        for carrier in &config.carriers {
            let adapter = CanonicalHttpAdapter::from_config(carrier, config.classifier.clone())
                .with_timeout_ms(config.http.timeout_ms);

            match &carrier.fallback {
                Some(fallback) => {
                    let client = AuthFallbackClient::new(
                        Arc::clone(&transport),
                        Arc::new(HttpTokenExchanger::new(&fallback.token_url)),
                        fallback.signature(),
                    )
                    .with_refresh_margin(Duration::from_secs(
                        config.auth_fallback.refresh_margin_secs,
                    ))
                    .with_default_ttl(Duration::from_secs(config.auth_fallback.default_ttl_secs));
                    registry.insert(Arc::new(adapter), Arc::new(client), true);
                }
                None => {
                    registry.register(Arc::new(adapter));
                }
            }
        }

        tracing::debug!(carriers = registry.len(), "adapter registry built from config");
        registry
    }

    /// Registers `adapter` on the default transport, replacing any adapter with the same id.
    pub fn register(&mut self, adapter: Arc<dyn CarrierAdapter>) -> Option<Arc<dyn CarrierAdapter>> {
        let http = Arc::clone(&self.default_http);
        self.insert(adapter, http, false)
    }

    pub fn register_with_transport(
        &mut self,
        adapter: Arc<dyn CarrierAdapter>,
        http: Arc<dyn HttpClient>,
    ) -> Option<Arc<dyn CarrierAdapter>> {
        self.insert(adapter, http, false)
    }

    fn insert(
        &mut self,
        adapter: Arc<dyn CarrierAdapter>,
        http: Arc<dyn HttpClient>,
        auth_fallback: bool,
    ) -> Option<Arc<dyn CarrierAdapter>> {
        let id = adapter.id().to_owned();
        let previous = self.carriers.insert(
            id.clone(),
            RegisteredCarrier {
                adapter,
                http,
                auth_fallback,
            },
        );
        if previous.is_some() {
            tracing::warn!(adapter = %id, "replacing registered adapter");
        }
        previous.map(|carrier| carrier.adapter)
    }

    pub fn get(&self, id: &str) -> Result<Arc<dyn CarrierAdapter>, CarrierError> {
        self.entry(id).map(|carrier| Arc::clone(&carrier.adapter))
    }

    /// Adapter and a context bound to the adapter's transport.
    pub fn resolve(
        &self,
        id: &str,
    ) -> Result<(Arc<dyn CarrierAdapter>, AdapterContext), CarrierError> {
        let carrier = self.entry(id)?;
        Ok((
            Arc::clone(&carrier.adapter),
            AdapterContext::new(Arc::clone(&carrier.http)),
        ))
    }

    fn entry(&self, id: &str) -> Result<&RegisteredCarrier, CarrierError> {
        self.carriers
            .get(id)
            .ok_or_else(|| CarrierError::adapter_not_registered(id))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.carriers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.carriers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.carriers.is_empty()
    }

    /// Registered ids in ascending order.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids = self.carriers.keys().map(String::as_str).collect::<Vec<_>>();
        ids.sort_unstable();
        ids
    }

    pub fn snapshots(&self) -> Vec<AdapterSnapshot> {
        self.ids()
            .into_iter()
            .filter_map(|id| self.carriers.get(id))
            .map(|carrier| AdapterSnapshot {
                id: carrier.adapter.id().to_owned(),
                capabilities: carrier.adapter.capabilities(),
                requirements: carrier.adapter.requirements().to_vec(),
                auth_fallback: carrier.auth_fallback,
            })
            .collect()
    }
}

impl Debug for AdapterRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("carriers", &self.ids())
            .finish_non_exhaustive()
    }
}
