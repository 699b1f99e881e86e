//! Provider catalog and registry.
//!
//! The [`ProviderCatalog`] maps provider names to constructors and is built
//! once at startup. A [`ProviderRegistry`] is built from the catalog and a
//! config snapshot, and is rebuilt whenever the configuration changes.
//!
//! Constructors run lazily, on the first call that needs the provider. The
//! outcome is cached in the catalog for the life of the process: a provider
//! whose constructor fails is logged once and treated as unavailable from
//! then on, without stopping any other provider from working.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::config::Config;

use super::provider::StreamProvider;

/// Builds a provider instance.
pub type ProviderFactory = Box<dyn Fn() -> Result<Arc<dyn StreamProvider>> + Send + Sync>;

struct CatalogEntry {
    name: String,
    factory: ProviderFactory,
    /// `Some(None)` once resolution failed.
    resolved: OnceLock<Option<Arc<dyn StreamProvider>>>,
}

impl CatalogEntry {
    fn resolve(&self) -> Option<Arc<dyn StreamProvider>> {
        self.resolved
            .get_or_init(|| match panic::catch_unwind(AssertUnwindSafe(|| (self.factory)())) {
                Ok(Ok(provider)) => {
                    debug!(provider = %self.name, "Provider resolved");
                    Some(provider)
                }
                Ok(Err(e)) => {
                    error!(provider = %self.name, "Failed to load provider: {e:#}");
                    None
                }
                Err(payload) => {
                    error!(
                        provider = %self.name,
                        "Provider constructor panicked: {}",
                        panic_message(payload.as_ref())
                    );
                    None
                }
            })
            .clone()
    }

    fn state(&self) -> Availability {
        match self.resolved.get() {
            None => Availability::Unresolved,
            Some(Some(_)) => Availability::Ready,
            Some(None) => Availability::Unavailable,
        }
    }
}

/// Text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Whether a provider's constructor has run, and how it went.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    Unresolved,
    Ready,
    Unavailable,
}

/// Constructors for every provider the process knows about, in enumeration order.
#[derive(Default)]
pub struct ProviderCatalog {
    entries: Vec<Arc<CatalogEntry>>,
}

impl ProviderCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor. Re-registering a name replaces it in place.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Result<Arc<dyn StreamProvider>> + Send + Sync + 'static,
    {
        let name = name.into().to_lowercase();
        let entry = Arc::new(CatalogEntry {
            name: name.clone(),
            factory: Box::new(factory),
            resolved: OnceLock::new(),
        });
        match self.entries.iter_mut().find(|e| e.name == name) {
            Some(slot) => *slot = entry,
            None => self.entries.push(entry),
        }
        self
    }

    /// Register an already constructed provider under its own name.
    pub fn register_instance(&mut self, provider: Arc<dyn StreamProvider>) -> &mut Self {
        let name = provider.name().to_string();
        self.register(name, move || Ok(Arc::clone(&provider)))
    }

    /// Registered names in enumeration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for ProviderCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// One registry slot: a provider name, its enable flag, and a handle to
/// its lazily resolved implementation.
#[derive(Clone)]
pub struct ProviderDescriptor {
    name: String,
    enabled: bool,
    entry: Arc<CatalogEntry>,
}

impl ProviderDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn availability(&self) -> Availability {
        self.entry.state()
    }

    /// Resolve the implementation, constructing it on first use.
    ///
    /// `None` means the provider is permanently unavailable in this process.
    pub fn provider(&self) -> Option<Arc<dyn StreamProvider>> {
        self.entry.resolve()
    }
}

impl fmt::Debug for ProviderDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderDescriptor")
            .field("name", &self.name)
            .field("enabled", &self.enabled)
            .field("availability", &self.availability())
            .finish()
    }
}

/// Introspection view of a registry slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderStatus {
    pub name: String,
    pub enabled: bool,
}

/// Providers for one configuration snapshot.
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    config: Arc<Config>,
    descriptors: Vec<ProviderDescriptor>,
}

impl ProviderRegistry {
    /// Build descriptors for every catalog entry, enabled per `config`.
    pub fn build(config: Arc<Config>, catalog: &ProviderCatalog) -> Self {
        let descriptors: Vec<ProviderDescriptor> = catalog
            .entries
            .iter()
            .map(|entry| {
                let enabled = config.provider_enabled(&entry.name);
                if enabled {
                    info!(provider = %entry.name, "Provider enabled");
                } else {
                    info!(provider = %entry.name, "Provider disabled via config");
                }
                ProviderDescriptor {
                    name: entry.name.clone(),
                    enabled,
                    entry: Arc::clone(entry),
                }
            })
            .collect();

        Self { config, descriptors }
    }

    /// The snapshot this registry was built from.
    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// Every descriptor in enumeration order.
    pub fn descriptors(&self) -> &[ProviderDescriptor] {
        &self.descriptors
    }

    /// Enabled descriptors in enumeration order.
    pub fn enabled(&self) -> impl Iterator<Item = &ProviderDescriptor> {
        self.descriptors.iter().filter(|d| d.enabled)
    }

    pub fn list(&self) -> Vec<ProviderStatus> {
        self.descriptors
            .iter()
            .map(|d| ProviderStatus {
                name: d.name.clone(),
                enabled: d.enabled,
            })
            .collect()
    }

    /// Case-insensitive lookup.
    pub fn get(&self, name: &str) -> Option<&ProviderDescriptor> {
        self.descriptors
            .iter()
            .find(|d| d.name.eq_ignore_ascii_case(name))
    }
}
