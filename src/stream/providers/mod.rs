//! Bundled stream providers

pub mod vidzee;
pub mod xprime;

use std::sync::Arc;

use anyhow::anyhow;

pub use vidzee::VidZeeProvider;
pub use xprime::XprimeProvider;

use crate::config::KNOWN_PROVIDERS;
use crate::http_client::AcceleratedClient;

use super::provider::StreamProvider;
use super::registry::ProviderCatalog;

/// Catalog of every known provider, sharing one HTTP client.
///
/// Known names without a bundled adapter are registered with a constructor
/// that fails, so they show up in listings and resolve as unavailable.
pub fn builtin_catalog(client: &AcceleratedClient) -> ProviderCatalog {
    let mut catalog = ProviderCatalog::new();
    for name in KNOWN_PROVIDERS {
        match name {
            "vidzee" => {
                let client = client.clone();
                catalog.register(name, move || {
                    Ok(Arc::new(VidZeeProvider::new(client.clone())) as Arc<dyn StreamProvider>)
                });
            }
            "xprime" => {
                let client = client.clone();
                catalog.register(name, move || {
                    Ok(Arc::new(XprimeProvider::new(client.clone())) as Arc<dyn StreamProvider>)
                });
            }
            _ => {
                catalog.register(name, move || Err(anyhow!("{name} adapter is not bundled")));
            }
        }
    }
    catalog
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::registry::Availability;

    #[test]
    fn catalog_lists_known_providers_in_order() {
        let catalog = builtin_catalog(&AcceleratedClient::new().unwrap());
        assert_eq!(catalog.names().collect::<Vec<_>>(), KNOWN_PROVIDERS.to_vec());
    }

    #[test]
    fn unbundled_providers_are_unavailable() {
        let catalog = builtin_catalog(&AcceleratedClient::new().unwrap());
        let registry = crate::stream::ProviderRegistry::build(Arc::default(), &catalog);

        let showbox = registry.get("showbox").unwrap();
        assert!(showbox.provider().is_none());
        assert_eq!(showbox.availability(), Availability::Unavailable);

        let vidzee = registry.get("vidzee").unwrap();
        assert_eq!(vidzee.provider().unwrap().name(), "vidzee");
    }
}
