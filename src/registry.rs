//! In-process language providers
//!
//! Providers compiled into the host are registered here and answer greetings
//! directly, without a subprocess. The host owns one registry for its whole
//! lifetime and closes it exactly once at exit.
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{error, info, warn};

use crate::greetings::Greeter;

#[derive(Default)]
pub struct Registry {
    providers: RwLock<HashMap<String, Arc<dyn Greeter>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the languages the host answers in-process
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register(Box::new(crate::lang::English));
        registry
    }

    /// Initialise and add a provider
    ///
    /// The first registration under a name wins. A provider whose init hook
    /// fails is logged and left out.
    pub fn register(&self, mut provider: Box<dyn Greeter>) {
        let mut providers = self
            .providers
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let name = provider.name().to_string();
        if providers.contains_key(&name) {
            warn!("Plugin {name} already registered, ignoring");
            return;
        }

        if let Err(err) = provider.init() {
            error!("Failed to initialize plugin {name}: {err:#}");
            return;
        }

        providers.insert(name.clone(), Arc::from(provider));
        info!("Registered plugin: {name}");
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Greeter>> {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Names of every registered provider, sorted
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Run every provider's close hook and empty the registry
    pub fn close(&self) {
        let mut providers = self
            .providers
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        for (name, provider) in providers.drain() {
            if let Err(err) = provider.close() {
                warn!("Error closing plugin {name}: {err:#}");
            }
        }
    }
}
