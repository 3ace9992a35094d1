use crate::config::Credentials;
use crate::error::Result;
use crate::provider::ProviderClient;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Builds provider clients for a set of credentials
pub trait ProviderFactory: Send + Sync {
    fn create(&self, credentials: &Credentials) -> Result<Arc<dyn ProviderClient>>;
}

impl<F> ProviderFactory for F
where
    F: Fn(&Credentials) -> Result<Arc<dyn ProviderClient>> + Send + Sync,
{
    fn create(&self, credentials: &Credentials) -> Result<Arc<dyn ProviderClient>> {
        (self)(credentials)
    }
}

/// Caches one provider client per credential pair
pub struct ProviderPool {
    factory: Box<dyn ProviderFactory>,
    instances: Mutex<HashMap<Credentials, Arc<dyn ProviderClient>>>,
}

impl ProviderPool {
    pub fn new<F: ProviderFactory + 'static>(factory: F) -> Self {
        Self {
            factory: Box::new(factory),
            instances: Mutex::new(HashMap::new()),
        }
    }

    /// Get the client for these credentials, creating it on first use
    pub fn get_instance(&self, credentials: &Credentials) -> Result<Arc<dyn ProviderClient>> {
        let mut instances = self
            .instances
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(instance) = instances.get(credentials) {
            return Ok(Arc::clone(instance));
        }

        tracing::debug!(
            subscribe_key = %credentials.subscribe_key,
            "creating provider client"
        );
        let instance = self.factory.create(credentials)?;
        instances.insert(credentials.clone(), Arc::clone(&instance));
        Ok(instance)
    }

    /// Number of cached clients
    pub fn len(&self) -> usize {
        self.instances
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
