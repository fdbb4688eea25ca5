//! Provider catalog: maps `(category, provider)` pairs to async
//! constructors producing ready-to-verify service handles.
//!
//! The built-in catalog registers every supported pairing; tests
//! register fakes through the same interface.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::debug;

use crate::config::BootstrapEnv;
use crate::errors::BootstrapError;
use crate::services::database::{DynamoDbDatabase, FirestoreDatabase, MongoDatabase};
use crate::services::file_storage::{GcsFileStorage, S3FileStorage};
use crate::services::logging::{AppInsightsLogging, CloudLoggingService, CloudWatchLogging};
use crate::services::pubsub::SnsPubSub;
use crate::services::trace::CloudTrace;
use crate::services::vm::{AzureComputeVm, GcComputeVm};
use crate::services::{
    ServiceCategory, ServiceHandle, PROVIDER_AWS, PROVIDER_AZURE, PROVIDER_GC, PROVIDER_MONGODB,
};

/// Future returned by a registered constructor.
pub type ConstructorFuture = Pin<Box<dyn Future<Output = anyhow::Result<ServiceHandle>> + Send>>;

/// A registered async constructor for one `(category, provider)` pair.
pub type Constructor = Box<dyn Fn(Arc<BootstrapEnv>) -> ConstructorFuture + Send + Sync>;

/// Registry of provider constructors keyed by `(category, provider)`.
pub struct ProviderCatalog {
    constructors: HashMap<(ServiceCategory, String), Constructor>,
}

impl ProviderCatalog {
    /// An empty catalog.  Tests build on this; production code uses
    /// [`ProviderCatalog::builtin`].
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Register (or replace) the constructor for a pairing.
    pub fn register<F>(&mut self, category: ServiceCategory, provider: &str, constructor: F)
    where
        F: Fn(Arc<BootstrapEnv>) -> ConstructorFuture + Send + Sync + 'static,
    {
        debug!("Registering provider: {category}/{provider}");
        self.constructors
            .insert((category, provider.to_string()), Box::new(constructor));
    }

    /// Look up the constructor for a pairing.  An unknown pairing is a
    /// configuration-level failure, not a construction failure.
    pub fn resolve(
        &self,
        category: ServiceCategory,
        provider: &str,
    ) -> Result<&Constructor, BootstrapError> {
        self.constructors
            .get(&(category, provider.to_string()))
            .ok_or_else(|| BootstrapError::UnsupportedProvider {
                category,
                provider: provider.to_string(),
            })
    }

    /// The full set of supported pairings.
    pub fn builtin() -> Self {
        let mut catalog = Self::new();

        catalog.register(ServiceCategory::Database, PROVIDER_AWS, |env| {
            Box::pin(async move {
                let handle = DynamoDbDatabase::new(&env).await?;
                Ok(ServiceHandle::Database(Arc::new(handle)))
            })
        });
        catalog.register(ServiceCategory::Database, PROVIDER_GC, |env| {
            Box::pin(async move {
                let handle = FirestoreDatabase::new(&env).await?;
                Ok(ServiceHandle::Database(Arc::new(handle)))
            })
        });
        catalog.register(ServiceCategory::Database, PROVIDER_MONGODB, |env| {
            Box::pin(async move {
                let handle = MongoDatabase::new(&env).await?;
                Ok(ServiceHandle::Database(Arc::new(handle)))
            })
        });

        catalog.register(ServiceCategory::FileStorage, PROVIDER_AWS, |env| {
            Box::pin(async move {
                let handle = S3FileStorage::new(&env).await?;
                Ok(ServiceHandle::FileStorage(Arc::new(handle)))
            })
        });
        catalog.register(ServiceCategory::FileStorage, PROVIDER_GC, |env| {
            Box::pin(async move {
                let handle = GcsFileStorage::new(&env).await?;
                Ok(ServiceHandle::FileStorage(Arc::new(handle)))
            })
        });

        catalog.register(ServiceCategory::Logging, PROVIDER_AWS, |env| {
            Box::pin(async move {
                let handle = CloudWatchLogging::new(&env).await?;
                Ok(ServiceHandle::Logging(Arc::new(handle)))
            })
        });
        catalog.register(ServiceCategory::Logging, PROVIDER_AZURE, |env| {
            Box::pin(async move {
                let handle = AppInsightsLogging::new(&env).await?;
                Ok(ServiceHandle::Logging(Arc::new(handle)))
            })
        });
        catalog.register(ServiceCategory::Logging, PROVIDER_GC, |env| {
            Box::pin(async move {
                let handle = CloudLoggingService::new(&env).await?;
                Ok(ServiceHandle::Logging(Arc::new(handle)))
            })
        });

        catalog.register(ServiceCategory::PubSub, PROVIDER_AWS, |env| {
            Box::pin(async move {
                let handle = SnsPubSub::new(&env).await?;
                Ok(ServiceHandle::PubSub(Arc::new(handle)))
            })
        });

        catalog.register(ServiceCategory::Tracing, PROVIDER_GC, |env| {
            Box::pin(async move {
                let handle = CloudTrace::new(&env).await?;
                Ok(ServiceHandle::Tracing(Arc::new(handle)))
            })
        });

        catalog.register(ServiceCategory::Vm, PROVIDER_AZURE, |env| {
            Box::pin(async move {
                let handle = AzureComputeVm::new(&env).await?;
                Ok(ServiceHandle::Vm(Arc::new(handle)))
            })
        });
        catalog.register(ServiceCategory::Vm, PROVIDER_GC, |env| {
            Box::pin(async move {
                let handle = GcComputeVm::new(&env).await?;
                Ok(ServiceHandle::Vm(Arc::new(handle)))
            })
        });

        catalog
    }
}

impl Default for ProviderCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_unknown_pairing_is_unsupported() {
        let catalog = ProviderCatalog::builtin();
        let err = catalog
            .resolve(ServiceCategory::PubSub, PROVIDER_AZURE)
            .err()
            .expect("Azure pub/sub is not a supported pairing");
        match err {
            BootstrapError::UnsupportedProvider { category, provider } => {
                assert_eq!(category, ServiceCategory::PubSub);
                assert_eq!(provider, "Azure");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_builtin_covers_all_supported_pairings() {
        let catalog = ProviderCatalog::builtin();
        let pairs = [
            (ServiceCategory::Database, PROVIDER_AWS),
            (ServiceCategory::Database, PROVIDER_GC),
            (ServiceCategory::Database, PROVIDER_MONGODB),
            (ServiceCategory::FileStorage, PROVIDER_AWS),
            (ServiceCategory::FileStorage, PROVIDER_GC),
            (ServiceCategory::Logging, PROVIDER_AWS),
            (ServiceCategory::Logging, PROVIDER_AZURE),
            (ServiceCategory::Logging, PROVIDER_GC),
            (ServiceCategory::PubSub, PROVIDER_AWS),
            (ServiceCategory::Tracing, PROVIDER_GC),
            (ServiceCategory::Vm, PROVIDER_AZURE),
            (ServiceCategory::Vm, PROVIDER_GC),
        ];
        for (category, provider) in pairs {
            assert!(
                catalog.resolve(category, provider).is_ok(),
                "{category}/{provider} must be registered"
            );
        }
    }

    #[tokio::test]
    async fn test_registered_constructor_is_invoked() {
        use crate::diag::FakeLoggingBackend;

        let mut catalog = ProviderCatalog::new();
        catalog.register(ServiceCategory::Logging, PROVIDER_AZURE, |_env| {
            Box::pin(async move {
                let backend = FakeLoggingBackend::new(true, false);
                Ok(ServiceHandle::Logging(backend))
            })
        });

        let env = Arc::new(BootstrapEnv {
            config: crate::config::Config::default(),
            env: crate::config::EnvironmentMap::default(),
        });
        let ctor = catalog
            .resolve(ServiceCategory::Logging, PROVIDER_AZURE)
            .unwrap();
        let handle = ctor(env).await.unwrap();
        assert_eq!(handle.category(), ServiceCategory::Logging);
        assert_eq!(handle.provider(), "Azure");
    }
}
