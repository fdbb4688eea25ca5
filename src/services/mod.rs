//! Per-category service capabilities and their provider implementations.
//!
//! Each service category (database, file storage, logging, pub/sub,
//! tracing, VM management) is a trait extending [`Service`], which adds
//! the common readiness query.  Provider implementations are thin
//! clients over the cloud SDKs/REST APIs; their network semantics are
//! external collaborators of the bootstrap core.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub mod aws_auth;
pub mod database;
pub mod file_storage;
pub mod gc_auth;
pub mod logging;
pub mod pubsub;
pub mod trace;
pub mod vm;

pub use database::DatabaseService;
pub use file_storage::FileStorageService;
pub use logging::LoggingService;
pub use pubsub::PubSubService;
pub use trace::TraceService;
pub use vm::VmService;

/// Provider identifier for AWS-backed services.
pub const PROVIDER_AWS: &str = "AWS";
/// Provider identifier for Google-Cloud-backed services.
pub const PROVIDER_GC: &str = "GC";
/// Provider identifier for Azure-backed services.
pub const PROVIDER_AZURE: &str = "Azure";
/// Provider identifier for MongoDB-backed services.
pub const PROVIDER_MONGODB: &str = "MongoDB";

/// A functional slot needing exactly one active backend per process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceCategory {
    Database,
    FileStorage,
    Logging,
    PubSub,
    Tracing,
    Vm,
}

impl ServiceCategory {
    /// All categories in bootstrap order: Logging first, because every
    /// other category's diagnostics route through it once Ready.
    pub const BOOTSTRAP_ORDER: [ServiceCategory; 6] = [
        ServiceCategory::Logging,
        ServiceCategory::Database,
        ServiceCategory::FileStorage,
        ServiceCategory::PubSub,
        ServiceCategory::Tracing,
        ServiceCategory::Vm,
    ];

    /// Stable lowercase name, used for metric labels and config keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceCategory::Database => "database",
            ServiceCategory::FileStorage => "file_storage",
            ServiceCategory::Logging => "logging",
            ServiceCategory::PubSub => "pubsub",
            ServiceCategory::Tracing => "tracing",
            ServiceCategory::Vm => "vm",
        }
    }
}

impl fmt::Display for ServiceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability common to every service handle.
///
/// `ready` is a post-construction query distinguishing a usable handle
/// from one that merely avoided a constructor error; the orchestrator
/// treats a non-ready handle as a failure even when construction
/// returned `Ok`.
pub trait Service: Send + Sync + 'static {
    /// The provider identifier this handle was constructed for.
    fn provider(&self) -> &'static str;

    /// Whether the backend behind this handle is reachable and usable.
    fn ready(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>>;
}

/// Opaque per-category handle produced by a catalog constructor.
///
/// Exactly one variant per category; the orchestrator stores the inner
/// trait object in [`crate::ServiceContext`] once the handle verifies
/// as ready.
pub enum ServiceHandle {
    Database(Arc<dyn DatabaseService>),
    FileStorage(Arc<dyn FileStorageService>),
    Logging(Arc<dyn LoggingService>),
    PubSub(Arc<dyn PubSubService>),
    Tracing(Arc<dyn TraceService>),
    Vm(Arc<dyn VmService>),
}

impl ServiceHandle {
    /// The category this handle belongs to.
    pub fn category(&self) -> ServiceCategory {
        match self {
            ServiceHandle::Database(_) => ServiceCategory::Database,
            ServiceHandle::FileStorage(_) => ServiceCategory::FileStorage,
            ServiceHandle::Logging(_) => ServiceCategory::Logging,
            ServiceHandle::PubSub(_) => ServiceCategory::PubSub,
            ServiceHandle::Tracing(_) => ServiceCategory::Tracing,
            ServiceHandle::Vm(_) => ServiceCategory::Vm,
        }
    }

    /// The provider identifier of the underlying handle.
    pub fn provider(&self) -> &'static str {
        match self {
            ServiceHandle::Database(h) => h.provider(),
            ServiceHandle::FileStorage(h) => h.provider(),
            ServiceHandle::Logging(h) => h.provider(),
            ServiceHandle::PubSub(h) => h.provider(),
            ServiceHandle::Tracing(h) => h.provider(),
            ServiceHandle::Vm(h) => h.provider(),
        }
    }

    /// Run the common readiness query on the underlying handle.
    pub async fn ready(&self) -> bool {
        match self {
            ServiceHandle::Database(h) => h.ready().await,
            ServiceHandle::FileStorage(h) => h.ready().await,
            ServiceHandle::Logging(h) => h.ready().await,
            ServiceHandle::PubSub(h) => h.ready().await,
            ServiceHandle::Tracing(h) => h.ready().await,
            ServiceHandle::Vm(h) => h.ready().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap_order_starts_with_logging() {
        assert_eq!(ServiceCategory::BOOTSTRAP_ORDER[0], ServiceCategory::Logging);
        assert_eq!(ServiceCategory::BOOTSTRAP_ORDER.len(), 6);
    }

    #[test]
    fn test_category_names_are_stable() {
        assert_eq!(ServiceCategory::Database.as_str(), "database");
        assert_eq!(ServiceCategory::FileStorage.as_str(), "file_storage");
        assert_eq!(ServiceCategory::Vm.to_string(), "vm");
    }
}
