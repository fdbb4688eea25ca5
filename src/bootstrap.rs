//! Bootstrap orchestration: validate, construct, and verify one
//! service handle per enabled category.
//!
//! Each category moves through a small state machine:
//!
//! ```text
//! Uninitialized -> Validating -> Constructing -> Ready
//!                      \              \
//!                       +-> Failed <--+
//! ```
//!
//! Ready and Failed are terminal for the process lifetime; re-entering
//! a terminal category returns the recorded outcome without touching
//! the backend again.  Every failure produces exactly one critical
//! diagnostic, routed through the [`DiagnosticRouter`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::catalog::ProviderCatalog;
use crate::config::BootstrapEnv;
use crate::diag::{DiagnosticRecord, DiagnosticRouter, PHASE_INITIALIZATION};
use crate::errors::BootstrapError;
use crate::metrics;
use crate::services::{
    DatabaseService, FileStorageService, LoggingService, PubSubService, ServiceCategory,
    ServiceHandle, TraceService, VmService,
};
use crate::ServiceContext;

/// Lifecycle state of one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryState {
    Uninitialized,
    Validating,
    Constructing,
    Ready,
    Failed,
}

/// Outcome of one category's initialization attempt.
#[derive(Debug, Clone)]
pub struct InitializationResult {
    pub success: bool,
    pub category: ServiceCategory,
    pub provider: String,
    /// Failure description; `None` on success.
    pub message: Option<String>,
}

/// Drives the per-category bootstrap sequence and accumulates the
/// verified handles.
pub struct ServiceInitializer {
    shared: Arc<BootstrapEnv>,
    catalog: ProviderCatalog,
    diag: Arc<DiagnosticRouter>,
    /// Diagnostic source tag (the program identifier).
    source: String,
    states: HashMap<ServiceCategory, CategoryState>,
    results: Vec<InitializationResult>,
    database: Option<Arc<dyn DatabaseService>>,
    file_storage: Option<Arc<dyn FileStorageService>>,
    logging: Option<Arc<dyn LoggingService>>,
    pubsub: Option<Arc<dyn PubSubService>>,
    tracing: Option<Arc<dyn TraceService>>,
    vm: Option<Arc<dyn VmService>>,
}

impl ServiceInitializer {
    pub fn new(
        shared: Arc<BootstrapEnv>,
        catalog: ProviderCatalog,
        diag: Arc<DiagnosticRouter>,
    ) -> Self {
        let source = shared.program_id();
        Self {
            shared,
            catalog,
            diag,
            source,
            states: HashMap::new(),
            results: Vec::new(),
            database: None,
            file_storage: None,
            logging: None,
            pubsub: None,
            tracing: None,
            vm: None,
        }
    }

    /// Initialize every enabled category in bootstrap order (Logging
    /// first).  A category failure never aborts the sequence; callers
    /// decide afterwards what a partial bootstrap means for them.
    pub async fn initialize_all(&mut self) {
        for category in ServiceCategory::BOOTSTRAP_ORDER {
            if !self.shared.config.selection(category).enabled {
                info!("Skipping disabled category: {category}");
                continue;
            }
            self.init_category(category).await;
        }
    }

    pub async fn with_logging_service(&mut self) -> bool {
        self.init_category(ServiceCategory::Logging).await
    }

    pub async fn with_database_service(&mut self) -> bool {
        self.init_category(ServiceCategory::Database).await
    }

    pub async fn with_file_storage_service(&mut self) -> bool {
        self.init_category(ServiceCategory::FileStorage).await
    }

    pub async fn with_pubsub_service(&mut self) -> bool {
        self.init_category(ServiceCategory::PubSub).await
    }

    pub async fn with_tracing_service(&mut self) -> bool {
        self.init_category(ServiceCategory::Tracing).await
    }

    pub async fn with_vm_service(&mut self) -> bool {
        self.init_category(ServiceCategory::Vm).await
    }

    /// Current state of a category.
    pub fn state(&self, category: ServiceCategory) -> CategoryState {
        self.states
            .get(&category)
            .copied()
            .unwrap_or(CategoryState::Uninitialized)
    }

    /// Every recorded initialization outcome, in attempt order.
    pub fn results(&self) -> &[InitializationResult] {
        &self.results
    }

    /// Whether every attempted category reached Ready.
    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(|r| r.success)
    }

    /// Consume the initializer, producing the shared runtime context.
    pub fn into_context(self) -> ServiceContext {
        ServiceContext {
            config: self.shared.config.clone(),
            database: self.database,
            file_storage: self.file_storage,
            logging: self.logging,
            pubsub: self.pubsub,
            tracing: self.tracing,
            vm: self.vm,
        }
    }

    /// Run the full sequence for one category: validate the
    /// environment, construct the handle under the timeout, verify
    /// readiness, then store it.
    async fn init_category(&mut self, category: ServiceCategory) -> bool {
        // Terminal states are never re-entered.
        match self.state(category) {
            CategoryState::Ready => {
                warn!("Category {category} is already initialized");
                return true;
            }
            CategoryState::Failed => {
                warn!("Category {category} already failed; not retrying");
                return false;
            }
            _ => {}
        }

        let provider = self
            .shared
            .config
            .selection(category)
            .provider
            .to_string();
        let started = Instant::now();

        info!("Initializing {category} via provider {provider}");
        self.states.insert(category, CategoryState::Validating);

        if let Err(err) = self.shared.env.validate(category, &provider) {
            return self.fail(category, &provider, err, started).await;
        }

        // Resolving and invoking in one step keeps the catalog borrow
        // from overlapping the state updates below.
        let construction = match self.catalog.resolve(category, &provider) {
            Ok(constructor) => constructor(self.shared.clone()),
            Err(err) => return self.fail(category, &provider, err, started).await,
        };

        self.states.insert(category, CategoryState::Constructing);

        let seconds = self.shared.config.bootstrap.construct_timeout_seconds;
        let handle = match tokio::time::timeout(Duration::from_secs(seconds), construction).await {
            Err(_) => {
                let err = BootstrapError::Timeout {
                    category,
                    provider: provider.clone(),
                    seconds,
                };
                return self.fail(category, &provider, err, started).await;
            }
            Ok(Err(source)) => {
                let err = BootstrapError::Construction {
                    category,
                    provider: provider.clone(),
                    source,
                };
                return self.fail(category, &provider, err, started).await;
            }
            Ok(Ok(handle)) => handle,
        };

        if handle.category() != category {
            let err = BootstrapError::Construction {
                category,
                provider: provider.clone(),
                source: anyhow::anyhow!(
                    "constructor produced a {} handle",
                    handle.category()
                ),
            };
            return self.fail(category, &provider, err, started).await;
        }

        if !handle.ready().await {
            let err = BootstrapError::Verification {
                category,
                provider: provider.clone(),
            };
            return self.fail(category, &provider, err, started).await;
        }

        self.store(handle);
        self.states.insert(category, CategoryState::Ready);
        self.results.push(InitializationResult {
            success: true,
            category,
            provider: provider.clone(),
            message: None,
        });
        metrics::record_bootstrap(category, &provider, "success", started.elapsed());

        info!(
            "Category {category} ready via {provider} in {:?}",
            started.elapsed()
        );
        true
    }

    /// Store a verified handle.  A Ready logging handle is also
    /// promoted as the diagnostic route for every later category.
    fn store(&mut self, handle: ServiceHandle) {
        match handle {
            ServiceHandle::Database(h) => self.database = Some(h),
            ServiceHandle::FileStorage(h) => self.file_storage = Some(h),
            ServiceHandle::Logging(h) => {
                self.diag.promote(h.clone());
                self.logging = Some(h);
            }
            ServiceHandle::PubSub(h) => self.pubsub = Some(h),
            ServiceHandle::Tracing(h) => self.tracing = Some(h),
            ServiceHandle::Vm(h) => self.vm = Some(h),
        }
    }

    /// Record a failure: terminal state, one critical diagnostic, one
    /// result entry, one metric sample.
    async fn fail(
        &mut self,
        category: ServiceCategory,
        provider: &str,
        err: BootstrapError,
        started: Instant,
    ) -> bool {
        let message = err.to_string();
        warn!("Category {category} failed: {message}");

        self.states.insert(category, CategoryState::Failed);
        self.diag
            .emit(DiagnosticRecord::critical(
                message.clone(),
                &self.source,
                PHASE_INITIALIZATION,
            ))
            .await;
        self.results.push(InitializationResult {
            success: false,
            category,
            provider: provider.to_string(),
            message: Some(message),
        });
        metrics::record_bootstrap(category, provider, err.kind(), started.elapsed());
        false
    }
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::config::{Config, EnvironmentMap};
    use crate::diag::{FakeLoggingBackend, RecordingSink};
    use crate::services::PROVIDER_AZURE;

    /// Config with Logging/Azure enabled; other categories disabled.
    fn azure_logging_config() -> Config {
        let mut config = Config::default();
        config.services.logging.enabled = true;
        config.services.logging.provider = "Azure".to_string();
        config
    }

    fn shared_env(config: Config, pairs: &[(&str, &str)]) -> Arc<BootstrapEnv> {
        Arc::new(BootstrapEnv {
            config,
            env: EnvironmentMap::from_pairs(pairs.iter().copied()),
        })
    }

    /// Catalog whose Logging/Azure constructor yields a scriptable fake
    /// and counts invocations.
    fn fake_logging_catalog(
        ready: bool,
        fail_writes: bool,
        invocations: Arc<AtomicUsize>,
    ) -> ProviderCatalog {
        let mut catalog = ProviderCatalog::new();
        catalog.register(ServiceCategory::Logging, PROVIDER_AZURE, move |_env| {
            invocations.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                Ok(ServiceHandle::Logging(FakeLoggingBackend::new(
                    ready,
                    fail_writes,
                )))
            })
        });
        catalog
    }

    #[tokio::test]
    async fn test_missing_variable_fails_without_invoking_constructor() {
        let invocations = Arc::new(AtomicUsize::new(0));
        let catalog = fake_logging_catalog(true, false, invocations.clone());
        let sink = RecordingSink::new();
        let diag = Arc::new(DiagnosticRouter::new(sink.clone()));
        let env = shared_env(azure_logging_config(), &[]);

        let mut init = ServiceInitializer::new(env, catalog, diag);
        assert!(!init.with_logging_service().await);

        assert_eq!(invocations.load(Ordering::SeqCst), 0);
        assert_eq!(init.state(ServiceCategory::Logging), CategoryState::Failed);
        assert_eq!(sink.count(), 1);
        let records = sink.records.lock().expect("mutex");
        assert!(records[0].message.contains("APPINSIGHTS_INSTRUMENTATIONKEY"));
    }

    #[tokio::test]
    async fn test_successful_init_retains_handle_and_promotes_logging() {
        let catalog = fake_logging_catalog(true, false, Arc::new(AtomicUsize::new(0)));
        let sink = RecordingSink::new();
        let diag = Arc::new(DiagnosticRouter::new(sink.clone()));
        let env = shared_env(
            azure_logging_config(),
            &[("APPINSIGHTS_INSTRUMENTATIONKEY", "ikey")],
        );

        let mut init = ServiceInitializer::new(env, catalog, diag.clone());
        assert!(init.with_logging_service().await);

        assert_eq!(init.state(ServiceCategory::Logging), CategoryState::Ready);
        assert!(diag.logging_ready());
        assert_eq!(sink.count(), 0);

        let context = init.into_context();
        assert!(context.logging.is_some());
        assert_eq!(
            context.logging.as_ref().map(|h| h.provider()),
            Some("Azure")
        );
    }

    #[tokio::test]
    async fn test_not_ready_handle_fails_with_one_diagnostic() {
        let catalog = fake_logging_catalog(false, false, Arc::new(AtomicUsize::new(0)));
        let sink = RecordingSink::new();
        let diag = Arc::new(DiagnosticRouter::new(sink.clone()));
        let env = shared_env(
            azure_logging_config(),
            &[("APPINSIGHTS_INSTRUMENTATIONKEY", "ikey")],
        );

        let mut init = ServiceInitializer::new(env, catalog, diag);
        assert!(!init.with_logging_service().await);

        assert_eq!(init.state(ServiceCategory::Logging), CategoryState::Failed);
        assert_eq!(sink.count(), 1);
        let records = sink.records.lock().expect("mutex");
        assert!(records[0].message.contains("not ready"));
    }

    #[tokio::test]
    async fn test_constructor_error_fails_with_one_diagnostic() {
        let mut catalog = ProviderCatalog::new();
        catalog.register(ServiceCategory::Logging, PROVIDER_AZURE, |_env| {
            Box::pin(async move { Err(anyhow::anyhow!("simulated constructor failure")) })
        });
        let sink = RecordingSink::new();
        let diag = Arc::new(DiagnosticRouter::new(sink.clone()));
        let env = shared_env(
            azure_logging_config(),
            &[("APPINSIGHTS_INSTRUMENTATIONKEY", "ikey")],
        );

        let mut init = ServiceInitializer::new(env, catalog, diag);
        assert!(!init.with_logging_service().await);

        assert_eq!(sink.count(), 1);
        let records = sink.records.lock().expect("mutex");
        assert!(records[0].message.contains("simulated constructor failure"));
    }

    #[tokio::test]
    async fn test_terminal_states_are_not_reentered() {
        let invocations = Arc::new(AtomicUsize::new(0));
        let catalog = fake_logging_catalog(true, false, invocations.clone());
        let diag = Arc::new(DiagnosticRouter::new(RecordingSink::new()));
        let env = shared_env(
            azure_logging_config(),
            &[("APPINSIGHTS_INSTRUMENTATIONKEY", "ikey")],
        );

        let mut init = ServiceInitializer::new(env, catalog, diag);
        assert!(init.with_logging_service().await);
        assert!(init.with_logging_service().await);
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_category_stays_failed() {
        let invocations = Arc::new(AtomicUsize::new(0));
        let catalog = fake_logging_catalog(true, false, invocations.clone());
        let sink = RecordingSink::new();
        let diag = Arc::new(DiagnosticRouter::new(sink.clone()));
        // No environment: validation fails the first attempt.
        let env = shared_env(azure_logging_config(), &[]);

        let mut init = ServiceInitializer::new(env, catalog, diag);
        assert!(!init.with_logging_service().await);
        assert!(!init.with_logging_service().await);

        // No retry, no second diagnostic.
        assert_eq!(invocations.load(Ordering::SeqCst), 0);
        assert_eq!(sink.count(), 1);
    }

    #[tokio::test]
    async fn test_failures_after_logging_ready_route_through_logging() {
        let backend = FakeLoggingBackend::new(true, false);
        let backend_for_ctor = backend.clone();
        let mut catalog = ProviderCatalog::new();
        catalog.register(ServiceCategory::Logging, PROVIDER_AZURE, move |_env| {
            let backend = backend_for_ctor.clone();
            Box::pin(async move { Ok(ServiceHandle::Logging(backend)) })
        });

        let mut config = azure_logging_config();
        config.services.database.enabled = true;
        config.services.database.provider = "MongoDB".to_string();

        let sink = RecordingSink::new();
        let diag = Arc::new(DiagnosticRouter::new(sink.clone()));
        // Logging can come up; the MongoDB variables are absent.
        let env = shared_env(config, &[("APPINSIGHTS_INSTRUMENTATIONKEY", "ikey")]);

        let mut init = ServiceInitializer::new(env, catalog, diag);
        init.initialize_all().await;

        assert_eq!(init.state(ServiceCategory::Logging), CategoryState::Ready);
        assert_eq!(init.state(ServiceCategory::Database), CategoryState::Failed);
        // The database failure went through the promoted backend.
        assert_eq!(backend.count(), 1);
        assert_eq!(sink.count(), 0);

        let logged = backend.records.lock().expect("mutex");
        assert!(logged[0].message.contains("MONGODB_CONNECTION_STRING"));
    }

    #[tokio::test]
    async fn test_logging_write_failure_falls_back_to_sink() {
        let catalog = fake_logging_catalog(true, true, Arc::new(AtomicUsize::new(0)));

        let mut config = azure_logging_config();
        config.services.database.enabled = true;
        config.services.database.provider = "MongoDB".to_string();

        let sink = RecordingSink::new();
        let diag = Arc::new(DiagnosticRouter::new(sink.clone()));
        let env = shared_env(config, &[("APPINSIGHTS_INSTRUMENTATIONKEY", "ikey")]);

        let mut init = ServiceInitializer::new(env, catalog, diag);
        init.initialize_all().await;

        // The promoted backend rejects writes; the record still lands.
        assert_eq!(sink.count(), 1);
    }

    #[tokio::test]
    async fn test_disabled_categories_are_skipped() {
        let invocations = Arc::new(AtomicUsize::new(0));
        let catalog = fake_logging_catalog(true, false, invocations.clone());
        let diag = Arc::new(DiagnosticRouter::new(RecordingSink::new()));
        // Default config: everything disabled.
        let env = shared_env(Config::default(), &[]);

        let mut init = ServiceInitializer::new(env, catalog, diag);
        init.initialize_all().await;

        assert_eq!(invocations.load(Ordering::SeqCst), 0);
        assert!(init.results().is_empty());
        assert_eq!(
            init.state(ServiceCategory::Logging),
            CategoryState::Uninitialized
        );
    }

    #[tokio::test]
    async fn test_unsupported_provider_fails_cleanly() {
        let mut config = Config::default();
        config.services.pubsub.enabled = true;
        config.services.pubsub.provider = "Azure".to_string();

        let sink = RecordingSink::new();
        let diag = Arc::new(DiagnosticRouter::new(sink.clone()));
        let env = shared_env(config, &[]);

        let mut init = ServiceInitializer::new(env, ProviderCatalog::new(), diag);
        assert!(!init.with_pubsub_service().await);

        assert_eq!(init.state(ServiceCategory::PubSub), CategoryState::Failed);
        assert_eq!(sink.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_constructor_times_out() {
        let mut catalog = ProviderCatalog::new();
        catalog.register(ServiceCategory::Logging, PROVIDER_AZURE, |_env| {
            Box::pin(async move { std::future::pending().await })
        });

        let mut config = azure_logging_config();
        config.bootstrap.construct_timeout_seconds = 5;

        let sink = RecordingSink::new();
        let diag = Arc::new(DiagnosticRouter::new(sink.clone()));
        let env = shared_env(config, &[("APPINSIGHTS_INSTRUMENTATIONKEY", "ikey")]);

        let mut init = ServiceInitializer::new(env, catalog, diag);
        assert!(!init.with_logging_service().await);

        assert_eq!(init.state(ServiceCategory::Logging), CategoryState::Failed);
        let records = sink.records.lock().expect("mutex");
        assert!(records[0].message.contains("timed out after 5s"));
    }

    #[tokio::test]
    async fn test_results_record_every_attempt_in_order() {
        let catalog = fake_logging_catalog(true, false, Arc::new(AtomicUsize::new(0)));

        let mut config = azure_logging_config();
        config.services.database.enabled = true;
        config.services.database.provider = "MongoDB".to_string();

        let diag = Arc::new(DiagnosticRouter::new(RecordingSink::new()));
        let env = shared_env(config, &[("APPINSIGHTS_INSTRUMENTATIONKEY", "ikey")]);

        let mut init = ServiceInitializer::new(env, catalog, diag);
        init.initialize_all().await;

        let results = init.results();
        assert_eq!(results.len(), 2);
        // Logging first, per bootstrap order.
        assert_eq!(results[0].category, ServiceCategory::Logging);
        assert!(results[0].success);
        assert_eq!(results[1].category, ServiceCategory::Database);
        assert!(!results[1].success);
        assert!(!init.all_succeeded());
    }
}
