//! Cloudbind library -- multi-cloud service bootstrap and composition
//! layer.
//!
//! This crate validates provider credentials from the environment,
//! constructs one verified service handle per enabled category
//! (database, file storage, logging, pub/sub, tracing, VM management),
//! routes bootstrap diagnostics through a two-tier fallback, and
//! serves a small HTTP surface over the resulting context.

use std::sync::Arc;

pub mod bootstrap;
pub mod catalog;
pub mod config;
pub mod diag;
pub mod errors;
pub mod http;
pub mod metrics;
pub mod server;
pub mod services;

use crate::config::Config;
use crate::services::{
    DatabaseService, FileStorageService, LoggingService, PubSubService, TraceService, VmService,
};

/// Shared application state passed to all handlers via `axum::extract::State`.
///
/// Holds one verified handle per category that reached Ready; a `None`
/// slot means the category was disabled or failed bootstrap.
pub struct ServiceContext {
    /// Server configuration.
    pub config: Config,
    /// Structured record store.
    pub database: Option<Arc<dyn DatabaseService>>,
    /// Opaque byte object store.
    pub file_storage: Option<Arc<dyn FileStorageService>>,
    /// Cloud diagnostic log backend.
    pub logging: Option<Arc<dyn LoggingService>>,
    /// Topic publisher.
    pub pubsub: Option<Arc<dyn PubSubService>>,
    /// Distributed trace span recorder.
    pub tracing: Option<Arc<dyn TraceService>>,
    /// Compute instance lifecycle control.
    pub vm: Option<Arc<dyn VmService>>,
}

impl ServiceContext {
    /// A context with no live handles, for serving before (or without)
    /// a successful bootstrap.
    pub fn empty(config: Config) -> Self {
        Self {
            config,
            database: None,
            file_storage: None,
            logging: None,
            pubsub: None,
            tracing: None,
            vm: None,
        }
    }
}
