//! Two-tier diagnostic routing.
//!
//! Bootstrap has a circularity problem: diagnostics nominally go
//! through the logging service, but while Logging itself is being
//! constructed (or when it fails) no usable logging handle exists.
//! [`DiagnosticRouter`] resolves it with two routes: a [`FallbackSink`]
//! that is always available, and the logging handle once (and only
//! once) it reaches Ready.  The fallback also acts as the safety net
//! when the promoted logging handle errors while writing.

use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::services::LoggingService;

/// Phase tag attached to every bootstrap diagnostic.
pub const PHASE_INITIALIZATION: &str = "Initialization";

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Critical,
    Error,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }
}

/// One diagnostic record: severity, message, source tag (the program
/// identifier), and phase tag.
#[derive(Debug, Clone)]
pub struct DiagnosticRecord {
    pub severity: Severity,
    pub message: String,
    pub source: String,
    pub phase: String,
    pub timestamp: DateTime<Utc>,
}

impl DiagnosticRecord {
    /// Build a critical record stamped with the current time.
    pub fn critical(message: impl Into<String>, source: &str, phase: &str) -> Self {
        Self {
            severity: Severity::Critical,
            message: message.into(),
            source: source.to_string(),
            phase: phase.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// A diagnostic channel that cannot fail.
pub trait DiagnosticSink: Send + Sync + 'static {
    fn write(&self, record: &DiagnosticRecord);
}

/// The guaranteed-available diagnostic channel: the process-local
/// tracing subscriber.  Depends on nothing else in the bootstrap core,
/// so it is usable before any logging backend exists.
pub struct FallbackSink;

impl DiagnosticSink for FallbackSink {
    fn write(&self, record: &DiagnosticRecord) {
        match record.severity {
            Severity::Critical | Severity::Error => {
                error!(
                    source = %record.source,
                    phase = %record.phase,
                    severity = record.severity.as_str(),
                    "{}",
                    record.message
                );
            }
            Severity::Warning => {
                warn!(source = %record.source, phase = %record.phase, "{}", record.message);
            }
            Severity::Info => {
                info!(source = %record.source, phase = %record.phase, "{}", record.message);
            }
        }
    }
}

/// Routes diagnostics to the currently appropriate sink.
///
/// Before the logging handle is promoted every record goes to the
/// fallback; afterwards records go through the logging handle, falling
/// back again only when that handle's own write errors.  Promotion is
/// one-shot, matching the terminal-state invariant of the Logging
/// category.
pub struct DiagnosticRouter {
    fallback: Arc<dyn DiagnosticSink>,
    logging: OnceLock<Arc<dyn LoggingService>>,
}

impl DiagnosticRouter {
    pub fn new(fallback: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            fallback,
            logging: OnceLock::new(),
        }
    }

    /// Hand diagnostics off to a Ready logging handle.  Later calls are
    /// ignored; the first promoted handle stays authoritative for the
    /// process lifetime.
    pub fn promote(&self, handle: Arc<dyn LoggingService>) {
        let _ = self.logging.set(handle);
    }

    /// Whether the logging handle has been promoted.
    pub fn logging_ready(&self) -> bool {
        self.logging.get().is_some()
    }

    /// Emit one record via the currently appropriate sink.
    pub async fn emit(&self, record: DiagnosticRecord) {
        match self.logging.get() {
            Some(logging) => {
                if let Err(err) = logging.log(&record).await {
                    warn!("logging service write failed, using fallback sink: {err}");
                    self.fallback.write(&record);
                }
            }
            None => self.fallback.write(&record),
        }
    }
}

impl Default for DiagnosticRouter {
    fn default() -> Self {
        Self::new(Arc::new(FallbackSink))
    }
}

// -- Test doubles -------------------------------------------------------------

/// In-memory sink recording every write, shared with bootstrap tests.
#[cfg(test)]
pub struct RecordingSink {
    pub records: std::sync::Mutex<Vec<DiagnosticRecord>>,
}

#[cfg(test)]
impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            records: std::sync::Mutex::new(Vec::new()),
        })
    }

    pub fn count(&self) -> usize {
        self.records.lock().expect("sink mutex poisoned").len()
    }
}

#[cfg(test)]
impl DiagnosticSink for RecordingSink {
    fn write(&self, record: &DiagnosticRecord) {
        self.records
            .lock()
            .expect("sink mutex poisoned")
            .push(record.clone());
    }
}

/// Fake logging backend with scriptable readiness and write behavior.
#[cfg(test)]
pub struct FakeLoggingBackend {
    pub ready: bool,
    pub fail_writes: bool,
    pub records: std::sync::Mutex<Vec<DiagnosticRecord>>,
}

#[cfg(test)]
impl FakeLoggingBackend {
    pub fn new(ready: bool, fail_writes: bool) -> Arc<Self> {
        Arc::new(Self {
            ready,
            fail_writes,
            records: std::sync::Mutex::new(Vec::new()),
        })
    }

    pub fn count(&self) -> usize {
        self.records.lock().expect("log mutex poisoned").len()
    }
}

#[cfg(test)]
impl crate::services::Service for FakeLoggingBackend {
    fn provider(&self) -> &'static str {
        "Azure"
    }

    fn ready(&self) -> std::pin::Pin<Box<dyn std::future::Future<Output = bool> + Send + '_>> {
        Box::pin(async move { self.ready })
    }
}

#[cfg(test)]
impl LoggingService for FakeLoggingBackend {
    fn log(
        &self,
        record: &DiagnosticRecord,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send + '_>> {
        let record = record.clone();
        Box::pin(async move {
            if self.fail_writes {
                anyhow::bail!("simulated logging backend write failure");
            }
            self.records
                .lock()
                .expect("log mutex poisoned")
                .push(record);
            Ok(())
        })
    }
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_route_to_fallback_before_promotion() {
        let sink = RecordingSink::new();
        let router = DiagnosticRouter::new(sink.clone());

        router
            .emit(DiagnosticRecord::critical("boom", "prog", PHASE_INITIALIZATION))
            .await;

        assert_eq!(sink.count(), 1);
        assert!(!router.logging_ready());
        let records = sink.records.lock().expect("mutex");
        assert_eq!(records[0].severity, Severity::Critical);
        assert_eq!(records[0].source, "prog");
        assert_eq!(records[0].phase, PHASE_INITIALIZATION);
    }

    #[tokio::test]
    async fn test_records_route_to_logging_after_promotion() {
        let sink = RecordingSink::new();
        let router = DiagnosticRouter::new(sink.clone());
        let logging = FakeLoggingBackend::new(true, false);
        router.promote(logging.clone());

        router
            .emit(DiagnosticRecord::critical("boom", "prog", PHASE_INITIALIZATION))
            .await;

        assert_eq!(logging.count(), 1);
        assert_eq!(sink.count(), 0);
    }

    #[tokio::test]
    async fn test_fallback_is_safety_net_when_logging_write_fails() {
        let sink = RecordingSink::new();
        let router = DiagnosticRouter::new(sink.clone());
        router.promote(FakeLoggingBackend::new(true, true));

        router
            .emit(DiagnosticRecord::critical("boom", "prog", PHASE_INITIALIZATION))
            .await;

        // The record still reaches an operator, via the fallback.
        assert_eq!(sink.count(), 1);
    }

    #[tokio::test]
    async fn test_promotion_is_one_shot() {
        let router = DiagnosticRouter::default();
        let first = FakeLoggingBackend::new(true, false);
        let second = FakeLoggingBackend::new(true, false);
        router.promote(first.clone());
        router.promote(second.clone());

        router
            .emit(DiagnosticRecord::critical("boom", "prog", PHASE_INITIALIZATION))
            .await;

        assert_eq!(first.count(), 1);
        assert_eq!(second.count(), 0);
    }
}
