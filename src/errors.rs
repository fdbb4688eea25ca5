//! Bootstrap error taxonomy.
//!
//! Every variant collapses, at the orchestrator boundary, into a
//! boolean failure plus exactly one diagnostic write.  None escape as
//! uncontrolled failures that terminate the process: containing
//! provider-level failures and converting them into an inspectable
//! result is precisely the orchestrator's job.

use thiserror::Error;

use crate::services::ServiceCategory;

/// Failure modes of a single category's initialization.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// A required environment variable is missing or empty.  Carries
    /// all missing names; alternatives are rendered `A|B`.
    #[error("{category}/{provider}: missing or empty required environment variables: {}", .missing.join(", "))]
    Configuration {
        category: ServiceCategory,
        provider: String,
        missing: Vec<String>,
    },

    /// The `(category, provider)` pair is not registered in the catalog.
    #[error("{category}: provider '{provider}' is not registered")]
    UnsupportedProvider {
        category: ServiceCategory,
        provider: String,
    },

    /// The provider constructor returned an error.
    #[error("{category}/{provider}: construction failed: {source}")]
    Construction {
        category: ServiceCategory,
        provider: String,
        #[source]
        source: anyhow::Error,
    },

    /// The constructor returned a handle, but the handle reports
    /// not-ready.  Treated identically to a construction failure.
    #[error("{category}/{provider}: constructed handle reports not ready")]
    Verification {
        category: ServiceCategory,
        provider: String,
    },

    /// The constructor exceeded the configured construction timeout.
    #[error("{category}/{provider}: construction timed out after {seconds}s")]
    Timeout {
        category: ServiceCategory,
        provider: String,
        seconds: u64,
    },
}

impl BootstrapError {
    /// Short stable name for the failure kind, used as a metric label.
    pub fn kind(&self) -> &'static str {
        match self {
            BootstrapError::Configuration { .. } => "configuration",
            BootstrapError::UnsupportedProvider { .. } => "unsupported_provider",
            BootstrapError::Construction { .. } => "construction",
            BootstrapError::Verification { .. } => "verification",
            BootstrapError::Timeout { .. } => "timeout",
        }
    }

    /// The category the failure belongs to.
    pub fn category(&self) -> ServiceCategory {
        match self {
            BootstrapError::Configuration { category, .. }
            | BootstrapError::UnsupportedProvider { category, .. }
            | BootstrapError::Construction { category, .. }
            | BootstrapError::Verification { category, .. }
            | BootstrapError::Timeout { category, .. } => *category,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_names_all_missing_keys() {
        let err = BootstrapError::Configuration {
            category: ServiceCategory::Database,
            provider: "MongoDB".to_string(),
            missing: vec!["MONGODB_PASSWORD".to_string(), "MONGODB_DATABASE".to_string()],
        };
        let rendered = err.to_string();
        assert!(rendered.contains("MONGODB_PASSWORD"));
        assert!(rendered.contains("MONGODB_DATABASE"));
        assert_eq!(err.kind(), "configuration");
    }

    #[test]
    fn test_kind_labels_are_stable() {
        let err = BootstrapError::Verification {
            category: ServiceCategory::Logging,
            provider: "Azure".to_string(),
        };
        assert_eq!(err.kind(), "verification");
        assert_eq!(err.category(), ServiceCategory::Logging);
    }
}
