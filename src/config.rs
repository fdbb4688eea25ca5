//! Configuration loading and types for cloudbind.
//!
//! Two sources of configuration exist and are deliberately kept apart:
//! a YAML file deserialized into [`Config`] selects *which* provider
//! backs each service category and carries per-service settings, while
//! credentials are read exclusively from process environment variables
//! captured once into an immutable [`EnvironmentMap`] snapshot.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::errors::BootstrapError;
use crate::services::ServiceCategory;

/// Environment variable carrying the program identifier.  Supplies the
/// diagnostic `source` tag and is a required variable for Tracing/GC
/// and both VM providers.
pub const PROGRAM_ID_VAR: &str = "PROGRAM_ID";

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Program name, used as the diagnostic source tag when
    /// `PROGRAM_ID` is not set in the environment.
    #[serde(default = "default_program")]
    pub program: String,

    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Bootstrap orchestration settings.
    #[serde(default)]
    pub bootstrap: BootstrapConfig,

    /// Per-category provider selection and settings.
    #[serde(default)]
    pub services: ServicesConfig,

    /// Logging settings for the process-local tracing subscriber.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            program: default_program(),
            server: ServerConfig::default(),
            bootstrap: BootstrapConfig::default(),
            services: ServicesConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind host address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Server name used by the permanent-redirect endpoint
    /// (scheme + authority, no trailing slash).
    #[serde(default = "default_public_url")]
    pub public_url: String,

    /// Target path the permanent-redirect endpoint points at.
    #[serde(default = "default_redirect_path")]
    pub redirect_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: default_public_url(),
            redirect_path: default_redirect_path(),
        }
    }
}

/// Bootstrap orchestration settings.
#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapConfig {
    /// Upper bound on a single provider construction, in seconds.
    /// A constructor that exceeds it fails the category.
    #[serde(default = "default_construct_timeout")]
    pub construct_timeout_seconds: u64,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            construct_timeout_seconds: default_construct_timeout(),
        }
    }
}

/// Logging configuration for the tracing subscriber.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Per-category provider selection.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ServicesConfig {
    #[serde(default)]
    pub database: DatabaseServiceConfig,
    #[serde(default)]
    pub file_storage: FileStorageServiceConfig,
    #[serde(default)]
    pub logging: LoggingServiceConfig,
    #[serde(default)]
    pub pubsub: PubSubServiceConfig,
    #[serde(default)]
    pub tracing: TracingServiceConfig,
    #[serde(default)]
    pub vm: VmServiceConfig,
}

/// The provider selection a category resolved to.  Fixed before
/// construction begins and never re-decided at runtime.
#[derive(Debug, Clone, Copy)]
pub struct CategorySelection<'a> {
    /// Whether the category is requested at all.
    pub enabled: bool,
    /// The selected provider identifier.
    pub provider: &'a str,
    /// Whether a failure of this category should abort startup
    /// (enforced by the caller, not the orchestrator).
    pub required: bool,
}

/// Database category selection and settings.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseServiceConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Provider: `AWS`, `GC`, or `MongoDB`.
    #[serde(default = "default_provider_aws")]
    pub provider: String,
    #[serde(default = "default_true")]
    pub required: bool,
    /// DynamoDB table name (AWS provider).
    #[serde(default = "default_database_table")]
    pub table: String,
}

impl Default for DatabaseServiceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_provider_aws(),
            required: default_true(),
            table: default_database_table(),
        }
    }
}

/// File storage category selection and settings.
#[derive(Debug, Clone, Deserialize)]
pub struct FileStorageServiceConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Provider: `AWS` or `GC`.
    #[serde(default = "default_provider_aws")]
    pub provider: String,
    #[serde(default = "default_true")]
    pub required: bool,
    /// Backing bucket name.
    #[serde(default = "default_storage_bucket")]
    pub bucket: String,
    /// Key prefix inside the backing bucket.
    #[serde(default)]
    pub prefix: String,
}

impl Default for FileStorageServiceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_provider_aws(),
            required: default_true(),
            bucket: default_storage_bucket(),
            prefix: String::new(),
        }
    }
}

/// Logging category selection and settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingServiceConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Provider: `AWS`, `Azure`, or `GC`.
    #[serde(default = "default_provider_aws")]
    pub provider: String,
    #[serde(default = "default_true")]
    pub required: bool,
    /// CloudWatch log group (AWS provider).
    #[serde(default = "default_log_group")]
    pub log_group: String,
    /// CloudWatch log stream (AWS provider).
    #[serde(default = "default_log_stream")]
    pub log_stream: String,
    /// Cloud Logging log id (GC provider).
    #[serde(default = "default_log_id")]
    pub log_id: String,
}

impl Default for LoggingServiceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_provider_aws(),
            required: default_true(),
            log_group: default_log_group(),
            log_stream: default_log_stream(),
            log_id: default_log_id(),
        }
    }
}

/// Pub/sub category selection and settings.
#[derive(Debug, Clone, Deserialize)]
pub struct PubSubServiceConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Provider: `AWS`.
    #[serde(default = "default_provider_aws")]
    pub provider: String,
    #[serde(default = "default_true")]
    pub required: bool,
    /// SNS topic ARN messages are published to.
    #[serde(default)]
    pub topic_arn: String,
}

impl Default for PubSubServiceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_provider_aws(),
            required: default_true(),
            topic_arn: String::new(),
        }
    }
}

/// Tracing category selection.
#[derive(Debug, Clone, Deserialize)]
pub struct TracingServiceConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Provider: `GC`.
    #[serde(default = "default_provider_gc")]
    pub provider: String,
    #[serde(default = "default_true")]
    pub required: bool,
}

impl Default for TracingServiceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_provider_gc(),
            required: default_true(),
        }
    }
}

/// VM management category selection and settings.
#[derive(Debug, Clone, Deserialize)]
pub struct VmServiceConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Provider: `Azure` or `GC`.
    #[serde(default = "default_provider_gc")]
    pub provider: String,
    #[serde(default = "default_true")]
    pub required: bool,
    /// Azure subscription the resource group lives in (Azure provider).
    #[serde(default)]
    pub subscription_id: String,
}

impl Default for VmServiceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_provider_gc(),
            required: default_true(),
            subscription_id: String::new(),
        }
    }
}

impl Config {
    /// The fixed provider selection for a category.
    pub fn selection(&self, category: ServiceCategory) -> CategorySelection<'_> {
        match category {
            ServiceCategory::Database => CategorySelection {
                enabled: self.services.database.enabled,
                provider: &self.services.database.provider,
                required: self.services.database.required,
            },
            ServiceCategory::FileStorage => CategorySelection {
                enabled: self.services.file_storage.enabled,
                provider: &self.services.file_storage.provider,
                required: self.services.file_storage.required,
            },
            ServiceCategory::Logging => CategorySelection {
                enabled: self.services.logging.enabled,
                provider: &self.services.logging.provider,
                required: self.services.logging.required,
            },
            ServiceCategory::PubSub => CategorySelection {
                enabled: self.services.pubsub.enabled,
                provider: &self.services.pubsub.provider,
                required: self.services.pubsub.required,
            },
            ServiceCategory::Tracing => CategorySelection {
                enabled: self.services.tracing.enabled,
                provider: &self.services.tracing.provider,
                required: self.services.tracing.required,
            },
            ServiceCategory::Vm => CategorySelection {
                enabled: self.services.vm.enabled,
                provider: &self.services.vm.provider,
                required: self.services.vm.required,
            },
        }
    }
}

// -- Defaults ----------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_program() -> String {
    "cloudbind".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_public_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_redirect_path() -> String {
    "/docs".to_string()
}

fn default_construct_timeout() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_provider_aws() -> String {
    "AWS".to_string()
}

fn default_provider_gc() -> String {
    "GC".to_string()
}

fn default_database_table() -> String {
    "cloudbind_records".to_string()
}

fn default_storage_bucket() -> String {
    "cloudbind-files".to_string()
}

fn default_log_group() -> String {
    "/cloudbind/diagnostics".to_string()
}

fn default_log_stream() -> String {
    "bootstrap".to_string()
}

fn default_log_id() -> String {
    "cloudbind".to_string()
}

// -- Loader ------------------------------------------------------------------

/// Load and parse configuration from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let config: Config = serde_yaml::from_str(&contents)?;
    Ok(config)
}

/// Everything a provider constructor is allowed to see: the parsed
/// configuration plus the immutable environment snapshot.  Both are
/// written only during startup and read-only afterward.
#[derive(Debug, Clone)]
pub struct BootstrapEnv {
    pub config: Config,
    pub env: EnvironmentMap,
}

impl BootstrapEnv {
    /// Program identifier used as the diagnostic source tag.  The
    /// `PROGRAM_ID` environment variable wins over the config value.
    pub fn program_id(&self) -> String {
        self.env
            .get(PROGRAM_ID_VAR)
            .map(str::to_string)
            .unwrap_or_else(|| self.config.program.clone())
    }
}

// -- Environment snapshot ----------------------------------------------------

/// A required environment variable entry: either a single name, or a
/// set of alternatives of which at least one must be present.
#[derive(Debug, Clone, Copy)]
pub enum RequiredVar {
    One(&'static str),
    AnyOf(&'static [&'static str]),
}

const AWS_CREDENTIAL_VARS: &[RequiredVar] = &[
    RequiredVar::One("AWS_ACCESS_KEY"),
    RequiredVar::One("AWS_SECRET_KEY"),
    RequiredVar::One("AWS_REGION"),
];

const GC_DATABASE_VARS: &[RequiredVar] = &[
    RequiredVar::One("GOOGLE_CLOUD_PROJECT_ID"),
    RequiredVar::AnyOf(&["GOOGLE_APPLICATION_CREDENTIALS", "GOOGLE_PLAIN_CREDENTIALS"]),
];

const GC_STORAGE_VARS: &[RequiredVar] = &[
    RequiredVar::One("GOOGLE_CLOUD_PROJECT_ID"),
    RequiredVar::AnyOf(&["GOOGLE_APPLICATION_CREDENTIALS", "GOOGLE_CREDENTIALS"]),
];

const MONGODB_VARS: &[RequiredVar] = &[
    RequiredVar::One("MONGODB_CONNECTION_STRING"),
    RequiredVar::One("MONGODB_PASSWORD"),
    RequiredVar::One("MONGODB_DATABASE"),
];

const AZURE_LOGGING_VARS: &[RequiredVar] = &[RequiredVar::One("APPINSIGHTS_INSTRUMENTATIONKEY")];

const GC_TRACING_VARS: &[RequiredVar] = &[
    RequiredVar::One("GOOGLE_CLOUD_PROJECT_ID"),
    RequiredVar::AnyOf(&["GOOGLE_APPLICATION_CREDENTIALS", "GOOGLE_PLAIN_CREDENTIALS"]),
    RequiredVar::One(PROGRAM_ID_VAR),
];

const AZURE_VM_VARS: &[RequiredVar] = &[
    RequiredVar::One("AZ_CLIENT_ID"),
    RequiredVar::One("AZ_CLIENT_SECRET"),
    RequiredVar::One("AZ_TENANT_ID"),
    RequiredVar::One("AZ_RESOURCE_GROUP_NAME"),
    RequiredVar::One(PROGRAM_ID_VAR),
];

const GC_VM_VARS: &[RequiredVar] = &[
    RequiredVar::One(PROGRAM_ID_VAR),
    RequiredVar::One("GOOGLE_CLOUD_PROJECT_ID"),
    RequiredVar::One("GOOGLE_CLOUD_COMPUTE_ZONE"),
];

/// The ordered set of environment variables that must be present and
/// non-empty before construction of `(category, provider)` is
/// attempted.  `None` means the pair is not supported at all.
pub fn required_vars(category: ServiceCategory, provider: &str) -> Option<&'static [RequiredVar]> {
    match (category, provider) {
        (ServiceCategory::Database, "AWS") => Some(AWS_CREDENTIAL_VARS),
        (ServiceCategory::Database, "GC") => Some(GC_DATABASE_VARS),
        (ServiceCategory::Database, "MongoDB") => Some(MONGODB_VARS),
        (ServiceCategory::FileStorage, "AWS") => Some(AWS_CREDENTIAL_VARS),
        (ServiceCategory::FileStorage, "GC") => Some(GC_STORAGE_VARS),
        (ServiceCategory::Logging, "AWS") => Some(AWS_CREDENTIAL_VARS),
        (ServiceCategory::Logging, "Azure") => Some(AZURE_LOGGING_VARS),
        (ServiceCategory::Logging, "GC") => Some(GC_DATABASE_VARS),
        (ServiceCategory::PubSub, "AWS") => Some(AWS_CREDENTIAL_VARS),
        (ServiceCategory::Tracing, "GC") => Some(GC_TRACING_VARS),
        (ServiceCategory::Vm, "Azure") => Some(AZURE_VM_VARS),
        (ServiceCategory::Vm, "GC") => Some(GC_VM_VARS),
        _ => None,
    }
}

/// Immutable snapshot of the process environment.
///
/// Captured once at startup; keys are case-sensitive.  Validation is
/// deterministic: the same snapshot always yields the same result.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentMap {
    vars: HashMap<String, String>,
}

impl EnvironmentMap {
    /// Capture the current process environment.
    pub fn capture() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    /// Build a snapshot from explicit pairs (used by tests).
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Look up a variable.  Empty values are indistinguishable from
    /// absent ones: both are treated as missing.
    pub fn get(&self, key: &str) -> Option<&str> {
        match self.vars.get(key) {
            Some(v) if !v.is_empty() => Some(v.as_str()),
            _ => None,
        }
    }

    /// Look up a variable, erroring when missing or empty.  Used by
    /// provider constructors, which run only after validation.
    pub fn require(&self, key: &str) -> anyhow::Result<&str> {
        self.get(key)
            .ok_or_else(|| anyhow::anyhow!("environment variable {key} is missing or empty"))
    }

    /// Check that every variable required by `(category, provider)` is
    /// present and non-empty, reporting all missing names at once.
    pub fn validate(
        &self,
        category: ServiceCategory,
        provider: &str,
    ) -> Result<(), BootstrapError> {
        let Some(required) = required_vars(category, provider) else {
            return Err(BootstrapError::UnsupportedProvider {
                category,
                provider: provider.to_string(),
            });
        };

        let mut missing = Vec::new();
        for var in required {
            match var {
                RequiredVar::One(name) => {
                    if self.get(name).is_none() {
                        missing.push((*name).to_string());
                    }
                }
                RequiredVar::AnyOf(names) => {
                    if !names.iter().any(|name| self.get(name).is_some()) {
                        missing.push(names.join("|"));
                    }
                }
            }
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(BootstrapError::Configuration {
                category,
                provider: provider.to_string(),
                missing,
            })
        }
    }
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_validate_all_present() {
        let env = EnvironmentMap::from_pairs([
            ("AWS_ACCESS_KEY", "ak"),
            ("AWS_SECRET_KEY", "sk"),
            ("AWS_REGION", "us-east-1"),
        ]);
        assert!(env.validate(ServiceCategory::Database, "AWS").is_ok());
        assert!(env.validate(ServiceCategory::PubSub, "AWS").is_ok());
    }

    #[test]
    fn test_validate_reports_all_missing_keys() {
        let env = EnvironmentMap::from_pairs([("AWS_ACCESS_KEY", "ak")]);
        let err = env
            .validate(ServiceCategory::Logging, "AWS")
            .expect_err("validation should fail");
        match err {
            BootstrapError::Configuration { missing, .. } => {
                assert_eq!(missing, vec!["AWS_SECRET_KEY", "AWS_REGION"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_value_counts_as_missing() {
        let env = EnvironmentMap::from_pairs([("APPINSIGHTS_INSTRUMENTATIONKEY", "")]);
        assert!(env.get("APPINSIGHTS_INSTRUMENTATIONKEY").is_none());
        let err = env
            .validate(ServiceCategory::Logging, "Azure")
            .expect_err("empty value must fail validation");
        assert!(matches!(err, BootstrapError::Configuration { .. }));
    }

    #[test]
    fn test_any_of_alternative_satisfies() {
        let env = EnvironmentMap::from_pairs([
            ("GOOGLE_CLOUD_PROJECT_ID", "proj"),
            ("GOOGLE_PLAIN_CREDENTIALS", "{}"),
        ]);
        assert!(env.validate(ServiceCategory::Database, "GC").is_ok());

        // FileStorage/GC accepts a different alternative set.
        let err = env
            .validate(ServiceCategory::FileStorage, "GC")
            .expect_err("GOOGLE_PLAIN_CREDENTIALS does not satisfy FileStorage/GC");
        match err {
            BootstrapError::Configuration { missing, .. } => {
                assert_eq!(
                    missing,
                    vec!["GOOGLE_APPLICATION_CREDENTIALS|GOOGLE_CREDENTIALS"]
                );
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unsupported_pair_rejected_at_validation() {
        let env = EnvironmentMap::from_pairs([("AWS_ACCESS_KEY", "ak")]);
        let err = env
            .validate(ServiceCategory::Vm, "AWS")
            .expect_err("VM has no AWS provider");
        assert!(matches!(err, BootstrapError::UnsupportedProvider { .. }));
    }

    #[test]
    fn test_validation_is_deterministic() {
        let env = EnvironmentMap::from_pairs([("MONGODB_CONNECTION_STRING", "mongodb://h")]);
        let a = env.validate(ServiceCategory::Database, "MongoDB");
        let b = env.validate(ServiceCategory::Database, "MongoDB");
        assert_eq!(a.is_err(), b.is_err());
        assert_eq!(
            a.unwrap_err().to_string(),
            b.unwrap_err().to_string()
        );
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.program, "cloudbind");
        assert_eq!(config.bootstrap.construct_timeout_seconds, 30);
        assert!(!config.selection(ServiceCategory::Database).enabled);
        assert!(config.selection(ServiceCategory::Database).required);
        assert_eq!(config.selection(ServiceCategory::Tracing).provider, "GC");
    }

    #[test]
    fn test_load_config_applies_defaults_for_absent_sections() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            "program: widget-api\nservices:\n  logging:\n    enabled: true\n    provider: Azure\n"
        )
        .expect("write config");

        let config = load_config(file.path()).expect("config should parse");
        assert_eq!(config.program, "widget-api");
        let logging = config.selection(ServiceCategory::Logging);
        assert!(logging.enabled);
        assert_eq!(logging.provider, "Azure");
        // Untouched sections fall back to defaults.
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.services.database.table, "cloudbind_records");
    }
}
