//! Logging service: delivers diagnostic records to a cloud backend.
//!
//! Providers: AWS (CloudWatch Logs), Azure (Application Insights track
//! endpoint), GC (Cloud Logging REST API).  Once the orchestrator
//! promotes a Ready handle of this category, every later bootstrap
//! diagnostic flows through it.

use std::future::Future;
use std::pin::Pin;

use tracing::{debug, info};

use super::gc_auth::GcTokenProvider;
use super::{aws_auth, Service, PROVIDER_AWS, PROVIDER_AZURE, PROVIDER_GC};
use crate::config::BootstrapEnv;
use crate::diag::{DiagnosticRecord, Severity};

/// Application Insights ingestion endpoint.
const APPINSIGHTS_TRACK_URL: &str = "https://dc.services.visualstudio.com/v2/track";

/// Cloud Logging write endpoint.
const CLOUD_LOGGING_WRITE_URL: &str = "https://logging.googleapis.com/v2/entries:write";

/// Async diagnostic delivery contract.
pub trait LoggingService: Service {
    /// Deliver one record to the backend.  An error here is caught by
    /// the diagnostic router, which re-emits via the fallback sink.
    fn log(
        &self,
        record: &DiagnosticRecord,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>>;
}

// -- AWS / CloudWatch Logs ----------------------------------------------------

/// CloudWatch-Logs-backed logging handle.
pub struct CloudWatchLogging {
    client: aws_sdk_cloudwatchlogs::Client,
    log_group: String,
    log_stream: String,
}

impl CloudWatchLogging {
    pub async fn new(env: &BootstrapEnv) -> anyhow::Result<Self> {
        let config = aws_auth::sdk_config(&env.env).await?;
        let client = aws_sdk_cloudwatchlogs::Client::new(&config);
        let log_group = env.config.services.logging.log_group.clone();
        let log_stream = env.config.services.logging.log_stream.clone();

        // Ensure the stream exists; an already-existing stream is fine.
        if let Err(e) = client
            .create_log_stream()
            .log_group_name(&log_group)
            .log_stream_name(&log_stream)
            .send()
            .await
        {
            let service_err = e.into_service_error();
            if !service_err.is_resource_already_exists_exception() {
                return Err(anyhow::anyhow!(
                    "CloudWatch create_log_stream: {service_err}"
                ));
            }
        }

        info!("CloudWatch logging handle initialized: group={log_group} stream={log_stream}");

        Ok(Self {
            client,
            log_group,
            log_stream,
        })
    }
}

impl Service for CloudWatchLogging {
    fn provider(&self) -> &'static str {
        PROVIDER_AWS
    }

    fn ready(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        Box::pin(async move {
            self.client
                .describe_log_streams()
                .log_group_name(&self.log_group)
                .limit(1)
                .send()
                .await
                .is_ok()
        })
    }
}

impl LoggingService for CloudWatchLogging {
    fn log(
        &self,
        record: &DiagnosticRecord,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        let message = format!(
            "[{}] [{}/{}] {}",
            record.severity.as_str(),
            record.source,
            record.phase,
            record.message
        );
        let timestamp_ms = record.timestamp.timestamp_millis();
        Box::pin(async move {
            let event = aws_sdk_cloudwatchlogs::types::InputLogEvent::builder()
                .timestamp(timestamp_ms)
                .message(message)
                .build()
                .map_err(|e| anyhow::anyhow!("CloudWatch event build: {e}"))?;

            debug!(
                "CloudWatch put_log_events: group={} stream={}",
                self.log_group, self.log_stream
            );

            self.client
                .put_log_events()
                .log_group_name(&self.log_group)
                .log_stream_name(&self.log_stream)
                .log_events(event)
                .send()
                .await
                .map_err(|e| anyhow::anyhow!("CloudWatch put_log_events: {e}"))?;
            Ok(())
        })
    }
}

// -- Azure / Application Insights ---------------------------------------------

/// Map a diagnostic severity to the Application Insights numeric level.
fn appinsights_severity_level(severity: Severity) -> u8 {
    match severity {
        Severity::Critical => 4,
        Severity::Error => 3,
        Severity::Warning => 2,
        Severity::Info => 1,
    }
}

/// Build one Application Insights message envelope.
fn appinsights_envelope(instrumentation_key: &str, record: &DiagnosticRecord) -> serde_json::Value {
    serde_json::json!([{
        "name": "Microsoft.ApplicationInsights.Message",
        "time": record.timestamp.to_rfc3339(),
        "iKey": instrumentation_key,
        "data": {
            "baseType": "MessageData",
            "baseData": {
                "message": record.message,
                "severityLevel": appinsights_severity_level(record.severity),
                "properties": {
                    "source": record.source,
                    "phase": record.phase,
                },
            },
        },
    }])
}

/// Application-Insights-backed logging handle.  Authentication is the
/// instrumentation key itself; no token exchange is involved.
pub struct AppInsightsLogging {
    client: reqwest::Client,
    instrumentation_key: String,
}

impl AppInsightsLogging {
    pub async fn new(env: &BootstrapEnv) -> anyhow::Result<Self> {
        let instrumentation_key = env.env.require("APPINSIGHTS_INSTRUMENTATIONKEY")?.to_string();
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {e}"))?;

        info!("Application Insights logging handle initialized");

        Ok(Self {
            client,
            instrumentation_key,
        })
    }

    async fn track(&self, envelope: &serde_json::Value) -> anyhow::Result<()> {
        let resp = self
            .client
            .post(APPINSIGHTS_TRACK_URL)
            .json(envelope)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("App Insights track request failed: {e}"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("App Insights track failed ({status}): {text}"));
        }
        Ok(())
    }
}

impl Service for AppInsightsLogging {
    fn provider(&self) -> &'static str {
        PROVIDER_AZURE
    }

    fn ready(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        Box::pin(async move {
            // The track endpoint has no side-effect-free probe; send a
            // verbose readiness message and check acceptance.
            let probe = DiagnosticRecord {
                severity: Severity::Info,
                message: "readiness probe".to_string(),
                source: "cloudbind".to_string(),
                phase: "Initialization".to_string(),
                timestamp: chrono::Utc::now(),
            };
            let envelope = appinsights_envelope(&self.instrumentation_key, &probe);
            self.track(&envelope).await.is_ok()
        })
    }
}

impl LoggingService for AppInsightsLogging {
    fn log(
        &self,
        record: &DiagnosticRecord,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        let envelope = appinsights_envelope(&self.instrumentation_key, record);
        Box::pin(async move {
            debug!("App Insights track: {}", APPINSIGHTS_TRACK_URL);
            self.track(&envelope).await
        })
    }
}

// -- GC / Cloud Logging -------------------------------------------------------

/// Map a diagnostic severity to a Cloud Logging severity string.
fn cloud_logging_severity(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "CRITICAL",
        Severity::Error => "ERROR",
        Severity::Warning => "WARNING",
        Severity::Info => "INFO",
    }
}

/// Cloud-Logging-backed logging handle.
pub struct CloudLoggingService {
    client: reqwest::Client,
    project: String,
    log_id: String,
    token: GcTokenProvider,
}

impl CloudLoggingService {
    pub async fn new(env: &BootstrapEnv) -> anyhow::Result<Self> {
        let project = env.env.require("GOOGLE_CLOUD_PROJECT_ID")?.to_string();
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {e}"))?;
        let token = GcTokenProvider::from_env(client.clone(), &env.env, "GOOGLE_PLAIN_CREDENTIALS");
        let log_id = env.config.services.logging.log_id.clone();

        info!("Cloud Logging handle initialized: project={project} log={log_id}");

        Ok(Self {
            client,
            project,
            log_id,
            token,
        })
    }
}

impl Service for CloudLoggingService {
    fn provider(&self) -> &'static str {
        PROVIDER_GC
    }

    fn ready(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        Box::pin(async move { self.token.access_token().await.is_ok() })
    }
}

impl LoggingService for CloudLoggingService {
    fn log(
        &self,
        record: &DiagnosticRecord,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        let body = serde_json::json!({
            "entries": [{
                "logName": format!("projects/{}/logs/{}", self.project, self.log_id),
                "severity": cloud_logging_severity(record.severity),
                "textPayload": record.message,
                "timestamp": record.timestamp.to_rfc3339(),
                "labels": {
                    "source": record.source,
                    "phase": record.phase,
                },
                "resource": { "type": "global" },
            }]
        });
        Box::pin(async move {
            let token = self.token.access_token().await?;

            debug!("Cloud Logging entries:write: project={}", self.project);

            let resp = self
                .client
                .post(CLOUD_LOGGING_WRITE_URL)
                .bearer_auth(token)
                .json(&body)
                .send()
                .await
                .map_err(|e| anyhow::anyhow!("Cloud Logging write request failed: {e}"))?;

            if !resp.status().is_success() {
                let status = resp.status();
                let text = resp.text().await.unwrap_or_default();
                return Err(anyhow::anyhow!("Cloud Logging write failed ({status}): {text}"));
            }
            Ok(())
        })
    }
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> DiagnosticRecord {
        DiagnosticRecord {
            severity: Severity::Critical,
            message: "database/AWS: construction failed".to_string(),
            source: "widget-api".to_string(),
            phase: "Initialization".to_string(),
            timestamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_appinsights_envelope_shape() {
        let envelope = appinsights_envelope("ikey-123", &sample_record());
        let item = &envelope[0];
        assert_eq!(item["name"], "Microsoft.ApplicationInsights.Message");
        assert_eq!(item["iKey"], "ikey-123");
        assert_eq!(item["data"]["baseType"], "MessageData");
        assert_eq!(item["data"]["baseData"]["severityLevel"], 4);
        assert_eq!(item["data"]["baseData"]["properties"]["source"], "widget-api");
        assert_eq!(
            item["data"]["baseData"]["properties"]["phase"],
            "Initialization"
        );
    }

    #[test]
    fn test_severity_mappings() {
        assert_eq!(appinsights_severity_level(Severity::Critical), 4);
        assert_eq!(appinsights_severity_level(Severity::Info), 1);
        assert_eq!(cloud_logging_severity(Severity::Critical), "CRITICAL");
        assert_eq!(cloud_logging_severity(Severity::Warning), "WARNING");
    }
}
