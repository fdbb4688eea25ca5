//! Trace service: records timed spans with a distributed tracing
//! backend.
//!
//! Provider: GC (Cloud Trace v2 batchWrite REST API).

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::gc_auth::GcTokenProvider;
use super::{Service, PROVIDER_GC};
use crate::config::BootstrapEnv;

/// Cloud Trace v2 API base URL.
const CLOUD_TRACE_API_BASE: &str = "https://cloudtrace.googleapis.com/v2";

/// Async span recording contract.
pub trait TraceService: Service {
    /// Record one completed span.
    fn record_span(
        &self,
        name: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>>;
}

/// Generate a random lowercase-hex id of `N` raw bytes.
fn random_hex_id<const N: usize>() -> String {
    let bytes: [u8; N] = rand::random();
    hex::encode(bytes)
}

// -- GC / Cloud Trace ---------------------------------------------------------

/// Cloud-Trace-backed span recorder.
pub struct CloudTrace {
    client: reqwest::Client,
    project: String,
    source: String,
    token: GcTokenProvider,
}

impl CloudTrace {
    pub async fn new(env: &BootstrapEnv) -> anyhow::Result<Self> {
        let project = env.env.require("GOOGLE_CLOUD_PROJECT_ID")?.to_string();
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {e}"))?;
        let token = GcTokenProvider::from_env(client.clone(), &env.env, "GOOGLE_PLAIN_CREDENTIALS");
        let source = env.program_id();

        info!("Cloud Trace handle initialized: project={project}");

        Ok(Self {
            client,
            project,
            source,
            token,
        })
    }
}

impl Service for CloudTrace {
    fn provider(&self) -> &'static str {
        PROVIDER_GC
    }

    fn ready(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        Box::pin(async move { self.token.access_token().await.is_ok() })
    }
}

impl TraceService for CloudTrace {
    fn record_span(
        &self,
        name: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        // Cloud Trace ids: 32 hex chars for the trace, 16 for the span.
        let trace_id = random_hex_id::<16>();
        let span_id = random_hex_id::<8>();
        let display_name = format!("{}: {}", self.source, name);
        Box::pin(async move {
            let token = self.token.access_token().await?;
            let span_name = format!(
                "projects/{}/traces/{trace_id}/spans/{span_id}",
                self.project
            );
            let body = serde_json::json!({
                "spans": [{
                    "name": span_name,
                    "spanId": span_id,
                    "displayName": { "value": display_name },
                    "startTime": start.to_rfc3339(),
                    "endTime": end.to_rfc3339(),
                }]
            });

            debug!("Cloud Trace batchWrite: {span_name}");

            let url = format!(
                "{CLOUD_TRACE_API_BASE}/projects/{}/traces:batchWrite",
                self.project
            );
            let resp = self
                .client
                .post(&url)
                .bearer_auth(token)
                .json(&body)
                .send()
                .await
                .map_err(|e| anyhow::anyhow!("Cloud Trace batchWrite request failed: {e}"))?;

            if !resp.status().is_success() {
                let status = resp.status();
                let text = resp.text().await.unwrap_or_default();
                return Err(anyhow::anyhow!(
                    "Cloud Trace batchWrite failed ({status}): {text}"
                ));
            }
            Ok(())
        })
    }
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_id_is_32_hex_chars() {
        let id = random_hex_id::<16>();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_span_id_is_16_hex_chars() {
        let id = random_hex_id::<8>();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_ids_are_not_repeated() {
        assert_ne!(random_hex_id::<16>(), random_hex_id::<16>());
    }
}
