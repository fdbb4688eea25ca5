//! VM service: lifecycle control over named compute instances.
//!
//! Providers: Azure (ARM REST API with a client-credentials AAD token)
//! and GC (Compute Engine v1 REST API).

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::gc_auth::GcTokenProvider;
use super::{Service, PROVIDER_AZURE, PROVIDER_GC};
use crate::config::BootstrapEnv;

/// ARM compute API version.
const ARM_COMPUTE_API_VERSION: &str = "2024-03-01";

/// Compute Engine v1 API base URL.
const GC_COMPUTE_API_BASE: &str = "https://compute.googleapis.com/compute/v1";

/// Async VM lifecycle contract.
pub trait VmService: Service {
    /// Start the named instance.
    fn start_instance(
        &self,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>>;

    /// Stop (deallocate) the named instance.
    fn stop_instance(
        &self,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>>;

    /// Report the backend's status string for the named instance.
    fn instance_status(
        &self,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + '_>>;
}

// -- Azure / ARM --------------------------------------------------------------

/// Cached AAD access token with expiry.
struct CachedAadToken {
    access_token: String,
    expiry: Instant,
}

/// Build the ARM URL for a VM operation.  `action` is empty for the
/// resource itself, or a sub-path like "/start".
fn arm_vm_url(subscription: &str, resource_group: &str, name: &str, action: &str) -> String {
    format!(
        "https://management.azure.com/subscriptions/{subscription}/resourceGroups/{resource_group}\
         /providers/Microsoft.Compute/virtualMachines/{name}{action}?api-version={ARM_COMPUTE_API_VERSION}"
    )
}

/// ARM-backed VM handle using the client-credentials flow.
pub struct AzureComputeVm {
    client: reqwest::Client,
    client_id: String,
    client_secret: String,
    tenant_id: String,
    subscription_id: String,
    resource_group: String,
    token_cache: Mutex<Option<CachedAadToken>>,
}

impl AzureComputeVm {
    pub async fn new(env: &BootstrapEnv) -> anyhow::Result<Self> {
        let client_id = env.env.require("AZ_CLIENT_ID")?.to_string();
        let client_secret = env.env.require("AZ_CLIENT_SECRET")?.to_string();
        let tenant_id = env.env.require("AZ_TENANT_ID")?.to_string();
        let resource_group = env.env.require("AZ_RESOURCE_GROUP_NAME")?.to_string();

        let subscription_id = env.config.services.vm.subscription_id.clone();
        if subscription_id.is_empty() {
            anyhow::bail!("No Azure subscription id configured for the VM service");
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {e}"))?;

        info!(
            "Azure VM handle initialized: subscription={subscription_id} group={resource_group}"
        );

        Ok(Self {
            client,
            client_id,
            client_secret,
            tenant_id,
            subscription_id,
            resource_group,
            token_cache: Mutex::new(None),
        })
    }

    /// Return a valid management-scope AAD token, from cache when
    /// possible.
    async fn access_token(&self) -> anyhow::Result<String> {
        {
            let cache = self.token_cache.lock().expect("token cache mutex poisoned");
            if let Some(ref cached) = *cache {
                if cached.expiry > Instant::now() {
                    return Ok(cached.access_token.clone());
                }
            }
        }

        let url = format!(
            "https://login.microsoftonline.com/{}/oauth2/v2.0/token",
            self.tenant_id
        );

        debug!("AAD token request: tenant={}", self.tenant_id);

        let resp = self
            .client
            .post(&url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("scope", "https://management.azure.com/.default"),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("AAD token request failed: {e}"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("AAD token request failed ({status}): {body}"));
        }

        let token_resp: serde_json::Value = resp.json().await?;
        let access_token = token_resp
            .get("access_token")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("No access_token in AAD response"))?
            .to_string();
        let expires_in = token_resp
            .get("expires_in")
            .and_then(|v| v.as_u64())
            .unwrap_or(3600);

        // Cache with 60s safety margin.
        let expiry = Instant::now() + Duration::from_secs(expires_in.saturating_sub(60));
        {
            let mut cache = self.token_cache.lock().expect("token cache mutex poisoned");
            *cache = Some(CachedAadToken {
                access_token: access_token.clone(),
                expiry,
            });
        }

        Ok(access_token)
    }

    /// POST an empty-bodied lifecycle action to ARM.
    async fn post_action(&self, name: &str, action: &str) -> anyhow::Result<()> {
        let token = self.access_token().await?;
        let url = arm_vm_url(&self.subscription_id, &self.resource_group, name, action);

        debug!("ARM POST: {url}");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(token)
            .header("content-length", 0)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("ARM request failed: {e}"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("ARM {action} failed ({status}): {body}"));
        }
        Ok(())
    }
}

impl Service for AzureComputeVm {
    fn provider(&self) -> &'static str {
        PROVIDER_AZURE
    }

    fn ready(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        Box::pin(async move { self.access_token().await.is_ok() })
    }
}

impl VmService for AzureComputeVm {
    fn start_instance(
        &self,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        let name = name.to_string();
        Box::pin(async move { self.post_action(&name, "/start").await })
    }

    fn stop_instance(
        &self,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        let name = name.to_string();
        // Deallocate rather than power-off so compute stops billing.
        Box::pin(async move { self.post_action(&name, "/deallocate").await })
    }

    fn instance_status(
        &self,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + '_>> {
        let name = name.to_string();
        Box::pin(async move {
            let token = self.access_token().await?;
            let url = arm_vm_url(
                &self.subscription_id,
                &self.resource_group,
                &name,
                "/instanceView",
            );

            debug!("ARM instanceView: {url}");

            let resp = self
                .client
                .get(&url)
                .bearer_auth(token)
                .send()
                .await
                .map_err(|e| anyhow::anyhow!("ARM request failed: {e}"))?;

            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                return Err(anyhow::anyhow!("ARM instanceView failed ({status}): {body}"));
            }

            let view: serde_json::Value = resp.json().await?;
            let power_state = view
                .get("statuses")
                .and_then(|v| v.as_array())
                .and_then(|statuses| {
                    statuses.iter().find_map(|s| {
                        s.get("code")
                            .and_then(|c| c.as_str())
                            .filter(|c| c.starts_with("PowerState/"))
                    })
                })
                .unwrap_or("unknown");

            Ok(power_state
                .strip_prefix("PowerState/")
                .unwrap_or(power_state)
                .to_string())
        })
    }
}

// -- GC / Compute Engine ------------------------------------------------------

/// Build the Compute Engine URL for an instance operation.
fn gc_instance_url(project: &str, zone: &str, name: &str, action: &str) -> String {
    format!("{GC_COMPUTE_API_BASE}/projects/{project}/zones/{zone}/instances/{name}{action}")
}

/// Compute-Engine-backed VM handle.
pub struct GcComputeVm {
    client: reqwest::Client,
    project: String,
    zone: String,
    token: GcTokenProvider,
}

impl GcComputeVm {
    pub async fn new(env: &BootstrapEnv) -> anyhow::Result<Self> {
        let project = env.env.require("GOOGLE_CLOUD_PROJECT_ID")?.to_string();
        let zone = env.env.require("GOOGLE_CLOUD_COMPUTE_ZONE")?.to_string();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {e}"))?;
        let token = GcTokenProvider::from_env(client.clone(), &env.env, "GOOGLE_PLAIN_CREDENTIALS");

        info!("GC VM handle initialized: project={project} zone={zone}");

        Ok(Self {
            client,
            project,
            zone,
            token,
        })
    }

    /// POST an empty-bodied lifecycle action to the Compute API.
    async fn post_action(&self, name: &str, action: &str) -> anyhow::Result<()> {
        let token = self.token.access_token().await?;
        let url = gc_instance_url(&self.project, &self.zone, name, action);

        debug!("Compute POST: {url}");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Compute request failed: {e}"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Compute {action} failed ({status}): {body}"));
        }
        Ok(())
    }
}

impl Service for GcComputeVm {
    fn provider(&self) -> &'static str {
        PROVIDER_GC
    }

    fn ready(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        Box::pin(async move { self.token.access_token().await.is_ok() })
    }
}

impl VmService for GcComputeVm {
    fn start_instance(
        &self,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        let name = name.to_string();
        Box::pin(async move { self.post_action(&name, "/start").await })
    }

    fn stop_instance(
        &self,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        let name = name.to_string();
        Box::pin(async move { self.post_action(&name, "/stop").await })
    }

    fn instance_status(
        &self,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + '_>> {
        let name = name.to_string();
        Box::pin(async move {
            let token = self.token.access_token().await?;
            let url = gc_instance_url(&self.project, &self.zone, &name, "");

            debug!("Compute GET: {url}");

            let resp = self
                .client
                .get(&url)
                .bearer_auth(token)
                .send()
                .await
                .map_err(|e| anyhow::anyhow!("Compute request failed: {e}"))?;

            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                return Err(anyhow::anyhow!("Compute get instance failed ({status}): {body}"));
            }

            let instance: serde_json::Value = resp.json().await?;
            Ok(instance
                .get("status")
                .and_then(|v| v.as_str())
                .unwrap_or("UNKNOWN")
                .to_string())
        })
    }
}

// -- Tests -------------------------------------------------------------------
