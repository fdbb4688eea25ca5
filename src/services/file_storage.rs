//! File storage service: opaque byte objects under string keys.
//!
//! Providers: AWS (S3 via the SDK) and GC (Cloud Storage JSON API via
//! reqwest).  Both namespace every object under a configured bucket
//! and optional key prefix.

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use tracing::{debug, info};

use super::gc_auth::GcTokenProvider;
use super::{aws_auth, Service, PROVIDER_AWS, PROVIDER_GC};
use crate::config::BootstrapEnv;

/// GCS JSON API base URL.
const GCS_API_BASE: &str = "https://storage.googleapis.com/storage/v1";

/// GCS upload base URL (for media uploads).
const GCS_UPLOAD_BASE: &str = "https://storage.googleapis.com/upload/storage/v1";

/// Async file storage contract.
pub trait FileStorageService: Service {
    /// Write `data` at `key`, overwriting any existing object.
    fn put_file(
        &self,
        key: &str,
        data: Bytes,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>>;

    /// Read the full object at `key`.
    fn fetch_file(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Bytes>> + Send + '_>>;

    /// Delete the object at `key`.
    fn delete_file(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>>;
}

// -- AWS / S3 -----------------------------------------------------------------

/// S3-backed file storage.
pub struct S3FileStorage {
    client: aws_sdk_s3::Client,
    bucket: String,
    prefix: String,
}

impl S3FileStorage {
    pub async fn new(env: &BootstrapEnv) -> anyhow::Result<Self> {
        let config = aws_auth::sdk_config(&env.env).await?;
        let client = aws_sdk_s3::Client::new(&config);
        let bucket = env.config.services.file_storage.bucket.clone();
        let prefix = env.config.services.file_storage.prefix.clone();

        info!("S3 file storage handle initialized: bucket={bucket} prefix='{prefix}'");

        Ok(Self {
            client,
            bucket,
            prefix,
        })
    }

    /// Map a storage key to an S3 object key.
    fn s3_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

impl Service for S3FileStorage {
    fn provider(&self) -> &'static str {
        PROVIDER_AWS
    }

    fn ready(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        Box::pin(async move {
            self.client
                .head_bucket()
                .bucket(&self.bucket)
                .send()
                .await
                .is_ok()
        })
    }
}

impl FileStorageService for S3FileStorage {
    fn put_file(
        &self,
        key: &str,
        data: Bytes,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        let s3_key = self.s3_key(key);
        Box::pin(async move {
            debug!("S3 put_object: bucket={} key={}", self.bucket, s3_key);

            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(&s3_key)
                .body(aws_sdk_s3::primitives::ByteStream::from(data))
                .send()
                .await
                .map_err(|e| anyhow::anyhow!("S3 put_object: {e}"))?;
            Ok(())
        })
    }

    fn fetch_file(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Bytes>> + Send + '_>> {
        let s3_key = self.s3_key(key);
        Box::pin(async move {
            debug!("S3 get_object: bucket={} key={}", self.bucket, s3_key);

            let resp = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(&s3_key)
                .send()
                .await
                .map_err(|e| {
                    let service_err = e.into_service_error();
                    if service_err.is_no_such_key() {
                        anyhow::anyhow!("No object at key: {s3_key}")
                    } else {
                        anyhow::anyhow!("S3 get_object: {service_err}")
                    }
                })?;

            let body = resp
                .body
                .collect()
                .await
                .map_err(|e| anyhow::anyhow!("S3 get_object body: {e}"))?
                .into_bytes();

            Ok(Bytes::from(body.to_vec()))
        })
    }

    fn delete_file(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        let s3_key = self.s3_key(key);
        Box::pin(async move {
            debug!("S3 delete_object: bucket={} key={}", self.bucket, s3_key);

            // delete_object is idempotent -- no error for missing keys.
            self.client
                .delete_object()
                .bucket(&self.bucket)
                .key(&s3_key)
                .send()
                .await
                .map_err(|e| anyhow::anyhow!("S3 delete_object: {e}"))?;
            Ok(())
        })
    }
}

// -- GC / Cloud Storage -------------------------------------------------------

/// Percent-encode a GCS object name for use as a single path segment.
fn gcs_object_path(name: &str) -> String {
    utf8_percent_encode(name, NON_ALPHANUMERIC).to_string()
}

/// GCS-backed file storage over the JSON API.
pub struct GcsFileStorage {
    client: reqwest::Client,
    bucket: String,
    prefix: String,
    token: GcTokenProvider,
}

impl GcsFileStorage {
    pub async fn new(env: &BootstrapEnv) -> anyhow::Result<Self> {
        // Project id is validated but not needed for object operations.
        env.env.require("GOOGLE_CLOUD_PROJECT_ID")?;

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {e}"))?;
        let token = GcTokenProvider::from_env(client.clone(), &env.env, "GOOGLE_CREDENTIALS");
        let bucket = env.config.services.file_storage.bucket.clone();
        let prefix = env.config.services.file_storage.prefix.clone();

        info!("GCS file storage handle initialized: bucket={bucket} prefix='{prefix}'");

        Ok(Self {
            client,
            bucket,
            prefix,
            token,
        })
    }

    /// Map a storage key to an upstream GCS object name.
    fn object_name(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

impl Service for GcsFileStorage {
    fn provider(&self) -> &'static str {
        PROVIDER_GC
    }

    fn ready(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        Box::pin(async move {
            let Ok(token) = self.token.access_token().await else {
                return false;
            };
            let url = format!("{GCS_API_BASE}/b/{}", self.bucket);
            match self.client.get(&url).bearer_auth(token).send().await {
                Ok(resp) => resp.status().is_success(),
                Err(_) => false,
            }
        })
    }
}

impl FileStorageService for GcsFileStorage {
    fn put_file(
        &self,
        key: &str,
        data: Bytes,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        let name = self.object_name(key);
        Box::pin(async move {
            let token = self.token.access_token().await?;
            let url = format!(
                "{GCS_UPLOAD_BASE}/b/{}/o?uploadType=media&name={}",
                self.bucket,
                gcs_object_path(&name)
            );

            debug!("GCS upload: bucket={} name={}", self.bucket, name);

            let resp = self
                .client
                .post(&url)
                .bearer_auth(token)
                .header("content-type", "application/octet-stream")
                .body(data)
                .send()
                .await
                .map_err(|e| anyhow::anyhow!("GCS upload request failed: {e}"))?;

            if !resp.status().is_success() {
                let status = resp.status();
                let text = resp.text().await.unwrap_or_default();
                return Err(anyhow::anyhow!("GCS upload failed ({status}): {text}"));
            }
            Ok(())
        })
    }

    fn fetch_file(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Bytes>> + Send + '_>> {
        let name = self.object_name(key);
        Box::pin(async move {
            let token = self.token.access_token().await?;
            let url = format!(
                "{GCS_API_BASE}/b/{}/o/{}?alt=media",
                self.bucket,
                gcs_object_path(&name)
            );

            debug!("GCS download: bucket={} name={}", self.bucket, name);

            let resp = self
                .client
                .get(&url)
                .bearer_auth(token)
                .send()
                .await
                .map_err(|e| anyhow::anyhow!("GCS download request failed: {e}"))?;

            if resp.status() == reqwest::StatusCode::NOT_FOUND {
                return Err(anyhow::anyhow!("No object at key: {name}"));
            }
            if !resp.status().is_success() {
                let status = resp.status();
                let text = resp.text().await.unwrap_or_default();
                return Err(anyhow::anyhow!("GCS download failed ({status}): {text}"));
            }

            let body = resp
                .bytes()
                .await
                .map_err(|e| anyhow::anyhow!("GCS download body: {e}"))?;
            Ok(body)
        })
    }

    fn delete_file(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        let name = self.object_name(key);
        Box::pin(async move {
            let token = self.token.access_token().await?;
            let url = format!(
                "{GCS_API_BASE}/b/{}/o/{}",
                self.bucket,
                gcs_object_path(&name)
            );

            debug!("GCS delete: bucket={} name={}", self.bucket, name);

            let resp = self
                .client
                .delete(&url)
                .bearer_auth(token)
                .send()
                .await
                .map_err(|e| anyhow::anyhow!("GCS delete request failed: {e}"))?;

            // Treat 404 as success to match S3 delete semantics.
            if !resp.status().is_success() && resp.status() != reqwest::StatusCode::NOT_FOUND {
                let status = resp.status();
                let text = resp.text().await.unwrap_or_default();
                return Err(anyhow::anyhow!("GCS delete failed ({status}): {text}"));
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
    fn test_key_prefix_mapping() {
        let prefix = "uploads/";
        let key = "reports/2026/summary.pdf";
        assert_eq!(format!("{prefix}{key}"), "uploads/reports/2026/summary.pdf");
    }

    #[test]
    fn test_gcs_object_path_encodes_slashes() {
        assert_eq!(gcs_object_path("a/b c.txt"), "a%2Fb%20c%2Etxt");
    }

    #[test]
    fn test_gcs_object_path_plain_name_unchanged() {
        assert_eq!(gcs_object_path("report"), "report");
    }
}
