//! Google Cloud OAuth2 token resolution shared by every GC handle.
//!
//! Credential sources, in order:
//! 1. Inline service-account JSON from the environment snapshot (the
//!    `GOOGLE_PLAIN_CREDENTIALS` / `GOOGLE_CREDENTIALS` variables)
//! 2. `GOOGLE_APPLICATION_CREDENTIALS` (service account JSON key file)
//! 3. `gcloud auth application-default` user credentials
//! 4. GCE metadata server (when running on Google Cloud)
//!
//! Service-account keys are exchanged with a signed JWT assertion;
//! tokens are cached until expiry with a 60s safety margin.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::Serialize;
use tracing::debug;

use crate::config::EnvironmentMap;

/// Scope requested for every token.
const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// GCE metadata server token endpoint.
const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Cached access token with expiry.
struct CachedToken {
    access_token: String,
    expiry: Instant,
}

/// JWT claims for the service-account assertion flow.
#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

/// Resolves and caches OAuth2 access tokens for the GCS/Firestore/
/// Cloud Logging/Cloud Trace/Compute REST APIs.
pub struct GcTokenProvider {
    client: reqwest::Client,
    /// Inline service-account JSON taken from the environment snapshot.
    plain_credentials: Option<String>,
    /// Path to a service-account key file.
    credentials_file: Option<String>,
    token_cache: Mutex<Option<CachedToken>>,
}

impl GcTokenProvider {
    /// Build a provider from the environment snapshot.  `plain_var`
    /// names the inline-JSON alternative accepted by the category
    /// (`GOOGLE_PLAIN_CREDENTIALS` or `GOOGLE_CREDENTIALS`).
    pub fn from_env(client: reqwest::Client, env: &EnvironmentMap, plain_var: &str) -> Self {
        Self {
            client,
            plain_credentials: env.get(plain_var).map(str::to_string),
            credentials_file: env.get("GOOGLE_APPLICATION_CREDENTIALS").map(str::to_string),
            token_cache: Mutex::new(None),
        }
    }

    /// Return a valid access token, from cache when possible.
    pub async fn access_token(&self) -> anyhow::Result<String> {
        {
            let cache = self.token_cache.lock().expect("token cache mutex poisoned");
            if let Some(ref cached) = *cache {
                if cached.expiry > Instant::now() {
                    return Ok(cached.access_token.clone());
                }
            }
        }

        let (token, expires_in) = self.fetch_access_token().await?;

        // Cache with 60s safety margin.
        let expiry = Instant::now() + Duration::from_secs(expires_in.saturating_sub(60));
        {
            let mut cache = self.token_cache.lock().expect("token cache mutex poisoned");
            *cache = Some(CachedToken {
                access_token: token.clone(),
                expiry,
            });
        }

        Ok(token)
    }

    /// Fetch a fresh token from the first available credential source.
    async fn fetch_access_token(&self) -> anyhow::Result<(String, u64)> {
        if let Some(ref raw) = self.plain_credentials {
            let creds: serde_json::Value = serde_json::from_str(raw)
                .map_err(|e| anyhow::anyhow!("Failed to parse inline GC credentials: {e}"))?;
            return self.token_from_credentials(&creds).await;
        }

        if let Some(ref path) = self.credentials_file {
            return self.token_from_file(path).await;
        }

        let adc_path = Self::application_default_credentials_path();
        if let Ok(true) = tokio::fs::try_exists(&adc_path).await {
            return self.token_from_file(&adc_path).await;
        }

        self.token_from_metadata_server().await
    }

    /// Get the path to gcloud application-default credentials.
    fn application_default_credentials_path() -> String {
        if let Ok(config_dir) = std::env::var("CLOUDSDK_CONFIG") {
            return format!("{config_dir}/application_default_credentials.json");
        }
        if let Ok(home) = std::env::var("HOME") {
            return format!("{home}/.config/gcloud/application_default_credentials.json");
        }
        ".config/gcloud/application_default_credentials.json".to_string()
    }

    /// Obtain a token from a credentials JSON file.
    async fn token_from_file(&self, path: &str) -> anyhow::Result<(String, u64)> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read GC credentials file {path}: {e}"))?;
        let creds: serde_json::Value = serde_json::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("Failed to parse GC credentials file {path}: {e}"))?;
        self.token_from_credentials(&creds).await
    }

    /// Obtain a token from parsed credentials JSON.
    async fn token_from_credentials(
        &self,
        creds: &serde_json::Value,
    ) -> anyhow::Result<(String, u64)> {
        let cred_type = creds.get("type").and_then(|v| v.as_str()).unwrap_or("");

        match cred_type {
            "service_account" => {
                let client_email = creds
                    .get("client_email")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| anyhow::anyhow!("Missing client_email in service account key"))?;
                let private_key = creds
                    .get("private_key")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| anyhow::anyhow!("Missing private_key in service account key"))?;
                let token_uri = creds
                    .get("token_uri")
                    .and_then(|v| v.as_str())
                    .unwrap_or("https://oauth2.googleapis.com/token");

                self.exchange_jwt_for_token(client_email, private_key, token_uri)
                    .await
            }
            "authorized_user" => {
                self.token_from_refresh(
                    creds.get("client_id").and_then(|v| v.as_str()).unwrap_or(""),
                    creds
                        .get("client_secret")
                        .and_then(|v| v.as_str())
                        .unwrap_or(""),
                    creds
                        .get("refresh_token")
                        .and_then(|v| v.as_str())
                        .unwrap_or(""),
                )
                .await
            }
            other => Err(anyhow::anyhow!(
                "Unsupported GC credential type: '{other}'"
            )),
        }
    }

    /// Exchange a signed JWT assertion for an access token
    /// (service-account flow).
    async fn exchange_jwt_for_token(
        &self,
        client_email: &str,
        private_key_pem: &str,
        token_uri: &str,
    ) -> anyhow::Result<(String, u64)> {
        let now = chrono::Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: client_email,
            scope: CLOUD_PLATFORM_SCOPE,
            aud: token_uri,
            iat: now,
            exp: now + 3600,
        };

        let key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
            .map_err(|e| anyhow::anyhow!("Invalid service account private key: {e}"))?;
        let assertion = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|e| anyhow::anyhow!("Failed to sign JWT assertion: {e}"))?;

        debug!("Exchanging JWT assertion for access token at {token_uri}");

        let resp = self
            .client
            .post(token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Token exchange request failed: {e}"))?;

        Self::parse_token_response(resp).await
    }

    /// Exchange a refresh token for an access token.
    async fn token_from_refresh(
        &self,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
    ) -> anyhow::Result<(String, u64)> {
        let resp = self
            .client
            .post("https://oauth2.googleapis.com/token")
            .form(&[
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Token refresh request failed: {e}"))?;

        Self::parse_token_response(resp).await
    }

    /// Fetch a token from the GCE metadata server.
    async fn token_from_metadata_server(&self) -> anyhow::Result<(String, u64)> {
        let resp = self
            .client
            .get(METADATA_TOKEN_URL)
            .header("Metadata-Flavor", "Google")
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Metadata server request failed: {e}"))?;

        Self::parse_token_response(resp).await
    }

    /// Extract `access_token` and `expires_in` from a token endpoint reply.
    async fn parse_token_response(resp: reqwest::Response) -> anyhow::Result<(String, u64)> {
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Token request failed ({status}): {body}"));
        }

        let token_resp: serde_json::Value = resp.json().await?;
        let access_token = token_resp
            .get("access_token")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("No access_token in token response"))?
            .to_string();
        let expires_in = token_resp
            .get("expires_in")
            .and_then(|v| v.as_u64())
            .unwrap_or(3600);

        Ok((access_token, expires_in))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_inline_credentials_fail_without_network() {
        let env = EnvironmentMap::from_pairs([("GOOGLE_PLAIN_CREDENTIALS", "not-json")]);
        let provider =
            GcTokenProvider::from_env(reqwest::Client::new(), &env, "GOOGLE_PLAIN_CREDENTIALS");
        let err = provider.access_token().await.expect_err("parse must fail");
        assert!(err.to_string().contains("parse inline GC credentials"));
    }

    #[tokio::test]
    async fn test_unknown_credential_type_rejected() {
        let env = EnvironmentMap::from_pairs([(
            "GOOGLE_PLAIN_CREDENTIALS",
            r#"{"type":"external_account"}"#,
        )]);
        let provider =
            GcTokenProvider::from_env(reqwest::Client::new(), &env, "GOOGLE_PLAIN_CREDENTIALS");
        let err = provider.access_token().await.expect_err("type must be rejected");
        assert!(err.to_string().contains("external_account"));
    }

    #[tokio::test]
    async fn test_service_account_with_bad_key_fails_before_exchange() {
        let creds = r#"{"type":"service_account","client_email":"x@y.iam.gserviceaccount.com","private_key":"garbage"}"#;
        let env = EnvironmentMap::from_pairs([("GOOGLE_PLAIN_CREDENTIALS", creds)]);
        let provider =
            GcTokenProvider::from_env(reqwest::Client::new(), &env, "GOOGLE_PLAIN_CREDENTIALS");
        let err = provider.access_token().await.expect_err("bad key must fail");
        assert!(err.to_string().contains("private key"));
    }
}
