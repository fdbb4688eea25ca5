//! Shared AWS SDK configuration built from validated environment variables.
//!
//! cloudbind's required-variable schema (`AWS_ACCESS_KEY`,
//! `AWS_SECRET_KEY`, `AWS_REGION`) is injected as explicit static
//! credentials rather than relying on the SDK's default chain, so the
//! values the orchestrator validated are exactly the ones used.

use aws_credential_types::Credentials;

use crate::config::EnvironmentMap;

/// Build an SDK config from the snapshot's AWS variables.
pub async fn sdk_config(env: &EnvironmentMap) -> anyhow::Result<aws_config::SdkConfig> {
    let access_key = env.require("AWS_ACCESS_KEY")?;
    let secret_key = env.require("AWS_SECRET_KEY")?;
    let region = env.require("AWS_REGION")?;

    let credentials = Credentials::new(
        access_key,
        secret_key,
        None, // session_token
        None, // expiry
        "cloudbind-env",
    );

    let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(aws_config::Region::new(region.to_string()))
        .credentials_provider(credentials)
        .load()
        .await;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sdk_config_requires_all_three_variables() {
        let env = EnvironmentMap::from_pairs([("AWS_ACCESS_KEY", "ak"), ("AWS_SECRET_KEY", "sk")]);
        let err = sdk_config(&env).await.expect_err("missing region");
        assert!(err.to_string().contains("AWS_REGION"));
    }

    #[tokio::test]
    async fn test_sdk_config_uses_snapshot_region() {
        let env = EnvironmentMap::from_pairs([
            ("AWS_ACCESS_KEY", "ak"),
            ("AWS_SECRET_KEY", "sk"),
            ("AWS_REGION", "eu-west-1"),
        ]);
        let config = sdk_config(&env).await.expect("config");
        assert_eq!(config.region().map(|r| r.as_ref()), Some("eu-west-1"));
    }
}
