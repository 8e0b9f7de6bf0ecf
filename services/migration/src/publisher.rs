//! Asset publication to the destination object store.
//!
//! The destination is any S3-compatible endpoint (Cloudflare R2 in the
//! original deployment), addressed by endpoint URL and static credentials.

use crate::config::DestinationConfig;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::timeout::TimeoutConfig;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur while publishing an asset
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Failed to upload {key}: {message}")]
    Upload { key: String, message: String },
}

/// Maps a source path to the key the asset is published under.
///
/// Identity keeps the key unchanged (the storage root moves, the path does
/// not); Rebase prepends a namespace prefix for genuine path rewrites.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DestinationKeyPolicy {
    #[default]
    Identity,
    Rebase {
        prefix: String,
    },
}

impl DestinationKeyPolicy {
    pub fn from_prefix(prefix: Option<String>) -> Self {
        match prefix {
            Some(prefix) if !prefix.trim().is_empty() => Self::Rebase { prefix },
            _ => Self::Identity,
        }
    }

    pub fn destination_key(&self, source_path: &str) -> String {
        match self {
            Self::Identity => source_path.to_string(),
            Self::Rebase { prefix } => format!(
                "{}/{}",
                prefix.trim_end_matches('/'),
                source_path.trim_start_matches('/')
            ),
        }
    }
}

/// Infer the media type from a key's file extension.
///
/// Everything without an explicit rule (including `.jpg`/`.jpeg` and
/// extension-less keys) is treated as JPEG.
pub fn content_type_for(key: &str) -> &'static str {
    let key = key.to_ascii_lowercase();
    if key.ends_with(".png") {
        "image/png"
    } else if key.ends_with(".gif") {
        "image/gif"
    } else if key.ends_with(".webp") {
        "image/webp"
    } else {
        "image/jpeg"
    }
}

/// Write of raw asset content under a destination key
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AssetPublish: Send + Sync {
    async fn publish(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), PublishError>;
}

/// Publishes assets to the destination bucket
pub struct AssetPublisher {
    client: S3Client,
    bucket: String,
}

impl AssetPublisher {
    /// Create a new publisher for the configured destination
    pub async fn new(config: &DestinationConfig) -> Self {
        let credentials = Credentials::new(
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
            None,
            None,
            "migration-config",
        );

        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config)
            .endpoint_url(&config.endpoint_url)
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(Duration::from_secs(config.request_timeout_secs))
                    .build(),
            );

        // Path-style access for MinIO-style endpoints
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = S3Client::from_conf(s3_config_builder.build());

        info!(
            bucket = %config.bucket,
            endpoint = %config.endpoint_url,
            region = %config.region,
            "Destination publisher initialized"
        );

        Self {
            client,
            bucket: config.bucket.clone(),
        }
    }
}

#[async_trait]
impl AssetPublish for AssetPublisher {
    /// Single put, no retry; re-publishing the same key overwrites identically
    async fn publish(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), PublishError> {
        let size_bytes = body.len();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| PublishError::Upload {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        debug!(
            key = %key,
            content_type = %content_type,
            size_bytes,
            "Uploaded asset to destination"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_table() {
        assert_eq!(content_type_for("a/b.png"), "image/png");
        assert_eq!(content_type_for("a/b.gif"), "image/gif");
        assert_eq!(content_type_for("a/b.webp"), "image/webp");
        assert_eq!(content_type_for("a/b.jpg"), "image/jpeg");
    }

    #[test]
    fn test_content_type_is_case_insensitive() {
        assert_eq!(content_type_for("a/b.PNG"), "image/png");
        assert_eq!(content_type_for("a/b.WebP"), "image/webp");
    }

    #[test]
    fn test_content_type_defaults_to_jpeg() {
        assert_eq!(content_type_for("a/b.jpeg"), "image/jpeg");
        assert_eq!(content_type_for("a/b"), "image/jpeg");
        assert_eq!(content_type_for(""), "image/jpeg");
    }

    #[test]
    fn test_identity_policy_keeps_the_key() {
        let policy = DestinationKeyPolicy::Identity;
        assert_eq!(
            policy.destination_key("ingredients/onion.png"),
            "ingredients/onion.png"
        );
    }

    #[test]
    fn test_rebase_policy_prepends_the_prefix() {
        let policy = DestinationKeyPolicy::Rebase {
            prefix: "migrated/".to_string(),
        };
        assert_eq!(
            policy.destination_key("/ingredients/onion.png"),
            "migrated/ingredients/onion.png"
        );
    }

    #[test]
    fn test_policy_from_prefix() {
        assert_eq!(
            DestinationKeyPolicy::from_prefix(None),
            DestinationKeyPolicy::Identity
        );
        assert_eq!(
            DestinationKeyPolicy::from_prefix(Some("  ".to_string())),
            DestinationKeyPolicy::Identity
        );
        assert_eq!(
            DestinationKeyPolicy::from_prefix(Some("migrated".to_string())),
            DestinationKeyPolicy::Rebase {
                prefix: "migrated".to_string()
            }
        );
    }
}
