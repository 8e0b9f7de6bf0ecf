//! Record store path rewrite after a successful publication.

use crate::config::RecordStoreConfig;
use crate::enumerator::AssetReference;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur while updating a record's asset path
#[derive(Error, Debug)]
pub enum UpdateError {
    #[error("Record update request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Record update for {table} id {record_id} returned status {status}")]
    Status {
        table: String,
        record_id: String,
        status: StatusCode,
    },
}

/// Rewrite of the stored asset path on a single owning record
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReferenceUpdate: Send + Sync {
    async fn update(&self, reference: &AssetReference, new_path: &str)
        -> Result<(), UpdateError>;
}

/// Updates asset-path columns through the record store's HTTP interface
pub struct ReferenceUpdater {
    client: Client,
    base_url: String,
    service_key: String,
}

impl ReferenceUpdater {
    pub fn new(config: &RecordStoreConfig) -> Result<Self, UpdateError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            service_key: config.service_key.clone(),
        })
    }
}

#[async_trait]
impl ReferenceUpdate for ReferenceUpdater {
    /// Partial update scoped to one record; only an empty 204 counts as success.
    /// On failure the record keeps its prior value and the already-published
    /// destination object is left in place.
    async fn update(
        &self,
        reference: &AssetReference,
        new_path: &str,
    ) -> Result<(), UpdateError> {
        let url = format!("{}/rest/v1/{}", self.base_url, reference.table);

        let mut body = serde_json::Map::new();
        body.insert(
            reference.column.clone(),
            Value::String(new_path.to_string()),
        );

        let response = self
            .client
            .patch(&url)
            .query(&[("id", format!("eq.{}", reference.record_id))])
            .header("apikey", &self.service_key)
            .header("Authorization", format!("Bearer {}", self.service_key))
            .header("Prefer", "return=minimal")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::NO_CONTENT {
            return Err(UpdateError::Status {
                table: reference.table.clone(),
                record_id: reference.record_id.to_string(),
                status,
            });
        }

        debug!(
            table = %reference.table,
            record_id = %reference.record_id,
            column = %reference.column,
            new_path = %new_path,
            "Updated record asset path"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enumerator::{EntityKind, RecordId};
    use mockito::Matcher;

    fn record_store_config(base_url: String) -> RecordStoreConfig {
        RecordStoreConfig {
            base_url,
            service_key: "test-key".to_string(),
            timeout_secs: 5,
        }
    }

    fn reference() -> AssetReference {
        AssetReference {
            kind: EntityKind::Ingredient,
            record_id: RecordId::Int(7),
            source_path: "ingredients/onion.png".to_string(),
            table: "ingredients".to_string(),
            column: "image_url".to_string(),
        }
    }

    #[tokio::test]
    async fn test_update_patches_the_single_record() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PATCH", "/rest/v1/ingredients")
            .match_query(Matcher::UrlEncoded("id".into(), "eq.7".into()))
            .match_header("apikey", "test-key")
            .match_header("prefer", "return=minimal")
            .match_body(Matcher::Json(serde_json::json!({
                "image_url": "ingredients/onion.png"
            })))
            .with_status(204)
            .create_async()
            .await;

        let updater = ReferenceUpdater::new(&record_store_config(server.url())).unwrap();
        updater
            .update(&reference(), "ingredients/onion.png")
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_204_response_is_a_failure() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("PATCH", "/rest/v1/ingredients")
            .match_query(Matcher::UrlEncoded("id".into(), "eq.7".into()))
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let updater = ReferenceUpdater::new(&record_store_config(server.url())).unwrap();
        let error = updater
            .update(&reference(), "ingredients/onion.png")
            .await
            .unwrap_err();

        match error {
            UpdateError::Status {
                table,
                record_id,
                status,
            } => {
                assert_eq!(table, "ingredients");
                assert_eq!(record_id, "7");
                assert_eq!(status, StatusCode::OK);
            }
            other => panic!("expected status error, got {other}"),
        }
    }
}
