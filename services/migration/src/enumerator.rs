//! Reference enumeration against the record store.
//!
//! One read query per entity kind, driven by a declarative descriptor table
//! rather than hand-written per-kind blocks. A kind whose query fails
//! contributes zero references and never blocks the others.

use crate::config::RecordStoreConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that can occur while enumerating one entity kind
#[derive(Error, Debug)]
pub enum EnumerationError {
    #[error("Record store request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Record store query for table {table} returned status {status}")]
    Status {
        table: String,
        status: reqwest::StatusCode,
    },
}

/// Kind of entity owning an asset reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Ingredient,
    Recipe,
    UserProfile,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Ingredient => "ingredient",
            EntityKind::Recipe => "recipe",
            EntityKind::UserProfile => "user_profile",
        }
    }
}

/// Opaque record identifier as the store defines it (integer or string)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Text(String),
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Int(id) => write!(f, "{}", id),
            RecordId::Text(id) => write!(f, "{}", id),
        }
    }
}

/// Descriptor driving the generic enumeration query for one entity kind
#[derive(Debug, Clone)]
pub struct EntityKindSpec {
    /// Entity kind this descriptor enumerates
    pub kind: EntityKind,
    /// Record store table name
    pub table: String,
    /// Column holding the record identifier
    pub id_column: String,
    /// Column holding the asset path
    pub path_column: String,
}

impl EntityKindSpec {
    pub fn new(
        kind: EntityKind,
        table: impl Into<String>,
        id_column: impl Into<String>,
        path_column: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            table: table.into(),
            id_column: id_column.into(),
            path_column: path_column.into(),
        }
    }

    /// The entity kinds migrated by default
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new(EntityKind::Ingredient, "ingredients", "id", "image_url"),
            Self::new(EntityKind::Recipe, "recipes", "id", "image_url"),
            Self::new(EntityKind::UserProfile, "users", "id", "profile_image"),
        ]
    }
}

/// A record's pointer at an asset in the source backend.
///
/// Identity is (kind, record_id, column); duplicates simply re-migrate the
/// same path, which is idempotent. Immutable once enumerated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetReference {
    /// Kind of the owning entity
    pub kind: EntityKind,
    /// Identifier of the owning record
    pub record_id: RecordId,
    /// Asset path relative to the source backend's public namespace
    pub source_path: String,
    /// Table holding the owning record
    pub table: String,
    /// Column holding the asset path
    pub column: String,
}

/// Source of the migration worklist.
///
/// Enumeration is infallible by contract: per-kind failures are absorbed
/// and logged, yielding zero references for that kind.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReferenceSource: Send + Sync {
    async fn enumerate(&self) -> Vec<AssetReference>;
}

/// Enumerates asset references from the record store's HTTP query interface
pub struct ReferenceEnumerator {
    client: Client,
    base_url: String,
    service_key: String,
    kinds: Vec<EntityKindSpec>,
}

impl ReferenceEnumerator {
    /// Create a new enumerator for the given entity kinds
    pub fn new(
        config: &RecordStoreConfig,
        kinds: Vec<EntityKindSpec>,
    ) -> Result<Self, EnumerationError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            service_key: config.service_key.clone(),
            kinds,
        })
    }

    /// Query one entity kind, requesting only the id and path columns
    async fn enumerate_kind(
        &self,
        spec: &EntityKindSpec,
    ) -> Result<Vec<AssetReference>, EnumerationError> {
        let url = format!("{}/rest/v1/{}", self.base_url, spec.table);

        let response = self
            .client
            .get(&url)
            .query(&[("select", format!("{},{}", spec.id_column, spec.path_column))])
            .header("apikey", &self.service_key)
            .header("Authorization", format!("Bearer {}", self.service_key))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(EnumerationError::Status {
                table: spec.table.clone(),
                status,
            });
        }

        let rows: Vec<serde_json::Map<String, Value>> = response.json().await?;

        let mut references = Vec::new();
        for row in rows {
            let record_id = match row
                .get(&spec.id_column)
                .cloned()
                .and_then(|v| serde_json::from_value::<RecordId>(v).ok())
            {
                Some(id) => id,
                None => {
                    debug!(table = %spec.table, "Row without a usable id, skipping");
                    continue;
                }
            };

            // Rows with a null or empty path have nothing to migrate
            let source_path = match row.get(&spec.path_column).and_then(Value::as_str) {
                Some(path) if !path.trim().is_empty() => path.to_string(),
                _ => continue,
            };

            references.push(AssetReference {
                kind: spec.kind,
                record_id,
                source_path,
                table: spec.table.clone(),
                column: spec.path_column.clone(),
            });
        }

        Ok(references)
    }
}

#[async_trait]
impl ReferenceSource for ReferenceEnumerator {
    async fn enumerate(&self) -> Vec<AssetReference> {
        let mut references = Vec::new();

        for spec in &self.kinds {
            match self.enumerate_kind(spec).await {
                Ok(found) => {
                    info!(
                        kind = spec.kind.as_str(),
                        table = %spec.table,
                        count = found.len(),
                        "Enumerated asset references"
                    );
                    references.extend(found);
                }
                Err(e) => {
                    warn!(
                        kind = spec.kind.as_str(),
                        table = %spec.table,
                        error = %e,
                        "Enumeration failed for entity kind, continuing without it"
                    );
                }
            }
        }

        references
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecordStoreConfig;
    use mockito::Matcher;

    fn record_store_config(base_url: String) -> RecordStoreConfig {
        RecordStoreConfig {
            base_url,
            service_key: "test-key".to_string(),
            timeout_secs: 5,
        }
    }

    #[test]
    fn test_record_id_deserializes_from_int_and_string() {
        let int_id: RecordId = serde_json::from_str("42").unwrap();
        assert_eq!(int_id, RecordId::Int(42));
        assert_eq!(int_id.to_string(), "42");

        let text_id: RecordId = serde_json::from_str("\"a1b2\"").unwrap();
        assert_eq!(text_id, RecordId::Text("a1b2".to_string()));
        assert_eq!(text_id.to_string(), "a1b2");
    }

    #[test]
    fn test_default_entity_kinds() {
        let kinds = EntityKindSpec::defaults();
        assert_eq!(kinds.len(), 3);
        assert_eq!(kinds[0].table, "ingredients");
        assert_eq!(kinds[1].path_column, "image_url");
        assert_eq!(kinds[2].path_column, "profile_image");
    }

    #[tokio::test]
    async fn test_enumerate_drops_rows_without_a_path() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/rest/v1/ingredients")
            .match_query(Matcher::UrlEncoded("select".into(), "id,image_url".into()))
            .match_header("apikey", "test-key")
            .with_status(200)
            .with_body(
                r#"[
                    {"id": 1, "image_url": "ingredients/onion.png"},
                    {"id": 2, "image_url": null},
                    {"id": 3, "image_url": ""},
                    {"id": 4, "image_url": "ingredients/garlic.webp"}
                ]"#,
            )
            .create_async()
            .await;

        let enumerator = ReferenceEnumerator::new(
            &record_store_config(server.url()),
            vec![EntityKindSpec::new(
                EntityKind::Ingredient,
                "ingredients",
                "id",
                "image_url",
            )],
        )
        .unwrap();

        let references = enumerator.enumerate().await;
        assert_eq!(references.len(), 2);
        assert_eq!(references[0].record_id, RecordId::Int(1));
        assert_eq!(references[0].source_path, "ingredients/onion.png");
        assert_eq!(references[1].record_id, RecordId::Int(4));
    }

    #[tokio::test]
    async fn test_failed_kind_does_not_block_others() {
        let mut server = mockito::Server::new_async().await;
        let _recipes = server
            .mock("GET", "/rest/v1/recipes")
            .match_query(Matcher::UrlEncoded("select".into(), "id,image_url".into()))
            .with_status(500)
            .create_async()
            .await;
        let _users = server
            .mock("GET", "/rest/v1/users")
            .match_query(Matcher::UrlEncoded("select".into(), "id,profile_image".into()))
            .with_status(200)
            .with_body(r#"[{"id": "u-7", "profile_image": "profiles/u-7.jpg"}]"#)
            .create_async()
            .await;

        let enumerator = ReferenceEnumerator::new(
            &record_store_config(server.url()),
            vec![
                EntityKindSpec::new(EntityKind::Recipe, "recipes", "id", "image_url"),
                EntityKindSpec::new(EntityKind::UserProfile, "users", "id", "profile_image"),
            ],
        )
        .unwrap();

        let references = enumerator.enumerate().await;
        assert_eq!(references.len(), 1);
        assert_eq!(references[0].kind, EntityKind::UserProfile);
        assert_eq!(references[0].record_id, RecordId::Text("u-7".to_string()));
    }

    #[tokio::test]
    async fn test_worklist_order_follows_descriptor_order() {
        let mut server = mockito::Server::new_async().await;
        let _ingredients = server
            .mock("GET", "/rest/v1/ingredients")
            .match_query(Matcher::UrlEncoded("select".into(), "id,image_url".into()))
            .with_status(200)
            .with_body(r#"[{"id": 1, "image_url": "a.png"}, {"id": 2, "image_url": "b.png"}]"#)
            .create_async()
            .await;
        let _recipes = server
            .mock("GET", "/rest/v1/recipes")
            .match_query(Matcher::UrlEncoded("select".into(), "id,image_url".into()))
            .with_status(200)
            .with_body(r#"[{"id": 9, "image_url": "c.png"}]"#)
            .create_async()
            .await;

        let enumerator = ReferenceEnumerator::new(
            &record_store_config(server.url()),
            vec![
                EntityKindSpec::new(EntityKind::Ingredient, "ingredients", "id", "image_url"),
                EntityKindSpec::new(EntityKind::Recipe, "recipes", "id", "image_url"),
            ],
        )
        .unwrap();

        let references = enumerator.enumerate().await;
        let paths: Vec<&str> = references.iter().map(|r| r.source_path.as_str()).collect();
        assert_eq!(paths, vec!["a.png", "b.png", "c.png"]);
    }
}
