//! Image Asset Migration Service
//!
//! Batch relocation of image assets referenced by records in a relational
//! record store, from the record store's public storage namespace to an
//! S3-compatible destination bucket. The stored path column on each owning
//! record is rewritten only after the asset is confirmed present at the
//! destination, so the record store never points at a missing object.
//!
//! ## Features
//!
//! - **Data-driven enumeration**: one descriptor per entity kind drives a
//!   single generic query routine; kinds are isolated from each other's
//!   failures
//! - **Per-item fault isolation**: every reference gets a terminal outcome,
//!   and one bad item never aborts the batch
//! - **Dry-run mode**: reports the full migration plan with zero network
//!   writes
//! - **Clean cancellation**: an operator interrupt stops dispatching new
//!   references while the in-flight one finishes
//!
//! ## Architecture
//!
//! ```text
//! Record store                 Source backend            Destination bucket
//! ┌──────────────┐            ┌──────────────┐          ┌──────────────┐
//! │ ingredients  │            │ public       │          │ images/      │
//! │ recipes      │            │ object       │─────────▶│   (same      │
//! │ users        │            │ namespace    │  bytes   │    keys)     │
//! └──────────────┘            └──────────────┘          └──────────────┘
//!        │                           ▲                         ▲
//!        │ enumerate                 │ fetch                   │ publish
//!        ▼                           │                         │
//! ┌──────────────┐            ┌──────────────────────────────────────┐
//! │ Reference    │  worklist  │ Migration Orchestrator               │
//! │ Enumerator   │───────────▶│ fetch → publish → update, per item   │
//! └──────────────┘            └──────────────────────────────────────┘
//!                                    │ rewrite path on success
//!                                    ▼
//!                             ┌──────────────┐
//!                             │ Reference    │
//!                             │ Updater      │
//!                             └──────────────┘
//! ```

pub mod config;
pub mod enumerator;
pub mod fetcher;
pub mod orchestrator;
pub mod publisher;
pub mod updater;

pub use config::{Config, ConfigError};
pub use enumerator::{
    AssetReference, EntityKind, EntityKindSpec, EnumerationError, RecordId, ReferenceEnumerator,
    ReferenceSource,
};
pub use fetcher::{AssetFetch, AssetFetcher, FetchError};
pub use orchestrator::{
    MigrationMode, MigrationOrchestrator, MigrationOutcome, MigrationSettings, OutcomeStage,
    RunSummary, StageError,
};
pub use publisher::{content_type_for, AssetPublish, AssetPublisher, DestinationKeyPolicy, PublishError};
pub use updater::{ReferenceUpdate, ReferenceUpdater, UpdateError};
