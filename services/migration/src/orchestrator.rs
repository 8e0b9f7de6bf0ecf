//! End-to-end migration orchestration.
//!
//! Drives fetch → publish → update per reference, records one outcome per
//! reference regardless of where the chain stopped, and never lets one bad
//! item abort the batch. Dry-run mode stops every reference after
//! enumeration and performs no network write.

use crate::enumerator::{AssetReference, ReferenceSource};
use crate::fetcher::{AssetFetch, FetchError};
use crate::publisher::{content_type_for, AssetPublish, DestinationKeyPolicy, PublishError};
use crate::updater::{ReferenceUpdate, UpdateError};
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Run mode: plan only, or perform the migration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationMode {
    /// Report the worklist without any fetch, publish, or update call
    DryRun,
    /// Perform the full pipeline for every reference
    Apply,
}

impl MigrationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationMode::DryRun => "dry-run",
            MigrationMode::Apply => "apply",
        }
    }
}

/// Failure detail for one reference, identifying the stage that stopped it
#[derive(Error, Debug)]
pub enum StageError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error(transparent)]
    Update(#[from] UpdateError),
}

impl StageError {
    pub fn stage(&self) -> &'static str {
        match self {
            StageError::Fetch(_) => "fetch",
            StageError::Publish(_) => "publish",
            StageError::Update(_) => "update",
        }
    }
}

/// How far a reference's pipeline progressed.
///
/// `Skipped` is the dry-run terminal state; `Failed` means the first stage
/// failed before anything completed. For later failures the stage names the
/// last completed step and the outcome's error names the one that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeStage {
    Skipped,
    Failed,
    Fetched,
    Uploaded,
    RecordUpdated,
}

/// Terminal status recorded for one reference after one run
#[derive(Debug)]
pub struct MigrationOutcome {
    pub reference: AssetReference,
    pub stage: OutcomeStage,
    pub error: Option<StageError>,
}

impl MigrationOutcome {
    fn skipped(reference: AssetReference) -> Self {
        Self {
            reference,
            stage: OutcomeStage::Skipped,
            error: None,
        }
    }

    fn migrated(reference: AssetReference) -> Self {
        Self {
            reference,
            stage: OutcomeStage::RecordUpdated,
            error: None,
        }
    }

    fn failed(reference: AssetReference, stage: OutcomeStage, error: StageError) -> Self {
        Self {
            reference,
            stage,
            error: Some(error),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

/// Aggregated result of one migration run
#[derive(Debug)]
pub struct RunSummary {
    pub mode: MigrationMode,
    /// References in the worklist
    pub total: usize,
    /// References whose record was rewritten
    pub migrated: usize,
    /// References reported by a dry run
    pub planned: usize,
    pub fetch_failures: usize,
    pub publish_failures: usize,
    pub update_failures: usize,
    /// Whether the run stopped early on operator cancellation
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<MigrationOutcome>,
}

impl RunSummary {
    fn new(mode: MigrationMode, total: usize, started_at: DateTime<Utc>) -> Self {
        Self {
            mode,
            total,
            migrated: 0,
            planned: 0,
            fetch_failures: 0,
            publish_failures: 0,
            update_failures: 0,
            cancelled: false,
            started_at,
            finished_at: started_at,
            outcomes: Vec::new(),
        }
    }

    fn record(&mut self, outcome: MigrationOutcome) {
        match (&outcome.stage, &outcome.error) {
            (OutcomeStage::Skipped, _) => self.planned += 1,
            (OutcomeStage::RecordUpdated, _) => self.migrated += 1,
            (_, Some(StageError::Fetch(_))) => self.fetch_failures += 1,
            (_, Some(StageError::Publish(_))) => self.publish_failures += 1,
            (_, Some(StageError::Update(_))) => self.update_failures += 1,
            _ => {}
        }
        self.outcomes.push(outcome);
    }

    /// Total references whose terminal state is a failure
    pub fn failed(&self) -> usize {
        self.fetch_failures + self.publish_failures + self.update_failures
    }
}

/// Tunables for one migration run
#[derive(Debug, Clone)]
pub struct MigrationSettings {
    /// Pause between consecutive references in apply mode; zero disables it
    pub pause: Duration,
    /// Mapping from source path to destination key
    pub key_policy: DestinationKeyPolicy,
}

/// Drives the per-reference pipeline and aggregates outcomes
pub struct MigrationOrchestrator<E, F, P, U> {
    enumerator: E,
    fetcher: F,
    publisher: P,
    updater: U,
    settings: MigrationSettings,
    cancel: CancellationToken,
}

impl<E, F, P, U> MigrationOrchestrator<E, F, P, U>
where
    E: ReferenceSource,
    F: AssetFetch,
    P: AssetPublish,
    U: ReferenceUpdate,
{
    pub fn new(
        enumerator: E,
        fetcher: F,
        publisher: P,
        updater: U,
        settings: MigrationSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            enumerator,
            fetcher,
            publisher,
            updater,
            settings,
            cancel,
        }
    }

    /// Run the migration over a fresh enumeration snapshot.
    ///
    /// Per-item failures are recorded and never abort the run; cancellation
    /// stops dispatching new references while the in-flight one finishes.
    pub async fn run(&self, mode: MigrationMode) -> RunSummary {
        let started_at = Utc::now();

        let worklist = self.enumerator.enumerate().await;
        info!(
            mode = mode.as_str(),
            total = worklist.len(),
            "Migration worklist built"
        );

        let mut summary = RunSummary::new(mode, worklist.len(), started_at);

        for (index, reference) in worklist.into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!(
                    processed = index,
                    total = summary.total,
                    "Cancellation requested, stopping dispatch"
                );
                summary.cancelled = true;
                break;
            }

            info!(
                position = index + 1,
                total = summary.total,
                kind = reference.kind.as_str(),
                path = %reference.source_path,
                "Processing reference"
            );

            let outcome = match mode {
                MigrationMode::DryRun => {
                    info!(
                        kind = reference.kind.as_str(),
                        path = %reference.source_path,
                        destination_key = %self.settings.key_policy.destination_key(&reference.source_path),
                        "Dry run: would migrate"
                    );
                    MigrationOutcome::skipped(reference)
                }
                MigrationMode::Apply => {
                    let outcome = self.migrate(reference).await;
                    match &outcome.error {
                        None => info!(
                            path = %outcome.reference.source_path,
                            "Migrated asset and updated record"
                        ),
                        Some(e) => error!(
                            path = %outcome.reference.source_path,
                            stage = e.stage(),
                            error = %e,
                            "Migration failed for reference"
                        ),
                    }
                    outcome
                }
            };

            summary.record(outcome);

            let more_to_come = index + 1 < summary.total;
            if mode == MigrationMode::Apply && !self.settings.pause.is_zero() && more_to_come {
                tokio::time::sleep(self.settings.pause).await;
            }
        }

        summary.finished_at = Utc::now();

        info!(
            mode = summary.mode.as_str(),
            total = summary.total,
            migrated = summary.migrated,
            planned = summary.planned,
            failed = summary.failed(),
            fetch_failures = summary.fetch_failures,
            publish_failures = summary.publish_failures,
            update_failures = summary.update_failures,
            cancelled = summary.cancelled,
            "Migration run finished"
        );

        summary
    }

    /// Full pipeline for one reference; stops at the first failed stage
    async fn migrate(&self, reference: AssetReference) -> MigrationOutcome {
        let content = match self.fetcher.fetch(&reference.source_path).await {
            Ok(content) => content,
            Err(e) => {
                return MigrationOutcome::failed(reference, OutcomeStage::Failed, e.into());
            }
        };

        let key = self.settings.key_policy.destination_key(&reference.source_path);
        let content_type = content_type_for(&key);

        if let Err(e) = self.publisher.publish(&key, content, content_type).await {
            return MigrationOutcome::failed(reference, OutcomeStage::Fetched, e.into());
        }

        // The asset is confirmed at the destination; only now touch the record
        if let Err(e) = self.updater.update(&reference, &key).await {
            warn!(
                path = %reference.source_path,
                destination_key = %key,
                "Asset published but the record still points at the old path, reconcile manually"
            );
            return MigrationOutcome::failed(reference, OutcomeStage::Uploaded, e.into());
        }

        MigrationOutcome::migrated(reference)
    }
}
