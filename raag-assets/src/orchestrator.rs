//! Pipeline orchestrator
//!
//! Walks the selected catalog entries in order, one at a time:
//!
//! ```text
//! Pending ──checkpointed──────────────────────────────► Resolved(Skipped)
//!    │
//!    └─► Classified ──GenuinePresent───────────────────► Resolved(Skipped)
//!            │
//!            └─Missing / PlaceholderPresent─► Acquiring ─ok──► Resolved(Success)
//!                                                 │
//!                                                 └─fail─► placeholder ─► Resolved(Failure)
//! ```
//!
//! Every resolved asset is checkpointed before the next one starts. The
//! manifest is reconciled at the end of every run, interrupted or not.

use crate::acquire::{Acquired, Acquirer};
use crate::audio_search::AudioSearch;
use crate::catalog::{AssetDescriptor, Catalog, MediaKind, SourceHint};
use crate::checkpoint::{read_ids, CheckpointStore};
use crate::classifier::{AssetState, ExistenceClassifier};
use crate::config::PipelineConfig;
use crate::error::{truncate_reason, AcquireError};
use crate::manifest::{reconcile, ReconcileReport};
use crate::placeholder::{Placeholder, PlaceholderGenerator};
use crate::retry::{AcquireFailure, RetryPolicy};
use crate::search::SearchProvider;
use crate::stats::{Progress, RunStatistics};
use crate::transfer::TransferAdapter;
use raag_common::human_time::format_duration;
use raag_common::Result;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

/// Cost of search queries beyond the free daily quota, per 1000 queries
pub const SEARCH_COST_PER_1000_USD: f64 = 5.0;

/// Why an asset was skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Resolved by an earlier run
    Checkpointed,
    /// Genuine content already on disk
    AlreadyGenuine,
}

/// Terminal outcome of one asset in one run
#[derive(Debug, Clone, PartialEq)]
pub enum AssetOutcome {
    Skipped(SkipReason),
    Acquired {
        bytes_written: u64,
        attempts: u32,
    },
    /// Acquisition failed; a placeholder now stands in
    Placeholder {
        failure: AcquireFailure,
        placeholder: Placeholder,
    },
    /// Nothing usable was written
    HardFailure { reason: String },
    /// Interrupted while in flight; not checkpointed
    Abandoned,
}

impl AssetOutcome {
    pub fn kind(&self) -> &'static str {
        match self {
            AssetOutcome::Skipped(SkipReason::Checkpointed) => "skipped_checkpointed",
            AssetOutcome::Skipped(SkipReason::AlreadyGenuine) => "skipped_genuine",
            AssetOutcome::Acquired { .. } => "success",
            AssetOutcome::Placeholder { .. } => "placeholder",
            AssetOutcome::HardFailure { .. } => "hard_failure",
            AssetOutcome::Abandoned => "abandoned",
        }
    }
}

/// Outcome of one asset, by id
#[derive(Debug, Clone, PartialEq)]
pub struct AssetReport {
    pub id: String,
    pub outcome: AssetOutcome,
}

/// Everything a caller needs after a run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub stats: RunStatistics,
    pub outcomes: Vec<AssetReport>,
    /// Stopped early by the cancellation token
    pub interrupted: bool,
    pub checkpoint_cleared: bool,
    pub manifest: Option<ReconcileReport>,
    pub manifest_error: Option<String>,
    pub elapsed: Duration,
}

impl RunReport {
    /// 0 when every asset ended with usable content and the run finished
    pub fn exit_code(&self) -> u8 {
        if self.interrupted || self.stats.hard_failures > 0 || self.manifest_error.is_some() {
            1
        } else {
            0
        }
    }

    pub fn outcome(&self, id: &str) -> Option<&AssetOutcome> {
        self.outcomes.iter().find(|r| r.id == id).map(|r| &r.outcome)
    }
}

/// Planned work reported by `--dry-run`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DryRunEstimate {
    pub selected: usize,
    pub checkpointed: usize,
    pub already_genuine: usize,
    pub to_acquire: usize,
    /// Image queries that would hit the search API (one each when it answers first time)
    pub search_queries: usize,
    /// Upper bound if every search attempt is retried
    pub search_queries_worst_case: usize,
    /// Query-only audio assets, handled by the audio search tool
    pub audio_queries: usize,
    pub search_configured: bool,
    pub audio_search_configured: bool,
    pub daily_quota: u32,
    pub queries_over_quota: usize,
    pub estimated_cost_usd: f64,
}

impl DryRunEstimate {
    pub fn would_skip(&self) -> usize {
        self.checkpointed + self.already_genuine
    }

    pub fn display_lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!(
                "{} selected: {} would be skipped ({} checkpointed, {} already genuine), {} would be acquired",
                self.selected,
                self.would_skip(),
                self.checkpointed,
                self.already_genuine,
                self.to_acquire
            ),
            format!(
                "Image search queries: {} expected, {} worst case (free daily quota: {}, ${:.0} per 1000 after)",
                self.search_queries,
                self.search_queries_worst_case,
                self.daily_quota,
                SEARCH_COST_PER_1000_USD
            ),
        ];
        if !self.search_configured && self.search_queries > 0 {
            lines.push("Image search is not configured: query-based images will get placeholders".to_string());
        }
        if self.audio_queries > 0 {
            lines.push(if self.audio_search_configured {
                format!("Audio search: {} queries", self.audio_queries)
            } else {
                format!(
                    "Audio search is not available: {} query-only audio assets will get placeholders",
                    self.audio_queries
                )
            });
        }
        if self.queries_over_quota == 0 {
            lines.push("Within free quota".to_string());
        } else {
            lines.push(format!(
                "Will exceed quota by {} queries, estimated cost ${:.2}",
                self.queries_over_quota, self.estimated_cost_usd
            ));
        }
        lines
    }
}

/// Drives one acquisition run
pub struct Orchestrator {
    config: PipelineConfig,
    catalog: Catalog,
    transfer: Box<dyn TransferAdapter>,
    search: Option<Box<dyn SearchProvider>>,
    audio_search: Option<Box<dyn AudioSearch>>,
    classifier: ExistenceClassifier,
    placeholders: PlaceholderGenerator,
}

impl Orchestrator {
    pub fn new(config: PipelineConfig, catalog: Catalog, transfer: Box<dyn TransferAdapter>) -> Self {
        let classifier = ExistenceClassifier::from_config(&config);
        let placeholders = PlaceholderGenerator::new(
            config.root.clone(),
            config.audio_genuine_min_bytes,
            config.image_genuine_min_bytes,
        );
        Self {
            config,
            catalog,
            transfer,
            search: None,
            audio_search: None,
            classifier,
            placeholders,
        }
    }

    pub fn with_search(mut self, search: Box<dyn SearchProvider>) -> Self {
        self.search = Some(search);
        self
    }

    pub fn with_audio_search(mut self, audio_search: Box<dyn AudioSearch>) -> Self {
        self.audio_search = Some(audio_search);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    fn selection(&self) -> Vec<&AssetDescriptor> {
        self.catalog.select(&self.config.categories, self.config.limit)
    }

    /// Process every selected asset, then reconcile the manifest
    ///
    /// Per-asset failures never abort the run. Only an unreadable checkpoint
    /// file is an error.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<RunReport> {
        let selection = self.selection();
        let total = selection.len();
        let mut checkpoint = CheckpointStore::open(&self.config.checkpoint_path)?;
        let mut stats = RunStatistics::new();
        let mut outcomes = Vec::with_capacity(total);
        let mut interrupted = false;
        let start = Instant::now();

        info!(
            selected = total,
            catalog = self.catalog.len(),
            checkpointed = checkpoint.len(),
            root = %self.config.root.display(),
            "Starting acquisition run"
        );

        for (index, descriptor) in selection.iter().enumerate() {
            if cancel.is_cancelled() {
                interrupted = true;
                break;
            }

            let span = info_span!("asset", asset_id = %descriptor.id, category = %descriptor.category);
            let mut network_used = false;
            let asset_start = Instant::now();
            let outcome = self
                .process(descriptor, &mut checkpoint, cancel, &mut network_used)
                .instrument(span)
                .await;

            if outcome == AssetOutcome::Abandoned {
                warn!(asset_id = %descriptor.id, "Interrupted in flight; asset will be retried next run");
                outcomes.push(AssetReport {
                    id: descriptor.id.clone(),
                    outcome,
                });
                interrupted = true;
                break;
            }

            record(&mut stats, &outcome);
            log_outcome(descriptor, &outcome, asset_start.elapsed());
            outcomes.push(AssetReport {
                id: descriptor.id.clone(),
                outcome,
            });

            let progress = Progress {
                completed: index + 1,
                total,
                elapsed: start.elapsed(),
                stats,
            };
            info!("{}", progress.display_string());

            let more_to_do = index + 1 < total;
            if network_used && more_to_do && !self.config.inter_asset_delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        interrupted = true;
                        break;
                    }
                    _ = tokio::time::sleep(self.config.inter_asset_delay) => {}
                }
            }
        }

        let mut checkpoint_cleared = false;
        if !interrupted && stats.all_favorable(self.catalog.len()) {
            match checkpoint.clear() {
                Ok(()) => checkpoint_cleared = true,
                Err(e) => warn!(error = %e, "Could not clear checkpoint"),
            }
        }

        let (manifest, manifest_error) = match self.reconcile_manifest() {
            Ok(report) => (Some(report), None),
            Err(e) => {
                error!(error = %e, "Manifest reconciliation failed");
                (None, Some(e.to_string()))
            }
        };

        let elapsed = start.elapsed();
        if interrupted {
            warn!(
                elapsed = %format_duration(elapsed),
                "Run interrupted: {}",
                stats.display_string()
            );
        } else {
            info!(
                elapsed = %format_duration(elapsed),
                checkpoint_cleared,
                "Run complete: {}",
                stats.display_string()
            );
        }

        Ok(RunReport {
            stats,
            outcomes,
            interrupted,
            checkpoint_cleared,
            manifest,
            manifest_error,
            elapsed,
        })
    }

    async fn process(
        &self,
        descriptor: &AssetDescriptor,
        checkpoint: &mut CheckpointStore,
        cancel: &CancellationToken,
        network_used: &mut bool,
    ) -> AssetOutcome {
        if checkpoint.contains(&descriptor.id) {
            return AssetOutcome::Skipped(SkipReason::Checkpointed);
        }

        let destination = descriptor.destination_under(&self.config.root);
        let classification = self.classifier.classify(&destination, descriptor.category);
        if classification.state == AssetState::GenuinePresent {
            mark_resolved(checkpoint, &descriptor.id);
            return AssetOutcome::Skipped(SkipReason::AlreadyGenuine);
        }

        let acquirer = Acquirer {
            transfer: self.transfer.as_ref(),
            search: self.search.as_deref(),
            audio_search: self.audio_search.as_deref(),
            policy: RetryPolicy::new(self.config.max_attempts, self.config.base_delay),
            timeout: self.config.request_timeout,
        };
        let context = self.catalog.search_context(descriptor.category);

        match acquirer
            .acquire(&self.config.root, descriptor, context, cancel, network_used)
            .await
        {
            Ok(Acquired {
                bytes_written,
                attempts,
                ..
            }) => {
                mark_resolved(checkpoint, &descriptor.id);
                AssetOutcome::Acquired {
                    bytes_written,
                    attempts,
                }
            }
            Err(failure) if failure.is_cancelled() => AssetOutcome::Abandoned,
            Err(failure) if matches!(failure.error(), AcquireError::Filesystem { .. }) => {
                AssetOutcome::HardFailure {
                    reason: failure.error().truncated_reason(),
                }
            }
            Err(failure) => match self.placeholders.make_placeholder(descriptor) {
                Ok(placeholder) => {
                    mark_resolved(checkpoint, &descriptor.id);
                    AssetOutcome::Placeholder {
                        failure,
                        placeholder,
                    }
                }
                Err(e) => AssetOutcome::HardFailure {
                    reason: truncate_reason(&format!(
                        "{}; placeholder could not be written: {}",
                        failure, e
                    )),
                },
            },
        }
    }

    /// Rewrite the manifest from current disk state
    pub fn reconcile_manifest(&self) -> Result<ReconcileReport> {
        reconcile(
            &self.catalog,
            &self.config.root,
            &self.classifier,
            &self.config.manifest_path,
        )
    }

    /// Report planned work without transfers or writes
    pub fn estimate(&self) -> Result<DryRunEstimate> {
        let checkpointed = read_ids(&self.config.checkpoint_path)?;
        let mut estimate = DryRunEstimate {
            search_configured: self.search.is_some(),
            audio_search_configured: self.audio_search.is_some(),
            daily_quota: self.config.daily_search_quota,
            ..Default::default()
        };

        for descriptor in self.selection() {
            estimate.selected += 1;
            if checkpointed.contains(&descriptor.id) {
                estimate.checkpointed += 1;
                continue;
            }

            let destination = descriptor.destination_under(&self.config.root);
            if self.classifier.classify(&destination, descriptor.category).state
                == AssetState::GenuinePresent
            {
                estimate.already_genuine += 1;
                continue;
            }

            estimate.to_acquire += 1;
            if let SourceHint::Query(_) = descriptor.source {
                match descriptor.media_kind() {
                    MediaKind::Image => estimate.search_queries += 1,
                    MediaKind::Audio => estimate.audio_queries += 1,
                }
            }
        }

        estimate.search_queries_worst_case =
            estimate.search_queries * self.config.max_attempts.max(1) as usize;
        estimate.queries_over_quota = estimate
            .search_queries
            .saturating_sub(self.config.daily_search_quota as usize);
        estimate.estimated_cost_usd =
            estimate.queries_over_quota as f64 / 1000.0 * SEARCH_COST_PER_1000_USD;

        Ok(estimate)
    }
}

/// Append to the checkpoint; failure is logged, the outcome stands
fn mark_resolved(checkpoint: &mut CheckpointStore, id: &str) {
    if let Err(e) = checkpoint.append(id) {
        error!(
            asset_id = id,
            path = %checkpoint.path().display(),
            error = %e,
            "Could not record checkpoint"
        );
    }
}

fn record(stats: &mut RunStatistics, outcome: &AssetOutcome) {
    match outcome {
        AssetOutcome::Skipped(_) => stats.skipped += 1,
        AssetOutcome::Acquired { .. } => {
            stats.attempted += 1;
            stats.succeeded += 1;
        }
        AssetOutcome::Placeholder { .. } => {
            stats.attempted += 1;
            stats.failed += 1;
            stats.placeholders += 1;
        }
        AssetOutcome::HardFailure { .. } => {
            stats.attempted += 1;
            stats.failed += 1;
            stats.hard_failures += 1;
        }
        AssetOutcome::Abandoned => {}
    }
}

fn log_outcome(descriptor: &AssetDescriptor, outcome: &AssetOutcome, elapsed: Duration) {
    let elapsed_ms = elapsed.as_millis() as u64;
    match outcome {
        AssetOutcome::Skipped(_) => info!(
            asset_id = %descriptor.id,
            outcome = outcome.kind(),
            "Skipped"
        ),
        AssetOutcome::Acquired {
            bytes_written,
            attempts,
        } => info!(
            asset_id = %descriptor.id,
            outcome = outcome.kind(),
            bytes_written,
            attempts,
            elapsed_ms,
            "Acquired"
        ),
        AssetOutcome::Placeholder {
            failure,
            placeholder,
        } => warn!(
            asset_id = %descriptor.id,
            outcome = outcome.kind(),
            failure = failure.kind(),
            attempts = failure.attempts(),
            reason = %truncate_reason(&failure.to_string()),
            placeholder = %placeholder.path.display(),
            elapsed_ms,
            "Acquisition failed, placeholder written"
        ),
        AssetOutcome::HardFailure { reason } => error!(
            asset_id = %descriptor.id,
            outcome = outcome.kind(),
            reason = %reason,
            elapsed_ms,
            "Acquisition failed with nothing written"
        ),
        AssetOutcome::Abandoned => {}
    }
}
