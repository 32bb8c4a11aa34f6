//! Reconciler - Converge the mirror onto the live route tables
//!
//! One run per route table: fetch every live route, read the mirror
//! partition, diff, then apply the resulting [`Plan`] in batches. Route tables
//! are reconciled independently; a failure in one is reported and the next
//! is still attempted.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::differ::{RouteDiff, diff};
use crate::effect::Effect;
use crate::normalizer::{normalize_live, normalize_mirror};
use crate::notifier::{Notifier, new_routes_digest};
use crate::plan::Plan;
use crate::route::{CanonicalRoute, ItemKey, RouteFilter};
use crate::source::{LiveRouteSource, SourceError, fetch_all_routes};
use crate::store::{MirrorStore, StoreError};

/// A route table to reconcile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTableTarget {
    /// Label used in logs and notifications (e.g., "prod")
    pub environment: String,
    pub route_table_id: String,
}

impl RouteTableTarget {
    pub fn new(environment: impl Into<String>, route_table_id: impl Into<String>) -> Self {
        Self {
            environment: environment.into(),
            route_table_id: route_table_id.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Live routes could not be fetched completely
    #[error("Live routes for {route_table_id} unavailable: {source}")]
    SourceUnavailable {
        route_table_id: String,
        source: SourceError,
    },

    /// The mirror could not be read, or some writes failed. `added` and
    /// `removed` count the writes that did land.
    #[error(
        "Mirror for {route_table_id} unavailable: {source} \
         ({added} added, {removed} removed before failure)"
    )]
    StoreUnavailable {
        route_table_id: String,
        source: StoreError,
        added: usize,
        removed: usize,
    },
}

impl ReconcileError {
    pub fn route_table_id(&self) -> &str {
        match self {
            ReconcileError::SourceUnavailable { route_table_id, .. }
            | ReconcileError::StoreUnavailable { route_table_id, .. } => route_table_id,
        }
    }
}

/// What happened to the new-routes notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationStatus {
    /// Nothing was added
    NotNeeded,
    /// No notifier configured, or dry run
    Disabled,
    Sent,
    /// Delivery failed; the mirror writes still stand
    Failed(String),
}

/// Outcome of reconciling one route table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub target: RouteTableTarget,
    pub added: usize,
    pub removed: usize,
    pub unchanged: usize,
    pub notification: NotificationStatus,
    pub dry_run: bool,
}

/// Result of applying a Plan
#[derive(Debug, Default)]
pub struct ApplyResult {
    /// Keys of puts that landed
    pub put_keys: HashSet<ItemKey>,
    pub deleted: usize,
    pub errors: Vec<StoreError>,
}

impl ApplyResult {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    fn record(&mut self, applied: Vec<Effect>) {
        for effect in applied {
            match effect {
                Effect::Put(route) => {
                    self.put_keys.insert(route.key);
                }
                Effect::Delete(_) => self.deleted += 1,
            }
        }
    }
}

/// One route table's entry in a multi-table run
#[derive(Debug)]
pub struct TableOutcome {
    pub target: RouteTableTarget,
    pub result: Result<ReconcileReport, ReconcileError>,
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub outcomes: Vec<TableOutcome>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    pub fn failure_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_err()).count()
    }
}

/// Reconciler configuration
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Compute the diff but write and notify nothing
    pub dry_run: bool,
    /// Batch size; capped at the store's ceiling
    pub batch_size: Option<usize>,
    /// Retries for items a store reports as unprocessed
    pub max_unprocessed_retries: u32,
    /// First retry delay; doubles per attempt
    pub retry_base_delay: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            batch_size: None,
            max_unprocessed_retries: 3,
            retry_base_delay: Duration::from_millis(50),
        }
    }
}

/// Reconciler holding explicit collaborator handles
pub struct Reconciler {
    source: Arc<dyn LiveRouteSource>,
    store: Arc<dyn MirrorStore>,
    notifier: Option<Arc<dyn Notifier>>,
    filter: RouteFilter,
    config: ReconcilerConfig,
}

impl Reconciler {
    pub fn new(source: Arc<dyn LiveRouteSource>, store: Arc<dyn MirrorStore>) -> Self {
        Self {
            source,
            store,
            notifier: None,
            filter: RouteFilter::vpc_propagated(),
            config: ReconcilerConfig::default(),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_config(mut self, config: ReconcilerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_filter(mut self, filter: RouteFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Fetch both sides and diff them without writing anything
    pub async fn plan(&self, target: &RouteTableTarget) -> Result<RouteDiff, ReconcileError> {
        let route_table_id = target.route_table_id.as_str();

        let raw = fetch_all_routes(self.source.as_ref(), route_table_id, &self.filter)
            .await
            .map_err(|source| ReconcileError::SourceUnavailable {
                route_table_id: route_table_id.to_string(),
                source,
            })?;
        let live = normalize_live(route_table_id, &raw);
        log::info!(
            "{} ({}): {} live routes from {} raw routes",
            target.environment,
            route_table_id,
            live.len(),
            raw.len()
        );

        let rows = self
            .store
            .query_partition(route_table_id)
            .await
            .map_err(|source| ReconcileError::StoreUnavailable {
                route_table_id: route_table_id.to_string(),
                source,
                added: 0,
                removed: 0,
            })?;
        let mirror = normalize_mirror(rows);
        log::info!(
            "{} ({}): {} mirror rows in {}",
            target.environment,
            route_table_id,
            mirror.len(),
            self.store.name()
        );

        let result = diff(&live, &mirror);
        log::info!(
            "{} ({}): {}",
            target.environment,
            route_table_id,
            result.summary()
        );
        Ok(result)
    }

    /// Reconcile one route table
    pub async fn reconcile(
        &self,
        target: &RouteTableTarget,
    ) -> Result<ReconcileReport, ReconcileError> {
        let diff = self.plan(target).await?;
        let summary = diff.summary();

        if self.config.dry_run {
            return Ok(ReconcileReport {
                target: target.clone(),
                added: summary.added,
                removed: summary.removed,
                unchanged: summary.unchanged,
                notification: NotificationStatus::Disabled,
                dry_run: true,
            });
        }

        let plan = Plan::from_diff(&diff);
        let applied = self.apply(&plan).await;

        let added: Vec<CanonicalRoute> = diff
            .added
            .into_iter()
            .filter(|route| applied.put_keys.contains(&route.item_key()))
            .collect();
        let notification = self.notify(target, &added).await;

        let mut errors = applied.errors.into_iter();
        if let Some(source) = errors.next() {
            for extra in errors {
                log::error!("{}: additional write failure: {}", target.route_table_id, extra);
            }
            return Err(ReconcileError::StoreUnavailable {
                route_table_id: target.route_table_id.clone(),
                source,
                added: added.len(),
                removed: applied.deleted,
            });
        }

        log::info!(
            "{} ({}): {} routes added, {} removed",
            target.environment,
            target.route_table_id,
            added.len(),
            applied.deleted
        );
        Ok(ReconcileReport {
            target: target.clone(),
            added: added.len(),
            removed: applied.deleted,
            unchanged: summary.unchanged,
            notification,
            dry_run: false,
        })
    }

    /// Reconcile every target, collecting one outcome per table
    pub async fn reconcile_all(&self, targets: &[RouteTableTarget]) -> RunReport {
        let mut report = RunReport::default();

        for target in targets {
            let result = self.reconcile(target).await;
            if let Err(e) = &result {
                log::error!("{} ({}): {}", target.environment, target.route_table_id, e);
            }
            report.outcomes.push(TableOutcome {
                target: target.clone(),
                result,
            });
        }

        report
    }

    /// Apply a Plan batch by batch. A failed batch is recorded and the rest
    /// are still attempted; nothing already written is rolled back.
    pub async fn apply(&self, plan: &Plan) -> ApplyResult {
        let ceiling = self.store.max_batch_size();
        let batch_size = self
            .config
            .batch_size
            .map_or(ceiling, |size| size.min(ceiling));

        let mut result = ApplyResult::default();
        for (index, batch) in plan.batches(batch_size).enumerate() {
            let (applied, error) = self.write_batch(batch).await;
            log::debug!(
                "batch {}: {} of {} effects applied",
                index + 1,
                applied.len(),
                batch.len()
            );
            result.record(applied);
            if let Some(e) = error {
                log::warn!("batch {} failed: {}", index + 1, e);
                result.errors.push(e);
            }
        }
        result
    }

    /// Write one batch, retrying unprocessed items with exponential backoff.
    /// Returns the effects that landed and the error that stopped the batch.
    async fn write_batch(&self, batch: &[Effect]) -> (Vec<Effect>, Option<StoreError>) {
        let mut applied = Vec::with_capacity(batch.len());
        let mut pending = batch.to_vec();
        let mut attempt = 0;

        loop {
            let unprocessed = match self.store.batch_write(&pending).await {
                Ok(unprocessed) => unprocessed,
                Err(StoreError::PartialBatch {
                    applied: landed,
                    source,
                }) => {
                    applied.extend(landed);
                    return (applied, Some(*source));
                }
                Err(e) => return (applied, Some(e)),
            };

            {
                let held: HashSet<&ItemKey> = unprocessed.iter().map(Effect::key).collect();
                applied.extend(
                    pending
                        .iter()
                        .filter(|effect| !held.contains(effect.key()))
                        .cloned(),
                );
            }

            if unprocessed.is_empty() {
                return (applied, None);
            }
            if attempt >= self.config.max_unprocessed_retries {
                let count = unprocessed.len();
                return (applied, Some(StoreError::Unprocessed { count }));
            }

            let delay = self.config.retry_base_delay * 2u32.saturating_pow(attempt);
            attempt += 1;
            log::debug!(
                "{} unprocessed writes, retry {} in {:?}",
                unprocessed.len(),
                attempt,
                delay
            );
            tokio::time::sleep(delay).await;
            pending = unprocessed;
        }
    }

    async fn notify(
        &self,
        target: &RouteTableTarget,
        added: &[CanonicalRoute],
    ) -> NotificationStatus {
        if added.is_empty() {
            return NotificationStatus::NotNeeded;
        }
        let Some(notifier) = &self.notifier else {
            return NotificationStatus::Disabled;
        };

        let notification = new_routes_digest(&target.environment, &target.route_table_id, added);
        match notifier.publish(&notification).await {
            Ok(()) => {
                log::info!("Sent notification: {}", notification.subject);
                NotificationStatus::Sent
            }
            Err(e) => {
                log::warn!(
                    "Notification for {} failed: {}",
                    target.route_table_id,
                    e
                );
                NotificationStatus::Failed(e.to_string())
            }
        }
    }
}
