//! Fakes for the collaborator traits, shared by the unit tests

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::effect::Effect;
use crate::metrics::{MetricsResult, MetricsSink};
use crate::notifier::{Notification, Notifier, NotifyError, NotifyResult};
use crate::route::{ItemKey, PersistedRoute, RawLiveRoute, RouteFilter};
use crate::source::{
    BoxFuture, Continuation, LiveRouteSource, RoutePage, SourceError, SourceResult,
};
use crate::store::{MemoryStore, MirrorStore, StoreError, StoreResult};

/// Source serving fixed pages per route table, with tokens "page-N"
#[derive(Default)]
pub struct PagedSource {
    pages: HashMap<String, Vec<Vec<RawLiveRoute>>>,
    truncated: HashSet<String>,
    unavailable: HashSet<String>,
    fail_on_page: Option<usize>,
    filters: Mutex<Vec<RouteFilter>>,
}

impl PagedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pages(mut self, route_table_id: &str, pages: Vec<Vec<RawLiveRoute>>) -> Self {
        self.pages.insert(route_table_id.to_string(), pages);
        self
    }

    pub fn with_routes(self, route_table_id: &str, routes: Vec<RawLiveRoute>) -> Self {
        self.with_pages(route_table_id, vec![routes])
    }

    /// One page followed by a report that more routes exist
    pub fn with_truncated(mut self, route_table_id: &str, routes: Vec<RawLiveRoute>) -> Self {
        self.truncated.insert(route_table_id.to_string());
        self.with_routes(route_table_id, routes)
    }

    pub fn unavailable(mut self, route_table_id: &str) -> Self {
        self.unavailable.insert(route_table_id.to_string());
        self
    }

    /// Fail when the 1-based page `page` is requested
    pub fn failing_on_page(mut self, page: usize) -> Self {
        self.fail_on_page = Some(page);
        self
    }

    pub fn filters_seen(&self) -> Vec<RouteFilter> {
        self.filters.lock().unwrap().clone()
    }

    fn page(
        &self,
        route_table_id: &str,
        filter: &RouteFilter,
        page_token: Option<&str>,
    ) -> SourceResult<RoutePage> {
        self.filters.lock().unwrap().push(filter.clone());

        if self.unavailable.contains(route_table_id) {
            return Err(SourceError::Aws("connection refused".to_string()));
        }

        let index = page_token
            .and_then(|token| token.strip_prefix("page-"))
            .and_then(|n| n.parse::<usize>().ok())
            .unwrap_or(0);
        if self.fail_on_page == Some(index + 1) {
            return Err(SourceError::Aws(format!("page {} timed out", index + 1)));
        }

        let pages = self.pages.get(route_table_id).cloned().unwrap_or_default();
        let routes = pages.get(index).cloned().unwrap_or_default();
        let continuation = if self.truncated.contains(route_table_id) {
            Continuation::Truncated
        } else if index + 1 < pages.len() {
            Continuation::Next(format!("page-{}", index + 1))
        } else {
            Continuation::Complete
        };

        Ok(RoutePage {
            routes,
            continuation,
        })
    }
}

impl LiveRouteSource for PagedSource {
    fn name(&self) -> &'static str {
        "paged"
    }

    fn search_routes<'a>(
        &'a self,
        route_table_id: &'a str,
        filter: &'a RouteFilter,
        page_token: Option<&'a str>,
    ) -> BoxFuture<'a, SourceResult<RoutePage>> {
        let result = self.page(route_table_id, filter, page_token);
        Box::pin(async move { result })
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn publish(&self, notification: &Notification) -> NotifyResult<()> {
        if self.fail {
            return Err(NotifyError::Aws("topic not found".to_string()));
        }
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingMetrics {
    recorded: Mutex<Vec<(String, String, String, usize)>>,
}

impl RecordingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> Vec<(String, String, String, usize)> {
        self.recorded.lock().unwrap().clone()
    }
}

#[async_trait]
impl MetricsSink for RecordingMetrics {
    async fn put_count(
        &self,
        namespace: &str,
        metric_name: &str,
        route_table_id: &str,
        value: usize,
    ) -> MetricsResult<()> {
        self.recorded.lock().unwrap().push((
            namespace.to_string(),
            metric_name.to_string(),
            route_table_id.to_string(),
            value,
        ));
        Ok(())
    }
}

/// Memory-backed store that can fail or withhold batches
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    failing_batches: HashSet<usize>,
    withhold_last_once: bool,
    withhold_everything: bool,
    failing_queries: bool,
    batch_size: Option<usize>,
    batch_calls: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the 1-based batch call `call` outright
    pub fn failing_batch(mut self, call: usize) -> Self {
        self.failing_batches.insert(call);
        self
    }

    /// Report the last effect of the first batch call as unprocessed
    pub fn withholding_last_once(mut self) -> Self {
        self.withhold_last_once = true;
        self
    }

    /// Never process anything
    pub fn withholding_everything(mut self) -> Self {
        self.withhold_everything = true;
        self
    }

    pub fn failing_queries(mut self) -> Self {
        self.failing_queries = true;
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size);
        self
    }

    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MirrorStore for FlakyStore {
    fn name(&self) -> &'static str {
        "flaky"
    }

    async fn query_partition(&self, hash_key: &str) -> StoreResult<Vec<PersistedRoute>> {
        if self.failing_queries {
            return Err(StoreError::Aws("ProvisionedThroughputExceeded".to_string()));
        }
        self.inner.query_partition(hash_key).await
    }

    async fn put_item(&self, route: &PersistedRoute) -> StoreResult<()> {
        self.inner.put_item(route).await
    }

    async fn delete_item(&self, key: &ItemKey) -> StoreResult<()> {
        self.inner.delete_item(key).await
    }

    async fn batch_write(&self, effects: &[Effect]) -> StoreResult<Vec<Effect>> {
        let call = self.batch_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.failing_batches.contains(&call) {
            return Err(StoreError::Aws("throttled".to_string()));
        }
        if self.withhold_everything {
            return Ok(effects.to_vec());
        }

        let split = if self.withhold_last_once && call == 1 {
            effects.len().saturating_sub(1)
        } else {
            effects.len()
        };
        let (apply, hold) = effects.split_at(split);
        self.inner.batch_write(apply).await?;
        Ok(hold.to_vec())
    }

    fn max_batch_size(&self) -> usize {
        self.batch_size
            .unwrap_or_else(|| self.inner.max_batch_size())
    }
}

/// Memory-backed store that rejects puts of one key and keeps the default
/// one-at-a-time batch writes
pub struct RejectingStore {
    pub inner: MemoryStore,
    rejected: ItemKey,
}

impl RejectingStore {
    pub fn new(hash_key: &str, sort_key: &str) -> Self {
        Self {
            inner: MemoryStore::new(),
            rejected: ItemKey::new(hash_key, sort_key),
        }
    }
}

#[async_trait]
impl MirrorStore for RejectingStore {
    fn name(&self) -> &'static str {
        "rejecting"
    }

    async fn query_partition(&self, hash_key: &str) -> StoreResult<Vec<PersistedRoute>> {
        self.inner.query_partition(hash_key).await
    }

    async fn put_item(&self, route: &PersistedRoute) -> StoreResult<()> {
        if route.key == self.rejected {
            return Err(StoreError::Aws("ConditionalCheckFailed".to_string()));
        }
        self.inner.put_item(route).await
    }

    async fn delete_item(&self, key: &ItemKey) -> StoreResult<()> {
        self.inner.delete_item(key).await
    }
}
