// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of Homevolt Monitor.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

use homevolt_types::{EmsResponse, Endpoint, NodeId, Snapshot};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify, broadcast};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::classifier::DEFAULT_GRACE_THRESHOLD;
use crate::event::CoordinatorEvent;
use crate::merger::{CycleResults, FetchOutcome, NodeMetricsBatch, Payload, StateMerger};
use crate::schedule::TierSchedule;
use crate::source::{DeviceApi, FetchFailure, FetchResult};
use crate::store::SnapshotStore;

pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorConfig {
    pub scan_interval: Duration,
    /// Upper bound for a single fetch, always shorter than the scan interval
    pub fetch_timeout: Duration,
    pub grace_threshold: u32,
    pub schedule: TierSchedule,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SCAN_INTERVAL, DEFAULT_READ_TIMEOUT)
    }
}

impl CoordinatorConfig {
    pub fn new(scan_interval: Duration, read_timeout: Duration) -> Self {
        let ceiling = scan_interval.saturating_sub(Duration::from_secs(1));
        let fetch_timeout = if ceiling.is_zero() {
            read_timeout.min(scan_interval)
        } else {
            read_timeout.min(ceiling)
        };
        Self {
            scan_interval,
            fetch_timeout,
            grace_threshold: DEFAULT_GRACE_THRESHOLD,
            schedule: TierSchedule::default(),
        }
    }

    #[must_use]
    pub fn with_grace_threshold(mut self, grace_threshold: u32) -> Self {
        self.grace_threshold = grace_threshold;
        self
    }

    #[must_use]
    pub fn with_fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }
}

/// Cycle number and the endpoints to fetch in it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CyclePlan {
    pub cycle: u64,
    pub endpoints: Vec<Endpoint>,
    /// Every endpoint regardless of tier (first cycle or manual refresh)
    pub forced: bool,
}

impl CyclePlan {
    pub fn is_due(&self, endpoint: Endpoint) -> bool {
        self.endpoints.contains(&endpoint)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleReport {
    Published { cycle: u64 },
    /// A newer cycle had already been published
    Discarded { cycle: u64, last_published: u64 },
}

/// Polling coordinator: schedules fetches, merges them and publishes snapshots
pub struct Coordinator {
    api: Arc<dyn DeviceApi>,
    config: CoordinatorConfig,
    store: Arc<SnapshotStore>,
    merger: Mutex<StateMerger>,
    cycle: AtomicU64,
    refresh: Notify,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("config", &self.config)
            .field("cycle", &self.cycle.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Coordinator {
    pub fn new(api: Arc<dyn DeviceApi>, config: CoordinatorConfig) -> Self {
        Self {
            api,
            config,
            store: Arc::new(SnapshotStore::new()),
            merger: Mutex::new(StateMerger::new(config.grace_threshold)),
            cycle: AtomicU64::new(0),
            refresh: Notify::new(),
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<SnapshotStore> {
        Arc::clone(&self.store)
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.store.snapshot()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.store.subscribe()
    }

    /// Claim the next cycle number and decide what is due in it
    pub fn begin_cycle(&self, force_all: bool) -> CyclePlan {
        let cycle = self.cycle.fetch_add(1, Ordering::SeqCst).saturating_add(1);
        let forced = force_all || cycle == 1;
        CyclePlan {
            cycle,
            endpoints: self.config.schedule.due_endpoints(cycle, forced),
            forced,
        }
    }

    /// Fetch every due endpoint concurrently. Node metrics wait only for the primary fetch,
    /// which tells them which nodes to ask.
    pub async fn fetch_cycle(&self, plan: &CyclePlan) -> CycleResults {
        debug!(cycle = plan.cycle, endpoints = ?plan.endpoints, "🔄 Fetching cycle");

        let primary_chain = async {
            let ems = if plan.is_due(Endpoint::Ems) {
                Some(self.bounded(Endpoint::Ems, self.api.ems()).await)
            } else {
                None
            };

            let node_metrics = if plan.is_due(Endpoint::NodeMetrics) {
                let targets = match &ems {
                    Some(Ok(response)) => metrics_targets(response),
                    Some(Err(_)) | None => self.store.snapshot().clamp_nodes(),
                };
                let result = self.fetch_node_metrics(targets).await;
                Some(FetchOutcome::new(
                    Endpoint::NodeMetrics,
                    result.map(Payload::NodeMetrics),
                ))
            } else {
                None
            };

            let ems = ems.map(|result| FetchOutcome::new(Endpoint::Ems, result.map(Payload::Ems)));
            (ems, node_metrics)
        };

        let error_report = self.fetch_if_due(plan, Endpoint::ErrorReport, async {
            self.api.error_report().await.map(Payload::ErrorReport)
        });
        let status = self.fetch_if_due(plan, Endpoint::Status, async {
            self.api.status().await.map(Payload::Status)
        });
        let nodes = self.fetch_if_due(plan, Endpoint::Nodes, async {
            self.api.nodes().await.map(Payload::Nodes)
        });

        let ((ems, node_metrics), error_report, status, nodes) =
            tokio::join!(primary_chain, error_report, status, nodes);

        CycleResults {
            cycle: plan.cycle,
            outcomes: [ems, error_report, status, nodes, node_metrics]
                .into_iter()
                .flatten()
                .collect(),
        }
    }

    /// Merge a fetched cycle and publish it, unless a newer cycle already was
    pub async fn apply(&self, results: CycleResults) -> CycleReport {
        let cycle = results.cycle;
        let mut merger = self.merger.lock().await;
        let current = self.store.snapshot();

        match merger.merge(&current, results) {
            Some(output) => {
                let events = output.events.len();
                self.store.publish(output);
                debug!(cycle, events, "📸 Snapshot published");
                CycleReport::Published { cycle }
            }
            None => CycleReport::Discarded {
                cycle,
                last_published: merger.last_published(),
            },
        }
    }

    /// One scheduled cycle, start to finish
    pub async fn tick(&self) -> CycleReport {
        let plan = self.begin_cycle(false);
        let results = self.fetch_cycle(&plan).await;
        self.apply(results).await
    }

    /// Immediate out-of-cycle refresh of every endpoint
    pub async fn refresh(&self) -> CycleReport {
        let plan = self.begin_cycle(true);
        let results = self.fetch_cycle(&plan).await;
        self.apply(results).await
    }

    /// Ask a running coordinator loop for an out-of-cycle refresh
    pub fn request_refresh(&self) {
        self.refresh.notify_one();
    }

    /// Drive cycles forever on the scan interval. Each cycle runs in its own task, so a slow
    /// device never delays the next tick.
    pub async fn run(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.scan_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            scan_interval_secs = self.config.scan_interval.as_secs(),
            fetch_timeout_secs = self.config.fetch_timeout.as_secs(),
            grace_threshold = self.config.grace_threshold,
            "🔋 Polling coordinator started"
        );

        loop {
            let forced = tokio::select! {
                _ = interval.tick() => false,
                () = self.refresh.notified() => {
                    interval.reset();
                    true
                }
            };

            let plan = self.begin_cycle(forced);
            let coordinator = Arc::clone(&self);
            tokio::spawn(async move {
                let results = coordinator.fetch_cycle(&plan).await;
                if let CycleReport::Discarded {
                    cycle,
                    last_published,
                } = coordinator.apply(results).await
                {
                    warn!(cycle, last_published, "⏭️ Cycle finished after a newer one, discarded");
                }
            });
        }
    }

    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn bounded<T>(
        &self,
        endpoint: Endpoint,
        fetch: impl Future<Output = FetchResult<T>>,
    ) -> FetchResult<T> {
        with_timeout(self.config.fetch_timeout, endpoint, fetch).await
    }

    async fn fetch_if_due(
        &self,
        plan: &CyclePlan,
        endpoint: Endpoint,
        fetch: impl Future<Output = FetchResult<Payload>>,
    ) -> Option<FetchOutcome> {
        if !plan.is_due(endpoint) {
            return None;
        }
        let result = self.bounded(endpoint, fetch).await;
        Some(FetchOutcome::new(endpoint, result))
    }

    /// Ask every target node for its metrics. One answer is enough for success; a node that
    /// does not answer keeps its previous metrics as stale.
    async fn fetch_node_metrics(&self, targets: Vec<NodeId>) -> FetchResult<NodeMetricsBatch> {
        if targets.is_empty() {
            debug!("No CT nodes to query for metrics");
            return Ok(NodeMetricsBatch::default());
        }

        let mut tasks = JoinSet::new();
        for node in targets.iter().copied() {
            let api = Arc::clone(&self.api);
            let timeout = self.config.fetch_timeout;
            tasks.spawn(async move {
                let result = with_timeout(timeout, Endpoint::NodeMetrics, api.node_metrics(node)).await;
                (node, result)
            });
        }

        let mut metrics = BTreeMap::new();
        let mut failures = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((node, Ok(m))) => {
                    metrics.insert(node, m);
                }
                Ok((node, Err(failure))) => {
                    debug!(node = %node, "Node metrics unavailable: {failure}");
                    failures.insert(node, failure);
                }
                Err(e) => warn!(error = %e, "Node metrics task failed"),
            }
        }

        if metrics.is_empty() {
            let failure = failures.into_values().next().unwrap_or_else(|| FetchFailure::Network {
                endpoint: Endpoint::NodeMetrics,
                message: "no node answered".to_owned(),
            });
            return Err(failure);
        }

        if !failures.is_empty() {
            debug!(
                answered = metrics.len(),
                failed = failures.len(),
                "Partial node metrics"
            );
        }
        Ok(NodeMetricsBatch { targets, metrics })
    }
}

async fn with_timeout<T>(
    timeout: Duration,
    endpoint: Endpoint,
    fetch: impl Future<Output = FetchResult<T>>,
) -> FetchResult<T> {
    tokio::time::timeout(timeout, fetch)
        .await
        .unwrap_or(Err(FetchFailure::Timeout { endpoint }))
}

/// Non-zero node ids of the paired clamps in a primary payload
fn metrics_targets(response: &EmsResponse) -> Vec<NodeId> {
    let mut targets: Vec<NodeId> = response
        .sensors
        .iter()
        .filter(|sensor| sensor.is_paired())
        .filter_map(|sensor| NodeId::from_raw(sensor.node_id))
        .collect();
    targets.sort_unstable();
    targets.dedup();
    targets
}
