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

//! State merging.
//!
//! Each endpoint outcome of a cycle is folded into a copy of the current snapshot, one field
//! group at a time. Groups of endpoints that were not due in the cycle are left untouched, so
//! a failure on one endpoint never discards what another endpoint delivered.

use chrono::{DateTime, Utc};
use homevolt_types::{
    ClampId, ClampTelemetry, Diagnostics, EmsResponse, Endpoint, EndpointHealth, EntityId,
    EntityKind, ErrorReportEntry, FieldGroup, Freshness, GroupFreshness, ModuleId,
    ModuleTelemetry, NodeId, NodeInfo, NodeMetrics, Snapshot, StatusResponse, SystemTelemetry,
    Tracked,
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use crate::classifier::{FailureClassifier, Verdict};
use crate::event::{CoordinatorEvent, MessageCategory};
use crate::source::FetchFailure;
use crate::topology::TopologyTracker;

/// Node metrics gathered for one cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeMetricsBatch {
    /// Nodes that were asked
    pub targets: Vec<NodeId>,
    /// Nodes that answered
    pub metrics: BTreeMap<NodeId, NodeMetrics>,
}

/// Parsed body of one endpoint
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Ems(EmsResponse),
    ErrorReport(Vec<ErrorReportEntry>),
    Status(StatusResponse),
    Nodes(Vec<NodeInfo>),
    NodeMetrics(NodeMetricsBatch),
}

#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub endpoint: Endpoint,
    pub result: Result<Payload, FetchFailure>,
    pub finished_at: DateTime<Utc>,
}

impl FetchOutcome {
    pub fn new(endpoint: Endpoint, result: Result<Payload, FetchFailure>) -> Self {
        Self {
            endpoint,
            result,
            finished_at: Utc::now(),
        }
    }
}

/// Everything fetched during one cycle, merged as a unit
#[derive(Debug, Clone, Default)]
pub struct CycleResults {
    pub cycle: u64,
    pub outcomes: Vec<FetchOutcome>,
}

/// A merged cycle ready to be published
#[derive(Debug, Clone)]
pub struct MergeOutput {
    pub snapshot: Snapshot,
    pub health: Vec<EndpointHealth>,
    pub events: Vec<CoordinatorEvent>,
}

/// Single writer of snapshot content, endpoint health and topology
#[derive(Debug)]
pub struct StateMerger {
    classifier: FailureClassifier,
    tracker: TopologyTracker,
    health: BTreeMap<Endpoint, EndpointHealth>,
    last_published: u64,
}

impl StateMerger {
    pub fn new(grace_threshold: u32) -> Self {
        let classifier = FailureClassifier::new(grace_threshold);
        Self {
            classifier,
            tracker: TopologyTracker::new(classifier),
            health: Endpoint::ALL
                .into_iter()
                .map(|endpoint| (endpoint, EndpointHealth::new(endpoint)))
                .collect(),
            last_published: 0,
        }
    }

    pub fn health(&self) -> Vec<EndpointHealth> {
        self.health.values().cloned().collect()
    }

    pub fn last_published(&self) -> u64 {
        self.last_published
    }

    /// Fold a cycle into `current`. Returns `None` when a newer cycle was already merged; the
    /// superseded results then leave no trace (values, health and topology alike).
    pub fn merge(&mut self, current: &Snapshot, mut results: CycleResults) -> Option<MergeOutput> {
        if results.cycle <= self.last_published {
            debug!(
                cycle = results.cycle,
                last_published = self.last_published,
                "⏭️ Discarding superseded cycle"
            );
            return None;
        }

        // Primary first so module and clamp existence is settled before anything else
        results.outcomes.sort_by_key(|outcome| outcome.endpoint);

        let mut next = current.clone();
        let mut events = Vec::new();

        for FetchOutcome {
            endpoint,
            result,
            finished_at,
        } in results.outcomes
        {
            let Some(health) = self.health.get_mut(&endpoint) else {
                continue;
            };
            match result {
                Ok(payload) => {
                    self.classifier.record_success(health, finished_at);
                    self.apply_payload(&mut next, payload, finished_at, &mut events);
                }
                Err(failure) => {
                    let verdict = self.classifier.record_failure(health, &failure, finished_at);
                    self.apply_failure(&mut next, endpoint, verdict, &mut events);
                }
            }
        }

        next.cycle = results.cycle;
        next.published_at = Some(Utc::now());
        self.last_published = results.cycle;
        events.push(CoordinatorEvent::SnapshotUpdated {
            cycle: results.cycle,
        });

        Some(MergeOutput {
            snapshot: next,
            health: self.health(),
            events,
        })
    }

    fn apply_payload(
        &mut self,
        snapshot: &mut Snapshot,
        payload: Payload,
        at: DateTime<Utc>,
        events: &mut Vec<CoordinatorEvent>,
    ) {
        match payload {
            Payload::Ems(response) => self.merge_ems(snapshot, &response, at, events),
            Payload::ErrorReport(entries) => {
                snapshot.diagnostics = Some(Diagnostics::from_entries(entries));
                mark_fresh(snapshot, FieldGroup::Diagnostics, at);
            }
            Payload::Status(status) => {
                snapshot.status = Some(status);
                mark_fresh(snapshot, FieldGroup::Status, at);
            }
            Payload::Nodes(nodes) => {
                let present: BTreeMap<NodeId, NodeInfo> = nodes
                    .into_iter()
                    .filter_map(|node| NodeId::from_raw(node.node_id).map(|id| (id, node)))
                    .collect();
                let ids: BTreeSet<EntityId> = present.keys().map(|id| EntityId::Node(*id)).collect();
                let diff = self.tracker.observe(EntityKind::Node, &ids);

                replace_present(&mut snapshot.nodes, present, at);
                mark_removed(snapshot, &diff.removed);
                events.extend(diff.events.into_iter().map(CoordinatorEvent::Topology));
                mark_fresh(snapshot, FieldGroup::Nodes, at);
            }
            Payload::NodeMetrics(batch) => {
                merge_node_metrics(snapshot, batch, at);
                mark_fresh(snapshot, FieldGroup::NodeMetrics, at);
            }
        }
    }

    fn merge_ems(
        &mut self,
        snapshot: &mut Snapshot,
        response: &EmsResponse,
        at: DateTime<Utc>,
        events: &mut Vec<CoordinatorEvent>,
    ) {
        let ecu_id = response.ecu_id();
        let system = SystemTelemetry::from_aggregated(&response.aggregated, ecu_id, response.ts);

        let modules = module_telemetry(response);
        let module_ids: BTreeSet<EntityId> = modules.keys().cloned().map(EntityId::Module).collect();
        let module_diff = self.tracker.observe(EntityKind::Module, &module_ids);

        let clamps: BTreeMap<ClampId, ClampTelemetry> = response
            .sensors
            .iter()
            .filter(|sensor| sensor.is_paired())
            .map(|sensor| (ClampId::new(sensor.euid.clone()), sensor.clone()))
            .collect();
        let clamp_ids: BTreeSet<EntityId> = clamps.keys().cloned().map(EntityId::Clamp).collect();
        let clamp_diff = self.tracker.observe(EntityKind::Clamp, &clamp_ids);

        replace_present(&mut snapshot.modules, modules, at);
        replace_present(&mut snapshot.clamps, clamps, at);
        mark_removed(snapshot, &module_diff.removed);
        mark_removed(snapshot, &clamp_diff.removed);

        events.extend(
            module_diff
                .events
                .into_iter()
                .chain(clamp_diff.events)
                .map(CoordinatorEvent::Topology),
        );

        if let Some(previous) = &snapshot.system {
            events.extend(message_changes(previous, &system));
        }
        snapshot.system = Some(system);

        for group in Endpoint::Ems.field_groups() {
            mark_fresh(snapshot, *group, at);
        }
    }

    fn apply_failure(
        &mut self,
        snapshot: &mut Snapshot,
        endpoint: Endpoint,
        verdict: Verdict,
        events: &mut Vec<CoordinatorEvent>,
    ) {
        match verdict {
            Verdict::Fresh => {}
            Verdict::HoldStale => {
                for group in endpoint.field_groups() {
                    hold_stale(snapshot, *group);
                }
            }
            Verdict::Clear => {
                for group in endpoint.field_groups() {
                    self.clear_group(snapshot, *group, events);
                }
            }
        }
    }

    fn clear_group(
        &mut self,
        snapshot: &mut Snapshot,
        group: FieldGroup,
        events: &mut Vec<CoordinatorEvent>,
    ) {
        let retired = match group {
            FieldGroup::System => {
                snapshot.system = None;
                Vec::new()
            }
            FieldGroup::Modules => {
                snapshot.modules.clear();
                self.tracker.clear(EntityKind::Module)
            }
            FieldGroup::Clamps => {
                snapshot.clamps.clear();
                self.tracker.clear(EntityKind::Clamp)
            }
            FieldGroup::Diagnostics => {
                snapshot.diagnostics = None;
                Vec::new()
            }
            FieldGroup::Status => {
                snapshot.status = None;
                Vec::new()
            }
            FieldGroup::Nodes => {
                snapshot.nodes.clear();
                self.tracker.clear(EntityKind::Node)
            }
            FieldGroup::NodeMetrics => {
                snapshot.node_metrics.clear();
                Vec::new()
            }
        };
        events.extend(retired.into_iter().map(CoordinatorEvent::Topology));

        let entry = snapshot.freshness.entry(group).or_default();
        if entry.state != Freshness::Unavailable {
            info!(group = ?group, "🚫 Field group unavailable");
        }
        entry.state = Freshness::Unavailable;
    }
}

/// Modules pair `bms_info[i]` with `bms_data[i]`; either side may be shorter
fn module_telemetry(response: &EmsResponse) -> BTreeMap<ModuleId, ModuleTelemetry> {
    let aggregated = &response.aggregated;
    let ecu_id = response.ecu_id();
    let count = aggregated.bms_info.len().max(aggregated.bms_data.len());

    let mut modules = BTreeMap::new();
    for index in 0..count {
        let info = aggregated.bms_info.get(index).cloned().unwrap_or_default();
        let data = aggregated.bms_data.get(index).cloned().unwrap_or_default();
        let id = ModuleId::from_serial(&info.serial_number, ecu_id, index);
        modules
            .entry(id)
            .or_insert(ModuleTelemetry { index, info, data });
    }
    modules
}

fn message_changes(previous: &SystemTelemetry, current: &SystemTelemetry) -> Vec<CoordinatorEvent> {
    [
        (
            MessageCategory::Info,
            &previous.data.info_str,
            &current.data.info_str,
        ),
        (
            MessageCategory::Warning,
            &previous.data.warning_str,
            &current.data.warning_str,
        ),
        (
            MessageCategory::Alarm,
            &previous.data.alarm_str,
            &current.data.alarm_str,
        ),
    ]
    .into_iter()
    .filter(|(_, before, after)| before != after)
    .map(|(category, before, after)| {
        info!(%category, ?before, ?after, "🔔 EMS messages changed");
        CoordinatorEvent::MessagesChanged {
            category,
            previous: before.clone(),
            current: after.clone(),
        }
    })
    .collect()
}

/// Present entries become fresh; absent ones keep whatever they had
fn replace_present<K: Ord, V>(
    entries: &mut BTreeMap<K, Tracked<V>>,
    present: BTreeMap<K, V>,
    at: DateTime<Utc>,
) {
    for (id, value) in present {
        entries.insert(id, Tracked::fresh(value, at));
    }
}

fn mark_removed(snapshot: &mut Snapshot, removed: &BTreeSet<EntityId>) {
    for id in removed {
        let freshness = match id {
            EntityId::Module(id) => snapshot.modules.get_mut(id).map(|t| &mut t.freshness),
            EntityId::Clamp(id) => snapshot.clamps.get_mut(id).map(|t| &mut t.freshness),
            EntityId::Node(id) => snapshot.nodes.get_mut(id).map(|t| &mut t.freshness),
        };
        if let Some(freshness) = freshness {
            *freshness = Freshness::Unavailable;
        }
    }
}

fn merge_node_metrics(snapshot: &mut Snapshot, batch: NodeMetricsBatch, at: DateTime<Utc>) {
    let NodeMetricsBatch {
        targets,
        mut metrics,
    } = batch;
    let previous = std::mem::take(&mut snapshot.node_metrics);

    for node in targets {
        if let Some(fresh) = metrics.remove(&node) {
            snapshot.node_metrics.insert(node, Tracked::fresh(fresh, at));
        } else if let Some(mut held) = previous.get(&node).cloned() {
            if held.freshness == Freshness::Fresh {
                held.freshness = Freshness::Stale;
            }
            snapshot.node_metrics.insert(node, held);
        }
    }
}

fn mark_fresh(snapshot: &mut Snapshot, group: FieldGroup, at: DateTime<Utc>) {
    snapshot.freshness.insert(
        group,
        GroupFreshness {
            state: Freshness::Fresh,
            data_as_of: Some(at),
        },
    );
}

/// Downgrade a group holding values to stale, together with its fresh entries
fn hold_stale(snapshot: &mut Snapshot, group: FieldGroup) {
    let entry = snapshot.freshness.entry(group).or_default();
    if !entry.state.has_values() {
        return;
    }
    entry.state = Freshness::Stale;

    match group {
        FieldGroup::Modules => stale_entries(&mut snapshot.modules),
        FieldGroup::Clamps => stale_entries(&mut snapshot.clamps),
        FieldGroup::Nodes => stale_entries(&mut snapshot.nodes),
        FieldGroup::NodeMetrics => stale_entries(&mut snapshot.node_metrics),
        FieldGroup::System | FieldGroup::Diagnostics | FieldGroup::Status => {}
    }
}

fn stale_entries<K, V>(entries: &mut BTreeMap<K, Tracked<V>>) {
    for tracked in entries.values_mut() {
        if tracked.freshness == Freshness::Fresh {
            tracked.freshness = Freshness::Stale;
        }
    }
}
