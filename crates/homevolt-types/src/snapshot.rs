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

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::endpoint::FieldGroup;
use crate::health::{EndpointHealth, Freshness, GroupFreshness};
use crate::payload::{
    BmsData, BmsInfo, CtSensor, EmsAggregate, EmsConfig, EmsControl, EmsData, EmsDevice, EmsInfo,
    EmsPrediction, ErrorReportEntry, InvInfo, NodeInfo, NodeMetrics, PhaseCurrents, PhaseVoltages,
    StatusResponse,
};
use crate::topology::{ClampId, ModuleId, NodeId};

/// A keyed entry together with its own freshness
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tracked<T> {
    pub value: T,
    pub freshness: Freshness,
    /// Time of the fetch that produced `value`
    pub updated_at: DateTime<Utc>,
}

impl<T> Tracked<T> {
    pub fn fresh(value: T, updated_at: DateTime<Utc>) -> Self {
        Self {
            value,
            freshness: Freshness::Fresh,
            updated_at,
        }
    }
}

/// Scalar telemetry of the whole system (aggregated EMS view)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemTelemetry {
    pub ecu_id: Option<i64>,
    pub ecu_host: String,
    pub ecu_version: String,
    pub op_state: i64,
    pub op_state_str: String,
    pub error: i64,
    pub error_str: String,
    pub error_cnt: i64,
    /// Device-side timestamp of the payload
    pub device_ts: i64,
    pub info: EmsInfo,
    pub inverter: InvInfo,
    pub config: EmsConfig,
    pub control: EmsControl,
    pub data: EmsData,
    pub prediction: EmsPrediction,
    pub voltage: PhaseVoltages,
    pub current: PhaseCurrents,
    pub aggregate: EmsAggregate,
}

impl SystemTelemetry {
    pub fn from_aggregated(device: &EmsDevice, ecu_id: Option<i64>, device_ts: i64) -> Self {
        Self {
            ecu_id,
            ecu_host: device.ecu_host.clone(),
            ecu_version: device.ecu_version.clone(),
            op_state: device.op_state,
            op_state_str: device.op_state_str.clone(),
            error: device.error,
            error_str: device.error_str.clone(),
            error_cnt: device.error_cnt,
            device_ts,
            info: device.ems_info.clone(),
            inverter: device.inv_info.clone(),
            config: device.ems_config.clone(),
            control: device.ems_control.clone(),
            data: device.ems_data.clone(),
            prediction: device.ems_prediction.clone(),
            voltage: device.ems_voltage.clone(),
            current: device.ems_current.clone(),
            aggregate: device.ems_aggregate.clone(),
        }
    }
}

/// One battery module: static BMS info paired with its live data
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleTelemetry {
    /// Position in the device's BMS arrays at the time of the fetch
    pub index: usize,
    pub info: BmsInfo,
    pub data: BmsData,
}

/// CT clamp telemetry is the sensor record as reported
pub type ClampTelemetry = CtSensor;

impl CtSensor {
    /// Mesh node hosting this clamp
    pub fn node(&self) -> Option<NodeId> {
        NodeId::from_raw(self.node_id)
    }
}

/// Worst state found in the error report
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Ok,
    Warning,
    Error,
}

/// Error report with derived counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub entries: Vec<ErrorReportEntry>,
    pub ok_count: usize,
    pub warning_count: usize,
    pub error_count: usize,
    /// `None` when the report is empty
    pub worst_status: Option<ReportStatus>,
}

impl Diagnostics {
    pub fn from_entries(entries: Vec<ErrorReportEntry>) -> Self {
        let count = |state: &str| entries.iter().filter(|e| e.activated == state).count();
        let ok_count = count("ok");
        let warning_count = count("warning");
        let error_count = count("error");

        let worst_status = if entries.is_empty() {
            None
        } else if error_count > 0 {
            Some(ReportStatus::Error)
        } else if warning_count > 0 {
            Some(ReportStatus::Warning)
        } else {
            Some(ReportStatus::Ok)
        };

        Self {
            entries,
            ok_count,
            warning_count,
            error_count,
            worst_status,
        }
    }

    /// Entries currently in the given state ("warning", "error", ...)
    pub fn active(&self, state: &str) -> impl Iterator<Item = &ErrorReportEntry> + '_ {
        let state = state.to_owned();
        self.entries.iter().filter(move |e| e.activated == state)
    }
}

/// Read view joining a node's list entry with its latest metrics
#[derive(Debug, Clone, Copy)]
pub struct NodeView<'a> {
    pub id: NodeId,
    pub info: Option<&'a Tracked<NodeInfo>>,
    pub metrics: Option<&'a Tracked<NodeMetrics>>,
}

/// Merged device state as published by the snapshot store. Immutable once published.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Cycle whose merge produced this snapshot (0 = nothing merged yet)
    pub cycle: u64,
    pub published_at: Option<DateTime<Utc>>,
    pub system: Option<SystemTelemetry>,
    pub modules: BTreeMap<ModuleId, Tracked<ModuleTelemetry>>,
    pub clamps: BTreeMap<ClampId, Tracked<ClampTelemetry>>,
    pub nodes: BTreeMap<NodeId, Tracked<NodeInfo>>,
    pub node_metrics: BTreeMap<NodeId, Tracked<NodeMetrics>>,
    pub diagnostics: Option<Diagnostics>,
    pub status: Option<StatusResponse>,
    pub freshness: BTreeMap<FieldGroup, GroupFreshness>,
}

impl Snapshot {
    /// Freshness of a group; groups never touched are `Unknown`
    pub fn freshness(&self, group: FieldGroup) -> GroupFreshness {
        self.freshness.get(&group).copied().unwrap_or_default()
    }

    pub fn freshness_state(&self, group: FieldGroup) -> Freshness {
        self.freshness(group).state
    }

    /// Node ids referenced by the current clamps, i.e. the node-metrics fetch targets
    pub fn clamp_nodes(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self
            .clamps
            .values()
            .filter(|c| c.freshness != Freshness::Unavailable)
            .filter_map(|c| c.value.node())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Clamps hosted by the given node
    pub fn clamps_on_node(&self, node: NodeId) -> impl Iterator<Item = &ClampId> + '_ {
        self.clamps
            .iter()
            .filter(move |(_, c)| c.value.node() == Some(node))
            .map(|(id, _)| id)
    }

    pub fn node(&self, id: NodeId) -> Option<NodeView<'_>> {
        let info = self.nodes.get(&id);
        let metrics = self.node_metrics.get(&id);
        (info.is_some() || metrics.is_some()).then_some(NodeView { id, info, metrics })
    }
}

/// Full pre-redaction read for diagnostics export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsReport {
    pub generated_at: DateTime<Utc>,
    pub snapshot: Snapshot,
    pub endpoints: Vec<EndpointHealth>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(state: &str) -> ErrorReportEntry {
        ErrorReportEntry {
            activated: state.to_owned(),
            ..Default::default()
        }
    }

    #[test]
    fn test_diagnostics_worst_status() {
        assert_eq!(Diagnostics::from_entries(vec![]).worst_status, None);

        let ok = Diagnostics::from_entries(vec![entry("ok"), entry("unknown")]);
        assert_eq!(ok.worst_status, Some(ReportStatus::Ok));

        let warn = Diagnostics::from_entries(vec![entry("ok"), entry("warning")]);
        assert_eq!(warn.worst_status, Some(ReportStatus::Warning));
        assert_eq!(warn.warning_count, 1);

        let err = Diagnostics::from_entries(vec![entry("warning"), entry("error"), entry("ok")]);
        assert_eq!(err.worst_status, Some(ReportStatus::Error));
        assert_eq!((err.ok_count, err.warning_count, err.error_count), (1, 1, 1));
        assert_eq!(err.active("error").count(), 1);
    }

    #[test]
    fn test_untouched_groups_are_unknown() {
        let snapshot = Snapshot::default();
        for group in FieldGroup::ALL {
            assert_eq!(snapshot.freshness_state(group), Freshness::Unknown);
        }
    }

    #[test]
    fn test_clamp_nodes_skip_unavailable_and_unassigned() {
        let now = Utc::now();
        let clamp = |node_id: u32| CtSensor {
            euid: format!("euid-{node_id}"),
            node_id,
            ..Default::default()
        };

        let mut snapshot = Snapshot::default();
        snapshot.clamps.insert(ClampId::new("a"), Tracked::fresh(clamp(3), now));
        snapshot.clamps.insert(ClampId::new("b"), Tracked::fresh(clamp(2), now));
        snapshot.clamps.insert(ClampId::new("c"), Tracked::fresh(clamp(0), now));
        snapshot.clamps.insert(ClampId::new("d"), Tracked::fresh(clamp(3), now));
        let mut gone = Tracked::fresh(clamp(7), now);
        gone.freshness = Freshness::Unavailable;
        snapshot.clamps.insert(ClampId::new("e"), gone);

        assert_eq!(snapshot.clamp_nodes(), vec![NodeId(2), NodeId(3)]);
        assert_eq!(snapshot.clamps_on_node(NodeId(3)).count(), 2);
    }
}
