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

use serde::{Deserialize, Serialize};
use std::fmt;

/// The five device endpoints polled by the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    /// System, voltage, current, module and clamp telemetry
    Ems,
    ErrorReport,
    Status,
    Nodes,
    NodeMetrics,
}

impl Endpoint {
    pub const ALL: [Endpoint; 5] = [
        Self::Ems,
        Self::ErrorReport,
        Self::Status,
        Self::Nodes,
        Self::NodeMetrics,
    ];

    /// URL path on the device
    pub fn path(self) -> &'static str {
        match self {
            Self::Ems => "/ems.json",
            Self::ErrorReport => "/error_report.json",
            Self::Status => "/status.json",
            Self::Nodes => "/nodes.json",
            Self::NodeMetrics => "/node_metrics.json",
        }
    }

    /// Snapshot field groups whose content comes from this endpoint
    pub fn field_groups(self) -> &'static [FieldGroup] {
        match self {
            Self::Ems => &[FieldGroup::System, FieldGroup::Modules, FieldGroup::Clamps],
            Self::ErrorReport => &[FieldGroup::Diagnostics],
            Self::Status => &[FieldGroup::Status],
            Self::Nodes => &[FieldGroup::Nodes],
            Self::NodeMetrics => &[FieldGroup::NodeMetrics],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ems => "ems",
            Self::ErrorReport => "error_report",
            Self::Status => "status",
            Self::Nodes => "nodes",
            Self::NodeMetrics => "node_metrics",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level groups of the merged snapshot, each with its own freshness
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldGroup {
    System,
    Modules,
    Clamps,
    Diagnostics,
    Status,
    Nodes,
    NodeMetrics,
}

impl FieldGroup {
    pub const ALL: [FieldGroup; 7] = [
        Self::System,
        Self::Modules,
        Self::Clamps,
        Self::Diagnostics,
        Self::Status,
        Self::Nodes,
        Self::NodeMetrics,
    ];

    /// Endpoint that feeds this group
    pub fn source(self) -> Endpoint {
        match self {
            Self::System | Self::Modules | Self::Clamps => Endpoint::Ems,
            Self::Diagnostics => Endpoint::ErrorReport,
            Self::Status => Endpoint::Status,
            Self::Nodes => Endpoint::Nodes,
            Self::NodeMetrics => Endpoint::NodeMetrics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_group_maps_back_to_its_endpoint() {
        for endpoint in Endpoint::ALL {
            for group in endpoint.field_groups() {
                assert_eq!(group.source(), endpoint);
            }
        }

        let covered: usize = Endpoint::ALL.iter().map(|e| e.field_groups().len()).sum();
        assert_eq!(covered, FieldGroup::ALL.len());
    }
}
