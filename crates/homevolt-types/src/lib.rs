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

pub mod endpoint;
pub mod health;
pub mod payload;
pub mod snapshot;
pub mod topology;

pub use endpoint::{Endpoint, FieldGroup};
pub use health::{EndpointHealth, FailureKind, Freshness, GroupFreshness};
pub use payload::{
    BmsData, BmsInfo, CtSensor, EmsDevice, EmsResponse, ErrorReportEntry, NodeInfo, NodeMetrics,
    StatusResponse, UNPAIRED_EUID,
};
pub use snapshot::{
    ClampTelemetry, Diagnostics, DiagnosticsReport, ModuleTelemetry, NodeView, ReportStatus,
    Snapshot, SystemTelemetry, Tracked,
};
pub use topology::{ClampId, EntityId, EntityKind, ModuleId, NodeId, TopologyChange, TopologyEvent};
