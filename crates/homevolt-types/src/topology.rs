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

/// Battery module identifier (BMS serial number, or `{ecu_id}_bms_{index}` when blank)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(pub String);

impl ModuleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Id for the module at `index`, falling back to an ECU-scoped id when the serial is blank
    pub fn from_serial(serial: &str, ecu_id: Option<i64>, index: usize) -> Self {
        if serial.is_empty() {
            Self(format!("{}_bms_{index}", ecu_id.unwrap_or_default()))
        } else {
            Self(serial.to_owned())
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// CT clamp identifier (the clamp's EUID)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClampId(pub String);

impl ClampId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClampId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// CT mesh node identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl NodeId {
    /// `0` is the device's "no node" marker
    pub fn from_raw(raw: u32) -> Option<Self> {
        (raw != 0).then_some(Self(raw))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Class of dynamically discovered sub-component
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Module,
    Clamp,
    Node,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Module => "module",
            Self::Clamp => "clamp",
            Self::Node => "node",
        })
    }
}

/// Identifier of any tracked sub-component
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum EntityId {
    Module(ModuleId),
    Clamp(ClampId),
    Node(NodeId),
}

impl EntityId {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Module(_) => EntityKind::Module,
            Self::Clamp(_) => EntityKind::Clamp,
            Self::Node(_) => EntityKind::Node,
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Module(id) => write!(f, "module:{id}"),
            Self::Clamp(id) => write!(f, "clamp:{id}"),
            Self::Node(id) => write!(f, "node:{id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopologyChange {
    Added,
    Removed,
}

/// One sub-component appearing or disappearing. Consumed once by the entity layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TopologyEvent {
    pub change: TopologyChange,
    pub id: EntityId,
}

impl TopologyEvent {
    pub fn added(id: EntityId) -> Self {
        Self {
            change: TopologyChange::Added,
            id,
        }
    }

    pub fn removed(id: EntityId) -> Self {
        Self {
            change: TopologyChange::Removed,
            id,
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.id.kind()
    }
}
