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

//! Polling coordinator for the Homevolt battery system.
//!
//! The [`Coordinator`] fetches the device endpoints on a tiered schedule, merges the results
//! into a single [`Snapshot`](homevolt_types::Snapshot) with per-group freshness, tracks
//! modules, clamps and mesh nodes as they come and go, and publishes everything through the
//! [`SnapshotStore`].

pub mod classifier;
pub mod coordinator;
pub mod event;
pub mod merger;
pub mod schedule;
pub mod source;
pub mod store;
pub mod topology;

pub use classifier::{DEFAULT_GRACE_THRESHOLD, FailureClassifier, Verdict};
pub use coordinator::{Coordinator, CoordinatorConfig, CyclePlan, CycleReport};
pub use event::{CoordinatorEvent, MessageCategory};
pub use merger::{CycleResults, FetchOutcome, MergeOutput, NodeMetricsBatch, Payload, StateMerger};
pub use schedule::TierSchedule;
pub use source::{DeviceApi, FetchFailure, FetchResult};
pub use store::SnapshotStore;
pub use topology::{TopologyDiff, TopologyTracker};
