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

//! Topology diffing for modules, clamps and mesh nodes.
//!
//! An identifier seen in a successful payload becomes active and emits `Added` once. An active
//! identifier missing from later payloads is only removed after its miss count exceeds the
//! grace threshold, so a single dropped reading never makes entities flap.

use homevolt_types::{EntityId, EntityKind, TopologyEvent};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use crate::classifier::FailureClassifier;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Presence {
    misses: u32,
    active: bool,
}

/// Result of feeding one payload's identifier set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopologyDiff {
    pub events: Vec<TopologyEvent>,
    /// Ids whose absence just exceeded the grace threshold
    pub removed: BTreeSet<EntityId>,
}

#[derive(Debug, Clone)]
pub struct TopologyTracker {
    classifier: FailureClassifier,
    entries: BTreeMap<EntityId, Presence>,
}

impl TopologyTracker {
    /// Miss counters are judged by the same classifier that grades endpoint failures
    pub fn new(classifier: FailureClassifier) -> Self {
        Self {
            classifier,
            entries: BTreeMap::new(),
        }
    }

    /// Diff the ids of one kind present in a successful payload against what is known
    pub fn observe(&mut self, kind: EntityKind, present: &BTreeSet<EntityId>) -> TopologyDiff {
        let mut diff = TopologyDiff::default();

        for id in present.iter().filter(|id| id.kind() == kind) {
            let presence = self.entries.entry(id.clone()).or_default();
            presence.misses = 0;
            if !presence.active {
                presence.active = true;
                info!(%kind, id = %id, "🆕 Discovered {kind}");
                diff.events.push(TopologyEvent::added(id.clone()));
            }
        }

        for (id, presence) in self
            .entries
            .iter_mut()
            .filter(|(id, p)| id.kind() == kind && p.active && !present.contains(*id))
        {
            presence.misses = presence.misses.saturating_add(1);
            if self.classifier.exceeds_grace(presence.misses) {
                presence.active = false;
                presence.misses = 0;
                info!(%kind, id = %id, "🗑️ {kind} gone from device");
                diff.removed.insert(id.clone());
                diff.events.push(TopologyEvent::removed(id.clone()));
            } else {
                debug!(%kind, id = %id, misses = presence.misses, "{kind} missing from payload");
            }
        }

        diff
    }

    /// Retire every active id of `kind` (governing endpoint past its grace threshold)
    pub fn clear(&mut self, kind: EntityKind) -> Vec<TopologyEvent> {
        let mut events = Vec::new();
        for (id, presence) in self
            .entries
            .iter_mut()
            .filter(|(id, p)| id.kind() == kind && p.active)
        {
            presence.active = false;
            presence.misses = 0;
            events.push(TopologyEvent::removed(id.clone()));
        }
        if !events.is_empty() {
            info!(%kind, count = events.len(), "🗑️ Endpoint unavailable, retiring all of kind");
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use homevolt_types::{ModuleId, NodeId, TopologyChange};

    fn modules(ids: &[&str]) -> BTreeSet<EntityId> {
        ids.iter()
            .map(|id| EntityId::Module(ModuleId::new(*id)))
            .collect()
    }

    fn module(id: &str) -> EntityId {
        EntityId::Module(ModuleId::new(id))
    }

    #[test]
    fn test_same_payload_twice_is_idempotent() {
        let mut tracker = TopologyTracker::new(FailureClassifier::new(3));
        let first = tracker.observe(EntityKind::Module, &modules(&["m1", "m2"]));
        assert_eq!(first.events.len(), 2);
        assert!(
            first
                .events
                .iter()
                .all(|e| e.change == TopologyChange::Added)
        );

        let second = tracker.observe(EntityKind::Module, &modules(&["m1", "m2"]));
        assert!(second.events.is_empty());
        assert!(second.removed.is_empty());
    }

    #[test]
    fn test_removal_after_grace_exceeded() {
        let mut tracker = TopologyTracker::new(FailureClassifier::new(3));
        tracker.observe(EntityKind::Module, &modules(&["m1", "m2"]));

        for _ in 0..3 {
            let diff = tracker.observe(EntityKind::Module, &modules(&["m1"]));
            assert!(diff.events.is_empty());
            assert!(diff.removed.is_empty());
        }

        let diff = tracker.observe(EntityKind::Module, &modules(&["m1"]));
        assert_eq!(diff.events, vec![TopologyEvent::removed(module("m2"))]);
        assert!(diff.removed.contains(&module("m2")));

        // Gone ids do not keep emitting
        let diff = tracker.observe(EntityKind::Module, &modules(&["m1"]));
        assert!(diff.events.is_empty());
        assert!(diff.removed.is_empty());

        let diff = tracker.observe(EntityKind::Module, &modules(&["m1", "m2"]));
        assert_eq!(diff.events, vec![TopologyEvent::added(module("m2"))]);
    }

    #[test]
    fn test_reappearing_within_grace_resets_misses() {
        let mut tracker = TopologyTracker::new(FailureClassifier::new(1));
        tracker.observe(EntityKind::Module, &modules(&["m1"]));
        tracker.observe(EntityKind::Module, &modules(&[]));
        tracker.observe(EntityKind::Module, &modules(&["m1"]));

        let diff = tracker.observe(EntityKind::Module, &modules(&[]));
        assert!(diff.removed.is_empty());

        // Two consecutive misses are needed again before removal
        let diff = tracker.observe(EntityKind::Module, &modules(&[]));
        assert_eq!(diff.events, vec![TopologyEvent::removed(module("m1"))]);
    }

    #[test]
    fn test_clear_only_touches_one_kind() {
        let mut tracker = TopologyTracker::new(FailureClassifier::new(3));
        tracker.observe(EntityKind::Module, &modules(&["m1"]));
        let nodes: BTreeSet<EntityId> = [EntityId::Node(NodeId(4))].into_iter().collect();
        tracker.observe(EntityKind::Node, &nodes);

        let events = tracker.clear(EntityKind::Node);
        assert_eq!(events, vec![TopologyEvent::removed(EntityId::Node(NodeId(4)))]);
        assert!(tracker.clear(EntityKind::Node).is_empty());
        assert_eq!(
            tracker.clear(EntityKind::Module),
            vec![TopologyEvent::removed(module("m1"))]
        );
    }
}
