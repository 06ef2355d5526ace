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

//! Snapshot store.
//!
//! Holds the latest published snapshot and endpoint health behind a single lock. Readers get
//! `Arc` handles to immutable values, so a reader never sees a merge in progress and never
//! holds the lock while using the data.

use chrono::Utc;
use homevolt_types::{DiagnosticsReport, Endpoint, EndpointHealth, Snapshot};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;

use crate::event::CoordinatorEvent;
use crate::merger::MergeOutput;

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
struct Published {
    snapshot: Arc<Snapshot>,
    health: Arc<[EndpointHealth]>,
}

#[derive(Debug)]
pub struct SnapshotStore {
    current: RwLock<Published>,
    events: broadcast::Sender<CoordinatorEvent>,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let health: Vec<EndpointHealth> = Endpoint::ALL
            .into_iter()
            .map(EndpointHealth::new)
            .collect();
        Self {
            current: RwLock::new(Published {
                snapshot: Arc::new(Snapshot::default()),
                health: health.into(),
            }),
            events,
        }
    }

    /// Latest published snapshot with per-group freshness
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.current.read().snapshot)
    }

    pub fn health(&self) -> Vec<EndpointHealth> {
        self.current.read().health.to_vec()
    }

    pub fn endpoint_health(&self, endpoint: Endpoint) -> Option<EndpointHealth> {
        self.current
            .read()
            .health
            .iter()
            .find(|h| h.endpoint == endpoint)
            .cloned()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.events.subscribe()
    }

    /// Snapshot and health taken under one read lock, pre-redaction
    pub fn diagnostics_report(&self) -> DiagnosticsReport {
        let current = self.current.read().clone();
        DiagnosticsReport {
            generated_at: Utc::now(),
            snapshot: Snapshot::clone(&current.snapshot),
            endpoints: current.health.to_vec(),
        }
    }

    /// Swap in a merged cycle, then notify subscribers
    pub(crate) fn publish(&self, output: MergeOutput) {
        let MergeOutput {
            snapshot,
            health,
            events,
        } = output;
        let cycle = snapshot.cycle;

        *self.current.write() = Published {
            snapshot: Arc::new(snapshot),
            health: health.into(),
        };

        for event in events {
            // No subscribers is fine, the snapshot is the source of truth
            if self.events.send(event).is_err() {
                trace!(cycle, "No event subscribers");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_swaps_snapshot_and_health_together() {
        let store = SnapshotStore::new();
        let before = store.snapshot();
        let mut rx = store.subscribe();

        let mut health = store.health();
        health[0].consecutive_failures = 2;
        store.publish(MergeOutput {
            snapshot: Snapshot {
                cycle: 7,
                ..Default::default()
            },
            health,
            events: vec![CoordinatorEvent::SnapshotUpdated { cycle: 7 }],
        });

        // Earlier readers keep their own immutable view
        assert_eq!(before.cycle, 0);
        assert_eq!(store.snapshot().cycle, 7);

        let report = store.diagnostics_report();
        assert_eq!(report.snapshot.cycle, 7);
        assert_eq!(report.endpoints[0].consecutive_failures, 2);
        assert_eq!(
            rx.try_recv().ok(),
            Some(CoordinatorEvent::SnapshotUpdated { cycle: 7 })
        );
    }

    #[test]
    fn test_fresh_store_has_health_for_every_endpoint() {
        let store = SnapshotStore::new();
        assert_eq!(store.health().len(), Endpoint::ALL.len());
        assert!(store.endpoint_health(Endpoint::Nodes).is_some());
        // Publishing with nobody listening must not fail
        store.publish(MergeOutput {
            snapshot: Snapshot::default(),
            health: Vec::new(),
            events: vec![CoordinatorEvent::SnapshotUpdated { cycle: 1 }],
        });
    }
}
