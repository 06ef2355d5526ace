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

use homevolt_types::Endpoint;
use serde::{Deserialize, Serialize};

/// Error report polled every 4th cycle (~2 min at 30s)
pub const ERROR_REPORT_EVERY: u64 = 4;

/// Status, node list and node metrics polled every 10th cycle (~5 min at 30s)
pub const SLOW_TIER_EVERY: u64 = 10;

/// Decides which endpoints are due on a given cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierSchedule {
    pub error_report_every: u64,
    pub slow_tier_every: u64,
}

impl Default for TierSchedule {
    fn default() -> Self {
        Self {
            error_report_every: ERROR_REPORT_EVERY,
            slow_tier_every: SLOW_TIER_EVERY,
        }
    }
}

impl TierSchedule {
    pub fn is_due(&self, endpoint: Endpoint, cycle: u64) -> bool {
        match endpoint {
            Endpoint::Ems => true,
            Endpoint::ErrorReport => every(cycle, self.error_report_every),
            Endpoint::Status | Endpoint::Nodes | Endpoint::NodeMetrics => {
                every(cycle, self.slow_tier_every)
            }
        }
    }

    /// Endpoints to fetch on `cycle`, primary first. `force_all` overrides the tiers.
    pub fn due_endpoints(&self, cycle: u64, force_all: bool) -> Vec<Endpoint> {
        Endpoint::ALL
            .into_iter()
            .filter(|endpoint| force_all || self.is_due(*endpoint, cycle))
            .collect()
    }
}

fn every(cycle: u64, period: u64) -> bool {
    period != 0 && cycle.is_multiple_of(period)
}
