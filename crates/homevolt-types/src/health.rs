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
use std::fmt;

use crate::endpoint::Endpoint;

/// Recency of a field group or tracked entry relative to successful fetches
///
/// `Unknown -> Fresh <-> Stale -> Unavailable -> Fresh`; nothing is terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    /// No successful fetch yet
    #[default]
    Unknown,
    Fresh,
    /// Last fetch failed, previous values retained
    Stale,
    /// Failures exceeded the grace threshold, or the entry disappeared from the device
    Unavailable,
}

impl Freshness {
    /// Whether values for this state are present in the snapshot
    pub fn has_values(self) -> bool {
        matches!(self, Self::Fresh | Self::Stale)
    }
}

impl fmt::Display for Freshness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unknown => "unknown",
            Self::Fresh => "fresh",
            Self::Stale => "stale",
            Self::Unavailable => "unavailable",
        })
    }
}

/// Freshness of one snapshot field group
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupFreshness {
    pub state: Freshness,
    /// Time of the successful fetch the group's data reflects
    pub data_as_of: Option<DateTime<Utc>>,
}

/// Bounded set of fetch failure kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Connection refused or host unreachable
    Network,
    Timeout,
    /// Non-success HTTP response, including authentication failures
    HttpStatus,
    /// Malformed body or unexpected JSON shape
    Decode,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::HttpStatus => "http_status",
            Self::Decode => "decode",
        })
    }
}

/// Per-endpoint polling health, created at startup and kept for the coordinator's lifetime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointHealth {
    pub endpoint: Endpoint,
    pub last_attempt: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub last_failure: Option<FailureKind>,
    /// Human-readable detail of the last failure
    pub last_error: Option<String>,
}

impl EndpointHealth {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            last_attempt: None,
            last_success: None,
            consecutive_failures: 0,
            last_failure: None,
            last_error: None,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.last_success.is_some() && self.consecutive_failures == 0
    }
}
