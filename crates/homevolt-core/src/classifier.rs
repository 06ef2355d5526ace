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
use homevolt_types::EndpointHealth;
use tracing::{debug, error, warn};

use crate::source::FetchFailure;

/// Consecutive misses tolerated before a group is cleared
pub const DEFAULT_GRACE_THRESHOLD: u32 = 3;

/// What the merger should do with an endpoint's field groups after an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Replace with the new payload
    Fresh,
    /// Keep previous values, downgrade to stale
    HoldStale,
    /// Grace exceeded: clear values, mark unavailable
    Clear,
}

/// Updates endpoint health records and decides stale vs unavailable
#[derive(Debug, Clone, Copy)]
pub struct FailureClassifier {
    grace_threshold: u32,
}

impl Default for FailureClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_GRACE_THRESHOLD)
    }
}

impl FailureClassifier {
    pub fn new(grace_threshold: u32) -> Self {
        Self { grace_threshold }
    }

    pub fn record_success(&self, health: &mut EndpointHealth, at: DateTime<Utc>) -> Verdict {
        if health.consecutive_failures > 0 {
            debug!(
                endpoint = %health.endpoint,
                failures = health.consecutive_failures,
                "✅ Endpoint recovered"
            );
        }
        health.last_attempt = Some(at);
        health.last_success = Some(at);
        health.consecutive_failures = 0;
        health.last_failure = None;
        health.last_error = None;
        Verdict::Fresh
    }

    pub fn record_failure(
        &self,
        health: &mut EndpointHealth,
        failure: &FetchFailure,
        at: DateTime<Utc>,
    ) -> Verdict {
        health.last_attempt = Some(at);
        health.consecutive_failures = health.consecutive_failures.saturating_add(1);
        health.last_failure = Some(failure.kind());
        health.last_error = Some(failure.to_string());

        let failures = health.consecutive_failures;
        if !self.exceeds_grace(failures) {
            warn!(
                endpoint = %health.endpoint,
                kind = %failure.kind(),
                failures,
                "⚠️ Fetch failed, holding previous values as stale: {failure}"
            );
            Verdict::HoldStale
        } else {
            // Log the crossing once, later misses only at debug
            if failures == self.grace_threshold.saturating_add(1) {
                error!(
                    endpoint = %health.endpoint,
                    kind = %failure.kind(),
                    failures,
                    "❌ Grace threshold exceeded, marking unavailable: {failure}"
                );
            } else {
                debug!(endpoint = %health.endpoint, failures, "Still unavailable: {failure}");
            }
            Verdict::Clear
        }
    }

    /// Whether `count` consecutive misses are past the grace threshold
    pub fn exceeds_grace(&self, count: u32) -> bool {
        count > self.grace_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use homevolt_types::{Endpoint, FailureKind};

    fn server_error() -> FetchFailure {
        FetchFailure::HttpStatus {
            endpoint: Endpoint::ErrorReport,
            status: 500,
            message: "Internal Server Error".to_owned(),
        }
    }

    #[test]
    fn test_fourth_consecutive_failure_clears() {
        let classifier = FailureClassifier::default();
        let mut health = EndpointHealth::new(Endpoint::ErrorReport);
        let now = Utc::now();

        for expected in 1..=3 {
            assert_eq!(
                classifier.record_failure(&mut health, &server_error(), now),
                Verdict::HoldStale
            );
            assert_eq!(health.consecutive_failures, expected);
        }
        assert_eq!(
            classifier.record_failure(&mut health, &server_error(), now),
            Verdict::Clear
        );
        assert_eq!(health.last_failure, Some(FailureKind::HttpStatus));
        assert!(health.last_success.is_none());
    }

    #[test]
    fn test_success_resets_health() {
        let classifier = FailureClassifier::new(1);
        let mut health = EndpointHealth::new(Endpoint::Ems);
        let now = Utc::now();

        classifier.record_failure(&mut health, &server_error(), now);
        classifier.record_failure(&mut health, &server_error(), now);
        assert_eq!(classifier.record_success(&mut health, now), Verdict::Fresh);

        assert_eq!(health.consecutive_failures, 0);
        assert_eq!(health.last_failure, None);
        assert!(health.is_healthy());
    }

    #[test]
    fn test_zero_grace_clears_immediately() {
        let classifier = FailureClassifier::new(0);
        let mut health = EndpointHealth::new(Endpoint::Status);
        assert_eq!(
            classifier.record_failure(&mut health, &server_error(), Utc::now()),
            Verdict::Clear
        );
        assert!(classifier.exceeds_grace(1));
        assert!(!classifier.exceeds_grace(0));
    }
}
