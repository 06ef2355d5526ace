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

use async_trait::async_trait;
use homevolt_types::{
    Endpoint, EmsResponse, ErrorReportEntry, FailureKind, NodeId, NodeInfo, NodeMetrics,
    StatusResponse,
};
use thiserror::Error;

/// Typed failure of a single endpoint fetch
///
/// Every variant is recoverable: the next scheduled cycle is the retry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    #[error("Connection to {endpoint} failed: {message}")]
    Network { endpoint: Endpoint, message: String },

    #[error("Request to {endpoint} timed out")]
    Timeout { endpoint: Endpoint },

    #[error("{endpoint} returned HTTP status {status}: {message}")]
    HttpStatus {
        endpoint: Endpoint,
        status: u16,
        message: String,
    },

    #[error("Failed to decode {endpoint} response: {message}")]
    Decode { endpoint: Endpoint, message: String },
}

impl FetchFailure {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Network { .. } => FailureKind::Network,
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::HttpStatus { .. } => FailureKind::HttpStatus,
            Self::Decode { .. } => FailureKind::Decode,
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        match self {
            Self::Network { endpoint, .. }
            | Self::Timeout { endpoint }
            | Self::HttpStatus { endpoint, .. }
            | Self::Decode { endpoint, .. } => *endpoint,
        }
    }

    /// The device rejected the configured credentials
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::HttpStatus { status: 401 | 403, .. })
    }
}

pub type FetchResult<T> = Result<T, FetchFailure>;

/// Read access to the device's local HTTP API
///
/// Implementations perform exactly one request per call, bounded by a timeout, and never
/// retry. The coordinator owns the retry policy (the next scheduled cycle).
#[async_trait]
pub trait DeviceApi: Send + Sync {
    /// Primary endpoint: system, voltage, current, module and clamp telemetry
    async fn ems(&self) -> FetchResult<EmsResponse>;

    async fn error_report(&self) -> FetchResult<Vec<ErrorReportEntry>>;

    async fn status(&self) -> FetchResult<StatusResponse>;

    /// CT mesh node list
    async fn nodes(&self) -> FetchResult<Vec<NodeInfo>>;

    /// Metrics of a single CT mesh node
    async fn node_metrics(&self, node: NodeId) -> FetchResult<NodeMetrics>;
}
