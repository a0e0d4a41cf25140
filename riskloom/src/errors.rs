// src/errors.rs
//
// Error taxonomy (spec §7). Only InvalidInput and Cancelled ever surface to
// a caller as an Err; everything else is swallowed at its boundary and
// turned into an empty result or a degraded-detector flag.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RiskError {
    #[error("transient fetch error for {kind} on chain {chain_id}: {reason}")]
    TransientFetch {
        kind: String,
        chain_id: u64,
        reason: String,
    },

    #[error("malformed data from adapter: {reason}")]
    MalformedData { reason: String },

    #[error("invalid input in field `{field}`: {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("cache I/O error: {reason}")]
    CacheIo { reason: String },

    #[error("detector `{detector}` failed internally: {reason}")]
    DetectorInternal { detector: String, reason: String },

    #[error("analysis cancelled")]
    Cancelled,
}

impl RiskError {
    /// Renders the degraded-detector flag text specified by §7:
    /// `"<detector> error: <reason>"`.
    pub fn as_detector_flag(&self) -> Option<String> {
        match self {
            RiskError::DetectorInternal { detector, reason } => {
                Some(format!("{detector} error: {reason}"))
            }
            _ => None,
        }
    }
}
