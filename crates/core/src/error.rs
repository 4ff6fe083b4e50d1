//! Engine error type.
//!
//! Failures are grouped by [`ErrorCategory`]; only domain errors are
//! skippable.

use crate::im::Im;

/// Which side of an interpolation a [`HazardError::Domain`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantity {
    ImLevel,
    ExceedanceRate,
}

impl std::fmt::Display for Quantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ImLevel => f.write_str("IM level"),
            Self::ExceedanceRate => f.write_str("exceedance rate"),
        }
    }
}

/// Broad failure classes, used by batch callers to decide between
/// aborting, skipping a unit, or flagging upstream data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Caller misuse: bad weights, mismatched grids, unsupported IMs.
    Configuration,
    /// Expected at extreme sites / return periods; skip the unit.
    Domain,
    /// Corrupt upstream data.
    DataIntegrity,
}

#[derive(Debug, thiserror::Error)]
pub enum HazardError {
    #[error("Unsupported IM {im}: {reason}")]
    UnsupportedIm { im: String, reason: String },

    #[error("Branch weights must sum to 1 (tolerance {tolerance}), got {sum}")]
    InvalidWeights { sum: f64, tolerance: f64 },

    #[error("Branch {branch_id} IM levels do not match the ensemble grid: {detail}")]
    GridMismatch { branch_id: String, detail: String },

    #[error("{quantity} {value} is outside the curve domain [{min}, {max}]")]
    Domain {
        quantity: Quantity,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Exceedance {exceedance} is outside the computed hazard range for IM {im}")]
    ExceedanceOutOfRange { im: Im, exceedance: f64 },

    #[error("Branch {branch_id} ground-motion data is {found}, expected {expected}")]
    MixedDataType {
        branch_id: String,
        expected: String,
        found: String,
    },

    #[error("Data integrity violation: {0}")]
    DataIntegrity(String),

    #[error("Validation failed: {0}")]
    Validation(String),
}

impl HazardError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Domain { .. } | Self::ExceedanceOutOfRange { .. } => ErrorCategory::Domain,
            Self::DataIntegrity(_) => ErrorCategory::DataIntegrity,
            Self::UnsupportedIm { .. }
            | Self::InvalidWeights { .. }
            | Self::GridMismatch { .. }
            | Self::MixedDataType { .. }
            | Self::Validation(_) => ErrorCategory::Configuration,
        }
    }

    /// `true` for conditions a batch caller should skip rather than abort on.
    pub fn is_skippable(&self) -> bool {
        self.category() == ErrorCategory::Domain
    }
}
