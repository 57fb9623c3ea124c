use crate::types::Unit;

/// Failures raised by histogram construction and use.
///
/// Every variant is a synchronous, non-retryable usage error: the engine
/// does no I/O, so there is no transient failure class. Callers should
/// treat these as programming errors rather than conditions to retry.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HistogramError {
    /// A percentile outside the closed interval [0, 1].
    #[error("percentile must be within [0, 1], got {0}")]
    InvalidPercentile(f64),

    /// A bin boundary that does not extend the builder's current maximum.
    #[error("bin boundary {next} must be greater than the current maximum {current}")]
    OutOfOrderBoundary {
        /// The offending boundary.
        next: f64,
        /// The builder's current maximum boundary.
        current: f64,
    },

    /// Exponential bins require a positive starting boundary.
    #[error("exponential bins require a positive current maximum, got {0}")]
    NonPositiveExponentialBase(f64),

    /// A boundary run with zero bins.
    #[error("bin count must be positive")]
    InvalidBinCount,

    /// A histogram's guid may be assigned at most once.
    #[error("histogram guid cannot be reassigned")]
    GuidAlreadySet,

    /// Merging or comparing histograms that measure different units.
    #[error("cannot combine histograms with units {left} and {right}")]
    UnitMismatch {
        /// Unit of the receiving histogram.
        left: Unit,
        /// Unit of the other histogram.
        right: Unit,
    },

    /// Merging histograms whose bin layouts differ.
    #[error("cannot merge histograms with different bin layouts")]
    IncompatibleBins,

    /// Merging bins that cover different ranges.
    #[error("cannot merge bins covering different ranges")]
    IncompatibleRange,

    /// A serialized boundary segment with an unsupported tag.
    #[error("unrecognized boundary segment tag {0}")]
    UnrecognizedBoundarySegment(i64),

    /// A serialized unit name that names no known unit.
    #[error("unknown unit name {0:?}")]
    UnknownUnit(String),

    /// A serialized histogram with a missing or malformed field.
    #[error("histogram field {0:?} is missing or malformed")]
    MalformedField(&'static str),
}
