//! Error Types for the Adaptive Offset Engine
//!
//! ## Design Philosophy
//!
//! Nothing in this system is allowed to raise past its own boundary: the
//! host environment has no crash recovery for a single entity's periodic
//! update callback failing repeatedly. Errors therefore exist to carry
//! intent *between* internal boundaries, where the orchestrator maps every
//! kind onto one of three observable outcomes:
//!
//! 1. A safe fallback result (offset 0.0, confidence 0.0)
//! 2. A logged rejection (feedback silently dropped)
//! 3. A fallback state value (e.g. hysteresis degrades to "learning")
//!
//! ## Error Categories
//!
//! - **Input errors** never reach this enum: sanitization degrades
//!   malformed values to `None` instead
//! - **Validation rejections**: `OutOfRange`, `RateLimited`,
//!   `FutureTimestamp`, `NotFinite`
//! - **Collaborator failures**: `Collaborator`, a seasonal/forecast or
//!   hysteresis sub-call failed and the caller degrades
//! - **Critical absence**: `CriticalSensorUnavailable`

use thiserror_no_std::Error;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors crossing internal engine boundaries
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// One of the two critical temperatures (AC internal, room) is missing
    #[error("Critical sensor unavailable")]
    CriticalSensorUnavailable,

    /// Value outside the configured validation bounds
    #[error("Value {value} outside range [{min}, {max}]")]
    OutOfRange {
        /// The rejected value
        value: f32,
        /// Lower validation bound
        min: f32,
        /// Upper validation bound
        max: f32,
    },

    /// Value is NaN or infinite
    #[error("Value is not a finite number")]
    NotFinite,

    /// Feedback arrived before the rate-limit interval elapsed
    #[error("Feedback rate limited: {elapsed_ms}ms since last accepted, limit {limit_ms}ms")]
    RateLimited {
        /// Milliseconds since the last accepted feedback
        elapsed_ms: u64,
        /// Configured minimum interval in milliseconds
        limit_ms: u64,
    },

    /// Feedback timestamp lies strictly in the future
    #[error("Feedback timestamp is in the future")]
    FutureTimestamp,

    /// A pluggable collaborator failed; the caller degrades to a fallback
    #[error("Collaborator failed: {what}")]
    Collaborator {
        /// Which collaborator failed
        what: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_bounds() {
        let err = EngineError::OutOfRange {
            value: 42.0,
            min: -10.0,
            max: 10.0,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("42"));
        assert!(msg.contains("-10"));
    }

    #[test]
    fn rate_limit_display() {
        let err = EngineError::RateLimited {
            elapsed_ms: 1000,
            limit_ms: 60_000,
        };
        assert!(format!("{}", err).contains("60000"));
    }
}
