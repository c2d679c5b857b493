//! Core primitives for aircal
//!
//! Shared building blocks for the adaptive offset engine: a fixed-capacity
//! history buffer, the error taxonomy, a pluggable time source, raw sensor
//! input sanitization and a statistical outlier gate.
//!
//! Key constraints:
//! - No operation in this crate panics on malformed sensor input
//! - Sanitization degrades to `None`, never to an error
//! - All stateful types are single-owner; the host serializes access
//!
//! ```
//! use aircal_core::sanitize;
//!
//! // Raw entity states arrive as strings and may be garbage
//! assert_eq!(sanitize::sanitize_float(Some("23.5")), Some(23.5));
//! assert_eq!(sanitize::sanitize_float(Some("unavailable")), None);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod buffer;
pub mod errors;
pub mod outlier;
pub mod sanitize;
pub mod time;

// Public API
pub use buffer::CircularBuffer;
pub use errors::{EngineError, EngineResult};
pub use outlier::{OutlierGate, RollingZScore};
pub use time::{FixedClock, SystemClock, TimeSource, Timestamp};

/// Crate version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_exists() {
        assert!(!VERSION.is_empty());
    }
}
