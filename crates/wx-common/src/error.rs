//! Shared error type for the weather-store workspace.

use thiserror::Error;

/// Result type alias using [`WxError`].
pub type WxResult<T> = Result<T, WxError>;

/// Primary error type for the storage/reader/mixer core.
///
/// Variants map 1:1 onto the error taxonomy: missing data is never an
/// error (it is `NaN`), so there is no "not found" variant here.
#[derive(Debug, Error)]
pub enum WxError {
    // === Column file format ===
    #[error("malformed column file {path}: {reason}")]
    FormatInvalid { path: String, reason: String },

    // === Range / index errors ===
    #[error("location {location} out of range (nLocations={n_locations})")]
    OutOfRange { location: u64, n_locations: u64 },

    // === Cancellation ===
    #[error("query cancelled: deadline exceeded")]
    Cancelled,

    // === I/O ===
    #[error("I/O error on {path}: {source}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    // === Mixer programmer errors ===
    #[error("unit mismatch in mixer: {first} vs {other}")]
    UnitMismatch { first: String, other: String },

    // === Grid selection ===
    #[error("no data available for this location")]
    GridMiss,

    // === Interpolation ===
    #[error("upsampling forbidden: requested dt {requested}s > domain dt {domain}s")]
    UpsamplingForbidden { requested: u64, domain: u64 },
}

impl WxError {
    pub fn format_invalid(path: impl Into<String>, reason: impl Into<String>) -> Self {
        WxError::FormatInvalid {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn out_of_range(location: u64, n_locations: u64) -> Self {
        WxError::OutOfRange {
            location,
            n_locations,
        }
    }

    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        WxError::IoError {
            path: path.into(),
            source,
        }
    }

    pub fn unit_mismatch(first: impl Into<String>, other: impl Into<String>) -> Self {
        WxError::UnitMismatch {
            first: first.into(),
            other: other.into(),
        }
    }

    /// Whether a reader may retry this error (concurrent-rename races only).
    pub fn is_retryable_open(&self) -> bool {
        match self {
            WxError::IoError { source, .. } => source.kind() == std::io::ErrorKind::NotFound,
            WxError::FormatInvalid { .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_invalid_is_retryable() {
        let e = WxError::format_invalid("v_0.om", "bad magic");
        assert!(e.is_retryable_open());
    }

    #[test]
    fn io_not_found_is_retryable() {
        let e = WxError::io(
            "v_0.om",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(e.is_retryable_open());
    }

    #[test]
    fn io_other_is_not_retryable() {
        let e = WxError::io(
            "v_0.om",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope"),
        );
        assert!(!e.is_retryable_open());
    }

    #[test]
    fn cancelled_is_not_retryable() {
        assert!(!WxError::Cancelled.is_retryable_open());
    }
}
