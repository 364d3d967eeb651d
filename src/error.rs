//! Error types for the Cardboard HMD core

use thiserror::Error;

/// Cardboard HMD errors
#[derive(Debug, Error)]
pub enum CardboardError {
    /// Malformed device-params bytes or calibration URI. Prior state is kept.
    #[error("Invalid device parameter encoding: {0}")]
    InvalidParameterEncoding(String),

    /// The viewer profile could not be parsed. Callers fall back to the default profile.
    #[error("Failed to parse viewer profile: {0}")]
    CalibrationParse(String),

    /// Neither the saved nor the default profile produced a calibration.
    #[error("No usable calibration: {0}")]
    FatalCalibration(String),

    /// No native head tracker on this platform
    #[error("Native head tracker unavailable")]
    TrackerUnavailable,

    /// API called from the wrong thread, in the wrong state, or after destruction
    #[error("Lifecycle misuse: {0}")]
    LifecycleMisuse(String),

    /// Persisted device params could not be read or written
    #[error("Device params storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// Settings file could not be (de)serialized
    #[error("Settings error: {0}")]
    Settings(#[from] serde_json::Error),
}

/// Result type for Cardboard operations
pub type Result<T> = std::result::Result<T, CardboardError>;
