//! Result and error types for kronos-probe.
//!
//! Every failure the adaptation layer can report is a variant of
//! [`ProbeError`]. Locator and save failures carry the structured detail a
//! caller needs to decide between retrying, skipping and failing a test.

use std::fmt;

use thiserror::Error;

use crate::capability::SectionId;

/// Result type for kronos-probe operations
pub type ProbeResult<T> = Result<T, ProbeError>;

/// Why a save did not complete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SaveFailureReason {
    /// The save control was disabled, nothing was submitted
    NotDirty,
    /// Neither a success nor an error indicator appeared in time
    Timeout,
    /// The device acknowledged the save but the value did not survive a reload
    NotPersisted,
    /// The device reported an error after the save was submitted
    DeviceError,
}

impl SaveFailureReason {
    /// Stable name used in logs and error messages
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotDirty => "not-dirty",
            Self::Timeout => "timeout",
            Self::NotPersisted => "not-persisted",
            Self::DeviceError => "device-error",
        }
    }
}

impl fmt::Display for SaveFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Furthest step the save protocol reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SaveStage {
    /// Checking whether the save control is enabled
    CheckEnabled,
    /// Save control clicked
    Submitted,
    /// Polling for a success or error indicator
    AwaitingIndicator,
    /// Reloading the section and re-reading mutated fields
    VerifyingPersistence,
    /// Every step passed
    Complete,
}

impl SaveStage {
    /// Stable name used in logs and error messages
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::CheckEnabled => "check-enabled",
            Self::Submitted => "submitted",
            Self::AwaitingIndicator => "awaiting-indicator",
            Self::VerifyingPersistence => "verifying-persistence",
            Self::Complete => "complete",
        }
    }
}

impl fmt::Display for SaveStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur in kronos-probe
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The raw identifier did not resolve to a known device model
    #[error("Unknown device '{raw}': no capability profile, refusing to operate")]
    UnknownDevice {
        /// Identifier supplied by the session
        raw: String,
    },

    /// The section is not in the resolved profile's available sections
    #[error("Section '{section}' is not available on device '{model}'")]
    SectionUnavailable {
        /// Requested section
        section: SectionId,
        /// Device model the profile was resolved for
        model: String,
    },

    /// No locator candidate matched a visible element
    #[error("Field '{field}' not found (tried: {})", tried.join(" | "))]
    FieldNotFound {
        /// Logical field name
        field: String,
        /// Candidate selectors in the order they were tried
        tried: Vec<String>,
    },

    /// The element exists but cannot be edited
    #[error("Field '{field}' matched by {selector} is not editable: {reason}")]
    FieldNotEditable {
        /// Logical field name
        field: String,
        /// Selector that matched
        selector: String,
        /// `disabled` or `read-only`
        reason: String,
    },

    /// The value was rejected before any write was attempted
    #[error("Invalid value '{value}' for field '{field}': {reason}")]
    InvalidValue {
        /// Logical field name
        field: String,
        /// Rejected value
        value: String,
        /// Validation message
        reason: String,
    },

    /// The save protocol did not confirm the change
    #[error("Save failed ({reason}) at stage {stage}: {detail}")]
    SaveFailed {
        /// Failure classification
        reason: SaveFailureReason,
        /// Furthest protocol stage reached
        stage: SaveStage,
        /// Human-readable detail
        detail: String,
    },

    /// A bounded wait exceeded its deadline
    #[error("Timed out after {ms}ms waiting for {waited_for}")]
    Timeout {
        /// Deadline in milliseconds
        ms: u64,
        /// Description of the awaited condition
        waited_for: String,
    },

    /// Operation called in the wrong controller phase
    #[error("Invalid state: {message}")]
    InvalidState {
        /// Error message
        message: String,
    },

    /// Authentication level not listed in the device profile
    #[error("Authentication level '{level}' is not supported by device '{model}'")]
    AuthLevelUnsupported {
        /// Requested level
        level: String,
        /// Device model
        model: String,
    },

    /// Authentication did not reach the expected page
    #[error("Authentication '{level}' failed: {message}")]
    AuthenticationFailed {
        /// Level being authenticated
        level: String,
        /// Error message
        message: String,
    },

    /// Browser engine failure
    #[error("Browser engine error: {message}")]
    Engine {
        /// Error message
        message: String,
    },

    /// Configuration could not be loaded or is inconsistent
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl ProbeError {
    /// Create a browser engine error
    #[must_use]
    pub fn engine(message: impl Into<String>) -> Self {
        Self::Engine {
            message: message.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid state error
    #[must_use]
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Create a save failure
    #[must_use]
    pub fn save_failed(reason: SaveFailureReason, stage: SaveStage, detail: impl Into<String>) -> Self {
        Self::SaveFailed {
            reason,
            stage,
            detail: detail.into(),
        }
    }

    /// Save failure reason, if this is a save failure
    #[must_use]
    pub const fn save_failure_reason(&self) -> Option<SaveFailureReason> {
        match self {
            Self::SaveFailed { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    /// Whether a bounded wait expired, including a save that timed out
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. }
                | Self::SaveFailed {
                    reason: SaveFailureReason::Timeout,
                    ..
                }
        )
    }

    /// Whether the failure comes from capability resolution rather than the page.
    ///
    /// These are never worth retrying against the same device.
    #[must_use]
    pub const fn is_capability_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownDevice { .. }
                | Self::SectionUnavailable { .. }
                | Self::AuthLevelUnsupported { .. }
        )
    }
}
