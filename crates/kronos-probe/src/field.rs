//! Field descriptors and client-side value validation.
//!
//! A descriptor decides whether a value is acceptable to submit. Whether the
//! device then accepts it is the save protocol's business.

use std::fmt;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::result::{ProbeError, ProbeResult};

/// Text constraints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextFormat {
    /// Any text
    #[default]
    Any,
    /// Dotted-quad IPv4 address
    Ipv4,
    /// IPv4 address, or empty to clear the setting
    Ipv4OrEmpty,
}

/// Expected value type of a form field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Free text input
    Text(TextFormat),
    /// Select with a fixed option list
    Enum(Vec<String>),
    /// Checkbox
    Boolean,
    /// Integer input with inclusive bounds
    NumericRange {
        /// Lower bound
        min: i64,
        /// Upper bound
        max: i64,
    },
}

impl FieldKind {
    /// Free text
    #[must_use]
    pub const fn text() -> Self {
        Self::Text(TextFormat::Any)
    }

    /// IPv4 address
    #[must_use]
    pub const fn ipv4() -> Self {
        Self::Text(TextFormat::Ipv4)
    }

    /// Enumeration from string slices
    #[must_use]
    pub fn one_of(options: &[&str]) -> Self {
        Self::Enum(options.iter().map(|o| (*o).to_string()).collect())
    }

    /// Inclusive integer range
    #[must_use]
    pub const fn range(min: i64, max: i64) -> Self {
        Self::NumericRange { min, max }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(TextFormat::Any) => write!(f, "text"),
            Self::Text(TextFormat::Ipv4) => write!(f, "IPv4 address"),
            Self::Text(TextFormat::Ipv4OrEmpty) => write!(f, "IPv4 address or empty"),
            Self::Enum(options) => write!(f, "one of [{}]", options.join(", ")),
            Self::Boolean => write!(f, "boolean"),
            Self::NumericRange { min, max } => write!(f, "integer {min}..={max}"),
        }
    }
}

/// Logical form field with its type and documented form default
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Logical name, also the DOM `name` attribute on current firmware
    pub name: String,
    /// Expected value type
    pub kind: FieldKind,
    /// Whether an empty value is rejected
    pub required: bool,
    /// Value the form shows after cancel, when documented
    pub default: Option<String>,
}

impl FieldDescriptor {
    /// Optional field without a documented default
    #[must_use]
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            default: None,
        }
    }

    /// Permissive descriptor for names no schema documents
    #[must_use]
    pub fn generic(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::text())
    }

    /// Mark the field as required
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Set the documented form default
    #[must_use]
    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Validate and return the canonical form of `value`.
    ///
    /// Booleans normalize to `true`/`false`, numbers lose surrounding
    /// whitespace and leading `+`. Text is returned unchanged.
    pub fn normalize(&self, value: &str) -> ProbeResult<String> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            if self.required {
                return Err(self.invalid(value, "value is required"));
            }
            if matches!(self.kind, FieldKind::Text(TextFormat::Any | TextFormat::Ipv4OrEmpty)) {
                return Ok(String::new());
            }
        }

        match &self.kind {
            FieldKind::Text(TextFormat::Any) => Ok(value.to_string()),
            FieldKind::Text(TextFormat::Ipv4 | TextFormat::Ipv4OrEmpty) => trimmed
                .parse::<Ipv4Addr>()
                .map(|ip| ip.to_string())
                .map_err(|_| self.invalid(value, "not a dotted-quad IPv4 address")),
            FieldKind::Enum(options) => options
                .iter()
                .find(|o| o.as_str() == trimmed)
                .cloned()
                .ok_or_else(|| self.invalid(value, &format!("expected {}", self.kind))),
            FieldKind::Boolean => match trimmed.to_ascii_lowercase().as_str() {
                "true" | "on" | "1" | "yes" => Ok("true".to_string()),
                "false" | "off" | "0" | "no" => Ok("false".to_string()),
                _ => Err(self.invalid(value, "expected a boolean")),
            },
            FieldKind::NumericRange { min, max } => {
                let n: i64 = trimmed
                    .parse()
                    .map_err(|_| self.invalid(value, "not an integer"))?;
                if n < *min || n > *max {
                    return Err(self.invalid(value, &format!("outside {min}..={max}")));
                }
                Ok(n.to_string())
            }
        }
    }

    /// Validate without keeping the canonical form
    pub fn validate(&self, value: &str) -> ProbeResult<()> {
        self.normalize(value).map(|_| ())
    }

    /// Whether two displayed values are the same setting
    #[must_use]
    pub fn values_match(&self, expected: &str, actual: &str) -> bool {
        match (self.normalize(expected), self.normalize(actual)) {
            (Ok(a), Ok(b)) => a == b,
            _ => expected.trim() == actual.trim(),
        }
    }

    fn invalid(&self, value: &str, reason: &str) -> ProbeError {
        ProbeError::InvalidValue {
            field: self.name.clone(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}
