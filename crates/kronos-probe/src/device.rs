//! Device classification.
//!
//! Resolves whatever identifying string the session supplies (a dashboard
//! "Model Number" value, a command-line option, an environment variable) to
//! a canonical model key the [`CapabilityRegistry`] knows about.
//!
//! ## Toyota Way Application
//!
//! - **Jidoka**: Unrecognized hardware stops the line as [`DeviceModel::Unknown`]
//! - **Poka-Yoke**: A model is a typed value, never a loose string compared ad hoc

use std::collections::BTreeSet;
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::capability::CapabilityRegistry;
use crate::result::{ProbeError, ProbeResult};

/// Label some dashboards prefix to the hardware identifier
const MODEL_NUMBER_LABEL: &str = "MODEL NUMBER:";

/// Hardware product generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Series {
    /// Single-interface devices with static save buttons
    Series2,
    /// Multi-interface devices with PTP and firmware upload
    Series3,
    /// Unrecognized hardware
    Unknown,
}

impl Series {
    /// Numeric generation, if known
    #[must_use]
    pub const fn generation(&self) -> Option<u8> {
        match self {
            Self::Series2 => Some(2),
            Self::Series3 => Some(3),
            Self::Unknown => None,
        }
    }
}

impl fmt::Display for Series {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Series2 => write!(f, "Series 2"),
            Self::Series3 => write!(f, "Series 3"),
            Self::Unknown => write!(f, "Unknown series"),
        }
    }
}

/// Canonical device model, resolved once per session
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeviceModel {
    /// A model key present in the registry
    Known(String),
    /// The identifier did not match any registry key or alias
    Unknown {
        /// The identifier as supplied
        raw: String,
    },
}

impl DeviceModel {
    /// Registry key, or the raw identifier for unknown devices
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Known(key) => key,
            Self::Unknown { raw } => raw,
        }
    }

    /// Whether the classifier recognized the device
    #[must_use]
    pub const fn is_known(&self) -> bool {
        matches!(self, Self::Known(_))
    }

    /// Fail with `UnknownDevice` unless the model is known
    pub fn require_known(&self) -> ProbeResult<&str> {
        match self {
            Self::Known(key) => Ok(key),
            Self::Unknown { raw } => Err(ProbeError::UnknownDevice { raw: raw.clone() }),
        }
    }
}

impl fmt::Display for DeviceModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(key) => f.write_str(key),
            Self::Unknown { raw } => write!(f, "unknown({raw})"),
        }
    }
}

/// Pattern mapping a family of raw identifiers to one registry key
#[derive(Debug, Clone)]
pub struct ModelAlias {
    pattern: Regex,
    model: String,
}

impl ModelAlias {
    /// Compile an alias. Patterns are matched against the normalized
    /// (trimmed, upper-cased) identifier.
    pub fn new(pattern: &str, model: impl Into<String>) -> ProbeResult<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| ProbeError::config(format!("invalid model alias pattern '{pattern}': {e}")))?;
        Ok(Self {
            pattern,
            model: model.into(),
        })
    }

    /// Target registry key
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Source pattern
    #[must_use]
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    fn matches(&self, normalized: &str) -> bool {
        self.pattern.is_match(normalized)
    }
}

/// Resolves raw identifiers against a registry snapshot
#[derive(Debug, Clone)]
pub struct DeviceClassifier {
    known: BTreeSet<String>,
    aliases: Vec<ModelAlias>,
}

impl DeviceClassifier {
    /// Snapshot the registry's model keys and alias patterns
    #[must_use]
    pub fn new(registry: &CapabilityRegistry) -> Self {
        Self {
            known: registry.models().map(str::to_uppercase).collect(),
            aliases: registry.aliases().to_vec(),
        }
    }

    /// Classify a raw identifier.
    ///
    /// Exact key matches win over alias patterns; aliases are tried in
    /// registration order and must point at a registered key. Anything
    /// else is `Unknown`. Never guesses from a prefix.
    #[must_use]
    pub fn classify(&self, raw: &str) -> DeviceModel {
        let normalized = normalize(raw);
        if normalized.is_empty() {
            return DeviceModel::Unknown { raw: raw.to_string() };
        }

        if self.known.contains(&normalized) {
            return DeviceModel::Known(normalized);
        }

        for alias in &self.aliases {
            if alias.matches(&normalized) && self.known.contains(&alias.model.to_uppercase()) {
                tracing::debug!(raw, model = alias.model(), pattern = alias.pattern(), "model resolved via alias");
                return DeviceModel::Known(alias.model.to_uppercase());
            }
        }

        tracing::warn!(raw, "device identifier did not match any capability profile");
        DeviceModel::Unknown { raw: raw.to_string() }
    }
}

fn normalize(raw: &str) -> String {
    let upper = raw.trim().to_uppercase();
    upper
        .strip_prefix(MODEL_NUMBER_LABEL)
        .map_or(upper.as_str(), str::trim)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> DeviceClassifier {
        DeviceClassifier::new(CapabilityRegistry::builtin())
    }

    mod classify_tests {
        use super::*;

        #[test]
        fn test_exact_key() {
            let model = classifier().classify("KRONOS-2R-HVXX-A2F");
            assert_eq!(model, DeviceModel::Known("KRONOS-2R-HVXX-A2F".to_string()));
            assert!(model.is_known());
        }

        #[test]
        fn test_normalizes_case_whitespace_and_label() {
            let c = classifier();
            assert_eq!(
                c.classify("  kronos-3r-hvxx-tcxo-44a \n").key(),
                "KRONOS-3R-HVXX-TCXO-44A"
            );
            assert_eq!(
                c.classify("Model Number: KRONOS-2P-HV-2").key(),
                "KRONOS-2P-HV-2"
            );
        }

        #[test]
        fn test_revision_suffix_alias() {
            let model = classifier().classify("KRONOS-3R-HVXX-TCXO-A2X-REV2");
            assert_eq!(model.key(), "KRONOS-3R-HVXX-TCXO-A2X");
        }

        #[test]
        fn test_unknown_fails_closed() {
            let model = classifier().classify("ZZZ-000");
            assert_eq!(model, DeviceModel::Unknown { raw: "ZZZ-000".to_string() });
            assert!(matches!(
                model.require_known(),
                Err(ProbeError::UnknownDevice { raw }) if raw == "ZZZ-000"
            ));
        }

        #[test]
        fn test_family_prefix_is_not_a_guess() {
            assert!(!classifier().classify("KRONOS-3R-SOMETHING-NEW").is_known());
            assert!(!classifier().classify("KRONOS-2").is_known());
        }

        #[test]
        fn test_empty_is_unknown() {
            assert!(!classifier().classify("   ").is_known());
        }

        #[test]
        fn test_alias_to_unregistered_model_is_ignored() {
            let registry = CapabilityRegistry::builtin()
                .clone()
                .with_alias(ModelAlias::new("^GHOST-\\d+$", "GHOST").unwrap());
            let c = DeviceClassifier::new(&registry);
            assert!(!c.classify("GHOST-1").is_known());
        }
    }

    mod series_tests {
        use super::*;

        #[test]
        fn test_generation() {
            assert_eq!(Series::Series2.generation(), Some(2));
            assert_eq!(Series::Series3.generation(), Some(3));
            assert_eq!(Series::Unknown.generation(), None);
            assert_eq!(Series::Series3.to_string(), "Series 3");
        }

        #[test]
        fn test_model_display() {
            assert_eq!(DeviceModel::Known("K3-900".into()).to_string(), "K3-900");
            assert_eq!(
                DeviceModel::Unknown { raw: "x".into() }.to_string(),
                "unknown(x)"
            );
        }
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Classification is deterministic for arbitrary input
            #[test]
            fn prop_classify_deterministic(raw in ".{0,40}") {
                let c = classifier();
                prop_assert_eq!(c.classify(&raw), c.classify(&raw));
            }

            /// Strings outside the Kronos namespace never classify as known
            #[test]
            fn prop_foreign_identifiers_unknown(raw in "[A-Z]{1,3}-[0-9]{1,4}") {
                prop_assert!(!classifier().classify(&raw).is_known());
            }
        }
    }
}
