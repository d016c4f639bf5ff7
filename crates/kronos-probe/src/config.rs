//! Session configuration.
//!
//! The runner supplies the device base URL, the raw model identifier and
//! credentials; everything here is opaque input to the adaptation layer.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::capability::CapabilityRegistry;
use crate::result::{ProbeError, ProbeResult};

/// Environment variable overriding `base_url`
pub const ENV_BASE_URL: &str = "KRONOS_BASE_URL";
/// Environment variable overriding `device_model`
pub const ENV_DEVICE_MODEL: &str = "KRONOS_DEVICE_MODEL";
/// Environment variable overriding both passwords
pub const ENV_PASSWORD: &str = "KRONOS_PASSWORD";

/// Unscaled wait bounds; each is multiplied by the device's timeout multiplier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaseTimeouts {
    /// Page navigation and section load
    pub navigation_ms: u64,
    /// Element appearance
    pub element_ms: u64,
    /// Save indicator after submitting
    pub save_ms: u64,
    /// Cancel control appearance
    pub cancel_ms: u64,
    /// Satellite data loading mask after each authentication level
    pub satellite_ms: u64,
    /// Polling interval (not scaled)
    pub poll_interval_ms: u64,
}

impl Default for BaseTimeouts {
    fn default() -> Self {
        Self {
            navigation_ms: 30_000,
            element_ms: 10_000,
            save_ms: 10_000,
            cancel_ms: 5_000,
            satellite_ms: 20_000,
            poll_interval_ms: 100,
        }
    }
}

fn default_base_url() -> String {
    "https://192.168.1.100".to_string()
}

const fn default_verify_persistence() -> bool {
    true
}

/// Configuration for one device session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Device web UI root, without trailing slash
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Raw model identifier as detected by the runner
    #[serde(default)]
    pub device_model: String,
    /// Status-level login password
    #[serde(default)]
    pub status_password: String,
    /// Configuration unlock password
    #[serde(default)]
    pub config_password: String,
    /// Wait bounds before device scaling
    #[serde(default)]
    pub base_timeouts: BaseTimeouts,
    /// Reload and re-read after every save
    #[serde(default = "default_verify_persistence")]
    pub verify_persistence: bool,
    /// Extra capability table layered over the built-in one
    #[serde(default)]
    pub capability_overlay: Option<PathBuf>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            device_model: String::new(),
            status_password: String::new(),
            config_password: String::new(),
            base_timeouts: BaseTimeouts::default(),
            verify_persistence: true,
            capability_overlay: None,
        }
    }
}

impl ProbeConfig {
    /// Create new default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse YAML
    pub fn from_yaml_str(yaml: &str) -> ProbeResult<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)?;
        config.validated()
    }

    /// Load a YAML file
    pub fn load(path: impl AsRef<Path>) -> ProbeResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&text)
    }

    /// Apply `KRONOS_*` environment overrides
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup
    #[must_use]
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(url) = non_empty(ENV_BASE_URL) {
            self.base_url = normalize_base_url(&url);
        }
        if let Some(model) = non_empty(ENV_DEVICE_MODEL) {
            self.device_model = model;
        }
        if let Some(password) = non_empty(ENV_PASSWORD) {
            self.status_password.clone_from(&password);
            self.config_password = password;
        }
        self
    }

    /// Set the base URL
    #[must_use]
    pub fn with_base_url(mut self, url: impl AsRef<str>) -> Self {
        self.base_url = normalize_base_url(url.as_ref());
        self
    }

    /// Set the raw model identifier
    #[must_use]
    pub fn with_device_model(mut self, model: impl Into<String>) -> Self {
        self.device_model = model.into();
        self
    }

    /// Set both passwords
    #[must_use]
    pub fn with_passwords(mut self, status: impl Into<String>, config: impl Into<String>) -> Self {
        self.status_password = status.into();
        self.config_password = config.into();
        self
    }

    /// Set base timeouts
    #[must_use]
    pub const fn with_timeouts(mut self, timeouts: BaseTimeouts) -> Self {
        self.base_timeouts = timeouts;
        self
    }

    /// Enable or disable reload verification after save
    #[must_use]
    pub const fn with_verify_persistence(mut self, verify: bool) -> Self {
        self.verify_persistence = verify;
        self
    }

    /// Layer a capability table file over the built-in one
    #[must_use]
    pub fn with_capability_overlay(mut self, path: impl Into<PathBuf>) -> Self {
        self.capability_overlay = Some(path.into());
        self
    }

    /// Built-in registry plus the configured overlay
    pub fn registry(&self) -> ProbeResult<CapabilityRegistry> {
        let registry = CapabilityRegistry::kronos();
        match &self.capability_overlay {
            Some(path) => registry.with_overlay_file(path),
            None => Ok(registry),
        }
    }

    fn validated(mut self) -> ProbeResult<Self> {
        self.base_url = normalize_base_url(&self.base_url);
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ProbeError::config(format!(
                "base_url must start with http:// or https://, got '{}'",
                self.base_url
            )));
        }
        if self.base_timeouts.poll_interval_ms == 0 {
            return Err(ProbeError::config("poll_interval_ms must be positive"));
        }
        Ok(self)
    }
}

/// Bare hosts get `https://`; trailing slashes are dropped
fn normalize_base_url(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    if url.contains("://") {
        url.to_string()
    } else {
        format!("https://{url}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = ProbeConfig::new();
        assert!(config.verify_persistence);
        assert_eq!(config.base_timeouts.save_ms, 10_000);
        assert!(config.capability_overlay.is_none());
    }

    #[test]
    fn test_yaml_partial() {
        let config = ProbeConfig::from_yaml_str(
            "base_url: https://10.0.0.5/\ndevice_model: KRONOS-2P-HV-2\nbase_timeouts:\n  save_ms: 2000\n",
        )
        .unwrap();
        assert_eq!(config.base_url, "https://10.0.0.5");
        assert_eq!(config.base_timeouts.save_ms, 2000);
        assert_eq!(config.base_timeouts.navigation_ms, 30_000);
        assert_eq!(config.base_timeouts.satellite_ms, 20_000);
    }

    #[test]
    fn test_yaml_rejects_bad_url_and_poll() {
        assert!(ProbeConfig::from_yaml_str("base_url: ftp://x\n").is_err());
        assert!(ProbeConfig::from_yaml_str("base_timeouts:\n  poll_interval_ms: 0\n").is_err());
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_BASE_URL, "10.9.8.7"),
            (ENV_DEVICE_MODEL, "KRONOS-3R-HVXX-TCXO-A2X"),
            (ENV_PASSWORD, "secret"),
        ]
        .into_iter()
        .collect();
        let config = ProbeConfig::new().with_overrides_from(|k| env.get(k).map(|v| (*v).to_string()));
        assert_eq!(config.base_url, "https://10.9.8.7");
        assert_eq!(config.device_model, "KRONOS-3R-HVXX-TCXO-A2X");
        assert_eq!(config.status_password, "secret");
        assert_eq!(config.config_password, "secret");
    }

    #[test]
    fn test_empty_override_ignored() {
        let config = ProbeConfig::new()
            .with_device_model("KRONOS-2P-HV-2")
            .with_overrides_from(|k| (k == ENV_DEVICE_MODEL).then(|| "  ".to_string()));
        assert_eq!(config.device_model, "KRONOS-2P-HV-2");
    }

    #[test]
    fn test_load_file_and_registry_overlay() {
        let dir = tempfile::tempdir().unwrap();
        let caps = dir.path().join("caps.yaml");
        std::fs::write(
            &caps,
            "profiles:\n  - model: K3-900\n    series: series3\n    sections: [general]\n    save_button:\n      role_based: Save\n",
        )
        .unwrap();
        let cfg_path = dir.path().join("probe.yaml");
        std::fs::write(
            &cfg_path,
            format!("device_model: K3-900\ncapability_overlay: {}\n", caps.display()),
        )
        .unwrap();

        let config = ProbeConfig::load(&cfg_path).unwrap();
        let registry = config.registry().unwrap();
        assert!(registry.classify(&config.device_model).is_known());
        assert_eq!(registry.models().count(), 6);
    }
}
