//! Capability profiles and the registry that owns them.
//!
//! Per-device behavior lives here as data: which configuration sections
//! exist, which concrete selectors a logical field maps to, how the save
//! control is rendered and how much slower than baseline the hardware is.
//! Adding hardware means adding a profile, never editing control flow.
//!
//! ## Toyota Way Application
//!
//! - **Poka-Yoke**: Lookup is total; unknown models get an empty profile
//! - **Heijunka**: One timeout scaling rule for every wait on a device
//! - **Genchi Genbutsu**: Profiles record observed firmware quirks as known issues

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

use crate::device::{DeviceClassifier, DeviceModel, ModelAlias, Series};
use crate::locator::Selector;
use crate::result::{ProbeError, ProbeResult};

// =============================================================================
// SECTIONS
// =============================================================================

/// One configuration page of the device web UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionId {
    /// Device identity
    General,
    /// Interface addressing
    Network,
    /// Timezone and DST
    Time,
    /// Satellite receiver
    Gnss,
    /// Timing signal outputs
    Outputs,
    /// Front panel display
    Display,
    /// Passwords, session timeout, HTTPS enforcement
    Access,
    /// SNMP communities
    Snmp,
    /// Remote syslog targets
    Syslog,
    /// Firmware upload
    Upload,
    /// Precision Time Protocol
    Ptp,
}

impl SectionId {
    /// Every section, in navigation order
    pub const ALL: [Self; 11] = [
        Self::General,
        Self::Network,
        Self::Time,
        Self::Gnss,
        Self::Outputs,
        Self::Display,
        Self::Access,
        Self::Snmp,
        Self::Syslog,
        Self::Upload,
        Self::Ptp,
    ];

    /// Stable lowercase name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Network => "network",
            Self::Time => "time",
            Self::Gnss => "gnss",
            Self::Outputs => "outputs",
            Self::Display => "display",
            Self::Access => "access",
            Self::Snmp => "snmp",
            Self::Syslog => "syslog",
            Self::Upload => "upload",
            Self::Ptp => "ptp",
        }
    }

    /// Navigation link text in the web UI
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::General => "General",
            Self::Network => "Network",
            Self::Time => "Time",
            Self::Gnss => "GNSS",
            Self::Outputs => "Outputs",
            Self::Display => "Display",
            Self::Access => "Access",
            Self::Snmp => "SNMP",
            Self::Syslog => "Syslog",
            Self::Upload => "Upload",
            Self::Ptp => "PTP",
        }
    }

    /// URL path of the section page
    #[must_use]
    pub fn path(&self) -> String {
        format!("/{}", self.as_str())
    }
}

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SectionId {
    type Err = ProbeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|section| section.as_str() == wanted)
            .ok_or_else(|| ProbeError::config(format!("unknown section '{s}'")))
    }
}

// =============================================================================
// SAVE BUTTON STRATEGY
// =============================================================================

/// How a device renders the save control for a section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveButtonStrategy {
    /// Fixed CSS selectors, tried in order
    StaticSelector(Vec<String>),
    /// Button located by accessible role and label
    RoleBased(String),
    /// One save button per interface; `{iface}` is substituted
    PerInterface(String),
    /// No usable save control; every save fails as not dirty
    Disabled,
}

impl SaveButtonStrategy {
    /// Placeholder substituted in [`Self::PerInterface`] templates
    pub const IFACE_PLACEHOLDER: &'static str = "{iface}";

    /// Candidate selectors for the save control.
    ///
    /// `iface` only matters for per-interface strategies; without it they
    /// yield no candidates.
    #[must_use]
    pub fn candidates(&self, iface: Option<&str>) -> Vec<Selector> {
        match self {
            Self::StaticSelector(css) => css.iter().map(|c| Selector::css(c)).collect(),
            Self::RoleBased(label) => vec![
                Selector::role("button", label),
                Selector::css(format!("input[type='submit'][value='{label}']")),
            ],
            Self::PerInterface(template) => iface
                .map(|i| vec![Selector::css(template.replace(Self::IFACE_PLACEHOLDER, i))])
                .unwrap_or_default(),
            Self::Disabled => Vec::new(),
        }
    }

    /// Whether the strategy needs an interface to produce candidates
    #[must_use]
    pub const fn is_per_interface(&self) -> bool {
        matches!(self, Self::PerInterface(_))
    }
}

// =============================================================================
// TIMEOUT MULTIPLIER
// =============================================================================

/// Positive rational scaling factor applied to every wait on a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "MultiplierRepr", into = "String")]
pub struct TimeoutMultiplier {
    num: u32,
    den: u32,
}

impl TimeoutMultiplier {
    /// No scaling
    pub const ONE: Self = Self { num: 1, den: 1 };

    /// Create a multiplier `num / den`, reduced to lowest terms
    pub fn new(num: u32, den: u32) -> ProbeResult<Self> {
        if num == 0 || den == 0 {
            return Err(ProbeError::config(format!(
                "timeout multiplier must be positive, got {num}/{den}"
            )));
        }
        let g = gcd(num, den);
        Ok(Self {
            num: num / g,
            den: den / g,
        })
    }

    /// Numerator
    #[must_use]
    pub const fn numerator(&self) -> u32 {
        self.num
    }

    /// Denominator
    #[must_use]
    pub const fn denominator(&self) -> u32 {
        self.den
    }

    /// Scale `base_ms`, rounding up and never returning less than `base_ms`
    #[must_use]
    pub fn scale(&self, base_ms: u64) -> u64 {
        let product = u128::from(base_ms) * u128::from(self.num);
        let den = u128::from(self.den);
        let scaled = product.div_ceil(den);
        u64::try_from(scaled).unwrap_or(u64::MAX).max(base_ms)
    }
}

impl Default for TimeoutMultiplier {
    fn default() -> Self {
        Self::ONE
    }
}

impl fmt::Display for TimeoutMultiplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

impl FromStr for TimeoutMultiplier {
    type Err = ProbeError;

    /// Accepts `3/2`, `1.5` or `2`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || ProbeError::config(format!("invalid timeout multiplier '{s}'"));

        if let Some((num, den)) = s.split_once('/') {
            let num = num.trim().parse().map_err(|_| invalid())?;
            let den = den.trim().parse().map_err(|_| invalid())?;
            return Self::new(num, den);
        }

        let (whole, frac) = s.split_once('.').unwrap_or((s, ""));
        if frac.len() > 6 || !frac.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let den = 10u32.pow(frac.len() as u32);
        let whole: u32 = whole.parse().map_err(|_| invalid())?;
        let frac: u32 = if frac.is_empty() { 0 } else { frac.parse().map_err(|_| invalid())? };
        let num = whole
            .checked_mul(den)
            .and_then(|w| w.checked_add(frac))
            .ok_or_else(invalid)?;
        Self::new(num, den)
    }
}

impl From<TimeoutMultiplier> for String {
    fn from(value: TimeoutMultiplier) -> Self {
        value.to_string()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MultiplierRepr {
    Integer(u32),
    Float(f64),
    Text(String),
}

impl TryFrom<MultiplierRepr> for TimeoutMultiplier {
    type Error = ProbeError;

    fn try_from(value: MultiplierRepr) -> Result<Self, Self::Error> {
        match value {
            MultiplierRepr::Integer(n) => Self::new(n, 1),
            MultiplierRepr::Float(f) => f.to_string().parse(),
            MultiplierRepr::Text(s) => s.parse(),
        }
    }
}

const fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

// =============================================================================
// PROFILE
// =============================================================================

fn default_auth_levels() -> Vec<String> {
    vec!["status".to_string(), "configuration".to_string()]
}

const fn default_syslog_targets() -> u8 {
    2
}

const fn default_session_timeout() -> u32 {
    30
}

fn default_interfaces() -> Vec<String> {
    vec!["eth0".to_string()]
}

/// Everything the adaptation layer knows about one device model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityProfile {
    /// Registry key
    pub model: String,
    /// Hardware generation
    pub series: Series,
    /// Sections the device UI exposes
    #[serde(alias = "sections")]
    pub available_sections: BTreeSet<SectionId>,
    /// Logical field name to ordered selector candidates
    #[serde(default, with = "serde_yaml_ng::with::singleton_map_recursive")]
    pub field_aliases: BTreeMap<String, Vec<Selector>>,
    /// Default save control rendering
    #[serde(with = "serde_yaml_ng::with::singleton_map_recursive")]
    pub save_button: SaveButtonStrategy,
    /// Sections whose save control differs from the default
    #[serde(default, with = "serde_yaml_ng::with::singleton_map_recursive")]
    pub section_save_overrides: BTreeMap<SectionId, SaveButtonStrategy>,
    /// Scaling applied to every wait
    #[serde(default)]
    pub timeout_multiplier: TimeoutMultiplier,
    /// Authentication levels, outermost first
    #[serde(default = "default_auth_levels")]
    pub auth_levels: Vec<String>,
    /// Remote syslog targets the form offers
    #[serde(default = "default_syslog_targets")]
    pub syslog_target_count: u8,
    /// Whether the access page offers HTTPS enforcement
    #[serde(default)]
    pub https_enforcement_supported: bool,
    /// Ethernet interfaces with configurable addressing
    #[serde(default = "default_interfaces")]
    pub network_interfaces: Vec<String>,
    /// Interfaces with PTP hardware
    #[serde(default)]
    pub ptp_interfaces: Vec<String>,
    /// Timing signal outputs
    #[serde(default)]
    pub max_outputs: u8,
    /// Web session idle timeout in minutes
    #[serde(default = "default_session_timeout")]
    pub session_timeout_minutes: u32,
    /// Observed firmware quirks
    #[serde(default)]
    pub known_issues: Vec<String>,
}

impl CapabilityProfile {
    /// The sentinel profile for unrecognized hardware
    #[must_use]
    pub fn unknown(raw: impl Into<String>) -> Self {
        Self {
            model: raw.into(),
            series: Series::Unknown,
            available_sections: BTreeSet::new(),
            field_aliases: BTreeMap::new(),
            save_button: SaveButtonStrategy::Disabled,
            section_save_overrides: BTreeMap::new(),
            timeout_multiplier: TimeoutMultiplier::ONE,
            auth_levels: Vec::new(),
            syslog_target_count: 0,
            https_enforcement_supported: false,
            network_interfaces: Vec::new(),
            ptp_interfaces: Vec::new(),
            max_outputs: 0,
            session_timeout_minutes: 0,
            known_issues: Vec::new(),
        }
    }

    /// Whether this is the sentinel profile
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        self.series == Series::Unknown && self.available_sections.is_empty()
    }

    /// Whether the section exists on this device
    #[must_use]
    pub fn is_section_available(&self, section: SectionId) -> bool {
        self.available_sections.contains(&section)
    }

    /// Scale a base wait for this device
    #[must_use]
    pub fn timeout_for(&self, base_ms: u64) -> u64 {
        self.timeout_multiplier.scale(base_ms)
    }

    /// Save control strategy for a section
    #[must_use]
    pub fn save_strategy(&self, section: SectionId) -> &SaveButtonStrategy {
        self.section_save_overrides
            .get(&section)
            .unwrap_or(&self.save_button)
    }

    /// Whether the authentication level is offered
    #[must_use]
    pub fn supports_auth_level(&self, level: &str) -> bool {
        self.auth_levels.iter().any(|l| l.eq_ignore_ascii_case(level))
    }

    /// Whether PTP hardware is present
    #[must_use]
    pub fn has_ptp(&self) -> bool {
        self.is_section_available(SectionId::Ptp) && !self.ptp_interfaces.is_empty()
    }

    fn validate(&self) -> ProbeResult<()> {
        if self.model.trim().is_empty() {
            return Err(ProbeError::config("capability profile without a model key"));
        }
        if self.series == Series::Unknown {
            return Err(ProbeError::config(format!(
                "profile '{}' must name series2 or series3",
                self.model
            )));
        }
        if self.is_section_available(SectionId::Ptp) && self.ptp_interfaces.is_empty() {
            return Err(ProbeError::config(format!(
                "profile '{}' offers ptp without ptp_interfaces",
                self.model
            )));
        }
        if let Some(iface) = self
            .ptp_interfaces
            .iter()
            .find(|i| !self.network_interfaces.contains(i))
        {
            return Err(ProbeError::config(format!(
                "profile '{}': ptp interface {iface} is not a network interface",
                self.model
            )));
        }
        Ok(())
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// YAML shape for capability tables
#[derive(Debug, Default, Deserialize)]
struct CapabilityTable {
    #[serde(default)]
    profiles: Vec<CapabilityProfile>,
    #[serde(default)]
    aliases: Vec<AliasEntry>,
}

#[derive(Debug, Deserialize)]
struct AliasEntry {
    pattern: String,
    model: String,
}

/// Read-only table from model key to capability profile
#[derive(Debug, Clone)]
pub struct CapabilityRegistry {
    profiles: BTreeMap<String, Arc<CapabilityProfile>>,
    aliases: Vec<ModelAlias>,
}

impl CapabilityRegistry {
    /// A registry with no profiles
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            profiles: BTreeMap::new(),
            aliases: Vec::new(),
        }
    }

    /// The built-in Kronos table, shared process-wide
    #[must_use]
    pub fn builtin() -> &'static Self {
        static BUILTIN: OnceLock<CapabilityRegistry> = OnceLock::new();
        BUILTIN.get_or_init(Self::kronos)
    }

    /// Build a fresh copy of the Kronos table
    #[must_use]
    pub fn kronos() -> Self {
        let mut registry = Self::empty();
        for profile in kronos_profiles() {
            registry = registry.with_profile(profile);
        }
        for key in registry.profiles.keys().cloned().collect::<Vec<_>>() {
            let pattern = format!("^{}(?:[-_ ]REV[A-Z0-9]+)?$", regex::escape(&key));
            if let Ok(alias) = ModelAlias::new(&pattern, key) {
                registry.aliases.push(alias);
            }
        }
        registry
    }

    /// Parse a standalone capability table
    pub fn from_yaml_str(yaml: &str) -> ProbeResult<Self> {
        Self::empty().with_overlay_yaml(yaml)
    }

    /// Add or replace profiles and aliases from YAML
    pub fn with_overlay_yaml(mut self, yaml: &str) -> ProbeResult<Self> {
        let table: CapabilityTable = serde_yaml_ng::from_str(yaml)?;
        let mut seen = BTreeSet::new();
        for profile in table.profiles {
            profile.validate()?;
            if !seen.insert(profile.model.to_uppercase()) {
                return Err(ProbeError::config(format!(
                    "duplicate profile '{}' in capability table",
                    profile.model
                )));
            }
            tracing::debug!(model = %profile.model, series = %profile.series, "capability profile loaded");
            self = self.with_profile(profile);
        }
        for entry in table.aliases {
            if !self.profiles.contains_key(&entry.model.to_uppercase()) {
                return Err(ProbeError::config(format!(
                    "alias '{}' targets unregistered model '{}'",
                    entry.pattern, entry.model
                )));
            }
            self.aliases.push(ModelAlias::new(&entry.pattern, entry.model)?);
        }
        Ok(self)
    }

    /// Load an overlay file on top of this registry
    pub fn with_overlay_file(self, path: impl AsRef<Path>) -> ProbeResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        self.with_overlay_yaml(&text)
    }

    /// Add or replace one profile
    #[must_use]
    pub fn with_profile(mut self, mut profile: CapabilityProfile) -> Self {
        profile.model = profile.model.trim().to_uppercase();
        self.profiles.insert(profile.model.clone(), Arc::new(profile));
        self
    }

    /// Register an alias pattern
    #[must_use]
    pub fn with_alias(mut self, alias: ModelAlias) -> Self {
        self.aliases.push(alias);
        self
    }

    /// Registered model keys, sorted
    pub fn models(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    /// Registered alias patterns, in registration order
    #[must_use]
    pub fn aliases(&self) -> &[ModelAlias] {
        &self.aliases
    }

    /// Classifier over this registry's keys and aliases
    #[must_use]
    pub fn classifier(&self) -> DeviceClassifier {
        DeviceClassifier::new(self)
    }

    /// Classify a raw identifier
    #[must_use]
    pub fn classify(&self, raw: &str) -> DeviceModel {
        self.classifier().classify(raw)
    }

    /// Profile for a model. Total: unmapped models get the sentinel profile.
    #[must_use]
    pub fn lookup(&self, model: &DeviceModel) -> Arc<CapabilityProfile> {
        match model {
            DeviceModel::Known(key) => self
                .profiles
                .get(&key.to_uppercase())
                .cloned()
                .unwrap_or_else(|| Arc::new(CapabilityProfile::unknown(key.clone()))),
            DeviceModel::Unknown { raw } => Arc::new(CapabilityProfile::unknown(raw.clone())),
        }
    }

    /// Whether `section` exists on `model`
    #[must_use]
    pub fn is_section_available(&self, model: &DeviceModel, section: SectionId) -> bool {
        self.lookup(model).is_section_available(section)
    }

    /// Scale `base_ms` by the model's multiplier, rounding up
    #[must_use]
    pub fn timeout_for(&self, model: &DeviceModel, base_ms: u64) -> u64 {
        self.lookup(model).timeout_for(base_ms)
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::kronos()
    }
}

// =============================================================================
// BUILT-IN KRONOS TABLE
// =============================================================================

const SERIES2_SECTIONS: [SectionId; 9] = [
    SectionId::General,
    SectionId::Network,
    SectionId::Time,
    SectionId::Gnss,
    SectionId::Outputs,
    SectionId::Display,
    SectionId::Access,
    SectionId::Snmp,
    SectionId::Syslog,
];

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

fn common_aliases(series: Series) -> BTreeMap<String, Vec<Selector>> {
    let mut aliases = BTreeMap::new();
    aliases.insert(
        "serverAddress".to_string(),
        vec![Selector::name_equals("target_a"), Selector::name_contains("server")],
    );
    aliases.insert(
        "statusPassword".to_string(),
        vec![Selector::name_equals("stspwd"), Selector::name_equals("sts_password")],
    );
    aliases.insert(
        "configPassword".to_string(),
        vec![Selector::name_equals("cfgpwd"), Selector::name_equals("cfg_password")],
    );
    aliases.insert(
        "timezone".to_string(),
        vec![Selector::name_equals("timezones"), Selector::name_equals("timezone")],
    );
    aliases.insert(
        "sessionTimeout".to_string(),
        vec![Selector::name_equals("session_timeout"), Selector::name_contains("timeout")],
    );
    match series {
        Series::Series2 => {
            aliases.insert(
                "ipAddress".to_string(),
                vec![Selector::name_equals("ipaddr"), Selector::name_equals("ip_eth0")],
            );
            aliases.insert("netmask".to_string(), vec![Selector::name_equals("ipmask")]);
        }
        Series::Series3 | Series::Unknown => {
            aliases.insert(
                "ipAddress".to_string(),
                vec![Selector::name_equals("ip_eth0"), Selector::name_equals("ipaddr")],
            );
            aliases.insert(
                "netmask".to_string(),
                vec![Selector::name_equals("mask_eth0"), Selector::name_equals("ipmask")],
            );
        }
    }
    aliases
}

fn series2(model: &str, known_issues: &[&str]) -> CapabilityProfile {
    CapabilityProfile {
        model: model.to_string(),
        series: Series::Series2,
        available_sections: SERIES2_SECTIONS.into_iter().collect(),
        field_aliases: common_aliases(Series::Series2),
        save_button: SaveButtonStrategy::StaticSelector(strings(&[
            "button#button_save",
            "input#button_save",
        ])),
        section_save_overrides: BTreeMap::new(),
        timeout_multiplier: TimeoutMultiplier::ONE,
        auth_levels: default_auth_levels(),
        syslog_target_count: 2,
        https_enforcement_supported: false,
        network_interfaces: default_interfaces(),
        ptp_interfaces: Vec::new(),
        max_outputs: 4,
        session_timeout_minutes: 30,
        known_issues: strings(known_issues),
    }
}

fn series3(model: &str, interfaces: &[&str], ptp: &[&str], extra_issues: &[&str]) -> CapabilityProfile {
    let per_port = SaveButtonStrategy::PerInterface("button#button_save_port_{iface}".to_string());
    let mut known_issues = strings(&[
        "PTP panels collapsed by default",
        "Multi-interface locator ambiguity",
    ]);
    known_issues.extend(strings(extra_issues));

    CapabilityProfile {
        model: model.to_string(),
        series: Series::Series3,
        available_sections: SERIES2_SECTIONS
            .into_iter()
            .chain([SectionId::Upload, SectionId::Ptp])
            .collect(),
        field_aliases: common_aliases(Series::Series3),
        save_button: SaveButtonStrategy::RoleBased("Save".to_string()),
        section_save_overrides: [(SectionId::Network, per_port.clone()), (SectionId::Ptp, per_port)]
            .into_iter()
            .collect(),
        timeout_multiplier: TimeoutMultiplier { num: 3, den: 2 },
        auth_levels: default_auth_levels(),
        syslog_target_count: 2,
        https_enforcement_supported: true,
        network_interfaces: strings(interfaces),
        ptp_interfaces: strings(ptp),
        max_outputs: 6,
        session_timeout_minutes: 30,
        known_issues,
    }
}

fn kronos_profiles() -> Vec<CapabilityProfile> {
    vec![
        series2("KRONOS-2R-HVXX-A2F", &[]),
        series2(
            "KRONOS-2P-HV-2",
            &["HTTP to HTTPS redirect causes browser compatibility test failures"],
        ),
        series3(
            "KRONOS-3R-HVLV-TCXO-A2F",
            &["eth0", "eth1", "eth2", "eth3"],
            &["eth1", "eth2", "eth3"],
            &[],
        ),
        series3(
            "KRONOS-3R-HVXX-TCXO-44A",
            &["eth0", "eth1", "eth3"],
            &["eth1", "eth3"],
            &["Configuration unlock may exceed the base timeout"],
        ),
        series3(
            "KRONOS-3R-HVXX-TCXO-A2X",
            &["eth0", "eth1", "eth2", "eth3", "eth4"],
            &["eth1", "eth3"],
            &["Section navigation may exceed the base timeout"],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    const K3_900: &str = r"
profiles:
  - model: K3-900
    series: series3
    sections: [general, network, access, syslog, upload, ptp]
    timeout_multiplier: 1.5
    save_button:
      role_based: Save
    network_interfaces: [eth0, eth1]
    ptp_interfaces: [eth1]
    https_enforcement_supported: true
aliases:
  - pattern: '^K3-9\d\d$'
    model: K3-900
";

    fn known(key: &str) -> DeviceModel {
        DeviceModel::Known(key.to_string())
    }

    mod section_tests {
        use super::*;

        #[test]
        fn test_section_paths() {
            assert_eq!(SectionId::Syslog.path(), "/syslog");
            assert_eq!(SectionId::Ptp.path(), "/ptp");
        }

        #[test]
        fn test_section_from_str() {
            assert_eq!("Access".parse::<SectionId>().unwrap(), SectionId::Access);
            assert!("bogus".parse::<SectionId>().is_err());
        }
    }

    mod multiplier_tests {
        use super::*;

        #[test]
        fn test_parse_forms() {
            assert_eq!("3/2".parse::<TimeoutMultiplier>().unwrap(), TimeoutMultiplier::new(3, 2).unwrap());
            assert_eq!("1.5".parse::<TimeoutMultiplier>().unwrap(), TimeoutMultiplier::new(3, 2).unwrap());
            assert_eq!("2".parse::<TimeoutMultiplier>().unwrap(), TimeoutMultiplier::new(2, 1).unwrap());
            assert!("0".parse::<TimeoutMultiplier>().is_err());
            assert!("-1".parse::<TimeoutMultiplier>().is_err());
            assert!("abc".parse::<TimeoutMultiplier>().is_err());
        }

        #[test]
        fn test_scale_rounds_up() {
            let m = TimeoutMultiplier::new(3, 2).unwrap();
            assert_eq!(m.scale(1000), 1500);
            assert_eq!(m.scale(1001), 1502);
            assert_eq!(m.scale(0), 0);
        }

        #[test]
        fn test_scale_never_below_base() {
            let half = TimeoutMultiplier::new(1, 2).unwrap();
            assert_eq!(half.scale(1000), 1000);
        }

        #[test]
        fn test_scale_saturates() {
            let big = TimeoutMultiplier::new(u32::MAX, 1).unwrap();
            assert_eq!(big.scale(u64::MAX), u64::MAX);
        }

        #[test]
        fn test_display_reduced() {
            assert_eq!(TimeoutMultiplier::new(6, 4).unwrap().to_string(), "3/2");
            assert_eq!(TimeoutMultiplier::ONE.to_string(), "1");
        }
    }

    mod registry_tests {
        use super::*;

        #[test]
        fn test_builtin_models() {
            let models: Vec<_> = CapabilityRegistry::builtin().models().collect();
            assert_eq!(models.len(), 5);
            assert!(models.contains(&"KRONOS-2P-HV-2"));
        }

        #[test]
        fn test_series2_profile() {
            let p = CapabilityRegistry::builtin().lookup(&known("KRONOS-2R-HVXX-A2F"));
            assert_eq!(p.series, Series::Series2);
            assert!(!p.is_section_available(SectionId::Ptp));
            assert!(!p.is_section_available(SectionId::Upload));
            assert!(p.is_section_available(SectionId::Syslog));
            assert_eq!(p.timeout_for(10_000), 10_000);
            assert_eq!(p.max_outputs, 4);
            assert!(!p.https_enforcement_supported);
            assert_eq!(
                p.save_strategy(SectionId::Network),
                &SaveButtonStrategy::StaticSelector(strings(&["button#button_save", "input#button_save"]))
            );
        }

        #[test]
        fn test_series3_profile() {
            let p = CapabilityRegistry::builtin().lookup(&known("KRONOS-3R-HVXX-TCXO-44A"));
            assert_eq!(p.series, Series::Series3);
            assert!(p.has_ptp());
            assert_eq!(p.network_interfaces, strings(&["eth0", "eth1", "eth3"]));
            assert_eq!(p.timeout_for(10_000), 15_000);
            assert!(p.save_strategy(SectionId::Ptp).is_per_interface());
            assert_eq!(p.save_strategy(SectionId::Syslog), &SaveButtonStrategy::RoleBased("Save".into()));
            assert!(p.known_issues.iter().any(|i| i.contains("PTP panels")));
        }

        #[test]
        fn test_unknown_lookup_is_sentinel() {
            let registry = CapabilityRegistry::builtin();
            let model = registry.classify("ZZZ-000");
            let p = registry.lookup(&model);
            assert!(p.is_unknown());
            assert_eq!(p.save_button, SaveButtonStrategy::Disabled);
            for section in SectionId::ALL {
                assert!(!registry.is_section_available(&model, section));
            }
        }

        #[test]
        fn test_known_key_missing_from_registry_is_sentinel() {
            let p = CapabilityRegistry::empty().lookup(&known("KRONOS-2R-HVXX-A2F"));
            assert!(p.is_unknown());
        }

        #[test]
        fn test_overlay_adds_profile() {
            let registry = CapabilityRegistry::kronos().with_overlay_yaml(K3_900).unwrap();
            let model = registry.classify("K3-900");
            assert_eq!(model, known("K3-900"));
            assert!(registry.is_section_available(&model, SectionId::Ptp));
            assert!(!registry.is_section_available(&model, SectionId::Snmp));
            assert_eq!(registry.timeout_for(&model, 1000), 1500);

            let p = registry.lookup(&model);
            assert_eq!(p.auth_levels, default_auth_levels());
            assert_eq!(p.syslog_target_count, 2);
            assert_eq!(registry.classify("k3-912"), known("K3-900"));
            assert_eq!(registry.models().count(), 6);
        }

        #[test]
        fn test_overlay_replaces_profile() {
            let yaml = r"
profiles:
  - model: KRONOS-2P-HV-2
    series: series2
    sections: [general]
    timeout_multiplier: 2
    save_button:
      static_selector: ['button#button_save']
";
            let registry = CapabilityRegistry::kronos().with_overlay_yaml(yaml).unwrap();
            let p = registry.lookup(&known("KRONOS-2P-HV-2"));
            assert_eq!(p.available_sections.len(), 1);
            assert_eq!(p.timeout_for(100), 200);
        }

        #[test]
        fn test_overlay_nested_strategies_and_aliases() {
            let yaml = r"
profiles:
  - model: K3-950
    series: series3
    sections: [general, network]
    save_button: disabled
    section_save_overrides:
      network:
        per_interface: 'button#save_{iface}'
    field_aliases:
      ipAddress:
        - name_equals: ip_lan
        - role:
            role: textbox
            name: IP Address
    network_interfaces: [eth0]
";
            let registry = CapabilityRegistry::empty().with_overlay_yaml(yaml).unwrap();
            let p = registry.lookup(&known("K3-950"));
            assert_eq!(p.save_button, SaveButtonStrategy::Disabled);
            assert_eq!(
                p.save_strategy(SectionId::Network),
                &SaveButtonStrategy::PerInterface("button#save_{iface}".into())
            );
            assert_eq!(
                p.field_aliases["ipAddress"],
                vec![Selector::name_equals("ip_lan"), Selector::role("textbox", "IP Address")]
            );
        }

        #[test]
        fn test_overlay_rejects_invalid() {
            let unknown_series = "profiles:\n  - model: X\n    series: unknown\n    sections: []\n    save_button: disabled\n";
            assert!(CapabilityRegistry::from_yaml_str(unknown_series).is_err());

            let bad_multiplier = "profiles:\n  - model: X\n    series: series2\n    sections: []\n    save_button: disabled\n    timeout_multiplier: 0\n";
            assert!(CapabilityRegistry::from_yaml_str(bad_multiplier).is_err());

            let dangling_alias = "aliases:\n  - pattern: '^Y$'\n    model: Y\n";
            assert!(CapabilityRegistry::from_yaml_str(dangling_alias).is_err());

            let ptp_without_ports = "profiles:\n  - model: X\n    series: series3\n    sections: [ptp]\n    save_button: disabled\n";
            assert!(CapabilityRegistry::from_yaml_str(ptp_without_ports).is_err());
        }

        #[test]
        fn test_overlay_file() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("caps.yaml");
            std::fs::write(&path, K3_900).unwrap();
            let registry = CapabilityRegistry::empty().with_overlay_file(&path).unwrap();
            assert_eq!(registry.models().collect::<Vec<_>>(), vec!["K3-900"]);
        }

        #[test]
        fn test_save_candidates() {
            let per_port = SaveButtonStrategy::PerInterface("button#button_save_port_{iface}".into());
            assert_eq!(
                per_port.candidates(Some("eth1")),
                vec![Selector::css("button#button_save_port_eth1")]
            );
            assert!(per_port.candidates(None).is_empty());
            assert!(SaveButtonStrategy::Disabled.candidates(None).is_empty());
            assert_eq!(SaveButtonStrategy::RoleBased("Save".into()).candidates(None).len(), 2);
        }
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Lookup is deterministic for every registered model
            #[test]
            fn prop_lookup_deterministic(idx in 0usize..5) {
                let registry = CapabilityRegistry::builtin();
                let key = registry.models().nth(idx).unwrap().to_string();
                let model = DeviceModel::Known(key);
                prop_assert_eq!(registry.lookup(&model), registry.lookup(&model));
            }

            /// Scaled timeouts are never below the base
            #[test]
            fn prop_timeout_at_least_base(base in 0u64..10_000_000, num in 1u32..50, den in 1u32..50) {
                let m = TimeoutMultiplier::new(num, den).unwrap();
                prop_assert!(m.scale(base) >= base);
            }

            /// Scaling is monotonic in the multiplier
            #[test]
            fn prop_timeout_monotonic(base in 0u64..10_000_000, a in 1u32..100, b in 1u32..100, den in 1u32..20) {
                let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
                let lo = TimeoutMultiplier::new(lo, den).unwrap();
                let hi = TimeoutMultiplier::new(hi, den).unwrap();
                prop_assert!(lo.scale(base) <= hi.scale(base));
            }
        }
    }
}
