//! Section schemas.
//!
//! A schema describes one configuration page for one device: where it
//! lives, which fields it has and what their documented form defaults
//! are, and which controls and indicators drive the save/cancel cycle.
//! Schemas are derived from the capability profile, so interface counts,
//! syslog targets and HTTPS enforcement follow the hardware.

use std::collections::BTreeMap;

use crate::capability::{CapabilityProfile, SectionId};
use crate::device::Series;
use crate::field::{FieldDescriptor, FieldKind, TextFormat};
use crate::locator::Selector;

/// HTTPS enforcement modes offered by the access page
pub const HTTPS_MODES: [&str; 3] = ["NEVER", "CFG_ONLY", "ALWAYS"];

/// PTP profiles offered per port
pub const PTP_PROFILES: [&str; 9] = [
    "IEEE C37.238-2011 (Power Profile)",
    "IEEE C37.238-2017 (Power Profile)",
    "IEC 61850-9-3:2016 (Utility Profile)",
    "Default Profile (UDPv4)",
    "Default Profile (802.3)",
    "Telecom G.8265.1 (frequency synchronization)",
    "Telecom G.8275.1 (phase/time synchronization with full timing support from the network)",
    "Telecom G.8275.2 (time/phase synchronization with partial timing support from the network)",
    "Custom",
];

/// Default remote syslog port
pub const SYSLOG_DEFAULT_PORT: &str = "514";

/// Default clock priority on every PTP profile
pub const PTP_DEFAULT_PRIORITY: &str = "128";

/// Whether a field can be seen and edited under the current form state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FieldConstraint {
    /// Not rendered at all
    pub hidden: bool,
    /// Rendered but grayed out
    pub read_only: bool,
}

impl FieldConstraint {
    /// Neither hidden nor read-only
    #[must_use]
    pub const fn is_editable(&self) -> bool {
        !self.hidden && !self.read_only
    }
}

/// Constraint a PTP profile puts on a per-port field.
///
/// `field` is the field name without the interface prefix, e.g. `priority1`.
/// The 2011 power profile fixes priority1; everything else is open.
#[must_use]
pub fn ptp_constraint(ptp_profile: &str, field: &str) -> FieldConstraint {
    FieldConstraint {
        hidden: false,
        read_only: ptp_profile == PTP_PROFILES[0] && field == "priority1",
    }
}

/// A collapsible panel that hides some fields until expanded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Panel {
    /// Toggle control
    pub trigger: Selector,
    /// A field inside the panel; visible means expanded
    pub probe_field: String,
}

/// Page description for one section on one device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionSchema {
    /// Section
    pub section: SectionId,
    /// URL path relative to the device base URL
    pub path: String,
    /// Documented fields, in form order
    pub fields: Vec<FieldDescriptor>,
    /// Logical alias to documented field name
    pub aliases: BTreeMap<String, String>,
    /// Elements whose visibility proves the page loaded
    pub ready_indicators: Vec<Selector>,
    /// Panels to expand after load
    pub panels: Vec<Panel>,
    /// Cancel control candidates
    pub cancel_controls: Vec<Selector>,
    /// Visible after a successful save
    pub success_indicators: Vec<Selector>,
    /// Visible after a rejected save
    pub error_indicators: Vec<Selector>,
    /// Visible while a save is in flight
    pub loading_indicators: Vec<Selector>,
}

impl SectionSchema {
    /// Schema for `section` on the profiled device, or `None` when the
    /// device does not offer the section.
    #[must_use]
    pub fn for_profile(profile: &CapabilityProfile, section: SectionId) -> Option<Self> {
        if !profile.is_section_available(section) {
            return None;
        }

        let mut schema = Self::skeleton(section);
        match section {
            SectionId::General => general(&mut schema),
            SectionId::Network => network(&mut schema, profile),
            SectionId::Time => time(&mut schema),
            SectionId::Gnss => gnss(&mut schema),
            SectionId::Outputs => outputs(&mut schema, profile),
            SectionId::Display => display(&mut schema),
            SectionId::Access => access(&mut schema, profile),
            SectionId::Snmp => snmp(&mut schema),
            SectionId::Syslog => syslog(&mut schema, profile),
            SectionId::Upload => upload(&mut schema),
            SectionId::Ptp => ptp(&mut schema, profile),
        }
        Some(schema)
    }

    fn skeleton(section: SectionId) -> Self {
        Self {
            section,
            path: section.path(),
            fields: Vec::new(),
            aliases: BTreeMap::new(),
            ready_indicators: vec![Selector::css("form")],
            panels: Vec::new(),
            cancel_controls: vec![
                Selector::css("button#button_cancel"),
                Selector::css("input[value='Cancel']"),
            ],
            success_indicators: vec![
                Selector::css(".alert-success"),
                Selector::css(".success-message"),
                Selector::text("Success"),
            ],
            error_indicators: vec![
                Selector::css(".alert-danger"),
                Selector::css(".error-message"),
                Selector::css_with_text(".alert", "Error"),
                Selector::css_with_text(".alert", "Failed"),
            ],
            loading_indicators: vec![
                Selector::css("[class*='saving']"),
                Selector::css("[class*='spinner']"),
                Selector::text("Saving"),
                Selector::text("Please wait"),
            ],
        }
    }

    fn push(&mut self, field: FieldDescriptor) {
        self.fields.push(field);
    }

    fn alias(&mut self, logical: &str, field: &str) {
        self.aliases.insert(logical.to_string(), field.to_string());
    }

    /// Documented field name for a logical name
    #[must_use]
    pub fn canonical_name<'a>(&'a self, name: &'a str) -> &'a str {
        self.aliases.get(name).map_or(name, String::as_str)
    }

    /// Documented descriptor, following aliases
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        let canonical = self.canonical_name(name);
        self.fields.iter().find(|f| f.name == canonical)
    }

    /// Descriptor for validation; undocumented names are accepted as text
    #[must_use]
    pub fn descriptor_for(&self, name: &str) -> FieldDescriptor {
        self.field(name)
            .cloned()
            .unwrap_or_else(|| FieldDescriptor::generic(name))
    }

    /// Value the form shows after cancel, when documented
    #[must_use]
    pub fn form_default(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(|f| f.default.as_deref())
    }

    /// Documented field names, in form order
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Constraint the form state puts on `name`.
    ///
    /// Only per-port PTP fields are constrained, by the profile their port
    /// currently shows; `shown` returns a field's value as the form has it.
    pub fn field_constraint<'v>(&self, name: &str, shown: impl Fn(&str) -> Option<&'v str>) -> FieldConstraint {
        if self.section != SectionId::Ptp {
            return FieldConstraint::default();
        }
        let canonical = self.canonical_name(name);
        let Some((iface, field)) = canonical.split_once('_') else {
            return FieldConstraint::default();
        };
        if field == "profile" {
            return FieldConstraint::default();
        }
        let profile_field = format!("{iface}_profile");
        shown(profile_field.as_str()).map_or_else(FieldConstraint::default, |p| ptp_constraint(p, field))
    }

    /// Interface a field belongs to, for per-port save controls
    #[must_use]
    pub fn interface_of(&self, name: &str, interfaces: &[String]) -> Option<String> {
        let canonical = self.canonical_name(name);
        interfaces
            .iter()
            .find(|iface| canonical.split('_').any(|part| part == iface.as_str()))
            .cloned()
    }
}

fn general(s: &mut SectionSchema) {
    for name in ["identifier", "location", "contact", "description"] {
        s.push(FieldDescriptor::new(name, FieldKind::text()));
    }
}

fn network(s: &mut SectionSchema, profile: &CapabilityProfile) {
    if profile.series == Series::Series2 {
        s.push(FieldDescriptor::new("ipaddr", FieldKind::ipv4()));
        s.push(FieldDescriptor::new("ipmask", FieldKind::ipv4()));
        s.push(FieldDescriptor::new("gateway", FieldKind::ipv4()));
        s.push(FieldDescriptor::new("dhcp", FieldKind::Boolean));
        s.alias("ipAddress", "ipaddr");
        s.alias("netmask", "ipmask");
    } else {
        for iface in &profile.network_interfaces {
            s.push(FieldDescriptor::new(format!("ip_{iface}"), FieldKind::ipv4()));
            s.push(FieldDescriptor::new(format!("mask_{iface}"), FieldKind::ipv4()));
            s.push(FieldDescriptor::new(format!("gateway_{iface}"), FieldKind::Text(TextFormat::Ipv4OrEmpty)));
            s.push(FieldDescriptor::new(format!("dhcp_{iface}"), FieldKind::Boolean));
        }
        if let Some(first) = profile.network_interfaces.first() {
            s.alias("ipAddress", &format!("ip_{first}"));
            s.alias("netmask", &format!("mask_{first}"));
        }
    }
}

fn time(s: &mut SectionSchema) {
    s.push(FieldDescriptor::new("timezones", FieldKind::text()));
    s.push(FieldDescriptor::new("dst_enable", FieldKind::Boolean));
    s.push(FieldDescriptor::new("dst_rule", FieldKind::text()));
    s.alias("timezone", "timezones");
}

fn gnss(s: &mut SectionSchema) {
    s.push(FieldDescriptor::new("antenna_type", FieldKind::text()));
    s.push(FieldDescriptor::new("constellation", FieldKind::text()));
}

fn outputs(s: &mut SectionSchema, profile: &CapabilityProfile) {
    for n in 1..=profile.max_outputs {
        s.push(FieldDescriptor::new(format!("signal{n}"), FieldKind::text()));
    }
}

fn display(s: &mut SectionSchema) {
    s.push(FieldDescriptor::new("mode1", FieldKind::text()));
}

fn access(s: &mut SectionSchema, profile: &CapabilityProfile) {
    for name in ["stspwd", "cfgpwd"] {
        s.push(FieldDescriptor::new(name, FieldKind::text()).with_default(""));
    }
    if profile.is_section_available(SectionId::Upload) {
        s.push(FieldDescriptor::new("uplpwd", FieldKind::text()).with_default(""));
    }
    s.push(FieldDescriptor::new("session_timeout", FieldKind::range(1, 1440)));
    if profile.https_enforcement_supported {
        s.push(
            FieldDescriptor::new("enforce_https", FieldKind::one_of(&HTTPS_MODES)).with_default("NEVER"),
        );
    }
    s.alias("statusPassword", "stspwd");
    s.alias("configPassword", "cfgpwd");
    s.alias("sessionTimeout", "session_timeout");
}

fn syslog(s: &mut SectionSchema, profile: &CapabilityProfile) {
    for suffix in target_suffixes(profile.syslog_target_count) {
        s.push(FieldDescriptor::new(format!("target_{suffix}"), FieldKind::Text(TextFormat::Ipv4OrEmpty)).with_default(""));
        s.push(FieldDescriptor::new(format!("port_{suffix}"), FieldKind::range(1, 65535)).with_default(SYSLOG_DEFAULT_PORT));
        s.push(FieldDescriptor::new(format!("protocol_{suffix}"), FieldKind::one_of(&["UDP", "TCP"])).with_default("UDP"));
    }
    if profile.syslog_target_count > 0 {
        s.alias("serverAddress", "target_a");
        s.alias("serverPort", "port_a");
    }
}

fn snmp(s: &mut SectionSchema) {
    for name in ["ro_community1", "ro_community2", "trap_community"] {
        s.push(FieldDescriptor::new(name, FieldKind::text()));
    }
}

fn upload(s: &mut SectionSchema) {
    s.push(FieldDescriptor::new("firmware_file", FieldKind::text()).required().with_default(""));
    s.success_indicators.push(Selector::text("Upload completed"));
}

fn ptp(s: &mut SectionSchema, profile: &CapabilityProfile) {
    for iface in &profile.ptp_interfaces {
        s.push(FieldDescriptor::new(format!("ptp_enable_{iface}"), FieldKind::Boolean));
        s.push(FieldDescriptor::new(format!("{iface}_profile"), FieldKind::one_of(&PTP_PROFILES)));
        s.push(FieldDescriptor::new(format!("{iface}_domain"), FieldKind::range(0, 255)));
        s.push(FieldDescriptor::new(format!("{iface}_priority1"), FieldKind::range(0, 255)).with_default(PTP_DEFAULT_PRIORITY));
        s.push(FieldDescriptor::new(format!("{iface}_priority2"), FieldKind::range(0, 255)).with_default(PTP_DEFAULT_PRIORITY));
        s.panels.push(Panel {
            trigger: Selector::css(format!("a[href='#{iface}_collapse']")),
            probe_field: format!("{iface}_profile"),
        });
    }
}

/// `a`, `b`, ... for the configured number of syslog targets
fn target_suffixes(count: u8) -> impl Iterator<Item = char> {
    (b'a'..=b'z').take(usize::from(count)).map(char::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::CapabilityRegistry;
    use crate::device::DeviceModel;

    fn schema(model: &str, section: SectionId) -> Option<SectionSchema> {
        let profile = CapabilityRegistry::builtin().lookup(&DeviceModel::Known(model.to_string()));
        SectionSchema::for_profile(&profile, section)
    }

    const S2: &str = "KRONOS-2R-HVXX-A2F";
    const S3: &str = "KRONOS-3R-HVXX-TCXO-44A";

    #[test]
    fn test_unavailable_section_has_no_schema() {
        assert!(schema(S2, SectionId::Ptp).is_none());
        assert!(schema(S2, SectionId::Upload).is_none());
        let unknown = CapabilityProfile::unknown("ZZZ-000");
        assert!(SectionId::ALL
            .iter()
            .all(|s| SectionSchema::for_profile(&unknown, *s).is_none()));
    }

    #[test]
    fn test_syslog_defaults() {
        let s = schema(S2, SectionId::Syslog).unwrap();
        assert_eq!(s.path, "/syslog");
        assert_eq!(s.form_default("target_a"), Some(""));
        assert_eq!(s.form_default("serverAddress"), Some(""));
        assert_eq!(s.form_default("port_b"), Some("514"));
        assert_eq!(s.form_default("protocol_a"), Some("UDP"));
        assert_eq!(s.field_names().count(), 6);
    }

    #[test]
    fn test_series2_network() {
        let s = schema(S2, SectionId::Network).unwrap();
        assert_eq!(s.canonical_name("ipAddress"), "ipaddr");
        assert!(s.field("dhcp").is_some());
        assert!(s.field("ip_eth1").is_none());
    }

    #[test]
    fn test_series3_network_per_interface() {
        let s = schema(S3, SectionId::Network).unwrap();
        assert!(s.field("ip_eth3").is_some());
        assert!(s.field("ip_eth2").is_none());
        assert_eq!(s.canonical_name("ipAddress"), "ip_eth0");
    }

    #[test]
    fn test_access_https_only_where_supported() {
        assert!(schema(S2, SectionId::Access).unwrap().field("enforce_https").is_none());
        let s3 = schema(S3, SectionId::Access).unwrap();
        assert_eq!(s3.form_default("enforce_https"), Some("NEVER"));
        assert!(s3.field("uplpwd").is_some());
    }

    #[test]
    fn test_ptp_panels() {
        let s = schema(S3, SectionId::Ptp).unwrap();
        assert_eq!(s.panels.len(), 2);
        assert_eq!(s.panels[0].trigger, Selector::css("a[href='#eth1_collapse']"));
        assert!(s.field("eth3_domain").is_some());
    }

    #[test]
    fn test_ptp_priority1_fixed_by_2011_power_profile() {
        let s = schema(S3, SectionId::Ptp).unwrap();
        assert_eq!(s.form_default("eth1_priority1"), Some("128"));

        let mut shown = BTreeMap::new();
        shown.insert("eth1_profile".to_string(), PTP_PROFILES[0].to_string());
        shown.insert("eth3_profile".to_string(), "Default Profile (UDPv4)".to_string());
        let lookup = |f: &str| shown.get(f).map(String::as_str);

        assert!(s.field_constraint("eth1_priority1", lookup).read_only);
        assert!(s.field_constraint("eth1_priority2", lookup).is_editable());
        assert!(s.field_constraint("eth3_priority1", lookup).is_editable());
        assert!(s.field_constraint("eth1_profile", lookup).is_editable());
        assert!(s.field_constraint("ptp_enable_eth1", lookup).is_editable());
    }

    #[test]
    fn test_constraints_only_apply_to_ptp() {
        let s = schema(S3, SectionId::Network).unwrap();
        assert_eq!(s.field_constraint("ip_eth0", |_| Some(PTP_PROFILES[0])), FieldConstraint::default());
        assert!(!ptp_constraint(PTP_PROFILES[1], "priority1").read_only);
    }

    #[test]
    fn test_outputs_follow_max_outputs() {
        assert_eq!(schema(S2, SectionId::Outputs).unwrap().fields.len(), 4);
        assert_eq!(schema(S3, SectionId::Outputs).unwrap().fields.len(), 6);
    }

    #[test]
    fn test_undocumented_field_is_generic_text() {
        let s = schema(S2, SectionId::General).unwrap();
        let d = s.descriptor_for("asset_tag");
        assert_eq!(d.kind, FieldKind::text());
        assert!(!d.required);
    }

    #[test]
    fn test_interface_of() {
        let s = schema(S3, SectionId::Ptp).unwrap();
        let ifaces: Vec<String> = vec!["eth1".into(), "eth3".into()];
        assert_eq!(s.interface_of("eth3_domain", &ifaces).as_deref(), Some("eth3"));
        assert_eq!(s.interface_of("ptp_enable_eth1", &ifaces).as_deref(), Some("eth1"));
        assert_eq!(s.interface_of("identifier", &ifaces), None);
    }

    #[test]
    fn test_error_text_only_counts_inside_alerts() {
        let s = schema(S2, SectionId::General).unwrap();
        assert!(!s.error_indicators.contains(&Selector::text("Error")));
        assert!(s.error_indicators.contains(&Selector::css_with_text(".alert", "Error")));
    }

    #[test]
    fn test_upload_required() {
        let s = schema(S3, SectionId::Upload).unwrap();
        assert!(s.field("firmware_file").unwrap().required);
        assert!(s.success_indicators.contains(&Selector::text("Upload completed")));
    }
}
