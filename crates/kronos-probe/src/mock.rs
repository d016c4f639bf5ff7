//! In-memory Kronos web UI.
//!
//! [`SimulatedDevice`] implements [`BrowserEngine`] over a model of the
//! device's configuration pages, built from the same capability profile
//! and section schemas the adaptation layer uses. It keeps a saved value
//! and a form value per field, enables save controls when a field is
//! edited, resets to documented form defaults on cancel, and can be told
//! to misbehave the way real firmware has been seen to.
//!
//! Every engine call is recorded in `history` for verification.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;

use crate::capability::{CapabilityProfile, SaveButtonStrategy, SectionId};
use crate::engine::{BrowserEngine, ElementHandle};
use crate::field::{FieldDescriptor, FieldKind, TextFormat};
use crate::locator::Selector;
use crate::result::{ProbeError, ProbeResult};
use crate::schema::SectionSchema;

const AUTHENTICATE_PATH: &str = "/authenticate";
const UNLOCK_PATH: &str = "/login";
const DASHBOARD_PATH: &str = "/";

// =============================================================================
// BEHAVIOR KNOBS
// =============================================================================

/// What the simulated firmware does when a save is submitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaveBehavior {
    /// Store the values and acknowledge
    #[default]
    Persist,
    /// Acknowledge but keep the old stored values
    AcknowledgeWithoutPersisting,
    /// Show an error banner and keep the form dirty
    Reject,
    /// Show the loading indicator forever
    NoResponse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flash {
    Success,
    Error,
}

#[derive(Debug, Clone)]
struct PendingSave {
    remaining_polls: u32,
    scope: Option<String>,
}

// =============================================================================
// PAGE MODEL
// =============================================================================

#[derive(Debug, Clone)]
struct SimField {
    descriptor: FieldDescriptor,
    saved: String,
    value: String,
    dirty: bool,
    iface: Option<String>,
}

impl SimField {
    fn form_default(&self) -> String {
        self.descriptor.default.clone().unwrap_or_else(|| self.saved.clone())
    }
}

#[derive(Debug, Clone)]
struct SimPage {
    schema: SectionSchema,
    fields: Vec<SimField>,
    expanded: BTreeSet<String>,
}

impl SimPage {
    fn field(&self, name: &str) -> Option<&SimField> {
        self.fields.iter().find(|f| f.descriptor.name == name)
    }

    fn field_mut(&mut self, name: &str) -> Option<&mut SimField> {
        self.fields.iter_mut().find(|f| f.descriptor.name == name)
    }

    fn in_scope<'a>(&'a self, scope: Option<&'a str>) -> impl Iterator<Item = &'a SimField> + 'a {
        self.fields
            .iter()
            .filter(move |f| scope.is_none() || f.iface.as_deref() == scope)
    }

    fn field_visible(&self, field: &SimField) -> bool {
        let in_panel = self
            .schema
            .panels
            .iter()
            .any(|p| field.iface.as_deref().is_some_and(|i| p.probe_field.starts_with(i)));
        !in_panel || field.iface.as_ref().is_some_and(|i| self.expanded.contains(i))
    }
}

/// Element snapshot used for selector matching
#[derive(Debug, Clone, Default)]
struct SimElement {
    handle: String,
    tag: &'static str,
    dom_id: Option<String>,
    name: Option<String>,
    input_type: Option<&'static str>,
    classes: Vec<&'static str>,
    text: String,
    placeholder: Option<&'static str>,
    extra_css: Vec<String>,
    visible: bool,
    enabled: bool,
    readonly: bool,
}

impl SimElement {
    fn new(handle: impl Into<String>, tag: &'static str) -> Self {
        Self {
            handle: handle.into(),
            tag,
            visible: true,
            enabled: true,
            ..Self::default()
        }
    }

    fn css_forms(&self) -> Vec<String> {
        let tag = self.tag;
        let mut forms = vec![tag.to_string()];
        if let Some(id) = &self.dom_id {
            forms.extend([format!("#{id}"), format!("{tag}#{id}"), format!("[id='{id}']"), format!("{tag}[id='{id}']")]);
        }
        if let Some(name) = &self.name {
            forms.extend([format!("[name='{name}']"), format!("{tag}[name='{name}']")]);
        }
        if let Some(t) = self.input_type {
            forms.extend([format!("[type='{t}']"), format!("{tag}[type='{t}']")]);
        }
        for class in &self.classes {
            forms.extend([format!(".{class}"), format!("{tag}.{class}"), format!("[class*='{class}']")]);
        }
        forms.extend(self.extra_css.iter().cloned());
        forms
    }

    fn implicit_role(&self) -> Option<&'static str> {
        match (self.tag, self.input_type) {
            ("button", _) | ("input", Some("submit" | "button")) => Some("button"),
            ("a", _) => Some("link"),
            ("select", _) => Some("combobox"),
            ("input", Some("checkbox")) => Some("checkbox"),
            ("input", _) | ("textarea", _) => Some("textbox"),
            _ => None,
        }
    }

    fn is_leaf_text(&self) -> bool {
        !matches!(self.tag, "input" | "select" | "textarea" | "form")
    }

    fn matches(&self, selector: &Selector) -> bool {
        match selector {
            Selector::Css(css) => self.css_forms().iter().any(|f| f == css.trim()),
            Selector::NameEquals(n) => self.name.as_deref() == Some(n.as_str()),
            Selector::NameContains(n) => self.name.as_deref().is_some_and(|name| name.contains(n.as_str())),
            Selector::IdContains(n) => self.dom_id.as_deref().is_some_and(|id| id.contains(n.as_str())),
            Selector::Label(text) => {
                self.name.is_some() && self.text.trim() == text.trim() && !self.is_leaf_text()
            }
            Selector::Placeholder(p) => self.placeholder == Some(p.as_str()),
            Selector::Role { role, name } => {
                self.implicit_role() == Some(role.as_str()) && self.text.trim() == name.trim()
            }
            Selector::Text(t) => self.is_leaf_text() && self.text.contains(t.as_str()),
            Selector::CssWithText { css, text } => {
                self.css_forms().iter().any(|f| f == css.trim()) && self.text.contains(text.as_str())
            }
        }
    }
}

// =============================================================================
// SIMULATED DEVICE
// =============================================================================

/// Simulated Kronos web interface
#[derive(Debug)]
pub struct SimulatedDevice {
    profile: Arc<CapabilityProfile>,
    base_url: String,
    path: String,
    pages: BTreeMap<SectionId, SimPage>,
    status_password: String,
    config_password: String,
    status_authenticated: bool,
    config_unlocked: bool,
    typed_password: String,
    save_behavior: SaveBehavior,
    save_control_stuck: bool,
    success_banner: bool,
    loading_polls: u32,
    satellite_loading_polls: u32,
    satellite_remaining: u32,
    help_text: Option<String>,
    pending: Option<PendingSave>,
    flash: Option<Flash>,
    /// Call history for verification
    pub history: Vec<String>,
}

impl SimulatedDevice {
    /// Build a logged-out device UI for the profiled model
    #[must_use]
    pub fn new(profile: Arc<CapabilityProfile>, base_url: impl Into<String>) -> Self {
        let pages = profile
            .available_sections
            .iter()
            .filter_map(|section| SectionSchema::for_profile(&profile, *section))
            .map(|schema| (schema.section, build_page(schema, &profile)))
            .collect();

        Self {
            profile,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            path: DASHBOARD_PATH.to_string(),
            pages,
            status_password: "status".to_string(),
            config_password: "config".to_string(),
            status_authenticated: false,
            config_unlocked: false,
            typed_password: String::new(),
            save_behavior: SaveBehavior::Persist,
            save_control_stuck: false,
            success_banner: true,
            loading_polls: 0,
            satellite_loading_polls: 0,
            satellite_remaining: 0,
            help_text: None,
            pending: None,
            flash: None,
            history: Vec::new(),
        }
    }

    /// Start with both authentication levels already passed
    #[must_use]
    pub fn logged_in(mut self) -> Self {
        self.status_authenticated = true;
        self.config_unlocked = true;
        self
    }

    /// Set the passwords the login and unlock pages accept
    #[must_use]
    pub fn with_passwords(mut self, status: impl Into<String>, config: impl Into<String>) -> Self {
        self.status_password = status.into();
        self.config_password = config.into();
        self
    }

    /// Choose what a submitted save does
    #[must_use]
    pub const fn with_save_behavior(mut self, behavior: SaveBehavior) -> Self {
        self.save_behavior = behavior;
        self
    }

    /// Keep every save control disabled regardless of edits
    #[must_use]
    pub const fn with_save_control_stuck_disabled(mut self) -> Self {
        self.save_control_stuck = true;
        self
    }

    /// Acknowledge saves only by disabling the save control
    #[must_use]
    pub const fn without_success_banner(mut self) -> Self {
        self.success_banner = false;
        self
    }

    /// Show the loading indicator for this many polls before the outcome
    #[must_use]
    pub const fn with_loading_polls(mut self, polls: u32) -> Self {
        self.loading_polls = polls;
        self
    }

    /// Keep the satellite data mask up after each login until the
    /// `polls`-th element query
    #[must_use]
    pub const fn with_satellite_loading_polls(mut self, polls: u32) -> Self {
        self.satellite_loading_polls = polls;
        self
    }

    /// Show a help paragraph on every section page
    #[must_use]
    pub fn with_help_text(mut self, text: impl Into<String>) -> Self {
        self.help_text = Some(text.into());
        self
    }

    /// Set a stored value; the form shows it on next load
    #[must_use]
    pub fn with_stored_value(mut self, section: SectionId, field: &str, value: impl Into<String>) -> Self {
        let value = value.into();
        if let Some(f) = self.pages.get_mut(&section).and_then(|p| p.field_mut(field)) {
            f.saved.clone_from(&value);
            f.value = value;
        }
        self
    }

    /// Stored value of a field
    #[must_use]
    pub fn stored_value(&self, section: SectionId, field: &str) -> Option<&str> {
        self.pages
            .get(&section)?
            .fields
            .iter()
            .find(|f| f.descriptor.name == field)
            .map(|f| f.saved.as_str())
    }

    /// Whether the configuration lock has been released
    #[must_use]
    pub const fn is_unlocked(&self) -> bool {
        self.config_unlocked
    }

    /// Profile the UI was built from
    #[must_use]
    pub fn profile(&self) -> &CapabilityProfile {
        &self.profile
    }

    /// Get call history
    #[must_use]
    pub fn history(&self) -> &[String] {
        &self.history
    }

    /// Check if method was called
    #[must_use]
    pub fn was_called(&self, method: &str) -> bool {
        self.history.iter().any(|c| c.starts_with(method))
    }

    /// Handles of clicked elements, in order
    #[must_use]
    pub fn clicks(&self) -> Vec<&str> {
        self.history
            .iter()
            .filter_map(|c| c.strip_prefix("click:"))
            .collect()
    }

    fn current_section(&self) -> Option<SectionId> {
        self.pages.keys().copied().find(|s| s.path() == self.path)
    }

    fn section_page(&self) -> Option<&SimPage> {
        self.pages.get(&self.current_section()?)
    }

    fn section_page_mut(&mut self) -> Option<&mut SimPage> {
        let section = self.current_section()?;
        self.pages.get_mut(&section)
    }

    fn load_current(&mut self) {
        self.flash = None;
        self.pending = None;
        self.typed_password.clear();
        if let Some(page) = self.section_page_mut() {
            page.expanded.clear();
            for field in &mut page.fields {
                field.value.clone_from(&field.saved);
                field.dirty = false;
            }
        }
    }

    fn save_enabled(&self, scope: Option<&str>) -> bool {
        !self.save_control_stuck
            && self.pending.is_none()
            && self
                .section_page()
                .is_some_and(|page| page.in_scope(scope).any(|f| f.dirty))
    }

    fn advance_satellite(&mut self) {
        self.satellite_remaining = self.satellite_remaining.saturating_sub(1);
    }

    fn advance_pending(&mut self) {
        let Some(pending) = self.pending.as_mut() else {
            return;
        };
        if self.save_behavior == SaveBehavior::NoResponse {
            return;
        }
        if pending.remaining_polls > 0 {
            pending.remaining_polls -= 1;
            return;
        }
        let scope = pending.scope.clone();
        self.pending = None;
        self.apply_save(scope.as_deref());
    }

    fn apply_save(&mut self, scope: Option<&str>) {
        let behavior = self.save_behavior;
        let banner = self.success_banner;
        let Some(page) = self.section_page_mut() else {
            return;
        };
        let mut flash = None;
        for field in page
            .fields
            .iter_mut()
            .filter(|f| scope.is_none() || f.iface.as_deref() == scope)
        {
            match behavior {
                SaveBehavior::Persist => {
                    if field.dirty {
                        field.saved.clone_from(&field.value);
                    }
                    field.dirty = false;
                    flash = banner.then_some(Flash::Success);
                }
                SaveBehavior::AcknowledgeWithoutPersisting => {
                    field.dirty = false;
                    flash = banner.then_some(Flash::Success);
                }
                SaveBehavior::Reject => flash = Some(Flash::Error),
                SaveBehavior::NoResponse => {}
            }
        }
        self.flash = flash;
    }

    // -------------------------------------------------------------------------
    // Element snapshot
    // -------------------------------------------------------------------------

    fn elements(&self) -> Vec<SimElement> {
        match self.path.as_str() {
            AUTHENTICATE_PATH => login_form("login", "sts_password"),
            UNLOCK_PATH => login_form("unlock", "cfg_password"),
            _ if !self.status_authenticated => Vec::new(),
            _ => self.authenticated_elements(),
        }
    }

    fn authenticated_elements(&self) -> Vec<SimElement> {
        let mut els = Vec::new();
        let masked = self.satellite_remaining > 0;
        if masked {
            let mut mask = SimElement::new("satellite-mask", "div");
            mask.classes = vec!["page_loading_mask"];
            mask.text = "Loading satellite data...".to_string();
            els.push(mask);
        }
        for section in self.pages.keys() {
            let mut link = SimElement::new(format!("nav:{section}"), "a");
            link.text = section.label().to_string();
            link.extra_css.push(format!("a[href='{}']", section.as_str()));
            link.visible = !masked;
            els.push(link);
        }
        if !self.config_unlocked {
            let mut configure = SimElement::new("unlock:configure", "a");
            configure.text = "Configure".to_string();
            configure.extra_css.extend(["a[title*='locked']".to_string(), "a[href='login']".to_string()]);
            configure.visible = !masked;
            els.push(configure);
        }

        let Some(page) = self.section_page() else {
            return els;
        };

        els.push(SimElement::new("form", "form"));
        if let Some(text) = &self.help_text {
            let mut help = SimElement::new("help", "p");
            help.classes = vec!["help-block"];
            help.text.clone_from(text);
            els.push(help);
        }
        for panel in &page.schema.panels {
            let mut trigger = SimElement::new(format!("panel:{}", panel.probe_field), "a");
            trigger.extra_css.push(panel.trigger.to_string());
            els.push(trigger);
        }
        let shown = |name: &str| page.field(name).map(|f| f.value.as_str());
        for field in &page.fields {
            let constraint = page.schema.field_constraint(&field.descriptor.name, shown);
            let visible = page.field_visible(field) && !constraint.hidden;
            let mut el = field_element(field, visible, self.config_unlocked);
            el.readonly = constraint.read_only;
            els.push(el);
        }
        els.extend(self.save_elements(page));

        let mut cancel = SimElement::new("cancel", "button");
        cancel.dom_id = Some("button_cancel".to_string());
        cancel.text = "Cancel".to_string();
        els.push(cancel);

        if self.pending.is_some() {
            let mut loading = SimElement::new("loading", "div");
            loading.classes = vec!["saving", "spinner"];
            loading.text = "Saving...".to_string();
            els.push(loading);
        }
        match self.flash {
            Some(Flash::Success) => {
                let mut banner = SimElement::new("flash:success", "div");
                banner.classes = vec!["alert", "alert-success"];
                banner.text = "Configuration saved".to_string();
                els.push(banner);
            }
            Some(Flash::Error) => {
                let mut banner = SimElement::new("flash:error", "div");
                banner.classes = vec!["alert", "alert-danger"];
                banner.text = "Error: configuration rejected".to_string();
                els.push(banner);
            }
            None => {}
        }
        els
    }

    fn save_elements(&self, page: &SimPage) -> Vec<SimElement> {
        let button = |handle: String, scope: Option<&str>| {
            let mut el = SimElement::new(handle, "button");
            el.text = "Save".to_string();
            el.enabled = self.save_enabled(scope);
            el
        };
        match self.profile.save_strategy(page.schema.section) {
            SaveButtonStrategy::StaticSelector(css) => {
                let mut el = button("save".to_string(), None);
                el.dom_id = Some("button_save".to_string());
                el.extra_css.extend(css.iter().take(1).cloned());
                vec![el]
            }
            SaveButtonStrategy::RoleBased(label) => {
                let mut el = button("save".to_string(), None);
                el.text.clone_from(label);
                vec![el]
            }
            SaveButtonStrategy::PerInterface(template) => {
                let ifaces: BTreeSet<&str> = page.fields.iter().filter_map(|f| f.iface.as_deref()).collect();
                ifaces
                    .into_iter()
                    .map(|iface| {
                        let mut el = button(format!("save:{iface}"), Some(iface));
                        el.dom_id = Some(format!("button_save_port_{iface}"));
                        el.extra_css
                            .push(template.replace(SaveButtonStrategy::IFACE_PLACEHOLDER, iface));
                        el
                    })
                    .collect()
            }
            SaveButtonStrategy::Disabled => Vec::new(),
        }
    }

    fn element(&self, handle: &ElementHandle) -> ProbeResult<SimElement> {
        self.elements()
            .into_iter()
            .find(|e| e.handle == handle.id)
            .ok_or_else(|| ProbeError::engine(format!("stale element handle '{}'", handle.id)))
    }

    fn url(&self) -> String {
        format!("{}{}", self.base_url, self.path)
    }

    fn route(&mut self, url: &str) {
        let path = url
            .strip_prefix(&self.base_url)
            .unwrap_or(url)
            .split(['?', '#'])
            .next()
            .unwrap_or_default();
        let path = if path.is_empty() { DASHBOARD_PATH } else { path };
        self.path = if self.status_authenticated {
            path.to_string()
        } else {
            AUTHENTICATE_PATH.to_string()
        };
        self.load_current();
    }

    fn submit_password(&mut self) {
        let typed = std::mem::take(&mut self.typed_password);
        match self.path.as_str() {
            AUTHENTICATE_PATH if typed == self.status_password => {
                self.status_authenticated = true;
                self.path = DASHBOARD_PATH.to_string();
                self.satellite_remaining = self.satellite_loading_polls;
            }
            UNLOCK_PATH if typed == self.config_password => {
                self.config_unlocked = true;
                self.path = DASHBOARD_PATH.to_string();
                self.satellite_remaining = self.satellite_loading_polls;
            }
            _ => {}
        }
    }
}

fn build_page(schema: SectionSchema, profile: &CapabilityProfile) -> SimPage {
    let fields = schema
        .fields
        .iter()
        .map(|descriptor| {
            let initial = descriptor.default.clone().unwrap_or_else(|| sample_value(descriptor));
            SimField {
                iface: profile_iface(profile, schema.section, &descriptor.name),
                descriptor: descriptor.clone(),
                saved: initial.clone(),
                value: initial,
                dirty: false,
            }
        })
        .collect();
    SimPage {
        schema,
        fields,
        expanded: BTreeSet::new(),
    }
}

fn profile_iface(profile: &CapabilityProfile, section: SectionId, field: &str) -> Option<String> {
    if !profile.save_strategy(section).is_per_interface() {
        return None;
    }
    profile
        .network_interfaces
        .iter()
        .find(|iface| field.split('_').any(|part| part == iface.as_str()))
        .cloned()
}

fn sample_value(descriptor: &FieldDescriptor) -> String {
    match &descriptor.kind {
        FieldKind::Text(TextFormat::Ipv4) => "192.168.1.10".to_string(),
        FieldKind::Text(_) => String::new(),
        FieldKind::Enum(options) => options.first().cloned().unwrap_or_default(),
        FieldKind::Boolean => "false".to_string(),
        FieldKind::NumericRange { min, .. } => min.to_string(),
    }
}

fn field_element(field: &SimField, visible: bool, unlocked: bool) -> SimElement {
    let name = field.descriptor.name.clone();
    let (tag, input_type) = match field.descriptor.kind {
        FieldKind::Enum(_) => ("select", None),
        FieldKind::Boolean => ("input", Some("checkbox")),
        _ if name.ends_with("pwd") => ("input", Some("password")),
        _ => ("input", Some("text")),
    };
    let mut el = SimElement::new(format!("field:{name}"), tag);
    el.dom_id = Some(name.clone());
    el.name = Some(name);
    el.input_type = input_type;
    el.visible = visible;
    el.enabled = unlocked;
    el
}

fn login_form(prefix: &str, name: &str) -> Vec<SimElement> {
    let mut password = SimElement::new(format!("{prefix}:password"), "input");
    password.name = Some(name.to_string());
    password.dom_id = Some(name.to_string());
    password.input_type = Some("password");
    password.placeholder = Some("Password");

    let mut submit = SimElement::new(format!("{prefix}:submit"), "button");
    submit.text = "Submit".to_string();
    submit.input_type = Some("submit");

    vec![SimElement::new("form", "form"), password, submit]
}

#[async_trait]
impl BrowserEngine for SimulatedDevice {
    async fn navigate(&mut self, url: &str) -> ProbeResult<()> {
        self.history.push(format!("navigate:{url}"));
        self.route(url);
        Ok(())
    }

    async fn reload(&mut self) -> ProbeResult<()> {
        self.history.push("reload".to_string());
        self.load_current();
        Ok(())
    }

    async fn current_url(&mut self) -> ProbeResult<String> {
        Ok(self.url())
    }

    async fn query_all(&mut self, selector: &Selector) -> ProbeResult<Vec<ElementHandle>> {
        self.history.push(format!("query:{selector}"));
        self.advance_satellite();
        self.advance_pending();
        Ok(self
            .elements()
            .into_iter()
            .filter(|e| e.matches(selector))
            .map(|e| ElementHandle::new(e.handle, e.tag))
            .collect())
    }

    async fn is_visible(&mut self, element: &ElementHandle) -> ProbeResult<bool> {
        Ok(self.element(element)?.visible)
    }

    async fn is_enabled(&mut self, element: &ElementHandle) -> ProbeResult<bool> {
        Ok(self.element(element)?.enabled)
    }

    async fn is_editable(&mut self, element: &ElementHandle) -> ProbeResult<bool> {
        let el = self.element(element)?;
        Ok(el.enabled && !el.readonly)
    }

    async fn read_value(&mut self, element: &ElementHandle) -> ProbeResult<String> {
        if let Some(name) = element.id.strip_prefix("field:") {
            return self
                .section_page()
                .and_then(|p| p.fields.iter().find(|f| f.descriptor.name == name))
                .map(|f| f.value.clone())
                .ok_or_else(|| ProbeError::engine(format!("stale element handle '{}'", element.id)));
        }
        if element.id.ends_with(":password") {
            return Ok(self.typed_password.clone());
        }
        Ok(self.element(element)?.text)
    }

    async fn fill(&mut self, element: &ElementHandle, value: &str) -> ProbeResult<()> {
        self.history.push(format!("fill:{}={value}", element.id));
        let el = self.element(element)?;
        if !el.enabled || el.readonly || !el.visible {
            return Err(ProbeError::engine(format!("element '{}' is not editable", element.id)));
        }
        if element.id.ends_with(":password") {
            self.typed_password = value.to_string();
            return Ok(());
        }
        let name = element.id.strip_prefix("field:").unwrap_or_default().to_string();
        self.flash = None;
        if let Some(field) = self.section_page_mut().and_then(|p| p.field_mut(&name)) {
            field.value = value.to_string();
            field.dirty = true;
        }
        Ok(())
    }

    async fn click(&mut self, element: &ElementHandle) -> ProbeResult<()> {
        self.history.push(format!("click:{}", element.id));
        let el = self.element(element)?;
        if !el.enabled {
            return Ok(());
        }
        let id = element.id.as_str();
        match id {
            "login:submit" | "unlock:submit" => self.submit_password(),
            "unlock:configure" => {
                self.path = UNLOCK_PATH.to_string();
                self.typed_password.clear();
            }
            "cancel" => {
                self.flash = None;
                if let Some(page) = self.section_page_mut() {
                    for field in &mut page.fields {
                        field.value = field.form_default();
                        field.dirty = false;
                    }
                }
            }
            "save" => self.start_save(None),
            _ => {
                if let Some(iface) = id.strip_prefix("save:") {
                    self.start_save(Some(iface.to_string()));
                } else if let Some(probe) = id.strip_prefix("panel:") {
                    let iface = probe.split('_').next().unwrap_or_default().to_string();
                    if let Some(page) = self.section_page_mut() {
                        if !page.expanded.remove(&iface) {
                            page.expanded.insert(iface);
                        }
                    }
                } else if let Some(section) = id.strip_prefix("nav:") {
                    self.path = format!("/{section}");
                    self.load_current();
                }
            }
        }
        Ok(())
    }
}

impl SimulatedDevice {
    fn start_save(&mut self, scope: Option<String>) {
        if !self.save_enabled(scope.as_deref()) {
            return;
        }
        self.flash = None;
        if self.loading_polls == 0 && self.save_behavior != SaveBehavior::NoResponse {
            self.apply_save(scope.as_deref());
        } else {
            self.pending = Some(PendingSave {
                remaining_polls: self.loading_polls,
                scope,
            });
        }
    }
}
