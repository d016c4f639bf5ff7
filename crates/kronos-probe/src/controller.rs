//! Configuration section controller.
//!
//! One [`SectionController`] drives one visit to one configuration page.
//! It owns the transient [`SectionState`] and moves through
//! [`SectionPhase`]:
//!
//! ```text
//! Unloaded ──navigate_and_load──▶ Loaded ──set_field──▶ Mutated ──save──▶ Saving ──▶ Saved
//!                                   ▲                      │                 │
//!                                   └──── Cancelling ◀─cancel           failure: back to Mutated
//! ```
//!
//! Every behavior difference between devices comes from the capability
//! profile and the section schema; the operation set is the same for every
//! section on every device.
//!
//! ## Toyota Way Application
//!
//! - **Poka-Yoke**: Sections the profile rules out fail before any DOM access
//! - **Jidoka**: Invalid values are rejected before anything is typed
//! - **Genchi Genbutsu**: Reads always reflect the live form

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::capability::{CapabilityProfile, SectionId};
use crate::config::BaseTimeouts;
use crate::engine::BrowserEngine;
use crate::locator::{locate_first, AdaptiveLocatorResolver, Selector};
use crate::protocol::{save_controls_enabled, ChangeVerificationProtocol, SaveConfirmation};
use crate::result::{ProbeError, ProbeResult, SaveFailureReason};
use crate::schema::SectionSchema;
use crate::tracing_support::{OperationClock, OperationTimings};
use crate::wait::{wait_for_visible, WaitOptions};

// =============================================================================
// CONTEXT
// =============================================================================

/// Per-session inputs every controller needs
#[derive(Debug, Clone)]
pub struct SectionContext {
    /// Device web UI root, without trailing slash
    pub base_url: String,
    /// Resolved capability profile
    pub profile: Arc<CapabilityProfile>,
    /// Unscaled wait bounds
    pub timeouts: BaseTimeouts,
    /// Reload and re-read after every save
    pub verify_persistence: bool,
}

impl SectionContext {
    /// Context with default timeouts and persistence verification on
    #[must_use]
    pub fn new(base_url: impl Into<String>, profile: Arc<CapabilityProfile>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            profile,
            timeouts: BaseTimeouts::default(),
            verify_persistence: true,
        }
    }

    /// Set base timeouts
    #[must_use]
    pub const fn with_timeouts(mut self, timeouts: BaseTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Enable or disable reload verification
    #[must_use]
    pub const fn with_verify_persistence(mut self, verify: bool) -> Self {
        self.verify_persistence = verify;
        self
    }

    /// Wait options for a base bound, scaled for this device
    #[must_use]
    pub fn wait(&self, base_ms: u64) -> WaitOptions {
        WaitOptions::new()
            .with_timeout(self.profile.timeout_for(base_ms))
            .with_poll_interval(self.timeouts.poll_interval_ms)
    }
}

// =============================================================================
// STATE
// =============================================================================

/// Where a section visit is in the save/cancel cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SectionPhase {
    /// Not navigated yet, or discarded
    #[default]
    Unloaded,
    /// Form read, no edits
    Loaded,
    /// At least one field written since load or save
    Mutated,
    /// Save protocol running
    Saving,
    /// Last save confirmed
    Saved,
    /// Cancel in progress
    Cancelling,
}

impl SectionPhase {
    /// Stable name for logs
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unloaded => "unloaded",
            Self::Loaded => "loaded",
            Self::Mutated => "mutated",
            Self::Saving => "saving",
            Self::Saved => "saved",
            Self::Cancelling => "cancelling",
        }
    }
}

impl fmt::Display for SectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transient state of one section visit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionState {
    /// Field values as last loaded or saved, keyed by schema field name
    pub loaded_values: BTreeMap<String, String>,
    /// Any field written since the last load or save
    pub dirty: bool,
    /// Save control state observed after the last write
    pub save_enabled: bool,
    /// Values written since the last load or save, keyed by schema field name
    pub pending_changes: BTreeMap<String, String>,
}

// =============================================================================
// CONTROLLER
// =============================================================================

/// Navigate/read/write/save/cancel/verify for one configuration section
pub struct SectionController<'e, E: BrowserEngine + ?Sized> {
    pub(crate) engine: &'e mut E,
    timings: Option<&'e mut OperationTimings>,
    pub(crate) context: SectionContext,
    section: SectionId,
    pub(crate) schema: Option<SectionSchema>,
    pub(crate) resolver: AdaptiveLocatorResolver,
    phase: SectionPhase,
    pub(crate) state: SectionState,
}

impl<E: BrowserEngine + ?Sized> fmt::Debug for SectionController<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SectionController")
            .field("model", &self.context.profile.model)
            .field("section", &self.section)
            .field("phase", &self.phase)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<'e, E: BrowserEngine + ?Sized> SectionController<'e, E> {
    /// Controller for `section`, starting `Unloaded`
    pub fn new(engine: &'e mut E, context: SectionContext, section: SectionId) -> Self {
        let schema = SectionSchema::for_profile(&context.profile, section);
        let resolver = AdaptiveLocatorResolver::new(Arc::clone(&context.profile));
        Self {
            engine,
            timings: None,
            context,
            section,
            schema,
            resolver,
            phase: SectionPhase::Unloaded,
            state: SectionState::default(),
        }
    }

    /// Record operation durations into `timings`
    #[must_use]
    pub fn with_timings(mut self, timings: &'e mut OperationTimings) -> Self {
        self.timings = Some(timings);
        self
    }

    /// Section this controller drives
    #[must_use]
    pub const fn section(&self) -> SectionId {
        self.section
    }

    /// Current phase
    #[must_use]
    pub const fn phase(&self) -> SectionPhase {
        self.phase
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> &SectionState {
        &self.state
    }

    /// Device profile
    #[must_use]
    pub fn profile(&self) -> &CapabilityProfile {
        &self.context.profile
    }

    /// Page schema, `None` when the device lacks the section
    #[must_use]
    pub const fn schema(&self) -> Option<&SectionSchema> {
        self.schema.as_ref()
    }

    /// Whether the device offers this section
    #[must_use]
    pub const fn is_available(&self) -> bool {
        self.schema.is_some()
    }

    /// Documented value the form shows after cancel
    #[must_use]
    pub fn form_default(&self, name: &str) -> Option<&str> {
        self.schema.as_ref()?.form_default(name)
    }

    /// Drop all state and return to `Unloaded`
    pub fn discard(&mut self) {
        tracing::debug!(section = %self.section, phase = %self.phase, "section state discarded");
        self.state = SectionState::default();
        self.phase = SectionPhase::Unloaded;
    }

    fn unavailable(&self) -> ProbeError {
        ProbeError::SectionUnavailable {
            section: self.section,
            model: self.context.profile.model.clone(),
        }
    }

    fn transition(&mut self, to: SectionPhase) {
        if self.phase != to {
            tracing::debug!(
                model = %self.context.profile.model,
                section = %self.section,
                from = %self.phase,
                to = %to,
                "section phase"
            );
            self.phase = to;
        }
    }

    fn record<T>(&mut self, clock: OperationClock, result: &ProbeResult<T>) {
        if let Some(timings) = self.timings.as_deref_mut() {
            timings.finish(clock, result);
        }
    }

    fn clock(&self, name: &str) -> OperationClock {
        OperationClock::start(name, Some(self.section.as_str()))
    }

    // -------------------------------------------------------------------------
    // Operations
    // -------------------------------------------------------------------------

    /// Navigate to the section, wait for the form, expand panels and read
    /// every documented field.
    ///
    /// Fails with `SectionUnavailable` before touching the browser when
    /// the profile rules the section out.
    pub async fn navigate_and_load(&mut self) -> ProbeResult<()> {
        let clock = self.clock("navigate");
        let result = self.load().await;
        self.record(clock, &result);
        result
    }

    async fn load(&mut self) -> ProbeResult<()> {
        let Some(schema) = self.schema.as_ref() else {
            tracing::warn!(model = %self.context.profile.model, section = %self.section, "section not available");
            return Err(self.unavailable());
        };
        let url = format!("{}{}", self.context.base_url, schema.path);
        tracing::info!(model = %self.context.profile.model, section = %self.section, url = %url, "loading section");

        self.state = SectionState::default();
        self.phase = SectionPhase::Unloaded;

        let nav_wait = self.context.wait(self.context.timeouts.navigation_ms);
        let element_wait = self.context.wait(self.context.timeouts.element_ms);
        self.engine.navigate(&url).await?;
        wait_for_visible(&mut *self.engine, &schema.ready_indicators, nav_wait).await?;
        expand_panels(&mut *self.engine, schema, element_wait).await?;
        let values = read_fields(&mut *self.engine, &self.resolver, schema).await?;

        tracing::debug!(section = %self.section, fields = values.len(), "section loaded");
        self.state.loaded_values = values;
        self.transition(SectionPhase::Loaded);
        Ok(())
    }

    /// Validate `value`, locate the live control and write it.
    ///
    /// `name` may be a schema field name or a logical alias.
    pub async fn set_field(&mut self, name: &str, value: &str) -> ProbeResult<()> {
        let clock = self.clock("set_field");
        let result = self.write_field(name, value).await;
        self.record(clock, &result);
        result
    }

    async fn write_field(&mut self, name: &str, value: &str) -> ProbeResult<()> {
        match self.phase {
            SectionPhase::Loaded | SectionPhase::Mutated | SectionPhase::Saved => {}
            phase => {
                return Err(ProbeError::invalid_state(format!(
                    "set_field('{name}') on section {} in phase {phase}; navigate_and_load first",
                    self.section
                )))
            }
        }
        let schema = self.schema.as_ref().ok_or_else(|| self.unavailable())?;

        let descriptor = schema.descriptor_for(name);
        let normalized = descriptor.normalize(value)?;
        let canonical = schema.canonical_name(name).to_string();

        let state = &self.state;
        let constraint = schema.field_constraint(&canonical, |field| {
            state
                .pending_changes
                .get(field)
                .or_else(|| state.loaded_values.get(field))
                .map(String::as_str)
        });
        if !constraint.is_editable() {
            let reason = if constraint.hidden { "hidden" } else { "read-only" };
            return Err(ProbeError::FieldNotEditable {
                field: name.to_string(),
                selector: Selector::name_equals(&canonical).to_string(),
                reason: format!("{reason} under the port's PTP profile"),
            });
        }

        let candidates = candidates_for(&self.resolver, schema, name);
        let located = locate_first(&mut *self.engine, name, &candidates).await?;
        if !self.engine.is_editable(&located.handle).await? {
            let reason = if self.engine.is_enabled(&located.handle).await? {
                "read-only"
            } else {
                "disabled"
            };
            return Err(ProbeError::FieldNotEditable {
                field: name.to_string(),
                selector: located.selector.to_string(),
                reason: reason.to_string(),
            });
        }

        self.engine.fill(&located.handle, &normalized).await?;
        tracing::debug!(section = %self.section, field = %canonical, selector = %located.selector, "field written");

        self.state.pending_changes.insert(canonical, normalized);
        self.state.dirty = true;
        self.state.save_enabled =
            save_controls_enabled(&mut *self.engine, &self.context.profile, schema, &self.state.pending_changes)
                .await?;
        self.transition(SectionPhase::Mutated);
        Ok(())
    }

    /// Run the save protocol.
    ///
    /// On failure the phase returns to where it was, so pending changes
    /// survive for a retry. After `NotPersisted` the reloaded values become
    /// `loaded_values` and the pending changes are typed into the form again.
    pub async fn save(&mut self) -> ProbeResult<SaveConfirmation> {
        let clock = self.clock("save");
        let result = self.run_save().await;
        self.record(clock, &result);
        result
    }

    async fn run_save(&mut self) -> ProbeResult<SaveConfirmation> {
        let prior = self.phase;
        match prior {
            SectionPhase::Loaded | SectionPhase::Mutated | SectionPhase::Saved => {}
            phase => {
                return Err(ProbeError::invalid_state(format!(
                    "save on section {} in phase {phase}",
                    self.section
                )))
            }
        }

        self.transition(SectionPhase::Saving);
        let protocol = ChangeVerificationProtocol::new(&self.context);
        match protocol.confirm_save(self).await {
            Ok(confirmation) => {
                let saved = std::mem::take(&mut self.state.pending_changes);
                self.state.loaded_values.extend(saved);
                self.state.dirty = false;
                self.state.save_enabled = false;
                self.transition(SectionPhase::Saved);
                Ok(confirmation)
            }
            Err(e) => {
                tracing::warn!(section = %self.section, error = %e, "save failed");
                if e.save_failure_reason() == Some(SaveFailureReason::NotPersisted) {
                    if let Err(restore) = self.reapply_after_reload().await {
                        tracing::warn!(section = %self.section, error = %restore, "could not re-apply edits after reload");
                        self.state.save_enabled = false;
                    }
                }
                self.transition(prior);
                Err(e)
            }
        }
    }

    /// The reload behind `NotPersisted` drops the typed values; read what
    /// the device kept and type the pending changes again.
    async fn reapply_after_reload(&mut self) -> ProbeResult<()> {
        let schema = self.schema.as_ref().ok_or_else(|| self.unavailable())?;
        self.state.loaded_values = read_fields(&mut *self.engine, &self.resolver, schema).await?;
        for (name, value) in &self.state.pending_changes {
            let candidates = candidates_for(&self.resolver, schema, name);
            let located = locate_first(&mut *self.engine, name, &candidates).await?;
            self.engine.fill(&located.handle, value).await?;
        }
        self.state.save_enabled =
            save_controls_enabled(&mut *self.engine, &self.context.profile, schema, &self.state.pending_changes)
                .await?;
        tracing::debug!(section = %self.section, fields = self.state.pending_changes.len(), "edits re-applied after reload");
        Ok(())
    }

    /// Click cancel and re-read the form.
    ///
    /// The device resets fields to their documented form defaults, which
    /// are not necessarily the values seen at load time.
    pub async fn cancel(&mut self) -> ProbeResult<()> {
        let clock = self.clock("cancel");
        let result = self.run_cancel().await;
        self.record(clock, &result);
        result
    }

    async fn run_cancel(&mut self) -> ProbeResult<()> {
        let prior = self.phase;
        match prior {
            SectionPhase::Loaded | SectionPhase::Mutated | SectionPhase::Saved => {}
            phase => {
                return Err(ProbeError::invalid_state(format!(
                    "cancel on section {} in phase {phase}",
                    self.section
                )))
            }
        }
        let Some(schema) = self.schema.clone() else {
            return Err(self.unavailable());
        };

        self.transition(SectionPhase::Cancelling);
        let cancel_wait = self.context.wait(self.context.timeouts.cancel_ms);
        let engine = &mut *self.engine;
        let resolver = &self.resolver;
        let outcome = async {
            let control = wait_for_visible(&mut *engine, &schema.cancel_controls, cancel_wait).await?;
            engine.click(&control).await?;
            read_fields(&mut *engine, resolver, &schema).await
        }
        .await;

        match outcome {
            Ok(values) => {
                for name in self.state.pending_changes.keys() {
                    let shown = values.get(name).map(String::as_str);
                    if let Some(default) = schema.form_default(name) {
                        if shown != Some(default) {
                            tracing::warn!(
                                section = %self.section,
                                field = %name,
                                expected = default,
                                shown = shown.unwrap_or("<absent>"),
                                "cancel did not restore the form default"
                            );
                        }
                    }
                }
                self.state = SectionState {
                    loaded_values: values,
                    ..SectionState::default()
                };
                self.transition(SectionPhase::Loaded);
                Ok(())
            }
            Err(e) => {
                self.transition(prior);
                Err(e)
            }
        }
    }

    /// Live values of every documented field present on the page.
    ///
    /// Valid in any phase and never changes state.
    pub async fn get_configuration(&mut self) -> ProbeResult<BTreeMap<String, String>> {
        let schema = self.schema.as_ref().ok_or_else(|| self.unavailable())?;
        read_fields(&mut *self.engine, &self.resolver, schema).await
    }

    /// Live value of one field
    pub async fn get_field(&mut self, name: &str) -> ProbeResult<String> {
        let schema = self.schema.as_ref().ok_or_else(|| self.unavailable())?;
        let candidates = candidates_for(&self.resolver, schema, name);
        let located = locate_first(&mut *self.engine, name, &candidates).await?;
        self.engine.read_value(&located.handle).await
    }

    /// Whether the live field shows `expected`, compared as the field's type
    pub async fn verify(&mut self, name: &str, expected: &str) -> ProbeResult<bool> {
        let actual = self.get_field(name).await?;
        let descriptor = self
            .schema
            .as_ref()
            .map(|s| s.descriptor_for(name))
            .ok_or_else(|| self.unavailable())?;
        let matches = descriptor.values_match(expected, &actual);
        if !matches {
            tracing::info!(section = %self.section, field = name, expected, actual = %actual, "field mismatch");
        }
        Ok(matches)
    }

    /// Live save control state for the pending changes
    pub async fn is_save_enabled(&mut self) -> ProbeResult<bool> {
        let schema = self.schema.as_ref().ok_or_else(|| self.unavailable())?;
        let enabled =
            save_controls_enabled(&mut *self.engine, &self.context.profile, schema, &self.state.pending_changes)
                .await?;
        self.state.save_enabled = enabled;
        Ok(enabled)
    }
}

// =============================================================================
// SHARED PAGE HELPERS
// =============================================================================

/// Candidates for a field: a profile alias for the name as given wins,
/// otherwise the schema's canonical name is resolved.
pub(crate) fn candidates_for(resolver: &AdaptiveLocatorResolver, schema: &SectionSchema, name: &str) -> Vec<Selector> {
    if resolver.profile().field_aliases.contains_key(name) {
        resolver.resolve(name)
    } else {
        resolver.resolve(schema.canonical_name(name))
    }
}

/// Expand every collapsed panel so its fields become visible
pub(crate) async fn expand_panels<E>(engine: &mut E, schema: &SectionSchema, options: WaitOptions) -> ProbeResult<()>
where
    E: BrowserEngine + ?Sized,
{
    for panel in &schema.panels {
        let probe = Selector::name_equals(&panel.probe_field);
        if engine.any_visible(&probe).await? {
            continue;
        }
        let Some(trigger) = engine.first_visible(&panel.trigger).await? else {
            tracing::warn!(section = %schema.section, trigger = %panel.trigger, "panel trigger not found");
            continue;
        };
        engine.click(&trigger).await?;
        wait_for_visible(engine, std::slice::from_ref(&probe), options).await?;
        tracing::debug!(section = %schema.section, panel = %panel.trigger, "panel expanded");
    }
    Ok(())
}

/// Read every documented field that is present and visible
pub(crate) async fn read_fields<E>(
    engine: &mut E,
    resolver: &AdaptiveLocatorResolver,
    schema: &SectionSchema,
) -> ProbeResult<BTreeMap<String, String>>
where
    E: BrowserEngine + ?Sized,
{
    let mut values = BTreeMap::new();
    for descriptor in &schema.fields {
        let candidates = candidates_for(resolver, schema, &descriptor.name);
        match locate_first(engine, &descriptor.name, &candidates).await {
            Ok(located) => {
                let value = engine.read_value(&located.handle).await?;
                values.insert(descriptor.name.clone(), value);
            }
            Err(ProbeError::FieldNotFound { .. }) => {
                tracing::debug!(section = %schema.section, field = %descriptor.name, "documented field absent");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::CapabilityRegistry;
    use crate::device::DeviceModel;
    use crate::mock::SimulatedDevice;

    const BASE: &str = "https://10.0.0.5";
    const S2: &str = "KRONOS-2R-HVXX-A2F";
    const S3: &str = "KRONOS-3R-HVXX-TCXO-A2X";

    fn profile(model: &str) -> Arc<CapabilityProfile> {
        CapabilityRegistry::builtin().lookup(&DeviceModel::Known(model.to_string()))
    }

    fn context(model: &str) -> SectionContext {
        SectionContext::new(BASE, profile(model))
    }

    fn device(model: &str) -> SimulatedDevice {
        SimulatedDevice::new(profile(model), BASE).logged_in()
    }

    mod context_tests {
        use super::*;

        #[test]
        fn test_wait_is_scaled() {
            assert_eq!(context(S2).wait(10_000).timeout_ms, 10_000);
            assert_eq!(context(S3).wait(10_000).timeout_ms, 15_000);
            assert_eq!(context(S3).wait(10_000).poll_interval_ms, 100);
        }

        #[test]
        fn test_base_url_trailing_slash() {
            let ctx = SectionContext::new("https://10.0.0.5/", profile(S2));
            assert_eq!(ctx.base_url, BASE);
        }
    }

    mod load_tests {
        use super::*;

        #[tokio::test]
        async fn test_load_reads_documented_fields() {
            let mut d = device(S2).with_stored_value(SectionId::Syslog, "target_a", "10.1.1.1");
            let mut c = SectionController::new(&mut d, context(S2), SectionId::Syslog);
            assert_eq!(c.phase(), SectionPhase::Unloaded);

            c.navigate_and_load().await.unwrap();
            assert_eq!(c.phase(), SectionPhase::Loaded);
            assert_eq!(c.state().loaded_values["target_a"], "10.1.1.1");
            assert_eq!(c.state().loaded_values["port_b"], "514");
            assert!(!c.state().dirty);
        }

        #[tokio::test]
        async fn test_unavailable_section_never_touches_browser() {
            let mut d = device(S2);
            let mut c = SectionController::new(&mut d, context(S2), SectionId::Ptp);
            let err = c.navigate_and_load().await.unwrap_err();
            assert!(matches!(err, ProbeError::SectionUnavailable { section: SectionId::Ptp, .. }));
            assert!(c.get_configuration().await.is_err());
            drop(c);
            assert!(d.history().is_empty());
        }

        #[tokio::test]
        async fn test_ptp_panels_expanded_on_load() {
            let mut d = device(S3);
            let mut c = SectionController::new(&mut d, context(S3), SectionId::Ptp);
            c.navigate_and_load().await.unwrap();
            let values = &c.state().loaded_values;
            assert!(values.contains_key("eth1_profile"));
            assert!(values.contains_key("eth3_priority2"));
            assert_eq!(values.len(), 10);
        }

        #[tokio::test]
        async fn test_get_configuration_is_idempotent() {
            let mut d = device(S2);
            let mut c = SectionController::new(&mut d, context(S2), SectionId::Access);
            c.navigate_and_load().await.unwrap();
            let first = c.get_configuration().await.unwrap();
            let second = c.get_configuration().await.unwrap();
            assert_eq!(first, second);
            assert_eq!(c.phase(), SectionPhase::Loaded);
        }
    }

    mod write_tests {
        use super::*;

        #[tokio::test]
        async fn test_set_field_before_load_is_invalid_state() {
            let mut d = device(S2);
            let mut c = SectionController::new(&mut d, context(S2), SectionId::General);
            let err = c.set_field("location", "Lab").await.unwrap_err();
            assert!(matches!(err, ProbeError::InvalidState { .. }));
        }

        #[tokio::test]
        async fn test_set_field_validates_before_writing() {
            let mut d = device(S2);
            let mut c = SectionController::new(&mut d, context(S2), SectionId::Syslog);
            c.navigate_and_load().await.unwrap();
            let err = c.set_field("port_a", "70000").await.unwrap_err();
            assert!(matches!(err, ProbeError::InvalidValue { .. }));
            assert_eq!(c.phase(), SectionPhase::Loaded);
            drop(c);
            assert!(!d.was_called("fill"));
        }

        #[tokio::test]
        async fn test_set_field_via_alias_marks_dirty() {
            let mut d = device(S2);
            let mut c = SectionController::new(&mut d, context(S2), SectionId::Syslog);
            c.navigate_and_load().await.unwrap();
            c.set_field("serverAddress", " 192.168.1.100 ").await.unwrap();
            assert_eq!(c.phase(), SectionPhase::Mutated);
            assert!(c.state().dirty);
            assert!(c.state().save_enabled);
            assert_eq!(c.state().pending_changes["target_a"], "192.168.1.100");
            assert!(c.verify("target_a", "192.168.1.100").await.unwrap());
        }

        #[tokio::test]
        async fn test_locked_field_is_not_editable() {
            let mut locked = SimulatedDevice::new(profile(S2), BASE).with_passwords("s", "c");
            locked.navigate(BASE).await.unwrap();
            let pwd = locked.query(&Selector::placeholder("Password")).await.unwrap().unwrap();
            locked.fill(&pwd, "s").await.unwrap();
            let submit = locked.query(&Selector::role("button", "Submit")).await.unwrap().unwrap();
            locked.click(&submit).await.unwrap();

            let mut c = SectionController::new(&mut locked, context(S2), SectionId::General);
            c.navigate_and_load().await.unwrap();
            let err = c.set_field("location", "Lab").await.unwrap_err();
            match err {
                ProbeError::FieldNotEditable { field, reason, .. } => {
                    assert_eq!(field, "location");
                    assert_eq!(reason, "disabled");
                }
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    mod constraint_tests {
        use super::*;

        #[tokio::test]
        async fn test_priority1_locked_by_power_profile() {
            let mut d = device(S3);
            let mut c = SectionController::new(&mut d, context(S3), SectionId::Ptp);
            c.navigate_and_load().await.unwrap();
            assert_eq!(c.state().loaded_values["eth1_priority1"], "128");

            let err = c.set_field("eth1_priority1", "100").await.unwrap_err();
            match err {
                ProbeError::FieldNotEditable { field, reason, .. } => {
                    assert_eq!(field, "eth1_priority1");
                    assert!(reason.starts_with("read-only"));
                }
                other => panic!("unexpected error: {other}"),
            }
            assert_eq!(c.phase(), SectionPhase::Loaded);

            c.set_field("eth1_priority2", "100").await.unwrap();
            c.set_field("eth1_profile", "Default Profile (UDPv4)").await.unwrap();
            c.set_field("eth1_priority1", "100").await.unwrap();
            assert_eq!(c.state().pending_changes["eth1_priority1"], "100");
            drop(c);
            assert!(d.was_called("fill:field:eth1_priority1=100"));
        }
    }

    mod save_cancel_tests {
        use super::*;

        #[tokio::test]
        async fn test_save_moves_pending_into_loaded() {
            let mut d = device(S2);
            let mut c = SectionController::new(&mut d, context(S2), SectionId::General);
            c.navigate_and_load().await.unwrap();
            c.set_field("location", "Rack 4").await.unwrap();
            let confirmation = c.save().await.unwrap();
            assert_eq!(confirmation.controls_clicked, 1);
            assert_eq!(c.phase(), SectionPhase::Saved);
            assert_eq!(c.state().loaded_values["location"], "Rack 4");
            assert!(c.state().pending_changes.is_empty());
            drop(c);
            assert_eq!(d.stored_value(SectionId::General, "location"), Some("Rack 4"));
        }

        #[tokio::test]
        async fn test_failed_save_returns_to_mutated() {
            let mut d = device(S2).with_save_control_stuck_disabled();
            let mut c = SectionController::new(&mut d, context(S2), SectionId::General);
            c.navigate_and_load().await.unwrap();
            c.set_field("contact", "noc@example.net").await.unwrap();
            assert!(!c.state().save_enabled);
            let err = c.save().await.unwrap_err();
            assert_eq!(err.save_failure_reason(), Some(SaveFailureReason::NotDirty));
            assert_eq!(c.phase(), SectionPhase::Mutated);
            assert_eq!(c.state().pending_changes.len(), 1);
        }

        #[tokio::test]
        async fn test_cancel_resets_to_form_default() {
            let mut d = device(S2).with_stored_value(SectionId::Syslog, "target_a", "10.1.1.1");
            let mut c = SectionController::new(&mut d, context(S2), SectionId::Syslog);
            c.navigate_and_load().await.unwrap();
            c.set_field("serverAddress", "10.2.2.2").await.unwrap();
            c.cancel().await.unwrap();
            assert_eq!(c.phase(), SectionPhase::Loaded);
            assert_eq!(c.state().loaded_values["target_a"], c.form_default("serverAddress").unwrap());
            assert!(!c.state().dirty);
        }

        #[tokio::test]
        async fn test_cancel_after_save_records_timing() {
            let mut d = device(S2);
            let mut timings = OperationTimings::new(S2);
            let mut c = SectionController::new(&mut d, context(S2), SectionId::Syslog).with_timings(&mut timings);
            c.navigate_and_load().await.unwrap();
            c.set_field("serverPort", "1514").await.unwrap();
            c.save().await.unwrap();
            assert_eq!(c.phase(), SectionPhase::Saved);

            c.set_field("serverAddress", "10.3.3.3").await.unwrap();
            c.cancel().await.unwrap();
            assert_eq!(c.phase(), SectionPhase::Loaded);
            assert_eq!(c.state().loaded_values["port_a"], "514");
            assert_eq!(c.state().loaded_values["target_a"], "");
            assert!(c.state().pending_changes.is_empty());
            drop(c);

            let names: Vec<&str> = timings.operations.iter().map(|o| o.name.as_str()).collect();
            assert_eq!(names, vec!["navigate", "set_field", "save", "set_field", "cancel"]);
            assert!(timings.failures().is_empty());
            assert_eq!(d.stored_value(SectionId::Syslog, "port_a"), Some("1514"));
        }

        #[tokio::test]
        async fn test_cancel_before_load_is_invalid_state() {
            let mut d = device(S2);
            let mut c = SectionController::new(&mut d, context(S2), SectionId::Syslog);
            assert!(matches!(c.cancel().await.unwrap_err(), ProbeError::InvalidState { .. }));
            assert!(matches!(c.save().await.unwrap_err(), ProbeError::InvalidState { .. }));
        }

        #[tokio::test]
        async fn test_discard_returns_to_unloaded() {
            let mut d = device(S2);
            let mut c = SectionController::new(&mut d, context(S2), SectionId::General);
            c.navigate_and_load().await.unwrap();
            c.set_field("location", "Lab").await.unwrap();
            c.discard();
            assert_eq!(c.phase(), SectionPhase::Unloaded);
            assert_eq!(c.state(), &SectionState::default());
        }

        #[tokio::test]
        async fn test_timings_recorded() {
            let mut d = device(S2);
            let mut timings = OperationTimings::new(S2);
            let mut c = SectionController::new(&mut d, context(S2), SectionId::General).with_timings(&mut timings);
            c.navigate_and_load().await.unwrap();
            c.set_field("location", "Lab").await.unwrap();
            c.save().await.unwrap();
            drop(c);
            let names: Vec<&str> = timings.operations.iter().map(|o| o.name.as_str()).collect();
            assert_eq!(names, vec!["navigate", "set_field", "save"]);
            assert!(timings.failures().is_empty());
        }
    }
}
