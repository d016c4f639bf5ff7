//! Save confirmation protocol.
//!
//! Decides whether a form edit was applied, saved, and persisted:
//!
//! 1. every save control for the edited scope must be enabled, otherwise
//!    the save fails as `NotDirty` without a click
//! 2. the controls are clicked
//! 3. the page is polled for an error indicator, a success indicator, or
//!    the save control returning to disabled; loading indicators postpone
//!    the decision and an error indicator always wins
//! 4. optionally the section is reloaded and every edited field re-read;
//!    a mismatch is `NotPersisted`, distinct from a failure at step 3
//!
//! ## Toyota Way Application
//!
//! - **Jidoka**: A disabled save control stops the line before anything is clicked
//! - **Genchi Genbutsu**: Persistence is judged by reloading, not by trusting the banner

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use tokio::time::Instant;

use crate::capability::CapabilityProfile;
use crate::controller::{candidates_for, expand_panels, SectionContext, SectionController};
use crate::engine::{BrowserEngine, ElementHandle};
use crate::locator::{locate_first, AdaptiveLocatorResolver, LocatedElement, Selector};
use crate::result::{ProbeError, ProbeResult, SaveFailureReason, SaveStage};
use crate::schema::SectionSchema;
use crate::wait::{wait_for_visible, WaitOptions};

/// What convinced the protocol the device accepted the save
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveSignal {
    /// A success indicator appeared
    SuccessIndicator,
    /// The save control went back to disabled
    ControlDisabled,
}

/// A confirmed save
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveConfirmation {
    /// Last stage reached
    pub stage: SaveStage,
    /// How the device acknowledged the save
    pub signal: SaveSignal,
    /// Save controls clicked (one per interface for per-port sections)
    pub controls_clicked: usize,
    /// Time from the enablement check to confirmation
    pub elapsed: Duration,
    /// Values re-read after reload; empty when verification is off
    pub verified: BTreeMap<String, String>,
}

/// The save/confirm/verify state machine shared by all sections
#[derive(Debug, Clone, Copy)]
pub struct ChangeVerificationProtocol {
    save_wait: WaitOptions,
    reload_wait: WaitOptions,
    element_wait: WaitOptions,
    verify_persistence: bool,
}

impl ChangeVerificationProtocol {
    /// Protocol with waits scaled for the context's device
    #[must_use]
    pub fn new(context: &SectionContext) -> Self {
        Self {
            save_wait: context.wait(context.timeouts.save_ms),
            reload_wait: context.wait(context.timeouts.navigation_ms),
            element_wait: context.wait(context.timeouts.element_ms),
            verify_persistence: context.verify_persistence,
        }
    }

    /// Run the protocol against the controller's pending changes
    pub async fn confirm_save<E>(&self, controller: &mut SectionController<'_, E>) -> ProbeResult<SaveConfirmation>
    where
        E: BrowserEngine + ?Sized,
    {
        let started = Instant::now();
        let profile = &*controller.context.profile;
        let schema = controller.schema.as_ref().ok_or_else(|| ProbeError::SectionUnavailable {
            section: controller.section(),
            model: profile.model.clone(),
        })?;
        let pending = &controller.state.pending_changes;
        let engine = &mut *controller.engine;

        // Stage 1: every control must be enabled before any is clicked
        let controls = locate_controls(engine, profile, schema, pending).await?;
        for control in &controls {
            if !engine.is_enabled(&control.handle).await? {
                tracing::info!(
                    section = %schema.section,
                    selector = %control.selector,
                    "save control disabled, nothing to save"
                );
                return Err(ProbeError::save_failed(
                    SaveFailureReason::NotDirty,
                    SaveStage::CheckEnabled,
                    format!("save control {} is disabled", control.selector),
                ));
            }
        }

        // Stage 2: submit
        for control in &controls {
            engine.click(&control.handle).await.map_err(|e| {
                ProbeError::save_failed(
                    SaveFailureReason::DeviceError,
                    SaveStage::Submitted,
                    format!("clicking save control {}: {e}", control.selector),
                )
            })?;
        }
        tracing::info!(section = %schema.section, controls = controls.len(), "save submitted");

        // Stage 3: wait for the device's verdict
        let signal = self.await_indicator(engine, schema, &controls).await?;
        tracing::info!(section = %schema.section, signal = ?signal, "save acknowledged");

        // Stage 4: reload and compare
        let verified = if self.verify_persistence {
            self.verify_persisted(engine, &controller.resolver, schema, pending)
                .await?
        } else {
            BTreeMap::new()
        };

        Ok(SaveConfirmation {
            stage: SaveStage::Complete,
            signal,
            controls_clicked: controls.len(),
            elapsed: started.elapsed(),
            verified,
        })
    }

    async fn await_indicator<E>(
        &self,
        engine: &mut E,
        schema: &SectionSchema,
        controls: &[LocatedElement],
    ) -> ProbeResult<SaveSignal>
    where
        E: BrowserEngine + ?Sized,
    {
        let deadline = self.save_wait.start();
        loop {
            if let Some(selector) = first_visible_of(engine, &schema.error_indicators).await? {
                tracing::warn!(section = %schema.section, indicator = %selector, "device reported a save error");
                return Err(ProbeError::save_failed(
                    SaveFailureReason::DeviceError,
                    SaveStage::AwaitingIndicator,
                    format!("error indicator {selector} visible after save"),
                ));
            }

            if first_visible_of(engine, &schema.loading_indicators).await?.is_none() {
                if first_visible_of(engine, &schema.success_indicators).await?.is_some() {
                    return Ok(SaveSignal::SuccessIndicator);
                }
                if all_controls_disabled(engine, controls).await? {
                    return Ok(SaveSignal::ControlDisabled);
                }
            }

            if deadline.is_expired() {
                return Err(ProbeError::save_failed(
                    SaveFailureReason::Timeout,
                    SaveStage::AwaitingIndicator,
                    format!(
                        "no success or error indicator within {}ms",
                        deadline.timeout_ms()
                    ),
                ));
            }
            deadline.pause().await;
        }
    }

    async fn verify_persisted<E>(
        &self,
        engine: &mut E,
        resolver: &AdaptiveLocatorResolver,
        schema: &SectionSchema,
        pending: &BTreeMap<String, String>,
    ) -> ProbeResult<BTreeMap<String, String>>
    where
        E: BrowserEngine + ?Sized,
    {
        engine.reload().await?;
        wait_for_visible(engine, &schema.ready_indicators, self.reload_wait).await?;
        expand_panels(engine, schema, self.element_wait).await?;

        let mut verified = BTreeMap::new();
        for (name, expected) in pending {
            let candidates = candidates_for(resolver, schema, name);
            let located = locate_first(engine, name, &candidates).await?;
            let actual = engine.read_value(&located.handle).await?;
            if !schema.descriptor_for(name).values_match(expected, &actual) {
                tracing::warn!(
                    section = %schema.section,
                    field = %name,
                    expected = %expected,
                    actual = %actual,
                    "saved value did not survive reload"
                );
                return Err(ProbeError::save_failed(
                    SaveFailureReason::NotPersisted,
                    SaveStage::VerifyingPersistence,
                    format!("{name}: expected '{expected}', device shows '{actual}' after reload"),
                ));
            }
            verified.insert(name.clone(), actual);
        }
        tracing::debug!(section = %schema.section, fields = verified.len(), "persistence verified");
        Ok(verified)
    }
}

/// Pending fields that no per-interface save control covers
pub(crate) fn unscoped_fields<'p>(
    profile: &CapabilityProfile,
    schema: &SectionSchema,
    pending: &'p BTreeMap<String, String>,
) -> Vec<&'p str> {
    if !profile.save_strategy(schema.section).is_per_interface() {
        return Vec::new();
    }
    pending
        .keys()
        .filter(|name| schema.interface_of(name, &profile.network_interfaces).is_none())
        .map(String::as_str)
        .collect()
}

/// Interfaces whose save control must be clicked; `None` is the single
/// section-wide control.
pub(crate) fn save_scopes(
    profile: &CapabilityProfile,
    schema: &SectionSchema,
    pending: &BTreeMap<String, String>,
) -> Vec<Option<String>> {
    if !profile.save_strategy(schema.section).is_per_interface() {
        return vec![None];
    }
    let interfaces: BTreeSet<String> = pending
        .keys()
        .filter_map(|name| schema.interface_of(name, &profile.network_interfaces))
        .collect();
    interfaces.into_iter().map(Some).collect()
}

async fn locate_controls<E>(
    engine: &mut E,
    profile: &CapabilityProfile,
    schema: &SectionSchema,
    pending: &BTreeMap<String, String>,
) -> ProbeResult<Vec<LocatedElement>>
where
    E: BrowserEngine + ?Sized,
{
    let strategy = profile.save_strategy(schema.section);
    let unscoped = unscoped_fields(profile, schema, pending);
    if !unscoped.is_empty() {
        return Err(ProbeError::invalid_state(format!(
            "{} on {} belong to no interface, and the section only has per-port save controls",
            unscoped.join(", "),
            schema.section
        )));
    }
    let scopes = save_scopes(profile, schema, pending);
    if scopes.is_empty() {
        return Err(ProbeError::save_failed(
            SaveFailureReason::NotDirty,
            SaveStage::CheckEnabled,
            "no edited interface to save",
        ));
    }

    let mut controls = Vec::with_capacity(scopes.len());
    for scope in &scopes {
        let candidates = strategy.candidates(scope.as_deref());
        if candidates.is_empty() {
            return Err(ProbeError::save_failed(
                SaveFailureReason::NotDirty,
                SaveStage::CheckEnabled,
                format!("device '{}' has no save control for {}", profile.model, schema.section),
            ));
        }
        let what = scope.as_deref().map_or_else(|| "save".to_string(), |iface| format!("save ({iface})"));
        controls.push(locate_first(engine, &what, &candidates).await?);
    }
    Ok(controls)
}

/// Whether every save control for the pending changes is present and enabled
pub(crate) async fn save_controls_enabled<E>(
    engine: &mut E,
    profile: &CapabilityProfile,
    schema: &SectionSchema,
    pending: &BTreeMap<String, String>,
) -> ProbeResult<bool>
where
    E: BrowserEngine + ?Sized,
{
    let controls = match locate_controls(engine, profile, schema, pending).await {
        Ok(controls) => controls,
        Err(ProbeError::FieldNotFound { .. } | ProbeError::SaveFailed { .. } | ProbeError::InvalidState { .. }) => {
            return Ok(false)
        }
        Err(e) => return Err(e),
    };
    for control in &controls {
        if !engine.is_enabled(&control.handle).await? {
            return Ok(false);
        }
    }
    Ok(true)
}

async fn first_visible_of<E>(engine: &mut E, candidates: &[Selector]) -> ProbeResult<Option<Selector>>
where
    E: BrowserEngine + ?Sized,
{
    for selector in candidates {
        if engine.any_visible(selector).await? {
            return Ok(Some(selector.clone()));
        }
    }
    Ok(None)
}

async fn all_controls_disabled<E>(engine: &mut E, controls: &[LocatedElement]) -> ProbeResult<bool>
where
    E: BrowserEngine + ?Sized,
{
    for control in controls {
        let current: Option<ElementHandle> = engine.first_visible(&control.selector).await?;
        match current {
            Some(handle) if engine.is_enabled(&handle).await? => return Ok(false),
            Some(_) => {}
            None => return Ok(false),
        }
    }
    Ok(true)
}
