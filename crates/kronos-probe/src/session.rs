//! Explicit device session.
//!
//! The runner hands over a browser engine and the raw model identifier it
//! detected; [`DeviceSession::open`] classifies the device and resolves its
//! capability profile exactly once. Section controllers are created from
//! the session and borrow its engine, so only one section is driven at a
//! time.

use std::sync::Arc;

use crate::auth;
use crate::capability::{CapabilityProfile, CapabilityRegistry, SectionId};
use crate::config::ProbeConfig;
use crate::controller::{SectionContext, SectionController};
use crate::device::DeviceModel;
use crate::engine::BrowserEngine;
use crate::result::{ProbeError, ProbeResult};
use crate::tracing_support::{OperationClock, OperationTimings};

/// One browser driving one device
pub struct DeviceSession<E: BrowserEngine> {
    engine: E,
    model: DeviceModel,
    context: SectionContext,
    config: ProbeConfig,
    timings: OperationTimings,
}

impl<E: BrowserEngine> std::fmt::Debug for DeviceSession<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("model", &self.model)
            .field("base_url", &self.context.base_url)
            .field("operations", &self.timings.operations.len())
            .finish_non_exhaustive()
    }
}

impl<E: BrowserEngine> DeviceSession<E> {
    /// Classify the configured device and resolve its profile.
    ///
    /// An empty model identifier means the runner detected nothing and is
    /// rejected as `UnknownDevice`. Any other unrecognized identifier
    /// opens a session on the sentinel profile, where every section is
    /// unavailable.
    pub fn open(engine: E, registry: &CapabilityRegistry, config: ProbeConfig) -> ProbeResult<Self> {
        let raw = config.device_model.trim();
        if raw.is_empty() {
            return Err(ProbeError::UnknownDevice { raw: String::new() });
        }

        let model = registry.classify(raw);
        let profile = registry.lookup(&model);
        if model.is_known() {
            tracing::info!(
                model = %model,
                series = %profile.series,
                sections = profile.available_sections.len(),
                multiplier = %profile.timeout_multiplier,
                "device session opened"
            );
        } else {
            tracing::warn!(raw = raw, "device session opened on unknown hardware");
        }

        let context = SectionContext::new(config.base_url.clone(), profile)
            .with_timeouts(config.base_timeouts)
            .with_verify_persistence(config.verify_persistence);
        Ok(Self {
            engine,
            timings: OperationTimings::new(model.key()),
            model,
            context,
            config,
        })
    }

    /// Classified model
    #[must_use]
    pub const fn model(&self) -> &DeviceModel {
        &self.model
    }

    /// Resolved profile
    #[must_use]
    pub fn profile(&self) -> &Arc<CapabilityProfile> {
        &self.context.profile
    }

    /// Shared controller inputs
    #[must_use]
    pub const fn context(&self) -> &SectionContext {
        &self.context
    }

    /// Session configuration
    #[must_use]
    pub const fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Refuse up front when the device is not recognized
    pub fn require_known(&self) -> ProbeResult<&str> {
        self.model.require_known()
    }

    /// Whether the device offers `section`
    #[must_use]
    pub fn is_section_available(&self, section: SectionId) -> bool {
        self.context.profile.is_section_available(section)
    }

    /// Pass one authentication level with an explicit password
    pub async fn authenticate(&mut self, level: &str, password: &str) -> ProbeResult<()> {
        let clock = OperationClock::start("authenticate", None);
        let result = auth::authenticate(&mut self.engine, &self.context, level, password).await;
        self.timings.finish(clock, &result);
        result
    }

    /// Status login then configuration unlock with the configured passwords
    pub async fn login(&mut self) -> ProbeResult<()> {
        let status = self.config.status_password.clone();
        let config = self.config.config_password.clone();
        self.authenticate("status", &status).await?;
        if self.context.profile.supports_auth_level("configuration") {
            self.authenticate("configuration", &config).await?;
        }
        Ok(())
    }

    /// Controller for one section, borrowing the session's engine
    pub fn section(&mut self, section: SectionId) -> SectionController<'_, E> {
        SectionController::new(&mut self.engine, self.context.clone(), section).with_timings(&mut self.timings)
    }

    /// Timings recorded so far
    #[must_use]
    pub const fn timings(&self) -> &OperationTimings {
        &self.timings
    }

    /// Direct engine access
    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// Engine and timings, ending the session
    pub fn into_parts(self) -> (E, OperationTimings) {
        (self.engine, self.timings)
    }
}
