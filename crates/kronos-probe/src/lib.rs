//! Kronos Probe: device-capability-driven adaptation layer for browser
//! tests of Kronos time-synchronization appliances.
//!
//! One set of test logic runs against every hardware variant: the
//! connected device is classified into a model, its capability profile is
//! looked up, and section controllers expose the same
//! navigate/read/write/save/cancel/verify operations everywhere. Device
//! differences are data, not control flow.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    KRONOS PROBE Architecture                    │
//! ├─────────────────────────────────────────────────────────────────┤
//! │   ┌────────────┐    ┌────────────┐    ┌──────────────────┐      │
//! │   │ Device     │    │ Capability │    │ Section          │      │
//! │   │ Classifier │───►│ Registry   │───►│ Controller       │      │
//! │   └────────────┘    └────────────┘    └────────┬─────────┘      │
//! │                                                │                │
//! │   ┌────────────┐    ┌────────────┐    ┌────────▼─────────┐      │
//! │   │ Browser    │◄───│ Adaptive   │◄───│ Change           │      │
//! │   │ Engine     │    │ Locator    │    │ Verification     │      │
//! │   └────────────┘    └────────────┘    └──────────────────┘      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use kronos_probe::{CapabilityRegistry, DeviceSession, ProbeConfig, SectionId, SimulatedDevice};
//!
//! # async fn run() -> kronos_probe::ProbeResult<()> {
//! let registry = CapabilityRegistry::kronos();
//! let config = ProbeConfig::new()
//!     .with_base_url("https://10.0.0.5")
//!     .with_device_model("KRONOS-2R-HVXX-A2F")
//!     .with_passwords("status", "config");
//! let profile = registry.lookup(&registry.classify(&config.device_model));
//! let engine = SimulatedDevice::new(profile, &config.base_url);
//!
//! let mut session = DeviceSession::open(engine, &registry, config)?;
//! session.login().await?;
//! let mut syslog = session.section(SectionId::Syslog);
//! syslog.navigate_and_load().await?;
//! syslog.set_field("serverAddress", "192.168.1.100").await?;
//! syslog.save().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::large_stack_arrays, clippy::large_stack_frames))]

mod auth;
mod capability;
mod config;
mod controller;
mod device;
mod engine;
mod field;
mod locator;
mod protocol;
mod result;
mod schema;
mod session;

/// Browser engine over Chromium (CDP)
#[cfg(feature = "browser")]
#[allow(clippy::missing_errors_doc, clippy::doc_markdown)]
pub mod cdp;

/// In-memory Kronos web UI for tests without a device
#[allow(clippy::missing_errors_doc, clippy::must_use_candidate)]
pub mod mock;

/// Tracing setup and per-operation timings
pub mod tracing_support;

/// Bounded polling waits
pub mod wait;

pub use auth::{authenticate, AuthLevel};
pub use capability::{
    CapabilityProfile, CapabilityRegistry, SaveButtonStrategy, SectionId, TimeoutMultiplier,
};
pub use config::{BaseTimeouts, ProbeConfig, ENV_BASE_URL, ENV_DEVICE_MODEL, ENV_PASSWORD};
pub use controller::{SectionContext, SectionController, SectionPhase, SectionState};
pub use device::{DeviceClassifier, DeviceModel, ModelAlias, Series};
pub use engine::{BrowserEngine, ElementHandle};
pub use field::{FieldDescriptor, FieldKind, TextFormat};
pub use locator::{locate_first, AdaptiveLocatorResolver, LocatedElement, Selector};
pub use mock::{SaveBehavior, SimulatedDevice};
pub use protocol::{ChangeVerificationProtocol, SaveConfirmation, SaveSignal};
pub use result::{ProbeError, ProbeResult, SaveFailureReason, SaveStage};
pub use schema::{
    ptp_constraint, FieldConstraint, Panel, SectionSchema, HTTPS_MODES, PTP_DEFAULT_PRIORITY, PTP_PROFILES,
    SYSLOG_DEFAULT_PORT,
};
pub use session::DeviceSession;
pub use tracing_support::{init_tracing, OperationTimings, TimedOperation};
pub use wait::{WaitOptions, WaitResult};

#[cfg(feature = "browser")]
pub use cdp::{ChromiumConfig, ChromiumEngine};
