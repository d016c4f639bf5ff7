//! Two-level device authentication.
//!
//! Kronos units gate the web UI twice: a status login that makes pages
//! readable, then a configuration unlock that makes form fields editable.
//! Both levels are driven through the same [`BrowserEngine`] seam as the
//! section controllers, with waits scaled for the device.

use std::fmt;
use std::str::FromStr;

use crate::capability::CapabilityProfile;
use crate::controller::SectionContext;
use crate::engine::BrowserEngine;
use crate::locator::{locate_first, Selector};
use crate::result::{ProbeError, ProbeResult};
use crate::wait::{wait_for_hidden, wait_for_url, wait_for_visible};

const AUTHENTICATE_PATH: &str = "/authenticate";
const UNLOCK_PATH: &str = "/login";

/// Authentication level offered by the device UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthLevel {
    /// Read-only status login
    Status,
    /// Configuration unlock
    Configuration,
}

impl AuthLevel {
    /// Name used in capability profiles
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Configuration => "configuration",
        }
    }
}

impl fmt::Display for AuthLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthLevel {
    type Err = ProbeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "status" => Ok(Self::Status),
            "configuration" | "config" => Ok(Self::Configuration),
            other => Err(ProbeError::config(format!("unknown authentication level '{other}'"))),
        }
    }
}

fn password_inputs(name: &str) -> Vec<Selector> {
    vec![
        Selector::placeholder("Password"),
        Selector::css(format!("input[name='{name}']")),
        Selector::css("input[type='password']"),
    ]
}

fn submit_controls() -> Vec<Selector> {
    vec![Selector::role("button", "Submit"), Selector::css("input[type='submit']")]
}

fn unlock_links() -> Vec<Selector> {
    vec![
        Selector::css_with_text("a[title*='locked']", "Configure"),
        Selector::css("a[href='login']"),
        Selector::text("Configure"),
    ]
}

/// Navigation links for every section the device offers
fn section_links(profile: &CapabilityProfile) -> Vec<Selector> {
    profile
        .available_sections
        .iter()
        .map(|section| Selector::role("link", section.label()))
        .collect()
}

/// Masks shown while the GNSS receiver state loads after a login
fn satellite_loading_indicators() -> Vec<Selector> {
    vec![
        Selector::text("Loading satellite data"),
        Selector::css(".page_loading_mask"),
        Selector::css(".pageLoadingMask"),
    ]
}

/// Wait out the satellite data mask that follows each authentication level
async fn await_satellite_data<E>(engine: &mut E, context: &SectionContext) -> ProbeResult<()>
where
    E: BrowserEngine + ?Sized,
{
    let options = context.wait(context.timeouts.satellite_ms);
    let result = wait_for_hidden(engine, &satellite_loading_indicators(), options).await?;
    if !result.elapsed.is_zero() {
        tracing::debug!(elapsed = ?result.elapsed, "satellite data loaded");
    }
    Ok(())
}

fn path_ends_with(url: &str, path: &str) -> bool {
    url.split(['?', '#'])
        .next()
        .unwrap_or_default()
        .trim_end_matches('/')
        .ends_with(path)
}

/// Pass one authentication level.
///
/// `level` must be listed in the device profile. The status level is a
/// no-op when the session is already past the login page; the
/// configuration level is a no-op when no unlock link is shown.
pub async fn authenticate<E>(
    engine: &mut E,
    context: &SectionContext,
    level: &str,
    password: &str,
) -> ProbeResult<()>
where
    E: BrowserEngine + ?Sized,
{
    let profile = &context.profile;
    let parsed = level.parse::<AuthLevel>().ok();
    let Some(parsed) = parsed.filter(|p| profile.supports_auth_level(p.as_str())) else {
        return Err(ProbeError::AuthLevelUnsupported {
            level: level.to_string(),
            model: profile.model.clone(),
        });
    };

    tracing::info!(model = %profile.model, level = %parsed, "authenticating");
    match parsed {
        AuthLevel::Status => status_login(engine, context, password).await,
        AuthLevel::Configuration => configuration_unlock(engine, context, password).await,
    }
}

async fn status_login<E>(engine: &mut E, context: &SectionContext, password: &str) -> ProbeResult<()>
where
    E: BrowserEngine + ?Sized,
{
    let element_wait = context.wait(context.timeouts.element_ms);
    let nav_wait = context.wait(context.timeouts.navigation_ms);

    engine.navigate(&format!("{}/", context.base_url)).await?;
    if !path_ends_with(&engine.current_url().await?, AUTHENTICATE_PATH) {
        tracing::debug!("status login already established");
        return Ok(());
    }

    let input = wait_for_visible(engine, &password_inputs("sts_password"), element_wait).await?;
    engine.fill(&input, password).await?;
    let submit = wait_for_visible(engine, &submit_controls(), element_wait).await?;
    engine.click(&submit).await?;

    wait_for_url(
        engine,
        "login page to close",
        |url| !path_ends_with(url, AUTHENTICATE_PATH),
        nav_wait,
    )
    .await
    .map_err(|e| match e {
        ProbeError::Timeout { ms, .. } => ProbeError::AuthenticationFailed {
            level: AuthLevel::Status.to_string(),
            message: format!("still on the login page after {ms}ms"),
        },
        other => other,
    })?;
    await_satellite_data(engine, context).await?;
    tracing::info!(model = %context.profile.model, "status login complete");
    Ok(())
}

async fn configuration_unlock<E>(engine: &mut E, context: &SectionContext, password: &str) -> ProbeResult<()>
where
    E: BrowserEngine + ?Sized,
{
    let element_wait = context.wait(context.timeouts.element_ms);
    let nav_wait = context.wait(context.timeouts.navigation_ms);
    let failed = |message: String| ProbeError::AuthenticationFailed {
        level: AuthLevel::Configuration.to_string(),
        message,
    };

    engine.navigate(&format!("{}/", context.base_url)).await?;
    if path_ends_with(&engine.current_url().await?, AUTHENTICATE_PATH) {
        return Err(failed("status login required before the configuration unlock".to_string()));
    }
    await_satellite_data(engine, context).await?;

    let link = match locate_first(engine, "configure link", &unlock_links()).await {
        Ok(link) => link,
        Err(ProbeError::FieldNotFound { .. }) => {
            tracing::debug!("configuration already unlocked");
            return Ok(());
        }
        Err(e) => return Err(e),
    };
    engine.click(&link.handle).await?;

    let input = wait_for_visible(engine, &password_inputs("cfg_password"), element_wait).await?;
    engine.fill(&input, password).await?;
    let submit = wait_for_visible(engine, &submit_controls(), element_wait).await?;
    engine.click(&submit).await?;

    wait_for_url(engine, "unlock page to close", |url| !path_ends_with(url, UNLOCK_PATH), nav_wait)
        .await
        .map_err(|e| match e {
            ProbeError::Timeout { ms, .. } => failed(format!("still on the unlock page after {ms}ms")),
            other => other,
        })?;
    await_satellite_data(engine, context).await?;
    wait_for_visible(engine, &section_links(&context.profile), nav_wait).await?;
    tracing::info!(model = %context.profile.model, "configuration unlocked");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::capability::{CapabilityRegistry, SectionId};
    use crate::device::DeviceModel;
    use crate::mock::SimulatedDevice;

    const BASE: &str = "https://10.0.0.5";
    const MODEL: &str = "KRONOS-3R-HVXX-TCXO-44A";

    fn context(model: &str) -> SectionContext {
        let profile = CapabilityRegistry::builtin().lookup(&DeviceModel::Known(model.to_string()));
        SectionContext::new(BASE, profile)
    }

    fn device() -> SimulatedDevice {
        SimulatedDevice::new(context(MODEL).profile, BASE).with_passwords("sts", "cfg")
    }

    #[test]
    fn test_level_parsing() {
        assert_eq!("Status".parse::<AuthLevel>().unwrap(), AuthLevel::Status);
        assert_eq!("config".parse::<AuthLevel>().unwrap(), AuthLevel::Configuration);
        assert!("admin".parse::<AuthLevel>().is_err());
    }

    #[test]
    fn test_section_links_cover_profile() {
        let links = section_links(&context(MODEL).profile);
        assert!(links.contains(&Selector::role("link", "General")));
        assert!(links.contains(&Selector::role("link", "PTP")));
        assert!(links.contains(&Selector::role("link", "GNSS")));
        assert!(!links.contains(&Selector::role("link", "Ptp")));
    }

    #[test]
    fn test_path_ends_with() {
        assert!(path_ends_with("https://x/authenticate", AUTHENTICATE_PATH));
        assert!(path_ends_with("https://x/authenticate/?next=1", AUTHENTICATE_PATH));
        assert!(!path_ends_with("https://x/", AUTHENTICATE_PATH));
    }

    #[tokio::test]
    async fn test_both_levels() {
        let ctx = context(MODEL);
        let mut d = device();
        authenticate(&mut d, &ctx, "status", "sts").await.unwrap();
        assert!(!d.is_unlocked());
        authenticate(&mut d, &ctx, "configuration", "cfg").await.unwrap();
        assert!(d.is_unlocked());

        // Both levels are idempotent
        authenticate(&mut d, &ctx, "status", "sts").await.unwrap();
        authenticate(&mut d, &ctx, "configuration", "cfg").await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_wrong_status_password() {
        let ctx = context(MODEL);
        let mut d = device();
        let err = authenticate(&mut d, &ctx, "status", "nope").await.unwrap_err();
        match err {
            ProbeError::AuthenticationFailed { level, message } => {
                assert_eq!(level, "status");
                assert!(message.contains("45000ms"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_wrong_config_password() {
        let ctx = context(MODEL);
        let mut d = device();
        authenticate(&mut d, &ctx, "status", "sts").await.unwrap();
        let err = authenticate(&mut d, &ctx, "configuration", "nope").await.unwrap_err();
        assert!(matches!(err, ProbeError::AuthenticationFailed { ref level, .. } if level == "configuration"));
        assert!(!d.is_unlocked());
    }

    #[tokio::test]
    async fn test_unlock_requires_status_login() {
        let ctx = context(MODEL);
        let mut d = device();
        let err = authenticate(&mut d, &ctx, "configuration", "cfg").await.unwrap_err();
        assert!(matches!(err, ProbeError::AuthenticationFailed { .. }));
    }

    #[tokio::test]
    async fn test_level_aliases_authenticate() {
        let ctx = context(MODEL);
        let mut d = device();
        authenticate(&mut d, &ctx, "Status", "sts").await.unwrap();
        authenticate(&mut d, &ctx, "config", "cfg").await.unwrap();
        assert!(d.is_unlocked());
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_out_satellite_loading_after_each_level() {
        let ctx = context(MODEL);
        let mut d = device().with_satellite_loading_polls(3);
        authenticate(&mut d, &ctx, "status", "sts").await.unwrap();
        assert!(!d.any_visible(&Selector::text("Loading satellite data")).await.unwrap());

        authenticate(&mut d, &ctx, "configuration", "cfg").await.unwrap();
        assert!(d.is_unlocked());
        assert!(!d.any_visible(&Selector::text("Loading satellite data")).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_satellite_loading_that_never_ends_times_out() {
        let ctx = context(MODEL);
        let mut d = device().with_satellite_loading_polls(u32::MAX);
        let err = authenticate(&mut d, &ctx, "status", "sts").await.unwrap_err();
        assert!(err.is_timeout());
        assert!(err.to_string().contains("30000"));
    }

    #[tokio::test]
    async fn test_unsupported_levels() {
        let ctx = context(MODEL);
        let mut d = device();
        let err = authenticate(&mut d, &ctx, "admin", "x").await.unwrap_err();
        assert!(matches!(err, ProbeError::AuthLevelUnsupported { .. }));

        let unknown = SectionContext::new(BASE, Arc::new(crate::capability::CapabilityProfile::unknown("ZZZ-000")));
        let err = authenticate(&mut d, &unknown, "status", "sts").await.unwrap_err();
        assert!(matches!(err, ProbeError::AuthLevelUnsupported { ref model, .. } if model == "ZZZ-000"));
        assert!(d.history().is_empty());
    }

    #[tokio::test]
    async fn test_unlocked_fields_become_editable() {
        let ctx = context(MODEL);
        let mut d = device();
        authenticate(&mut d, &ctx, "status", "sts").await.unwrap();
        authenticate(&mut d, &ctx, "configuration", "cfg").await.unwrap();
        d.navigate(&format!("{BASE}{}", SectionId::General.path())).await.unwrap();
        let field = d.query(&Selector::name_equals("location")).await.unwrap().unwrap();
        assert!(d.is_editable(&field).await.unwrap());
    }
}
