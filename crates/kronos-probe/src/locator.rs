//! Selectors and adaptive field location.
//!
//! Different device series expose the same logical control through
//! different DOM attributes. [`AdaptiveLocatorResolver`] turns a logical
//! name into an ordered list of [`Selector`] candidates, then probes them
//! against the live page until one matches a visible element.
//!
//! ## Toyota Way Application
//!
//! - **Poka-Yoke**: No match is `FieldNotFound` listing every candidate, never a false success
//! - **Kaizen**: Unseen fields degrade to a generic heuristic instead of failing outright

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::capability::CapabilityProfile;
use crate::engine::{BrowserEngine, ElementHandle};
use crate::result::{ProbeError, ProbeResult};

// =============================================================================
// SELECTOR
// =============================================================================

/// One concrete UI query strategy
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selector {
    /// Raw CSS selector
    Css(String),
    /// `name` attribute equals
    NameEquals(String),
    /// `name` attribute contains
    NameContains(String),
    /// `id` attribute contains
    IdContains(String),
    /// Associated `<label>` text or `aria-label`
    Label(String),
    /// `placeholder` attribute equals
    Placeholder(String),
    /// Accessible role with exact accessible name
    Role {
        /// ARIA role (`button`, `link`, `textbox`, `checkbox`, `combobox`)
        role: String,
        /// Accessible name
        name: String,
    },
    /// Leaf element whose text contains the string
    Text(String),
    /// CSS selector filtered by contained text
    CssWithText {
        /// CSS selector
        css: String,
        /// Text to match
        text: String,
    },
}

impl Selector {
    /// CSS selector
    #[must_use]
    pub fn css(css: impl Into<String>) -> Self {
        Self::Css(css.into())
    }

    /// Exact `name` attribute
    #[must_use]
    pub fn name_equals(name: impl Into<String>) -> Self {
        Self::NameEquals(name.into())
    }

    /// `name` attribute substring
    #[must_use]
    pub fn name_contains(fragment: impl Into<String>) -> Self {
        Self::NameContains(fragment.into())
    }

    /// `id` attribute substring
    #[must_use]
    pub fn id_contains(fragment: impl Into<String>) -> Self {
        Self::IdContains(fragment.into())
    }

    /// Label text
    #[must_use]
    pub fn label(text: impl Into<String>) -> Self {
        Self::Label(text.into())
    }

    /// Placeholder attribute
    #[must_use]
    pub fn placeholder(text: impl Into<String>) -> Self {
        Self::Placeholder(text.into())
    }

    /// Role and accessible name
    #[must_use]
    pub fn role(role: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Role {
            role: role.into(),
            name: name.into(),
        }
    }

    /// Text content
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// CSS filtered by text
    #[must_use]
    pub fn css_with_text(css: impl Into<String>, text: impl Into<String>) -> Self {
        Self::CssWithText {
            css: css.into(),
            text: text.into(),
        }
    }

    /// Equivalent plain CSS, when one exists
    #[must_use]
    pub fn to_css(&self) -> Option<String> {
        match self {
            Self::Css(css) => Some(css.clone()),
            Self::NameEquals(n) => Some(format!("[name={}]", css_string(n))),
            Self::NameContains(n) => Some(format!("[name*={}]", css_string(n))),
            Self::IdContains(n) => Some(format!("[id*={}]", css_string(n))),
            Self::Placeholder(p) => Some(format!("[placeholder={}]", css_string(p))),
            Self::Label(_) | Self::Role { .. } | Self::Text(_) | Self::CssWithText { .. } => None,
        }
    }

    /// JavaScript expression evaluating to an array of matching elements
    #[must_use]
    pub fn to_query(&self) -> String {
        if let Some(css) = self.to_css() {
            return format!("Array.from(document.querySelectorAll({}))", js_string(&css));
        }
        match self {
            Self::Label(text) => format!(
                "Array.from(document.querySelectorAll('input,select,textarea,button')).filter(el => \
                 (el.getAttribute('aria-label') || '').trim() === {t} || \
                 Array.from(el.labels || []).some(l => l.textContent.trim().includes({t})))",
                t = js_string(text)
            ),
            Self::Role { role, name } => format!(
                "Array.from(document.querySelectorAll({css})).filter(el => \
                 (el.getAttribute('aria-label') || el.textContent || el.value || '').trim() === {n})",
                css = js_string(role_css(role)),
                n = js_string(name)
            ),
            Self::Text(text) => format!(
                "Array.from(document.querySelectorAll('body *')).filter(el => \
                 el.children.length === 0 && el.textContent.includes({}))",
                js_string(text)
            ),
            Self::CssWithText { css, text } => format!(
                "Array.from(document.querySelectorAll({})).filter(el => el.textContent.includes({}))",
                js_string(css),
                js_string(text)
            ),
            _ => "[]".to_string(),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Label(text) => write!(f, "label={text}"),
            Self::Role { role, name } => write!(f, "role={role}[name={name:?}]"),
            Self::Text(text) => write!(f, "text={text}"),
            Self::CssWithText { css, text } => write!(f, "{css}:has-text({text:?})"),
            other => match other.to_css() {
                Some(css) => f.write_str(&css),
                None => write!(f, "{other:?}"),
            },
        }
    }
}

/// CSS for the elements an ARIA role implicitly covers
#[must_use]
pub fn role_css(role: &str) -> &'static str {
    match role {
        "button" => "button,[role='button'],input[type='submit'],input[type='button']",
        "link" => "a[href],[role='link']",
        "textbox" => "input:not([type]),input[type='text'],input[type='password'],textarea,[role='textbox']",
        "checkbox" => "input[type='checkbox'],[role='checkbox']",
        "combobox" => "select,[role='combobox']",
        _ => "[role]",
    }
}

fn css_string(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

// =============================================================================
// RESOLVER
// =============================================================================

/// A candidate that matched a visible element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedElement {
    /// The live element
    pub handle: ElementHandle,
    /// Candidate that matched
    pub selector: Selector,
    /// Position of that candidate in the resolved list
    pub candidate_index: usize,
    /// Whether the element was enabled when located
    pub enabled: bool,
}

/// Maps logical field names to selector candidates for one device
#[derive(Debug, Clone)]
pub struct AdaptiveLocatorResolver {
    profile: Arc<CapabilityProfile>,
}

impl AdaptiveLocatorResolver {
    /// Create a resolver over a device profile
    #[must_use]
    pub const fn new(profile: Arc<CapabilityProfile>) -> Self {
        Self { profile }
    }

    /// Profile this resolver reads aliases from
    #[must_use]
    pub fn profile(&self) -> &CapabilityProfile {
        &self.profile
    }

    /// Ordered candidates for a logical name.
    ///
    /// A profile alias wins outright. Otherwise the generic heuristic is
    /// used: exact `name`, `name` substring, `id` substring, label.
    #[must_use]
    pub fn resolve(&self, logical_name: &str) -> Vec<Selector> {
        if let Some(candidates) = self.profile.field_aliases.get(logical_name) {
            if !candidates.is_empty() {
                return candidates.clone();
            }
        }
        Self::fallback(logical_name)
    }

    /// Generic heuristic for names no profile maps
    #[must_use]
    pub fn fallback(logical_name: &str) -> Vec<Selector> {
        vec![
            Selector::name_equals(logical_name),
            Selector::name_contains(logical_name),
            Selector::id_contains(logical_name),
            Selector::label(logical_name),
        ]
    }

    /// Resolve and probe a logical name against the live page
    pub async fn locate<E>(&self, engine: &mut E, logical_name: &str) -> ProbeResult<LocatedElement>
    where
        E: BrowserEngine + ?Sized,
    {
        let candidates = self.resolve(logical_name);
        locate_first(engine, logical_name, &candidates).await
    }
}

/// Return the first candidate matching a visible, enabled element.
///
/// Candidates are tried strictly in order; within one candidate, matches
/// are taken in document order. When no candidate has an enabled match,
/// the first visible but disabled match is returned with `enabled` unset,
/// so readers still see the value and writers can report it as not
/// editable. Nothing visible is `FieldNotFound`.
pub async fn locate_first<E>(engine: &mut E, what: &str, candidates: &[Selector]) -> ProbeResult<LocatedElement>
where
    E: BrowserEngine + ?Sized,
{
    let mut disabled: Option<LocatedElement> = None;
    for (candidate_index, selector) in candidates.iter().enumerate() {
        for handle in engine.query_all(selector).await? {
            if !engine.is_visible(&handle).await? {
                continue;
            }
            let enabled = engine.is_enabled(&handle).await?;
            if enabled {
                if candidate_index > 0 {
                    tracing::debug!(field = what, selector = %selector, candidate_index, "located via fallback candidate");
                }
                return Ok(LocatedElement {
                    handle,
                    selector: selector.clone(),
                    candidate_index,
                    enabled,
                });
            }
            if disabled.is_none() {
                disabled = Some(LocatedElement {
                    handle,
                    selector: selector.clone(),
                    candidate_index,
                    enabled,
                });
            }
        }
    }

    if let Some(located) = disabled {
        tracing::debug!(field = what, selector = %located.selector, "only disabled matches visible");
        return Ok(located);
    }
    Err(ProbeError::FieldNotFound {
        field: what.to_string(),
        tried: candidates.iter().map(ToString::to_string).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::CapabilityRegistry;
    use crate::device::DeviceModel;

    fn profile(key: &str) -> Arc<CapabilityProfile> {
        CapabilityRegistry::builtin().lookup(&DeviceModel::Known(key.to_string()))
    }

    mod selector_tests {
        use super::*;

        #[test]
        fn test_css_forms() {
            assert_eq!(Selector::name_equals("target_a").to_css().unwrap(), "[name=\"target_a\"]");
            assert_eq!(Selector::id_contains("eth1").to_css().unwrap(), "[id*=\"eth1\"]");
            assert_eq!(Selector::label("Server").to_css(), None);
        }

        #[test]
        fn test_css_quoting() {
            assert_eq!(
                Selector::name_equals("a\"b").to_css().unwrap(),
                "[name=\"a\\\"b\"]"
            );
        }

        #[test]
        fn test_to_query_is_array_expression() {
            let q = Selector::css("button#button_save").to_query();
            assert_eq!(q, "Array.from(document.querySelectorAll(\"button#button_save\"))");

            let q = Selector::role("button", "Save").to_query();
            assert!(q.contains("input[type='submit']"));
            assert!(q.contains("=== \"Save\""));

            let q = Selector::css_with_text("a[title*='locked']", "Configure").to_query();
            assert!(q.contains("textContent.includes(\"Configure\")"));
        }

        #[test]
        fn test_display() {
            assert_eq!(Selector::role("button", "Save").to_string(), "role=button[name=\"Save\"]");
            assert_eq!(Selector::text("Saving").to_string(), "text=Saving");
            assert_eq!(Selector::css("#x").to_string(), "#x");
        }

        #[test]
        fn test_yaml_shape() {
            let yaml = "- name_equals: target_a\n- css: \"input#srv\"\n- role:\n    role: button\n    name: Save\n";
            let parsed: Vec<Selector> = serde_yaml_ng::with::singleton_map_recursive::deserialize(
                serde_yaml_ng::Deserializer::from_str(yaml),
            )
            .unwrap();
            assert_eq!(
                parsed,
                vec![
                    Selector::name_equals("target_a"),
                    Selector::css("input#srv"),
                    Selector::role("button", "Save"),
                ]
            );
        }
    }

    mod resolver_tests {
        use super::*;

        #[test]
        fn test_alias_hit_returns_profile_candidates() {
            let resolver = AdaptiveLocatorResolver::new(profile("KRONOS-2R-HVXX-A2F"));
            assert_eq!(
                resolver.resolve("ipAddress"),
                vec![Selector::name_equals("ipaddr"), Selector::name_equals("ip_eth0")]
            );
        }

        #[test]
        fn test_alias_differs_by_series() {
            let s3 = AdaptiveLocatorResolver::new(profile("KRONOS-3R-HVLV-TCXO-A2F"));
            assert_eq!(s3.resolve("ipAddress")[0], Selector::name_equals("ip_eth0"));
        }

        #[test]
        fn test_fallback_order() {
            let resolver = AdaptiveLocatorResolver::new(profile("KRONOS-2R-HVXX-A2F"));
            assert_eq!(
                resolver.resolve("dns_server"),
                vec![
                    Selector::name_equals("dns_server"),
                    Selector::name_contains("dns_server"),
                    Selector::id_contains("dns_server"),
                    Selector::label("dns_server"),
                ]
            );
        }

        #[test]
        fn test_unknown_profile_uses_fallback() {
            let unknown = Arc::new(CapabilityProfile::unknown("ZZZ-000"));
            let resolver = AdaptiveLocatorResolver::new(unknown);
            assert_eq!(resolver.resolve("identifier").len(), 4);
        }
    }

    mod locate_tests {
        use super::*;
        use crate::mock::SimulatedDevice;

        const BASE: &str = "https://10.0.0.5";

        async fn network_page() -> SimulatedDevice {
            let mut d = SimulatedDevice::new(profile("KRONOS-3R-HVXX-TCXO-44A"), BASE).logged_in();
            d.navigate(&format!("{BASE}/network")).await.unwrap();
            d
        }

        #[tokio::test]
        async fn test_enabled_fallback_beats_disabled_primary() {
            let mut d = network_page().await;
            let ip = d.query(&Selector::name_equals("ip_eth3")).await.unwrap().unwrap();
            d.fill(&ip, "10.0.3.1").await.unwrap();

            let candidates = [
                Selector::css("button#button_save_port_eth0"),
                Selector::css("button#button_save_port_eth3"),
            ];
            let located = locate_first(&mut d, "save", &candidates).await.unwrap();
            assert_eq!(located.handle.id, "save:eth3");
            assert_eq!(located.candidate_index, 1);
            assert!(located.enabled);
        }

        #[tokio::test]
        async fn test_enabled_match_wins_within_one_candidate() {
            let mut d = network_page().await;
            let located = locate_first(&mut d, "button", &[Selector::css("button")]).await.unwrap();
            assert_eq!(located.handle.id, "cancel");
            assert!(located.enabled);
        }

        #[tokio::test]
        async fn test_disabled_match_when_nothing_enabled() {
            let mut d = network_page().await;
            let candidates = [
                Selector::css("button#button_save_port_eth0"),
                Selector::css("button#button_save_port_eth1"),
            ];
            let located = locate_first(&mut d, "save", &candidates).await.unwrap();
            assert_eq!(located.handle.id, "save:eth0");
            assert_eq!(located.candidate_index, 0);
            assert!(!located.enabled);
        }

        #[tokio::test]
        async fn test_nothing_visible_is_not_found() {
            let mut d = network_page().await;
            let candidates = [Selector::css("button#button_save_port_eth2"), Selector::name_equals("ip_eth2")];
            match locate_first(&mut d, "eth2", &candidates).await.unwrap_err() {
                ProbeError::FieldNotFound { field, tried } => {
                    assert_eq!(field, "eth2");
                    assert_eq!(tried.len(), 2);
                }
                other => panic!("unexpected error: {other}"),
            }
        }
    }
}
