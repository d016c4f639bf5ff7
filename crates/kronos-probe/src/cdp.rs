//! Chromium engine over the Chrome `DevTools` Protocol.
//!
//! [`ChromiumEngine`] implements [`BrowserEngine`] with chromiumoxide by
//! evaluating small JavaScript snippets in the page. Matched elements are
//! tagged with a generated `data-kp-handle` attribute so later calls can
//! find them again; a handle whose element left the DOM is reported as an
//! engine error.
//!
//! Every fill dispatches `input`, `change` and `blur`, which is what Kronos
//! firmware listens for before enabling its save controls.

use std::sync::Arc;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig as CdpConfig};
use chromiumoxide::cdp::browser_protocol::dom::SetFileInputFilesParams;
use chromiumoxide::page::Page as CdpPage;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::engine::{BrowserEngine, ElementHandle};
use crate::locator::Selector;
use crate::result::{ProbeError, ProbeResult};

const HANDLE_ATTRIBUTE: &str = "data-kp-handle";

/// Browser launch options
#[derive(Debug, Clone)]
pub struct ChromiumConfig {
    /// Run without a visible window
    pub headless: bool,
    /// Window width
    pub viewport_width: u32,
    /// Window height
    pub viewport_height: u32,
    /// Path to chromium binary (None = auto-detect)
    pub chromium_path: Option<String>,
    /// Sandbox mode (disable for containers)
    pub sandbox: bool,
    /// Accept the self-signed certificates Kronos units ship with
    pub ignore_https_errors: bool,
}

impl Default for ChromiumConfig {
    fn default() -> Self {
        Self {
            headless: true,
            viewport_width: 1280,
            viewport_height: 900,
            chromium_path: None,
            sandbox: true,
            ignore_https_errors: true,
        }
    }
}

impl ChromiumConfig {
    /// Set headless mode
    #[must_use]
    pub const fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Set window dimensions
    #[must_use]
    pub const fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport_width = width;
        self.viewport_height = height;
        self
    }

    /// Set chromium path
    #[must_use]
    pub fn with_chromium_path(mut self, path: impl Into<String>) -> Self {
        self.chromium_path = Some(path.into());
        self
    }

    /// Disable sandbox (for containers/CI)
    #[must_use]
    pub const fn with_no_sandbox(mut self) -> Self {
        self.sandbox = false;
        self
    }
}

/// [`BrowserEngine`] backed by a real Chromium page
#[derive(Debug)]
pub struct ChromiumEngine {
    browser: Arc<Mutex<CdpBrowser>>,
    page: Arc<Mutex<CdpPage>>,
    handle_prefix: String,
    handler: tokio::task::JoinHandle<()>,
}

fn engine_error(e: impl std::fmt::Display) -> ProbeError {
    ProbeError::engine(e.to_string())
}

impl ChromiumEngine {
    /// Launch chromium and open a blank page
    pub async fn launch(config: ChromiumConfig) -> ProbeResult<Self> {
        let mut builder = CdpConfig::builder().window_size(config.viewport_width, config.viewport_height);
        if !config.headless {
            builder = builder.with_head();
        }
        if !config.sandbox {
            builder = builder.no_sandbox();
        }
        if config.ignore_https_errors {
            builder = builder.arg("--ignore-certificate-errors");
        }
        if let Some(ref path) = config.chromium_path {
            builder = builder.chrome_executable(path);
        }
        let cdp_config = builder.build().map_err(engine_error)?;

        let (browser, mut handler) = CdpBrowser::launch(cdp_config).await.map_err(engine_error)?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser.new_page("about:blank").await.map_err(engine_error)?;
        tracing::info!(headless = config.headless, "chromium launched");
        Ok(Self {
            browser: Arc::new(Mutex::new(browser)),
            page: Arc::new(Mutex::new(page)),
            handle_prefix: Uuid::new_v4().simple().to_string(),
            handler,
        })
    }

    /// Close the browser
    pub async fn close(self) -> ProbeResult<()> {
        let mut browser = self.browser.lock().await;
        browser.close().await.map_err(engine_error)?;
        self.handler.abort();
        Ok(())
    }

    async fn eval<T: DeserializeOwned>(&self, expression: &str) -> ProbeResult<T> {
        let page = self.page.lock().await;
        let result = page.evaluate(expression).await.map_err(engine_error)?;
        result.into_value().map_err(engine_error)
    }

    async fn set_files(&self, element: &ElementHandle, path: &str) -> ProbeResult<()> {
        let page = self.page.lock().await;
        let node = page.find_element(handle_css(element)).await.map_err(engine_error)?;
        let params = SetFileInputFilesParams::builder()
            .files(vec![path.to_string()])
            .backend_node_id(node.backend_node_id)
            .build()
            .map_err(ProbeError::engine)?;
        page.execute(params).await.map_err(engine_error)?;
        Ok(())
    }
}

fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

fn handle_css(element: &ElementHandle) -> String {
    format!("[{HANDLE_ATTRIBUTE}={}]", js_string(&element.id))
}

/// Tag every match with a stable handle and return `[handle, tag]` pairs
fn query_script(selector: &Selector, prefix: &str) -> String {
    format!(
        "(() => {{ \
           let seq = window.__kpSeq || 0; \
           const out = ({query}).map(el => {{ \
             if (!el.hasAttribute('{HANDLE_ATTRIBUTE}')) {{ seq += 1; el.setAttribute('{HANDLE_ATTRIBUTE}', {prefix} + '-' + seq); }} \
             return [el.getAttribute('{HANDLE_ATTRIBUTE}'), el.tagName.toLowerCase()]; \
           }}); \
           window.__kpSeq = seq; \
           return out; \
         }})()",
        query = selector.to_query(),
        prefix = js_string(prefix),
    )
}

/// Run `body` with `el` bound to the handle's element
fn element_script(element: &ElementHandle, body: &str) -> String {
    format!(
        "(() => {{ \
           const el = document.querySelector({css}); \
           if (!el) {{ throw new Error('stale element handle ' + {id}); }} \
           {body} \
         }})()",
        css = js_string(&handle_css(element)),
        id = js_string(&element.id),
    )
}

const VISIBLE_BODY: &str = "const r = el.getBoundingClientRect(); const s = window.getComputedStyle(el); \
     return r.width > 0 && r.height > 0 && s.visibility !== 'hidden' && s.display !== 'none';";

const ENABLED_BODY: &str = "return !el.disabled && el.getAttribute('aria-disabled') !== 'true';";

const EDITABLE_BODY: &str =
    "return !el.disabled && !el.readOnly && el.getAttribute('aria-disabled') !== 'true';";

const VALUE_BODY: &str = "if (el.type === 'checkbox' || el.type === 'radio') { return String(el.checked); } \
     if (el.tagName !== 'BUTTON' && 'value' in el) { return String(el.value); } \
     return (el.textContent || '').trim();";

const INPUT_TYPE_BODY: &str = "return (el.type || '').toLowerCase();";

const CLICK_BODY: &str = "el.scrollIntoView({ block: 'center' }); el.click(); return true;";

fn fill_body(value: &str) -> String {
    format!(
        "const v = {v}; \
         if (el.type === 'checkbox' || el.type === 'radio') {{ el.checked = v === 'true'; }} \
         else if (el.tagName === 'SELECT') {{ \
           const opt = Array.from(el.options).find(o => o.value === v || o.text.trim() === v); \
           if (!opt) {{ throw new Error('no option ' + v); }} \
           el.value = opt.value; \
         }} else {{ el.focus(); el.value = v; }} \
         for (const t of ['input', 'change', 'blur']) {{ el.dispatchEvent(new Event(t, {{ bubbles: true }})); }} \
         return true;",
        v = js_string(value)
    )
}

#[async_trait]
impl BrowserEngine for ChromiumEngine {
    async fn navigate(&mut self, url: &str) -> ProbeResult<()> {
        tracing::debug!(url, "navigate");
        let page = self.page.lock().await;
        page.goto(url).await.map_err(engine_error)?;
        Ok(())
    }

    async fn reload(&mut self) -> ProbeResult<()> {
        let page = self.page.lock().await;
        page.reload().await.map_err(engine_error)?;
        Ok(())
    }

    async fn current_url(&mut self) -> ProbeResult<String> {
        let page = self.page.lock().await;
        Ok(page.url().await.map_err(engine_error)?.unwrap_or_default())
    }

    async fn query_all(&mut self, selector: &Selector) -> ProbeResult<Vec<ElementHandle>> {
        let pairs: Vec<(String, String)> = self.eval(&query_script(selector, &self.handle_prefix)).await?;
        Ok(pairs
            .into_iter()
            .map(|(id, tag)| ElementHandle::new(id, tag))
            .collect())
    }

    async fn is_visible(&mut self, element: &ElementHandle) -> ProbeResult<bool> {
        self.eval(&element_script(element, VISIBLE_BODY)).await
    }

    async fn is_enabled(&mut self, element: &ElementHandle) -> ProbeResult<bool> {
        self.eval(&element_script(element, ENABLED_BODY)).await
    }

    async fn is_editable(&mut self, element: &ElementHandle) -> ProbeResult<bool> {
        self.eval(&element_script(element, EDITABLE_BODY)).await
    }

    async fn read_value(&mut self, element: &ElementHandle) -> ProbeResult<String> {
        self.eval(&element_script(element, VALUE_BODY)).await
    }

    async fn fill(&mut self, element: &ElementHandle, value: &str) -> ProbeResult<()> {
        let input_type: String = self.eval(&element_script(element, INPUT_TYPE_BODY)).await?;
        if input_type == "file" {
            return self.set_files(element, value).await;
        }
        let _: bool = self.eval(&element_script(element, &fill_body(value))).await?;
        Ok(())
    }

    async fn click(&mut self, element: &ElementHandle) -> ProbeResult<()> {
        let _: bool = self.eval(&element_script(element, CLICK_BODY)).await?;
        Ok(())
    }
}
