use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use playwright::api::{Browser, BrowserContext, Cookie, Page, Viewport};
use playwright::Playwright;
use tracing::{debug, info, warn};

use super::{AutomationContext, AutomationSurface, ContextOptions, SurfaceError, SurfaceResult};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/116.0.0.0 Safari/537.36";

const VIEWPORT_WIDTH: i32 = 1280;
const VIEWPORT_HEIGHT: i32 = 800;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Third-party analytics endpoints that only waste bandwidth during
/// automation. Requests to these hosts are dropped in-page.
const ANALYTICS_HOSTS: &[&str] = &[
    "googletagmanager.com",
    "google-analytics.com",
    "www.google-analytics.com",
    "analytics.google.com",
    "doubleclick.net",
    "facebook.net",
    "connect.facebook.net",
    "mixpanel.com",
    "segment.io",
    "cdn.segment.com",
    "hotjar.com",
    "fullstory.com",
    "static.cloudflareinsights.com",
];

/// Installed after every navigation. Queues alert/confirm messages so
/// the workflow can read them, hides the webdriver flag, and drops
/// analytics traffic when a host list is embedded.
const PAGE_HOOK_TEMPLATE: &str = r#"() => {
    if (window.__autoHooksInstalled) { return true; }
    window.__autoHooksInstalled = true;
    window.__dialogQueue = [];
    const push = (m) => { try { window.__dialogQueue.push(String(m)); } catch (e) {} };
    window.alert = (m) => { push(m); };
    window.confirm = (m) => { push(m); return true; };
    try {
        Object.defineProperty(navigator, 'webdriver', { get: () => false });
    } catch (e) {}
    const blocked = __BLOCKED_HOSTS__;
    if (blocked.length > 0) {
        const isBlocked = (u) => {
            try { return blocked.some((h) => String(u).includes(h)); } catch (e) { return false; }
        };
        const realFetch = window.fetch;
        window.fetch = (input, init) => {
            const u = typeof input === 'string' ? input : (input && input.url) || '';
            if (isBlocked(u)) { return Promise.resolve(new Response('', { status: 204 })); }
            return realFetch(input, init);
        };
        const realOpen = XMLHttpRequest.prototype.open;
        const realSend = XMLHttpRequest.prototype.send;
        XMLHttpRequest.prototype.open = function (...a) {
            this.__blockedRequest = a.length > 1 && isBlocked(a[1]);
            if (!this.__blockedRequest) { return realOpen.apply(this, a); }
        };
        XMLHttpRequest.prototype.send = function (...a) {
            if (!this.__blockedRequest) { return realSend.apply(this, a); }
        };
        if (navigator.sendBeacon) {
            const realBeacon = navigator.sendBeacon.bind(navigator);
            navigator.sendBeacon = (u, d) => (isBlocked(u) ? true : realBeacon(u, d));
        }
    }
    return true;
}"#;

const DRAIN_DIALOGS_JS: &str =
    "() => { const q = window.__dialogQueue || []; window.__dialogQueue = []; return q; }";

/// Launches one bundled Chromium and hands out isolated contexts.
pub struct PlaywrightSurface {
    _playwright: Playwright,
    browser: Browser,
}

impl PlaywrightSurface {
    pub async fn launch(
        headless: bool,
        low_resource: bool,
        launch_args: &[String],
    ) -> SurfaceResult<Self> {
        info!("Initializing Playwright...");
        let playwright = Playwright::initialize().await.map_err(|e| {
            SurfaceError::Connection(format!("Failed to initialize Playwright: {}", e))
        })?;
        playwright.prepare().map_err(|e| {
            SurfaceError::Connection(format!("Failed to prepare Playwright browsers: {}", e))
        })?;

        let chromium = playwright.chromium();
        let args: Vec<String> = if low_resource {
            launch_args.to_vec()
        } else {
            Vec::new()
        };

        info!(headless, low_resource, "Launching Chromium...");
        let browser = chromium
            .launcher()
            .headless(headless)
            .args(&args)
            .launch()
            .await
            .map_err(|e| SurfaceError::Connection(format!("Failed to launch Chromium: {}", e)))?;

        info!("Chromium launched.");
        Ok(Self {
            _playwright: playwright,
            browser,
        })
    }
}

/// Renders the page hook for one context. Performant contexts get the
/// analytics denylist embedded; plain contexts block nothing.
fn page_hook(performant: bool) -> String {
    let hosts: Vec<&str> = if performant {
        ANALYTICS_HOSTS.to_vec()
    } else {
        Vec::new()
    };
    // Serializing a &str slice cannot fail.
    let hosts_json = serde_json::to_string(&hosts).unwrap_or_else(|_| "[]".to_string());
    PAGE_HOOK_TEMPLATE.replace("__BLOCKED_HOSTS__", &hosts_json)
}

#[async_trait]
impl AutomationSurface for PlaywrightSurface {
    async fn open_context(
        &self,
        options: ContextOptions,
    ) -> SurfaceResult<Arc<dyn AutomationContext>> {
        let context = self
            .browser
            .context_builder()
            .user_agent(USER_AGENT)
            .viewport(Some(Viewport {
                width: VIEWPORT_WIDTH,
                height: VIEWPORT_HEIGHT,
            }))
            .build()
            .await
            .map_err(|e| SurfaceError::Other(format!("Failed to create context: {}", e)))?;

        if let Some(blob) = options.session_blob.as_deref() {
            match serde_json::from_str::<Vec<Cookie>>(blob) {
                Ok(cookies) => {
                    context.add_cookies(&cookies).await.map_err(|e| {
                        SurfaceError::Session(format!("Failed to restore cookies: {}", e))
                    })?;
                    debug!("Restored {} cookies into new context", cookies.len());
                }
                // A corrupt blob is not fatal. The workflow detects the
                // missing session and logs in from scratch.
                Err(e) => warn!("Ignoring unreadable session state: {}", e),
            }
        }

        let page = context
            .new_page()
            .await
            .map_err(|e| SurfaceError::Other(format!("Failed to create page: {}", e)))?;

        Ok(Arc::new(PlaywrightContext {
            context,
            page,
            hook_script: page_hook(options.performant),
            dialogs: Mutex::new(VecDeque::new()),
        }))
    }

    async fn shutdown(&self) -> SurfaceResult<()> {
        self.browser
            .close()
            .await
            .map_err(|e| SurfaceError::Other(format!("Failed to close browser: {}", e)))
    }
}

pub struct PlaywrightContext {
    context: BrowserContext,
    page: Page,
    hook_script: String,
    dialogs: Mutex<VecDeque<String>>,
}

impl PlaywrightContext {
    async fn install_hooks(&self) {
        if let Err(e) = self.page.eval::<bool>(&self.hook_script).await {
            debug!("Page hook installation failed: {}", e);
        }
    }

    /// Moves any queued in-page dialog messages into the local buffer.
    async fn drain_dialogs(&self) {
        match self.page.eval::<Vec<String>>(DRAIN_DIALOGS_JS).await {
            Ok(messages) => {
                if !messages.is_empty() {
                    let mut queue = self.dialogs.lock().unwrap_or_else(|p| p.into_inner());
                    queue.extend(messages);
                }
            }
            Err(e) => debug!("Dialog drain failed: {}", e),
        }
    }

    fn pop_dialog(&self) -> Option<String> {
        let mut queue = self.dialogs.lock().unwrap_or_else(|p| p.into_inner());
        queue.pop_front()
    }

    async fn element_visible(&self, selector: &str) -> bool {
        let element = match self.page.query_selector(selector).await {
            Ok(Some(el)) => el,
            Ok(None) => return false,
            Err(e) => {
                debug!("Query selector error for '{}': {}", selector, e);
                return false;
            }
        };
        element.is_visible().await.unwrap_or(false)
    }
}

#[async_trait]
impl AutomationContext for PlaywrightContext {
    async fn goto(&self, url: &str) -> SurfaceResult<()> {
        self.page
            .goto_builder(url)
            .goto()
            .await
            .map_err(|e| SurfaceError::Navigation(format!("goto {} failed: {}", url, e)))?;
        self.install_hooks().await;
        Ok(())
    }

    async fn current_url(&self) -> SurfaceResult<String> {
        self.page
            .url()
            .map_err(|e| SurfaceError::Other(format!("Failed to get current URL: {}", e)))
    }

    async fn fill(&self, selector: &str, text: &str) -> SurfaceResult<()> {
        self.page
            .fill_builder(selector, text)
            .fill()
            .await
            .map_err(|e| {
                SurfaceError::ElementNotFound(format!("Failed to fill {}: {}", selector, e))
            })?;
        Ok(())
    }

    async fn click(&self, selector: &str) -> SurfaceResult<()> {
        self.page
            .click_builder(selector)
            .click()
            .await
            .map_err(|e| {
                SurfaceError::ElementNotFound(format!("Failed to click {}: {}", selector, e))
            })?;
        Ok(())
    }

    async fn wait_for_visible(&self, selector: &str, timeout: Duration) -> SurfaceResult<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.element_visible(selector).await {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(SurfaceError::Timeout(format!("element {}", selector)));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn wait_for_url_contains(&self, fragment: &str, timeout: Duration) -> SurfaceResult<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.current_url().await?.contains(fragment) {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(SurfaceError::Timeout(format!("url containing {:?}", fragment)));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn wait_for_url_not_contains(
        &self,
        fragment: &str,
        timeout: Duration,
    ) -> SurfaceResult<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if !self.current_url().await?.contains(fragment) {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(SurfaceError::Timeout(format!(
                    "url to move away from {:?}",
                    fragment
                )));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn next_dialog_message(&self, timeout: Duration) -> SurfaceResult<Option<String>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(message) = self.pop_dialog() {
                return Ok(Some(message));
            }
            self.drain_dialogs().await;
            if let Some(message) = self.pop_dialog() {
                return Ok(Some(message));
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn visible_text(&self, selector: &str) -> SurfaceResult<Option<String>> {
        // Pages keep hidden alert placeholders in the DOM, so a single
        // first-match lookup can land on an invisible node. Scan every
        // match and report the first visible one with real text.
        let elements = match self.page.query_selector_all(selector).await {
            Ok(elements) => elements,
            Err(e) => {
                debug!("Query selector error for '{}': {}", selector, e);
                return Ok(None);
            }
        };
        for element in elements {
            if !element.is_visible().await.unwrap_or(false) {
                continue;
            }
            match element.text_content().await {
                Ok(Some(text)) => {
                    let text = text.trim();
                    if !text.is_empty() {
                        return Ok(Some(text.to_string()));
                    }
                }
                Ok(None) => {}
                Err(e) => debug!("Text read failed for '{}': {}", selector, e),
            }
        }
        Ok(None)
    }

    async fn export_session(&self) -> SurfaceResult<Option<String>> {
        let cookies = self
            .context
            .cookies(&[])
            .await
            .map_err(|e| SurfaceError::Session(format!("Failed to read cookies: {}", e)))?;
        if cookies.is_empty() {
            return Ok(None);
        }
        let blob = serde_json::to_string(&cookies)
            .map_err(|e| SurfaceError::Session(format!("Failed to serialize cookies: {}", e)))?;
        Ok(Some(blob))
    }

    async fn close(&self) -> SurfaceResult<()> {
        self.context
            .close()
            .await
            .map_err(|e| SurfaceError::Other(format!("Failed to close context: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_performant_hook_embeds_the_analytics_denylist() {
        let hook = page_hook(true);

        assert!(!hook.contains("__BLOCKED_HOSTS__"));
        assert!(hook.contains("googletagmanager.com"));
        assert!(hook.contains("google-analytics.com"));
    }

    #[test]
    fn test_plain_hook_blocks_no_hosts() {
        let hook = page_hook(false);

        assert!(!hook.contains("__BLOCKED_HOSTS__"));
        assert!(hook.contains("const blocked = [];"));
        assert!(!hook.contains("google-analytics.com"));
    }
}
