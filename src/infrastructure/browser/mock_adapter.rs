use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use super::{AutomationContext, AutomationSurface, ContextOptions, SurfaceError, SurfaceResult};
use crate::core::config::AppConfig;

/// Scripted responses for a mock run. All contexts opened from one
/// surface share the script.
#[derive(Default)]
struct MockBehavior {
    /// Selector -> how many `wait_for_visible` calls still time out.
    visible_fail_budget: HashMap<String, u32>,
    /// Selectors that never become visible.
    visible_never: Vec<String>,
    /// URL substring -> queue of redirect targets, consumed per goto.
    goto_redirects: HashMap<String, VecDeque<String>>,
    /// Selector -> URL the page lands on after clicking it.
    click_redirects: HashMap<String, String>,
    /// Selector -> dialog messages, one raised per click.
    click_dialogs: HashMap<String, VecDeque<String>>,
    /// Selector -> DOM nodes scanned by `visible_text`, in order.
    visible_texts: HashMap<String, Vec<TextNode>>,
    /// Blob returned by `export_session`.
    session_export: Option<String>,
}

/// One scripted DOM node under a selector.
struct TextNode {
    visible: bool,
    text: String,
}

/// Counters shared by all contexts of one mock surface.
#[derive(Debug, Clone, Default)]
pub struct MockStats {
    pub opened: usize,
    pub closed: usize,
    pub live: usize,
    pub peak: usize,
    pub open_options: Vec<ContextOptions>,
    /// Every goto/fill/click in call order, e.g. `"click button"`.
    pub actions: Vec<String>,
}

/// In-memory automation surface for tests and dry runs. Behavior is
/// scripted up front; stats record what the workflow actually did.
#[derive(Clone, Default)]
pub struct MockSurface {
    behavior: Arc<Mutex<MockBehavior>>,
    stats: Arc<Mutex<MockStats>>,
}

impl MockSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// A surface scripted so the whole order workflow succeeds: the
    /// login click leaves the login page and sessions export cleanly.
    pub fn happy_path(config: &AppConfig) -> Self {
        let surface = Self::new();
        surface.redirect_on_click(&config.selectors.login_submit, &config.site.section_url);
        surface.set_session_export(r#"[{"name":"session","value":"mock"}]"#);
        surface
    }

    fn behavior(&self) -> MutexGuard<'_, MockBehavior> {
        self.behavior.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn stats_mut(&self) -> MutexGuard<'_, MockStats> {
        self.stats.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn fail_visible_times(&self, selector: &str, times: u32) {
        self.behavior()
            .visible_fail_budget
            .insert(selector.to_string(), times);
    }

    pub fn never_visible(&self, selector: &str) {
        self.behavior().visible_never.push(selector.to_string());
    }

    /// The next `goto` whose URL contains `pattern` lands on `target`
    /// instead. Queued; each scripted target is used once.
    pub fn redirect_on_goto(&self, pattern: &str, target: &str) {
        self.behavior()
            .goto_redirects
            .entry(pattern.to_string())
            .or_default()
            .push_back(target.to_string());
    }

    pub fn redirect_on_click(&self, selector: &str, target: &str) {
        self.behavior()
            .click_redirects
            .insert(selector.to_string(), target.to_string());
    }

    /// Clicking `selector` raises `message` as a page dialog. Queued;
    /// one message per click.
    pub fn dialog_on_click(&self, selector: &str, message: &str) {
        self.behavior()
            .click_dialogs
            .entry(selector.to_string())
            .or_default()
            .push_back(message.to_string());
    }

    pub fn set_visible_text(&self, selector: &str, text: &str) {
        self.behavior().visible_texts.insert(
            selector.to_string(),
            vec![TextNode {
                visible: true,
                text: text.to_string(),
            }],
        );
    }

    /// Appends one DOM node under `selector`. `visible_text` scans the
    /// nodes in order, so hidden or empty placeholders can be scripted
    /// in front of the live message.
    pub fn add_text_node(&self, selector: &str, visible: bool, text: &str) {
        self.behavior()
            .visible_texts
            .entry(selector.to_string())
            .or_default()
            .push(TextNode {
                visible,
                text: text.to_string(),
            });
    }

    pub fn set_session_export(&self, blob: &str) {
        self.behavior().session_export = Some(blob.to_string());
    }

    pub fn stats(&self) -> MockStats {
        self.stats_mut().clone()
    }

    pub fn peak_contexts(&self) -> usize {
        self.stats_mut().peak
    }

    pub fn actions(&self) -> Vec<String> {
        self.stats_mut().actions.clone()
    }
}

#[async_trait]
impl AutomationSurface for MockSurface {
    async fn open_context(
        &self,
        options: ContextOptions,
    ) -> SurfaceResult<Arc<dyn AutomationContext>> {
        {
            let mut stats = self.stats_mut();
            stats.opened += 1;
            stats.live += 1;
            stats.peak = stats.peak.max(stats.live);
            stats.open_options.push(options);
        }
        Ok(Arc::new(MockContext {
            behavior: Arc::clone(&self.behavior),
            stats: Arc::clone(&self.stats),
            current_url: Mutex::new("about:blank".to_string()),
            dialogs: Mutex::new(VecDeque::new()),
        }))
    }

    async fn shutdown(&self) -> SurfaceResult<()> {
        info!("[Mock] Surface shut down");
        Ok(())
    }
}

struct MockContext {
    behavior: Arc<Mutex<MockBehavior>>,
    stats: Arc<Mutex<MockStats>>,
    current_url: Mutex<String>,
    dialogs: Mutex<VecDeque<String>>,
}

impl MockContext {
    fn behavior(&self) -> MutexGuard<'_, MockBehavior> {
        self.behavior.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn record(&self, action: String) {
        let mut stats = self.stats.lock().unwrap_or_else(|p| p.into_inner());
        stats.actions.push(action);
    }

    fn set_url(&self, url: String) {
        let mut current = self.current_url.lock().unwrap_or_else(|p| p.into_inner());
        *current = url;
    }

    fn url(&self) -> String {
        self.current_url
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    fn pop_dialog(&self) -> Option<String> {
        self.dialogs
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .pop_front()
    }
}

#[async_trait]
impl AutomationContext for MockContext {
    async fn goto(&self, url: &str) -> SurfaceResult<()> {
        info!("[Mock] Navigating to {}", url);
        self.record(format!("goto {}", url));
        let redirect = {
            let mut behavior = self.behavior();
            behavior
                .goto_redirects
                .iter_mut()
                .find(|(pattern, _)| url.contains(pattern.as_str()))
                .and_then(|(_, targets)| targets.pop_front())
        };
        self.set_url(redirect.unwrap_or_else(|| url.to_string()));
        Ok(())
    }

    async fn current_url(&self) -> SurfaceResult<String> {
        Ok(self.url())
    }

    async fn fill(&self, selector: &str, text: &str) -> SurfaceResult<()> {
        info!("[Mock] Filling {} with '{}'", selector, text);
        self.record(format!("fill {}", selector));
        Ok(())
    }

    async fn click(&self, selector: &str) -> SurfaceResult<()> {
        info!("[Mock] Clicking {}", selector);
        self.record(format!("click {}", selector));
        let (redirect, dialog) = {
            let mut behavior = self.behavior();
            let redirect = behavior.click_redirects.get(selector).cloned();
            let dialog = behavior
                .click_dialogs
                .get_mut(selector)
                .and_then(|queue| queue.pop_front());
            (redirect, dialog)
        };
        if let Some(target) = redirect {
            self.set_url(target);
        }
        if let Some(message) = dialog {
            self.dialogs
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .push_back(message);
        }
        Ok(())
    }

    async fn wait_for_visible(&self, selector: &str, timeout: Duration) -> SurfaceResult<()> {
        let should_fail = {
            let mut behavior = self.behavior();
            if behavior.visible_never.iter().any(|s| s == selector) {
                true
            } else {
                match behavior.visible_fail_budget.get_mut(selector) {
                    Some(budget) if *budget > 0 => {
                        *budget -= 1;
                        true
                    }
                    _ => false,
                }
            }
        };
        if should_fail {
            tokio::time::sleep(timeout).await;
            return Err(SurfaceError::Timeout(format!("element {}", selector)));
        }
        Ok(())
    }

    async fn wait_for_url_contains(&self, fragment: &str, timeout: Duration) -> SurfaceResult<()> {
        if self.url().contains(fragment) {
            return Ok(());
        }
        tokio::time::sleep(timeout).await;
        if self.url().contains(fragment) {
            return Ok(());
        }
        Err(SurfaceError::Timeout(format!("url containing {:?}", fragment)))
    }

    async fn wait_for_url_not_contains(
        &self,
        fragment: &str,
        timeout: Duration,
    ) -> SurfaceResult<()> {
        if !self.url().contains(fragment) {
            return Ok(());
        }
        tokio::time::sleep(timeout).await;
        if !self.url().contains(fragment) {
            return Ok(());
        }
        Err(SurfaceError::Timeout(format!(
            "url to move away from {:?}",
            fragment
        )))
    }

    async fn next_dialog_message(&self, timeout: Duration) -> SurfaceResult<Option<String>> {
        if let Some(message) = self.pop_dialog() {
            return Ok(Some(message));
        }
        tokio::time::sleep(timeout).await;
        Ok(self.pop_dialog())
    }

    async fn visible_text(&self, selector: &str) -> SurfaceResult<Option<String>> {
        Ok(self.behavior().visible_texts.get(selector).and_then(|nodes| {
            nodes.iter().find_map(|node| {
                let text = node.text.trim();
                (node.visible && !text.is_empty()).then(|| text.to_string())
            })
        }))
    }

    async fn export_session(&self) -> SurfaceResult<Option<String>> {
        Ok(self.behavior().session_export.clone())
    }

    async fn close(&self) -> SurfaceResult<()> {
        let mut stats = self.stats.lock().unwrap_or_else(|p| p.into_inner());
        stats.closed += 1;
        stats.live = stats.live.saturating_sub(1);
        Ok(())
    }
}
