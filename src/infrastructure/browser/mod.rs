use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub mod mock_adapter;
pub mod playwright_adapter;

pub use mock_adapter::MockSurface;
pub use playwright_adapter::PlaywrightSurface;

#[derive(Error, Debug)]
pub enum SurfaceError {
    #[error("Navigation failed: {0}")]
    Navigation(String),
    #[error("Element not found: {0}")]
    ElementNotFound(String),
    #[error("Timed out waiting for {0}")]
    Timeout(String),
    #[error("Connection failed: {0}")]
    Connection(String),
    #[error("Session state error: {0}")]
    Session(String),
    #[error("Surface error: {0}")]
    Other(String),
}

pub type SurfaceResult<T> = Result<T, SurfaceError>;

/// How to open one isolated automation context.
#[derive(Debug, Clone, Default)]
pub struct ContextOptions {
    /// Serialized session state to rehydrate, if any.
    pub session_blob: Option<String>,
    /// Trim the context for speed: analytics traffic is blocked.
    pub performant: bool,
}

/// Factory for isolated automation contexts. One surface is shared by
/// a whole run; each account gets its own context.
#[async_trait]
pub trait AutomationSurface: Send + Sync {
    async fn open_context(&self, options: ContextOptions)
        -> SurfaceResult<Arc<dyn AutomationContext>>;

    /// Release the underlying driver. Contexts must be closed first.
    async fn shutdown(&self) -> SurfaceResult<()>;
}

/// One isolated page the workflow drives. All waits are bounded by the
/// caller-supplied timeout; expiry is `SurfaceError::Timeout`.
#[async_trait]
pub trait AutomationContext: Send + Sync {
    async fn goto(&self, url: &str) -> SurfaceResult<()>;

    async fn current_url(&self) -> SurfaceResult<String>;

    async fn fill(&self, selector: &str, text: &str) -> SurfaceResult<()>;

    async fn click(&self, selector: &str) -> SurfaceResult<()>;

    async fn wait_for_visible(&self, selector: &str, timeout: Duration) -> SurfaceResult<()>;

    async fn wait_for_url_contains(&self, fragment: &str, timeout: Duration) -> SurfaceResult<()>;

    async fn wait_for_url_not_contains(
        &self,
        fragment: &str,
        timeout: Duration,
    ) -> SurfaceResult<()>;

    /// Next queued dialog message (alert/confirm), waiting up to
    /// `timeout` for one to arrive.
    async fn next_dialog_message(&self, timeout: Duration) -> SurfaceResult<Option<String>>;

    /// Text of the first visible match with non-empty content, scanning
    /// every node the selector hits. `None` when no match qualifies.
    async fn visible_text(&self, selector: &str) -> SurfaceResult<Option<String>>;

    /// Serializes the context's session state for later rehydration.
    /// `None` when the context has nothing worth persisting.
    async fn export_session(&self) -> SurfaceResult<Option<String>>;

    async fn close(&self) -> SurfaceResult<()>;
}
