//! Browser automation seam used by the live login strategy

use async_trait::async_trait;

use crate::error::BrowserResult;

/// Something that can start browser sessions
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Cheap readiness probe; `false` skips live login entirely
    async fn is_available(&self) -> bool;

    async fn open_session(&self) -> BrowserResult<Box<dyn BrowserSession>>;
}

/// One live browser window.
///
/// Owners must call [`BrowserSession::close`] on every exit path.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn navigate(&self, url: &str) -> BrowserResult<()>;

    async fn current_url(&self) -> BrowserResult<String>;

    async fn local_storage_item(&self, key: &str) -> BrowserResult<Option<String>>;

    async fn session_storage_item(&self, key: &str) -> BrowserResult<Option<String>>;

    async fn close(self: Box<Self>) -> BrowserResult<()>;
}
