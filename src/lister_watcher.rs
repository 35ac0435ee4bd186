use crate::error::{Result, WatchError};
use async_trait::async_trait;
use std::sync::Arc;

/// Parameters for one paginated list call.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Maximum number of items per page
    pub limit: Option<u32>,
    /// Opaque cursor from the previous page, `None` for the first page
    pub continue_token: Option<String>,
    /// Watch bookmarks are always disabled by the reflector
    pub allow_watch_bookmarks: bool,
}

/// Parameters for opening a watch stream.
#[derive(Debug, Clone, Default)]
pub struct WatchOptions {
    /// Consistency point to start streaming from
    pub resource_version: Option<String>,
    /// No client-side timeout; the stream runs until closed
    pub timeout_seconds: Option<u32>,
    /// Watch bookmarks are always disabled by the reflector
    pub allow_watch_bookmarks: bool,
}

/// One page of a paginated listing.
#[derive(Debug, Clone)]
pub struct ResourceList<R> {
    pub items: Vec<R>,
    /// Aggregate consistency point of the overall listing
    pub resource_version: Option<String>,
    /// Cursor for the next page, `None` or empty when this is the last page
    pub continue_token: Option<String>,
}

impl<R> ResourceList<R> {
    /// Whether the listing has more pages to fetch
    #[must_use]
    pub fn has_more(&self) -> bool {
        self.continue_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// Action kind carried by a watch event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventAction {
    Added,
    Modified,
    Deleted,
    /// The server is signaling a terminal condition for this stream
    Error,
}

/// Handle to a live watch stream. Closing is idempotent and must never block.
pub trait WatchHandle: Send {
    fn close(&mut self);
}

/// Receives events and the closure notification from a watch stream.
///
/// `on_event` returns the error kind instead of raising it across the handler
/// boundary; stream drivers stop pumping on the first `Err` and feed it into
/// `on_close`, which decides between relisting and terminating.
#[async_trait]
pub trait WatchEventHandler<R>: Send + Sync {
    async fn on_event(
        &self,
        action: Option<EventAction>,
        resource: Option<R>,
    ) -> std::result::Result<(), WatchError>;

    /// `cause` is `None` for a graceful, caller-initiated close
    async fn on_close(&self, cause: Option<WatchError>);
}

/// Performs paginated listing and opens watch streams for one resource type.
#[async_trait]
pub trait ListerWatcher<R>: Send + Sync {
    /// Fetch one page of the collection
    async fn list(&self, options: &ListOptions) -> Result<ResourceList<R>>;

    /// Open a watch stream delivering events to `handler` until closed
    async fn watch(
        &self,
        options: &WatchOptions,
        handler: Arc<dyn WatchEventHandler<R>>,
    ) -> Result<Box<dyn WatchHandle>>;

    /// Page-size limit used by the reflector's list loop
    fn limit(&self) -> u32;

    /// Namespace scope, diagnostics only
    fn namespace(&self) -> Option<String>;
}
