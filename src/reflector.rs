/**
 * List-then-watch reflector
 *
 * Bootstraps a local store from a paginated list, then keeps it converged
 * with the remote collection through a watch stream, relisting whenever the
 * watch start point expires.
 */
use crate::error::{Result, WatchError};
use crate::lister_watcher::{
    EventAction, ListOptions, ListerWatcher, ResourceList, WatchEventHandler, WatchHandle,
    WatchOptions,
};
use crate::resource::WatchedResource;
use crate::store::Store;
use async_trait::async_trait;
use std::collections::HashSet;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, warn};

/// Where the reflector is in its list/watch cycle.
///
/// A single enum instead of separate `running`/`watching` booleans, so status
/// reads never observe a half-updated flag pair. `Listing` also covers
/// "running with no watch open", e.g. after a graceful server-side close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Stopped,
    Listing,
    Watching,
    Relisting,
}

/// Maintains a local mirror of one remote resource collection.
///
/// Cloning is cheap and shares the same underlying reflector.
pub struct Reflector<R, L, S> {
    inner: Arc<Inner<R, L, S>>,
}

impl<R, L, S> Clone for Reflector<R, L, S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct Inner<R, L, S> {
    lister_watcher: L,
    store: S,
    state: Mutex<LifecycleState>,
    last_sync_resource_version: RwLock<String>,
    // single exclusion domain for the handle; watch-start and watch-stop
    // serialize on this, the list loop does not
    watch: AsyncMutex<Option<Box<dyn WatchHandle>>>,
    _resource: PhantomData<fn() -> R>,
}

impl<R, L, S> Reflector<R, L, S>
where
    R: WatchedResource,
    L: ListerWatcher<R> + 'static,
    S: Store<R> + 'static,
{
    #[must_use]
    pub fn new(lister_watcher: L, store: S) -> Self {
        Self {
            inner: Arc::new(Inner {
                lister_watcher,
                store,
                state: Mutex::new(LifecycleState::Stopped),
                last_sync_resource_version: RwLock::new(String::new()),
                watch: AsyncMutex::new(None),
                _resource: PhantomData,
            }),
        }
    }

    /// Run the full list-sync-and-watch cycle.
    ///
    /// Blocks across however many list round trips the collection needs, then
    /// opens the watch and returns. Safe to call again after `stop()`.
    ///
    /// # Errors
    ///
    /// Returns an error if a list page or the watch open fails; watch failures
    /// after this returns are handled internally (see `on_close`).
    pub async fn start(&self) -> Result<()> {
        self.inner.set_state(LifecycleState::Listing);
        self.inner.clone().list_sync_and_watch().await
    }

    /// Stop the reflector and close any open watch. Idempotent.
    pub async fn stop(&self) {
        self.inner.set_state(LifecycleState::Stopped);
        self.inner.stop_watcher().await;
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.state() != LifecycleState::Stopped
    }

    #[must_use]
    pub fn is_watching(&self) -> bool {
        self.inner.state() == LifecycleState::Watching
    }

    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.inner.state()
    }

    /// The consistency marker: the listing's aggregate version, advanced by
    /// each applied watch event. Empty until the first list completes.
    #[must_use]
    pub fn last_sync_resource_version(&self) -> String {
        self.inner.marker()
    }

    /// The store this reflector writes into
    #[must_use]
    pub fn store(&self) -> &S {
        &self.inner.store
    }
}

impl<R, L, S> Inner<R, L, S>
where
    R: WatchedResource,
    L: ListerWatcher<R> + 'static,
    S: Store<R> + 'static,
{
    fn state(&self) -> LifecycleState {
        self.state.lock().map_or(LifecycleState::Stopped, |s| *s)
    }

    fn set_state(&self, next: LifecycleState) {
        if let Ok(mut state) = self.state.lock() {
            *state = next;
        }
    }

    /// Move to `to` only if currently in `from`
    fn transition(&self, from: LifecycleState, to: LifecycleState) {
        if let Ok(mut state) = self.state.lock() {
            if *state == from {
                *state = to;
            }
        }
    }

    fn marker(&self) -> String {
        self.last_sync_resource_version
            .read()
            .map_or_else(|_| String::new(), |v| v.clone())
    }

    fn set_marker(&self, version: String) {
        if let Ok(mut marker) = self.last_sync_resource_version.write() {
            *marker = version;
        }
    }

    /// List every page into the store, reconcile deletions, then watch from
    /// the listing's consistency point.
    async fn list_sync_and_watch(self: Arc<Self>) -> Result<()> {
        debug!(namespace = ?self.lister_watcher.namespace(), "listing items");
        let mut observed: HashSet<String> = HashSet::new();
        let mut continue_token: Option<String> = None;
        let mut latest_version: Option<String> = None;

        loop {
            let options = ListOptions {
                limit: Some(self.lister_watcher.limit()),
                continue_token: continue_token.clone(),
                allow_watch_bookmarks: false,
            };
            let page = self.lister_watcher.list(&options).await?;
            let has_more = page.has_more();
            let ResourceList {
                items,
                resource_version,
                continue_token: next_token,
            } = page;

            debug!(
                items = items.len(),
                resource_version = ?resource_version,
                "listed chunk"
            );
            for item in items {
                let key = self.store.get_key(&item);
                // apply immediately so large collections never pile up here
                self.store.update(item);
                observed.insert(key);
            }
            latest_version = resource_version;

            if has_more {
                continue_token = next_token;
            } else {
                break;
            }
        }

        self.store.retain_all(&observed);

        let version = latest_version.unwrap_or_default();
        self.set_marker(version.clone());
        debug!(
            count = observed.len(),
            version = %version,
            "list complete, starting watcher"
        );
        self.start_watcher(version).await
    }

    /// Open a watch at `resource_version`, replacing any previous handle.
    ///
    /// No-op when stopped: a `stop()` may have raced ahead while the list
    /// phase was in flight.
    async fn start_watcher(self: Arc<Self>, resource_version: String) -> Result<()> {
        let mut guard = self.watch.lock().await;
        if self.state() == LifecycleState::Stopped {
            debug!("stop raced the list phase, not starting watcher");
            return Ok(());
        }

        // close-before-replace; the server also terminates superseded streams
        // for the same subscription, but the bookkeeping is kept local
        if let Some(mut old) = guard.take() {
            old.close();
        }

        let options = WatchOptions {
            resource_version: Some(resource_version.clone()),
            timeout_seconds: None,
            allow_watch_bookmarks: false,
        };
        let handler: Arc<dyn WatchEventHandler<R>> = Arc::new(ReflectorWatcher {
            inner: self.clone(),
        });
        let handle = self.lister_watcher.watch(&options, handler).await?;
        *guard = Some(handle);
        self.set_state(LifecycleState::Watching);
        debug!(version = %resource_version, "watcher started");
        Ok(())
    }

    async fn stop_watcher(&self) {
        let mut guard = self.watch.lock().await;
        if let Some(mut handle) = guard.take() {
            debug!(
                namespace = ?self.lister_watcher.namespace(),
                version = %self.marker(),
                "stopping watcher"
            );
            handle.close();
        }
        // re-assert under the handle lock in case a finishing watch-start
        // flipped the state after stop() recorded it
        self.set_state(LifecycleState::Stopped);
    }
}

/// The reflector's own event handler: applies stream events to the store,
/// advances the marker, and decides relist-vs-terminate on close.
struct ReflectorWatcher<R, L, S> {
    inner: Arc<Inner<R, L, S>>,
}

#[async_trait]
impl<R, L, S> WatchEventHandler<R> for ReflectorWatcher<R, L, S>
where
    R: WatchedResource,
    L: ListerWatcher<R> + 'static,
    S: Store<R> + 'static,
{
    async fn on_event(
        &self,
        action: Option<EventAction>,
        resource: Option<R>,
    ) -> std::result::Result<(), WatchError> {
        let Some(action) = action else {
            error!(version = %self.inner.marker(), "watch event carried no action");
            return Err(WatchError::ProtocolViolation("missing action"));
        };
        if action == EventAction::Error {
            error!(version = %self.inner.marker(), "ERROR event received on watch stream");
            return Err(WatchError::ErrorEvent {
                code: None,
                message: "ERROR event received".to_string(),
            });
        }
        let Some(resource) = resource else {
            error!(version = %self.inner.marker(), "watch event carried no resource");
            return Err(WatchError::ProtocolViolation("missing resource"));
        };

        let version = resource.resource_version();
        debug!(
            ?action,
            kind = %resource.kind_name(),
            name = %resource.name(),
            version = ?version,
            "event received"
        );
        match action {
            EventAction::Added => self.inner.store.add(resource),
            EventAction::Modified => self.inner.store.update(resource),
            EventAction::Deleted => self.inner.store.delete(&resource),
            // rejected above, before the resource check
            EventAction::Error => {}
        }
        // versions are trusted to arrive in order; no monotonicity check
        if let Some(version) = version {
            self.inner.set_marker(version);
        }
        Ok(())
    }

    async fn on_close(&self, cause: Option<WatchError>) {
        match cause {
            Some(cause) if cause.is_gone() => {
                debug!(
                    version = %self.inner.marker(),
                    "watch closed, resource version expired, relisting"
                );
                self.inner.set_state(LifecycleState::Relisting);
                if let Err(err) = self.inner.clone().list_sync_and_watch().await {
                    error!(error = %err, "relist after expired resource version failed");
                    self.inner.set_state(LifecycleState::Stopped);
                }
            }
            Some(cause) => {
                warn!(
                    error = %cause,
                    version = %self.inner.marker(),
                    "watch closed with unrecoverable error"
                );
                self.inner.set_state(LifecycleState::Stopped);
            }
            None => {
                debug!(version = %self.inner.marker(), "watch gracefully closed");
                self.inner
                    .transition(LifecycleState::Watching, LifecycleState::Listing);
            }
        }
    }
}
