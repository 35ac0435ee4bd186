use crate::error::{Error, Result, WatchError, HTTP_GONE};
use crate::lister_watcher::{
    EventAction, ListOptions, ListerWatcher, ResourceList, WatchEventHandler, WatchHandle,
    WatchOptions,
};
use async_trait::async_trait;
use futures::{pin_mut, TryStreamExt};
use kube::api::{Api, ListParams, WatchEvent, WatchParams};
use kube::Client;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Page-size limit used when the caller does not override it
pub const DEFAULT_PAGE_SIZE: u32 = 500;

/// `ListerWatcher` backed by a `kube::Api`.
///
/// Listing maps onto paginated `Api::list` calls; watching opens a raw
/// `Api::watch` stream and pumps it into the handler from a driver task. The
/// returned handle cancels the driver, which surfaces as a graceful close.
pub struct ApiListerWatcher<K> {
    api: Api<K>,
    namespace: Option<String>,
    limit: u32,
}

impl<K> ApiListerWatcher<K>
where
    K: kube::Resource,
    K::DynamicType: Default,
{
    #[must_use]
    pub fn new(api: Api<K>, namespace: Option<String>) -> Self {
        Self {
            api,
            namespace,
            limit: DEFAULT_PAGE_SIZE,
        }
    }

    /// Scope to a single namespace
    #[must_use]
    pub fn namespaced(client: Client, namespace: &str) -> Self
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    {
        Self::new(
            Api::namespaced(client, namespace),
            Some(namespace.to_string()),
        )
    }

    /// Watch across all namespaces
    #[must_use]
    pub fn all(client: Client) -> Self {
        Self::new(Api::all(client), None)
    }

    #[must_use]
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }
}

#[async_trait]
impl<K> ListerWatcher<K> for ApiListerWatcher<K>
where
    K: kube::Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    K::DynamicType: Default,
{
    async fn list(&self, options: &ListOptions) -> Result<ResourceList<K>> {
        let mut params = ListParams::default().limit(options.limit.unwrap_or(self.limit));
        if let Some(token) = options.continue_token.as_deref() {
            params = params.continue_token(token);
        }

        let list = self.api.list(&params).await?;
        Ok(ResourceList {
            resource_version: list.metadata.resource_version.clone(),
            continue_token: list.metadata.continue_.clone(),
            items: list.items,
        })
    }

    async fn watch(
        &self,
        options: &WatchOptions,
        handler: Arc<dyn WatchEventHandler<K>>,
    ) -> Result<Box<dyn WatchHandle>> {
        let api = self.api.clone();
        let params = WatchParams::default().disable_bookmarks();
        let version = options.resource_version.clone().unwrap_or_default();
        let token = CancellationToken::new();
        let driver_token = token.clone();

        // the stream borrows locals of the task, so it is opened there; the
        // oneshot reports the open outcome back to this call
        let (ready_tx, ready_rx) = oneshot::channel();
        tokio::spawn(async move {
            let stream = match api.watch(&params, &version).await {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    stream
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                    return;
                }
            };
            debug!(version = %version, "watch stream opened");
            pin_mut!(stream);

            loop {
                tokio::select! {
                    () = driver_token.cancelled() => {
                        debug!("watch stream cancelled by caller");
                        handler.on_close(None).await;
                        break;
                    }
                    next = stream.try_next() => match next {
                        Ok(Some(WatchEvent::Error(resp))) => {
                            warn!(code = resp.code, reason = %resp.reason, "ERROR event on watch stream");
                            // surface through the handler first so the apply
                            // path sees the terminal event, then close with
                            // the status detail for gone classification
                            let _ = handler.on_event(Some(EventAction::Error), None).await;
                            let cause = if resp.code == HTTP_GONE {
                                WatchError::ResourceVersionExpired {
                                    message: resp.message,
                                }
                            } else {
                                WatchError::ErrorEvent {
                                    code: Some(resp.code),
                                    message: resp.message,
                                }
                            };
                            handler.on_close(Some(cause)).await;
                            break;
                        }
                        Ok(Some(event)) => {
                            let outcome = match event {
                                WatchEvent::Added(obj) => {
                                    handler.on_event(Some(EventAction::Added), Some(obj)).await
                                }
                                WatchEvent::Modified(obj) => {
                                    handler.on_event(Some(EventAction::Modified), Some(obj)).await
                                }
                                WatchEvent::Deleted(obj) => {
                                    handler.on_event(Some(EventAction::Deleted), Some(obj)).await
                                }
                                // bookmarks are disabled; drop any stragglers
                                WatchEvent::Bookmark(_) | WatchEvent::Error(_) => Ok(()),
                            };
                            if let Err(err) = outcome {
                                handler.on_close(Some(err)).await;
                                break;
                            }
                        }
                        Ok(None) => {
                            debug!("watch stream ended");
                            handler.on_close(None).await;
                            break;
                        }
                        Err(err) => {
                            handler.on_close(Some(WatchError::Stream(err.into()))).await;
                            break;
                        }
                    }
                }
            }
        });

        match ready_rx.await {
            Ok(Ok(())) => Ok(Box::new(StreamHandle { token })),
            Ok(Err(err)) => Err(err.into()),
            Err(_) => Err(Error::Custom("watch driver exited before opening".to_string())),
        }
    }

    fn limit(&self) -> u32 {
        self.limit
    }

    fn namespace(&self) -> Option<String> {
        self.namespace.clone()
    }
}

/// Cancels the driver task; never aborts it, so close handling already in
/// flight on that task runs to completion.
struct StreamHandle {
    token: CancellationToken,
}

impl WatchHandle for StreamHandle {
    fn close(&mut self) {
        self.token.cancel();
    }
}

impl Drop for StreamHandle {
    // a handle dropped without close() still winds the driver down
    fn drop(&mut self) {
        self.token.cancel();
    }
}
