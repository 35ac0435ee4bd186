//! A list-then-watch reflector for Kubernetes resources.
//!
//! The [`Reflector`] bootstraps a local [`Store`] from a paginated list, then
//! keeps it converged with the cluster through a watch stream, transparently
//! relisting when the watch start point expires (HTTP 410 "Gone").

pub mod api;
pub mod error;
pub mod lister_watcher;
pub mod reflector;
pub mod resource;
pub mod store;

pub use api::ApiListerWatcher;
pub use error::{Error, Result, WatchError};
pub use lister_watcher::{
    EventAction, ListOptions, ListerWatcher, ResourceList, WatchEventHandler, WatchHandle,
    WatchOptions,
};
pub use reflector::{LifecycleState, Reflector};
pub use resource::WatchedResource;
pub use store::{MemoryStore, Store};
