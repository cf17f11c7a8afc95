//! Offline cache worker.
//!
//! This module provides the `CacheManager` that keeps one versioned bucket of
//! site assets and answers requests from it:
//! - Install precaches the manifest, all-or-nothing
//! - Activate purges buckets left by earlier versions
//! - Fetch serves cache-first with network fallback and populate-on-miss
//!
//! Push notifications, background sync and page messages are handled here
//! too. `runtime` hosts a manager behind an event channel.

pub mod error;
pub mod lifecycle;
pub mod manager;
pub mod network;
pub mod notify;
pub mod request;
pub mod runtime;
pub mod storage;

pub use error::{NetworkError, StorageError, WorkerError};
pub use lifecycle::WorkerState;
pub use manager::{
    ActivateReport, CacheManager, FetchSource, Fetched, InstallReport, SyncOutcome,
    WorkerMessage, CONTACT_FORM_SYNC_TAG,
};
pub use network::{HttpNetwork, Network, ScriptedNetwork};
pub use notify::{ClickOutcome, Notification, NotificationAction, Notifier, RecordingNotifier};
pub use request::{Destination, Request, RequestKey, ResponseSnapshot, ResponseType};
pub use runtime::WorkerHandle;
pub use storage::{BucketInfo, CacheStorage, DiskStorage, MemoryStorage};
pub use reqwest::{Method, Url};
