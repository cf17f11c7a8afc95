//! The cache manager: install, activate and fetch interception for one
//! versioned bucket.
//!
//! - Install precaches the manifest all-or-nothing, then asks to skip waiting.
//! - Activate deletes every bucket not named for this version, then claims
//!   clients.
//! - Fetch answers from the bucket first, falls back to the network, and
//!   writes plain same-origin 200 responses back (add-only). Failed
//!   navigations get the offline page when it is cached.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::try_join_all;
use reqwest::{Method, Url};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::{NotificationConfig, SiteConfig};

use super::error::{NetworkError, StorageError, WorkerError};
use super::lifecycle::WorkerState;
use super::network::Network;
use super::notify::{self, ClickOutcome, Notification, NotificationAction, Notifier, RecordingNotifier};
use super::request::{Destination, Request, RequestKey, ResponseSnapshot};
use super::storage::CacheStorage;

/// Background sync tag registered by the contact form.
pub const CONTACT_FORM_SYNC_TAG: &str = "contact-form-sync";

/// Where a fetch was answered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchSource {
    Cache,
    Network,
    /// Network failed; the cached offline page stood in for a navigation
    OfflineFallback,
}

impl std::fmt::Display for FetchSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchSource::Cache => write!(f, "cache"),
            FetchSource::Network => write!(f, "network"),
            FetchSource::OfflineFallback => write!(f, "offline"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Fetched {
    pub response: ResponseSnapshot,
    pub source: FetchSource,
    /// True when this miss was written into the bucket
    pub stored: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub bucket: String,
    pub cached: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivateReport {
    pub bucket: String,
    pub deleted: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed,
    Ignored,
}

/// Messages posted to the worker by pages.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
    SkipWaiting,
}

pub struct CacheManager<S, N> {
    storage: S,
    network: N,
    notifier: Arc<dyn Notifier>,
    origin: Url,
    bucket: String,
    manifest: Vec<String>,
    offline_page: String,
    notification: NotificationConfig,
    state: Mutex<WorkerState>,
    skip_waiting: AtomicBool,
    clients_claimed: AtomicBool,
}

impl<S: CacheStorage, N: Network> CacheManager<S, N> {
    pub fn new(config: &SiteConfig, storage: S, network: N) -> Result<Self, WorkerError> {
        let origin = Url::parse(&config.origin)
            .map_err(|e| NetworkError::InvalidUrl(format!("{}: {}", config.origin, e)))?;

        Ok(Self {
            storage,
            network,
            notifier: Arc::new(RecordingNotifier::new()),
            origin,
            bucket: config.bucket_name(),
            manifest: config.manifest.clone(),
            offline_page: config.offline_page.clone(),
            notification: config.notification.clone(),
            state: Mutex::new(WorkerState::Parsed),
            skip_waiting: AtomicBool::new(false),
            clients_claimed: AtomicBool::new(false),
        })
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn bucket_name(&self) -> &str {
        &self.bucket
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn network(&self) -> &N {
        &self.network
    }

    pub fn state(&self) -> WorkerState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::SeqCst)
    }

    pub fn clients_claimed(&self) -> bool {
        self.clients_claimed.load(Ordering::SeqCst)
    }

    /// Build a GET for a site-relative path.
    pub fn request_for(&self, path: &str) -> Result<Request, WorkerError> {
        Ok(Request::get_path(&self.origin, path)?)
    }

    fn set_state(&self, state: WorkerState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Move to `to` if the current state is `from`.
    fn transition(
        &self,
        from: WorkerState,
        to: WorkerState,
        action: &'static str,
    ) -> Result<(), WorkerError> {
        let mut current = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *current != from {
            return Err(WorkerError::InvalidTransition {
                action,
                state: *current,
            });
        }
        *current = to;
        Ok(())
    }

    // ===== Install =====

    pub async fn install(&self) -> Result<InstallReport, WorkerError> {
        self.transition(WorkerState::Parsed, WorkerState::Installing, "install")?;
        info!(cache = %self.bucket, assets = self.manifest.len(), "Caching files");

        match self.precache().await {
            Ok(cached) => {
                self.set_state(WorkerState::Installed);
                self.skip_waiting.store(true, Ordering::SeqCst);
                info!(cache = %self.bucket, cached, "All files cached");
                Ok(InstallReport {
                    bucket: self.bucket.clone(),
                    cached,
                })
            }
            Err(e) => {
                self.set_state(WorkerState::Parsed);
                warn!(cache = %self.bucket, error = %e, "Install failed");
                Err(e)
            }
        }
    }

    async fn precache(&self) -> Result<usize, WorkerError> {
        let fetches = self.manifest.iter().map(|asset| self.fetch_asset(asset));
        let entries = try_join_all(fetches).await?;
        let count = entries.len();
        self.storage.populate(&self.bucket, entries)?;
        Ok(count)
    }

    async fn fetch_asset(
        &self,
        asset: &str,
    ) -> Result<(RequestKey, ResponseSnapshot), WorkerError> {
        let install_error = |source: NetworkError| WorkerError::Install {
            asset: asset.to_string(),
            source,
        };

        let request = Request::get_path(&self.origin, asset).map_err(install_error)?;
        let response = self
            .network
            .fetch(&request)
            .await
            .map_err(install_error)?;
        if let Some(e) = NetworkError::from_status(request.url.as_str(), response.status) {
            return Err(install_error(e));
        }
        Ok((request.key(), response))
    }

    /// Adopt a bucket written by an earlier run. Moves `parsed -> installed`
    /// when storage already holds this version's bucket.
    pub fn resume(&self) -> Result<bool, WorkerError> {
        if !self.storage.has(&self.bucket)? {
            return Ok(false);
        }
        self.transition(WorkerState::Parsed, WorkerState::Installed, "resume")?;
        debug!(cache = %self.bucket, "Resumed installed bucket");
        Ok(true)
    }

    // ===== Activate =====

    pub async fn activate(&self) -> Result<ActivateReport, WorkerError> {
        self.transition(WorkerState::Installed, WorkerState::Activating, "activate")?;

        let result = self.purge_stale();
        match result {
            Ok(deleted) => {
                self.clients_claimed.store(true, Ordering::SeqCst);
                self.set_state(WorkerState::Activated);
                info!(cache = %self.bucket, deleted = deleted.len(), "Activated");
                Ok(ActivateReport {
                    bucket: self.bucket.clone(),
                    deleted,
                })
            }
            Err(e) => {
                self.set_state(WorkerState::Installed);
                Err(e.into())
            }
        }
    }

    fn purge_stale(&self) -> Result<Vec<String>, StorageError> {
        let mut deleted = Vec::new();
        for name in self.storage.keys()? {
            if name != self.bucket {
                info!(cache = %name, "Deleting old cache");
                if self.storage.delete(&name)? {
                    deleted.push(name);
                }
            }
        }
        Ok(deleted)
    }

    // ===== Fetch =====

    pub async fn fetch(&self, request: &Request) -> Result<Fetched, WorkerError> {
        let key = request.key();

        match self.storage.lookup(&self.bucket, &key) {
            Ok(Some(response)) => {
                debug!(url = %request.url, "Serving from cache");
                return Ok(Fetched {
                    response,
                    source: FetchSource::Cache,
                    stored: false,
                });
            }
            Ok(None) => {}
            Err(e) => {
                warn!(url = %request.url, error = %e, "Cache lookup failed, going to network");
            }
        }

        debug!(url = %request.url, "Fetching from network");
        match self.network.fetch(request).await {
            Ok(response) => {
                let stored = self.store_miss(request, &key, &response);
                Ok(Fetched {
                    response,
                    source: FetchSource::Network,
                    stored,
                })
            }
            Err(e) => self.offline_fallback(request, e),
        }
    }

    fn store_miss(&self, request: &Request, key: &RequestKey, response: &ResponseSnapshot) -> bool {
        if request.method != Method::GET || !response.is_cacheable() {
            return false;
        }
        match self
            .storage
            .insert_new(&self.bucket, key, response.clone())
        {
            Ok(stored) => stored,
            Err(e) => {
                warn!(url = %request.url, error = %e, "Failed to cache response");
                false
            }
        }
    }

    fn offline_fallback(&self, request: &Request, error: NetworkError) -> Result<Fetched, WorkerError> {
        if request.destination != Destination::Document {
            return Err(error.into());
        }

        let offline = Request::get_path(&self.origin, &self.offline_page)?;
        match self.storage.lookup(&self.bucket, &offline.key()) {
            Ok(Some(response)) => {
                info!(url = %request.url, "Network failed, serving offline page");
                Ok(Fetched {
                    response,
                    source: FetchSource::OfflineFallback,
                    stored: false,
                })
            }
            Ok(None) => Err(error.into()),
            Err(e) => {
                warn!(error = %e, "Offline page lookup failed");
                Err(error.into())
            }
        }
    }

    // ===== Push / notifications =====

    pub fn push(&self, payload: Option<&str>) -> Notification {
        let notification = Notification::from_push(&self.notification, payload);
        self.notifier.show(&notification);
        notification
    }

    pub fn notification_click(
        &self,
        notification: &Notification,
        action: NotificationAction,
    ) -> ClickOutcome {
        notify::handle_click(self.notifier.as_ref(), notification, action)
    }

    // ===== Sync / messages =====

    pub async fn sync(&self, tag: &str) -> SyncOutcome {
        if tag == CONTACT_FORM_SYNC_TAG {
            // Submissions are not queued offline; the sync only acknowledges.
            debug!(tag, "Contact form sync complete");
            SyncOutcome::Completed
        } else {
            debug!(tag, "Ignoring unknown sync tag");
            SyncOutcome::Ignored
        }
    }

    pub fn message(&self, raw: &str) -> Result<WorkerMessage, WorkerError> {
        let message: WorkerMessage = serde_json::from_str(raw).map_err(|_| {
            debug!(message = raw, "Ignoring unknown message");
            WorkerError::UnknownMessage(raw.to_string())
        })?;
        match message {
            WorkerMessage::SkipWaiting => self.skip_waiting.store(true, Ordering::SeqCst),
        }
        Ok(message)
    }
}

// ============================================================================
// Tests
// ============================================================================
