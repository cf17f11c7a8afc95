//! Event loop hosting a [`CacheManager`].
//!
//! Lifecycle events (install, activate, sync, message) are handled one at a
//! time in arrival order, so activate can never overlap install. Fetch, push
//! and notification-click events run as independent tasks. Each event carries
//! a oneshot reply that keeps the caller waiting until the work is done.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use super::error::WorkerError;
use super::manager::{
    ActivateReport, CacheManager, Fetched, InstallReport, SyncOutcome, WorkerMessage,
};
use super::network::Network;
use super::notify::{ClickOutcome, Notification, NotificationAction};
use super::request::Request;
use super::storage::CacheStorage;

/// Buffer size for the worker event channel.
const CHANNEL_BUFFER_SIZE: usize = 32;

type Reply<T> = oneshot::Sender<T>;

pub enum WorkerEvent {
    Install(Reply<Result<InstallReport, WorkerError>>),
    Activate(Reply<Result<ActivateReport, WorkerError>>),
    Fetch(Request, Reply<Result<Fetched, WorkerError>>),
    Push(Option<String>, Reply<Notification>),
    NotificationClick(Notification, NotificationAction, Reply<ClickOutcome>),
    Sync(String, Reply<SyncOutcome>),
    Message(String, Reply<Result<WorkerMessage, WorkerError>>),
}

/// Cheap to clone; every clone feeds the same event loop.
#[derive(Clone)]
pub struct WorkerHandle {
    tx: mpsc::Sender<WorkerEvent>,
}

/// Start the event loop on the current Tokio runtime.
pub fn spawn<S, N>(manager: Arc<CacheManager<S, N>>) -> WorkerHandle
where
    S: CacheStorage + 'static,
    N: Network,
{
    let (tx, rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
    tokio::spawn(run(manager, rx));
    WorkerHandle { tx }
}

async fn run<S, N>(manager: Arc<CacheManager<S, N>>, mut rx: mpsc::Receiver<WorkerEvent>)
where
    S: CacheStorage + 'static,
    N: Network,
{
    info!(cache = %manager.bucket_name(), "Worker runtime started");

    while let Some(event) = rx.recv().await {
        match event {
            WorkerEvent::Install(reply) => {
                let _ = reply.send(manager.install().await);
            }
            WorkerEvent::Activate(reply) => {
                let _ = reply.send(manager.activate().await);
            }
            WorkerEvent::Sync(tag, reply) => {
                let _ = reply.send(manager.sync(&tag).await);
            }
            WorkerEvent::Message(raw, reply) => {
                let _ = reply.send(manager.message(&raw));
            }
            WorkerEvent::Fetch(request, reply) => {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move {
                    let _ = reply.send(manager.fetch(&request).await);
                });
            }
            WorkerEvent::Push(payload, reply) => {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move {
                    let _ = reply.send(manager.push(payload.as_deref()));
                });
            }
            WorkerEvent::NotificationClick(notification, action, reply) => {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move {
                    let _ = reply.send(manager.notification_click(&notification, action));
                });
            }
        }
    }

    debug!("Worker runtime stopped");
}

impl WorkerHandle {
    async fn call<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> WorkerEvent,
    ) -> Result<T, WorkerError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| WorkerError::RuntimeClosed)?;
        rx.await.map_err(|_| WorkerError::RuntimeClosed)
    }

    pub async fn install(&self) -> Result<InstallReport, WorkerError> {
        self.call(WorkerEvent::Install).await?
    }

    pub async fn activate(&self) -> Result<ActivateReport, WorkerError> {
        self.call(WorkerEvent::Activate).await?
    }

    pub async fn fetch(&self, request: Request) -> Result<Fetched, WorkerError> {
        self.call(|reply| WorkerEvent::Fetch(request, reply)).await?
    }

    pub async fn push(&self, payload: Option<String>) -> Result<Notification, WorkerError> {
        self.call(|reply| WorkerEvent::Push(payload, reply)).await
    }

    pub async fn notification_click(
        &self,
        notification: Notification,
        action: NotificationAction,
    ) -> Result<ClickOutcome, WorkerError> {
        self.call(|reply| WorkerEvent::NotificationClick(notification, action, reply))
            .await
    }

    pub async fn sync(&self, tag: &str) -> Result<SyncOutcome, WorkerError> {
        let tag = tag.to_string();
        self.call(|reply| WorkerEvent::Sync(tag, reply)).await
    }

    pub async fn message(&self, raw: &str) -> Result<WorkerMessage, WorkerError> {
        let raw = raw.to_string();
        self.call(|reply| WorkerEvent::Message(raw, reply)).await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SiteConfig;
    use crate::worker::lifecycle::WorkerState;
    use crate::worker::manager::FetchSource;
    use std::time::Duration;
    use crate::worker::network::ScriptedNetwork;
    use crate::worker::storage::MemoryStorage;

    fn handle() -> (WorkerHandle, Arc<CacheManager<MemoryStorage, ScriptedNetwork>>) {
        let config = SiteConfig {
            origin: "http://solex.test".to_string(),
            manifest: vec!["/".into(), "/css/style.css".into()],
            ..SiteConfig::default()
        };
        let network = ScriptedNetwork::new();
        network
            .route("http://solex.test/", 200, "home")
            .route("http://solex.test/css/style.css", 200, "body{}");
        for i in 0..8 {
            network.route(&format!("http://solex.test/news/{}.html", i), 200, "news");
        }
        let manager = Arc::new(CacheManager::new(&config, MemoryStorage::new(), network).unwrap());
        (spawn(Arc::clone(&manager)), manager)
    }

    #[tokio::test]
    async fn test_lifecycle_through_handle() {
        let (worker, manager) = handle();

        let installed = worker.install().await.unwrap();
        assert_eq!(installed.cached, 2);
        let activated = worker.activate().await.unwrap();
        assert!(activated.deleted.is_empty());
        assert!(manager.clients_claimed());

        let fetched = worker
            .fetch(manager.request_for("/").unwrap())
            .await
            .unwrap();
        assert_eq!(fetched.source, FetchSource::Cache);
    }

    #[tokio::test]
    async fn test_concurrent_fetches_each_complete() {
        let (worker, manager) = handle();
        worker.install().await.unwrap();

        let fetches = (0..8).map(|i| {
            let worker = worker.clone();
            let request = manager.request_for(&format!("/news/{}.html", i)).unwrap();
            async move { worker.fetch(request).await }
        });
        let results = futures::future::join_all(fetches).await;

        assert!(results.iter().all(|r| r.as_ref().map(|f| f.stored).unwrap_or(false)));
        assert_eq!(manager.network().request_count(), 10);
        assert_eq!(
            manager.storage().info(manager.bucket_name()).unwrap().unwrap().entries,
            10
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_activate_waits_for_slow_install() {
        let (worker, manager) = handle();
        manager.network().set_latency(Duration::from_millis(250));

        let (installed, activated) = tokio::join!(worker.install(), worker.activate());

        assert_eq!(installed.unwrap().cached, 2);
        assert!(activated.unwrap().deleted.is_empty());
        assert_eq!(manager.state(), WorkerState::Activated);
        assert!(manager.clients_claimed());
    }

    #[tokio::test]
    async fn test_activate_before_install_is_rejected() {
        let (worker, _) = handle();
        assert!(matches!(
            worker.activate().await,
            Err(WorkerError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_push_click_sync_message_dispatch() {
        let (worker, manager) = handle();

        let notification = worker.push(Some("hello".to_string())).await.unwrap();
        assert_eq!(notification.body, "hello");
        let outcome = worker
            .notification_click(notification, NotificationAction::Open)
            .await
            .unwrap();
        assert_eq!(outcome, ClickOutcome::Opened("/".to_string()));

        assert_eq!(
            worker.sync("contact-form-sync").await.unwrap(),
            SyncOutcome::Completed
        );
        worker.message(r#"{"type":"SKIP_WAITING"}"#).await.unwrap();
        assert!(manager.skip_waiting_requested());
    }
}
