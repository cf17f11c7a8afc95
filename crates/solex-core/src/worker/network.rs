//! Network access for cache misses and installs.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use reqwest::{Client, Url};
use tracing::debug;

use super::error::NetworkError;
use super::request::{Request, ResponseSnapshot, ResponseType};

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Something that can turn a request into a response.
pub trait Network: Send + Sync + 'static {
    fn fetch(
        &self,
        request: &Request,
    ) -> impl Future<Output = Result<ResponseSnapshot, NetworkError>> + Send;
}

/// Real HTTP access via reqwest.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpNetwork {
    client: Client,
    origin: Url,
}

impl HttpNetwork {
    pub fn new(origin: Url) -> Result<Self, NetworkError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client, origin })
    }

    fn classify(&self, url: &Url) -> ResponseType {
        if url.origin() == self.origin.origin() {
            ResponseType::Basic
        } else {
            ResponseType::Cors
        }
    }
}

impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> Result<ResponseSnapshot, NetworkError> {
        let url = request.url.to_string();
        debug!(method = %request.method, url = %url, "HTTP request");

        let response = self
            .client
            .request(request.method.clone(), request.url.clone())
            .send()
            .await
            .map_err(|source| NetworkError::Unreachable {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        let final_url = response.url().clone();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|source| NetworkError::Unreachable {
                url: url.clone(),
                source,
            })?;

        Ok(ResponseSnapshot {
            url: final_url.to_string(),
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body: body.to_vec(),
            kind: self.classify(&final_url),
        })
    }
}

/// Canned network used by tests and simulations. Unknown URLs answer 404.
#[derive(Default)]
pub struct ScriptedNetwork {
    routes: Mutex<HashMap<String, ResponseSnapshot>>,
    offline: AtomicBool,
    requests: AtomicUsize,
    latency: Mutex<Duration>,
}

impl ScriptedNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` with `status` as a same-origin response for `url`.
    pub fn route(&self, url: &str, status: u16, body: &str) -> &Self {
        self.route_response(
            url,
            ResponseSnapshot::new(url, status, ResponseType::Basic, body.as_bytes().to_vec()),
        )
    }

    pub fn route_response(&self, url: &str, response: ResponseSnapshot) -> &Self {
        let url = Url::parse(url)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| url.to_string());
        if let Ok(mut routes) = self.routes.lock() {
            routes.insert(url, response);
        }
        self
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of requests that reached the network, offline ones included.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Delay every answer by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        if let Ok(mut current) = self.latency.lock() {
            *current = latency;
        }
    }
}

impl Network for ScriptedNetwork {
    async fn fetch(&self, request: &Request) -> Result<ResponseSnapshot, NetworkError> {
        let url = request.url.to_string();
        self.requests.fetch_add(1, Ordering::SeqCst);

        let latency = self.latency.lock().map(|l| *l).unwrap_or_default();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if self.offline.load(Ordering::SeqCst) {
            return Err(NetworkError::Offline(url));
        }

        let routed = self
            .routes
            .lock()
            .ok()
            .and_then(|routes| routes.get(&url).cloned());
        Ok(routed
            .unwrap_or_else(|| ResponseSnapshot::new(url, 404, ResponseType::Basic, Vec::new())))
    }
}
