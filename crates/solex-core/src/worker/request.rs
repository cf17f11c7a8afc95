//! Request and response shapes seen by the worker.

use std::fmt;

use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};

use super::error::NetworkError;

/// What the request is for; only `Document` is eligible for the offline page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    Document,
    Script,
    Style,
    Image,
    Font,
    #[default]
    Other,
}

impl Destination {
    /// Guess the destination from the extension of the last path segment.
    pub fn infer(url: &Url) -> Self {
        let path = url.path();
        let file = path.rsplit('/').next().unwrap_or(path);
        let ext = file.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
        match ext.as_deref() {
            None if path.ends_with('/') => Destination::Document,
            Some("html") | Some("htm") => Destination::Document,
            Some("js") | Some("mjs") => Destination::Script,
            Some("css") => Destination::Style,
            Some("png") | Some("jpg") | Some("jpeg") | Some("gif") | Some("svg") | Some("webp") => {
                Destination::Image
            }
            Some("woff") | Some("woff2") | Some("ttf") => Destination::Font,
            _ => Destination::Other,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub destination: Destination,
}

impl Request {
    pub fn get(url: Url) -> Self {
        let destination = Destination::infer(&url);
        Self {
            method: Method::GET,
            url,
            destination,
        }
    }

    /// Top-level navigation to `url`.
    pub fn navigate(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            destination: Destination::Document,
        }
    }

    /// Resolve `path` against `origin` and build a GET for it.
    pub fn get_path(origin: &Url, path: &str) -> Result<Self, NetworkError> {
        let url = origin
            .join(path)
            .map_err(|e| NetworkError::InvalidUrl(format!("{}: {}", path, e)))?;
        Ok(Self::get(url))
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn key(&self) -> RequestKey {
        RequestKey::new(&self.method, &self.url)
    }
}

/// Cache identity of a request: method plus the full URL including the query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestKey {
    pub method: String,
    pub url: String,
}

impl RequestKey {
    pub fn new(method: &Method, url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self {
            method: method.as_str().to_string(),
            url: url.to_string(),
        }
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    /// Same-origin response
    Basic,
    Cors,
    Opaque,
    Error,
}

/// A stored or freshly fetched response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseSnapshot {
    pub url: String,
    pub status: u16,
    #[serde(default)]
    pub status_text: String,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub body: Vec<u8>,
    pub kind: ResponseType,
}

impl ResponseSnapshot {
    pub fn new(url: impl Into<String>, status: u16, kind: ResponseType, body: Vec<u8>) -> Self {
        Self {
            url: url.into(),
            status,
            status_text: String::new(),
            headers: Vec::new(),
            body,
            kind,
        }
    }

    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Only plain same-origin 200s are written back on a cache miss.
    pub fn is_cacheable(&self) -> bool {
        self.status == 200 && self.kind == ResponseType::Basic
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_request_key_keeps_query_drops_fragment() {
        let a = RequestKey::new(&Method::GET, &url("http://x.test/a.css?v=2#top"));
        let b = RequestKey::new(&Method::GET, &url("http://x.test/a.css?v=2"));
        let c = RequestKey::new(&Method::GET, &url("http://x.test/a.css?v=3"));
        assert_eq!(a, b);
        assert_ne!(b, c);
    }

    #[test]
    fn test_request_key_includes_method() {
        let get = RequestKey::new(&Method::GET, &url("http://x.test/"));
        let post = RequestKey::new(&Method::POST, &url("http://x.test/"));
        assert_ne!(get, post);
        assert_eq!(post.to_string(), "POST http://x.test/");
    }

    #[test]
    fn test_destination_infer() {
        assert_eq!(Destination::infer(&url("http://x.test/")), Destination::Document);
        assert_eq!(Destination::infer(&url("http://x.test/index.html")), Destination::Document);
        assert_eq!(Destination::infer(&url("http://x.test/js/main.js")), Destination::Script);
        assert_eq!(Destination::infer(&url("http://x.test/css/a.css")), Destination::Style);
        assert_eq!(Destination::infer(&url("http://x.test/i/a.PNG")), Destination::Image);
        assert_eq!(Destination::infer(&url("http://x.test/api")), Destination::Other);
    }

    #[test]
    fn test_destination_ignores_dots_in_directories() {
        assert_eq!(Destination::infer(&url("http://x.test/v1.2/about")), Destination::Other);
        assert_eq!(Destination::infer(&url("http://x.test/assets.v2/")), Destination::Document);
        assert_eq!(
            Destination::infer(&url("http://x.test/assets.v2/app.js")),
            Destination::Script
        );
    }

    #[test]
    fn test_cacheable_requires_basic_200() {
        let ok = ResponseSnapshot::new("u", 200, ResponseType::Basic, vec![]);
        let cors = ResponseSnapshot::new("u", 200, ResponseType::Cors, vec![]);
        let partial = ResponseSnapshot::new("u", 206, ResponseType::Basic, vec![]);
        assert!(ok.is_cacheable());
        assert!(!cors.is_cacheable());
        assert!(!partial.is_cacheable());
        assert!(partial.is_ok());
    }

    #[test]
    fn test_header_lookup_ignores_case() {
        let mut response = ResponseSnapshot::new("u", 200, ResponseType::Basic, vec![]);
        response
            .headers
            .push(("content-type".to_string(), "text/css".to_string()));
        assert_eq!(response.header("Content-Type"), Some("text/css"));
        assert_eq!(response.header("etag"), None);
    }

    #[test]
    fn test_get_path_resolves_against_origin() {
        let origin = url("http://x.test:8080");
        let req = Request::get_path(&origin, "/css/style.css").unwrap();
        assert_eq!(req.url.as_str(), "http://x.test:8080/css/style.css");
        assert_eq!(req.destination, Destination::Style);
    }
}
