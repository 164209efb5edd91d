//! Intercepted requests, synthetic responses, and the network seam.

use futures::future::BoxFuture;
use hashbrown::HashMap;
use url::Url;

use crate::cache::CachedResponse;
use crate::SwError;

/// Whether a request is a page navigation or a subresource load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
    Navigation,
    #[default]
    Resource,
}

/// An intercepted request.
#[derive(Debug, Clone)]
pub struct SwRequest {
    pub url: Url,
    pub mode: RequestMode,
}

impl SwRequest {
    pub fn navigation(url: Url) -> Self {
        Self {
            url,
            mode: RequestMode::Navigation,
        }
    }

    pub fn resource(url: Url) -> Self {
        Self {
            url,
            mode: RequestMode::Resource,
        }
    }

    /// Only http/https requests are intercepted; everything else passes
    /// through unmodified.
    pub fn is_interceptable(&self) -> bool {
        matches!(self.url.scheme(), "http" | "https")
    }
}

/// Response type as seen by the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseKind {
    /// Same-origin response; safe to cache.
    #[default]
    Basic,
    /// Cross-origin response with CORS headers.
    Cors,
    /// Cross-origin response without readable body.
    Opaque,
}

/// A response handed back to the intercepted request.
#[derive(Debug, Clone)]
pub struct SwResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub kind: ResponseKind,
    pub from_cache: bool,
}

impl SwResponse {
    /// A successful basic response.
    pub fn ok(body: Vec<u8>) -> Self {
        Self {
            status: 200,
            status_text: "OK".to_string(),
            headers: HashMap::new(),
            body,
            kind: ResponseKind::Basic,
            from_cache: false,
        }
    }

    /// The synthetic response returned when neither cache nor network can
    /// answer.
    pub fn service_unavailable() -> Self {
        Self {
            status: 503,
            status_text: "Service Unavailable".to_string(),
            headers: HashMap::new(),
            body: b"offline".to_vec(),
            kind: ResponseKind::Basic,
            from_cache: false,
        }
    }

    /// Rebuild a response from a cache entry.
    pub fn from_cached(entry: &CachedResponse) -> Self {
        Self {
            status: entry.status,
            status_text: "OK".to_string(),
            headers: entry.headers.clone(),
            body: entry.body.clone(),
            kind: ResponseKind::Basic,
            from_cache: true,
        }
    }

    /// Clone this response into a cache entry for the given URL.
    pub fn to_cached(&self, url: &Url, cached_at: u64) -> CachedResponse {
        CachedResponse {
            url: url.to_string(),
            status: self.status,
            headers: self.headers.clone(),
            body: self.body.clone(),
            cached_at,
        }
    }

    /// Only basic, successful responses are written into the cache.
    pub fn is_cacheable(&self) -> bool {
        self.status == 200 && self.kind == ResponseKind::Basic
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Outcome of request interception.
#[derive(Debug)]
pub enum FetchDecision {
    /// The worker answers the request itself.
    Respond(SwResponse),
    /// Non-http(s) scheme; the platform handles it unmodified.
    PassThrough,
}

/// The network seam. The production implementation performs real HTTP;
/// tests substitute scripted responses and failures.
pub trait AssetFetcher: Send + Sync {
    fn fetch(&self, request: &SwRequest) -> BoxFuture<'_, Result<SwResponse, SwError>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_interception() {
        let http = SwRequest::resource(Url::parse("http://shop.example/app.js").unwrap());
        let https = SwRequest::resource(Url::parse("https://shop.example/app.js").unwrap());
        let ext = SwRequest::resource(Url::parse("chrome-extension://abc/def.js").unwrap());

        assert!(http.is_interceptable());
        assert!(https.is_interceptable());
        assert!(!ext.is_interceptable());
    }

    #[test]
    fn test_cacheable_requires_basic_200() {
        let mut resp = SwResponse::ok(Vec::new());
        assert!(resp.is_cacheable());

        resp.status = 204;
        assert!(!resp.is_cacheable());

        resp.status = 200;
        resp.kind = ResponseKind::Opaque;
        assert!(!resp.is_cacheable());
    }

    #[test]
    fn test_cache_roundtrip_marks_origin() {
        let url = Url::parse("https://shop.example/index.html").unwrap();
        let resp = SwResponse::ok(b"<html>".to_vec());
        let entry = resp.to_cached(&url, 42);

        assert_eq!(entry.url, url.as_str());
        assert_eq!(entry.cached_at, 42);

        let served = SwResponse::from_cached(&entry);
        assert!(served.from_cache);
        assert_eq!(served.body, b"<html>");
    }

    #[test]
    fn test_synthetic_503() {
        let resp = SwResponse::service_unavailable();
        assert_eq!(resp.status, 503);
        assert!(!resp.is_success());
    }
}
