//! Component D: a URL-keyed store of cacheable responses, participating in
//! `If-None-Match` revalidation.

use crate::cache::LruCache;
use crate::message::{Request, Response};

/// A full stored response: rendered bytes plus the ETag extracted at insert time,
/// so `revalidate` doesn't need to re-parse `text` on every hit.
#[derive(Debug, Clone)]
pub struct StoredResponse {
    pub text: Vec<u8>,
    pub etag: String,
}

pub struct ResponseCache {
    entries: LruCache<String, StoredResponse>,
}

impl ResponseCache {
    pub fn new(capacity: usize) -> Self {
        ResponseCache {
            entries: LruCache::new(capacity),
        }
    }

    /// The cache key is `host + URI`, exactly as specified.
    pub fn key(host: &str, uri: &str) -> String {
        format!("{host}{uri}")
    }

    pub fn exists(&self, key: &str) -> bool {
        self.entries.exists(&key.to_string())
    }

    pub fn get(&mut self, key: &str) -> Option<StoredResponse> {
        self.entries.get(&key.to_string())
    }

    /// Inserts `resp` under `key` iff `is_cacheable(req, resp)` holds.
    pub fn try_store(&mut self, key: &str, req: &Request, resp: &Response) {
        if !is_cacheable(req, resp) {
            return;
        }
        let etag = match resp.etag() {
            Some(e) => e.to_string(),
            None => return,
        };
        self.entries.put(
            key.to_string(),
            StoredResponse {
                text: resp.text().to_vec(),
                etag,
            },
        );
    }

    pub fn size(&self) -> usize {
        self.entries.size()
    }
}

/// `is_cacheable`: response carries its own 200/ETag/Cache-Control check; the
/// request must not have carried credentials.
pub fn is_cacheable(req: &Request, resp: &Response) -> bool {
    resp.is_cacheable() && !req.message().headers().has_nonempty("authorization")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Request as Req;

    fn cacheable_response() -> Response {
        let mut r = Response::new();
        r.append(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nETag: \"x\"\r\n\r\nhi");
        r
    }

    #[test]
    fn insert_then_lookup_byte_identical() {
        let mut cache = ResponseCache::new(10);
        let mut req = Req::new();
        req.append(b"GET /a HTTP/1.1\r\nHost: h\r\n\r\n");
        let resp = cacheable_response();
        let key = ResponseCache::key("h", "/a");
        cache.try_store(&key, &req, &resp);
        let stored = cache.get(&key).expect("entry present");
        assert_eq!(stored.text, resp.text());
        assert_eq!(stored.etag, "\"x\"");
    }

    #[test]
    fn no_etag_is_not_cached() {
        let mut cache = ResponseCache::new(10);
        let mut req = Req::new();
        req.append(b"GET /a HTTP/1.1\r\nHost: h\r\n\r\n");
        let mut resp = Response::new();
        resp.append(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nhi");
        let key = ResponseCache::key("h", "/a");
        cache.try_store(&key, &req, &resp);
        assert!(!cache.exists(&key));
    }

    #[test]
    fn authenticated_request_is_not_cached() {
        let mut cache = ResponseCache::new(10);
        let mut req = Req::new();
        req.append(b"GET /a HTTP/1.1\r\nHost: h\r\nAuthorization: Basic abc\r\n\r\n");
        let resp = cacheable_response();
        let key = ResponseCache::key("h", "/a");
        cache.try_store(&key, &req, &resp);
        assert!(!cache.exists(&key));
    }
}
