//! HTTP-level request built by the transport and mutated by signers

use crate::transfer::InputStream;
use hyper::header::{HeaderMap, HeaderName, HeaderValue};
use hyper::Method;

/// One storage-protocol HTTP request.
///
/// `path` holds the already URI-encoded path plus optional query string.
#[derive(Debug)]
pub struct HttpRequest {
    method: Method,
    path: String,
    headers: HeaderMap,
    body: Option<InputStream>,
}

impl HttpRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Path and query, as sent on the request line
    pub fn path_and_query(&self) -> &str {
        &self.path
    }

    pub fn path(&self) -> &str {
        match self.path.find('?') {
            Some(pos) => &self.path[..pos],
            None => &self.path,
        }
    }

    pub fn query(&self) -> &str {
        match self.path.find('?') {
            Some(pos) => &self.path[pos + 1..],
            None => "",
        }
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// First value of `name` as a string, if present and visible ASCII
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn insert_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    pub fn body(&self) -> Option<&InputStream> {
        self.body.as_ref()
    }

    pub fn set_body(&mut self, body: InputStream) {
        self.body = Some(body);
    }

    pub fn take_body(&mut self) -> Option<InputStream> {
        self.body.take()
    }

    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }
}
