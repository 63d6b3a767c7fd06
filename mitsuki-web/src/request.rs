//! Raw transport request view handed to handlers declaring a `request` binding: method, path,
//! headers, query and client address, without the body (which is owned by the binding step).

use axum::http::{HeaderMap, Method};
use fxhash::FxHashMap;
use std::net::SocketAddr;

#[derive(Clone, Debug)]
pub struct RequestContext {
    method: Method,
    path: String,
    query: FxHashMap<String, String>,
    headers: HeaderMap,
    client_addr: Option<SocketAddr>,
}

impl RequestContext {
    pub(crate) fn new(
        method: Method,
        path: String,
        query: FxHashMap<String, String>,
        headers: HeaderMap,
        client_addr: Option<SocketAddr>,
    ) -> Self {
        Self {
            method,
            path,
            query,
            headers,
            client_addr,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> &FxHashMap<String, String> {
        &self.query
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn client_addr(&self) -> Option<SocketAddr> {
        self.client_addr
    }
}
