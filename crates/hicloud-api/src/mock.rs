//! In-memory transport for tests and offline demos.
//!
//! Routes are keyed by `METHOD path` (query string included). Unmatched reads
//! answer `NotFound`; unmatched writes answer an empty object so callers that
//! only care about "did it get called" need no setup.

use crate::error::{error_from_response, ApiError, ApiResult};
use crate::transport::{Method, Transport};
use serde_json::{json, Value};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

#[derive(Debug, Clone)]
enum Canned {
    Json(Value),
    Status { status: u16, body: String },
}

#[derive(Default)]
pub struct MockTransport {
    routes: RefCell<HashMap<(Method, String), Canned>>,
    calls: RefCell<Vec<RecordedCall>>,
    token: RefCell<String>,
    offline: Cell<bool>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`MockTransport::respond`].
    pub fn with(self, method: Method, path: &str, body: Value) -> Self {
        self.respond(method, path, body);
        self
    }

    pub fn respond(&self, method: Method, path: &str, body: Value) {
        self.routes
            .borrow_mut()
            .insert((method, path.to_string()), Canned::Json(body));
    }

    /// Answer `method path` with an API error envelope.
    pub fn fail(&self, method: Method, path: &str, status: u16, message: &str) {
        let body = json!({ "error": { "code": "mock_error", "message": message } }).to_string();
        self.routes
            .borrow_mut()
            .insert((method, path.to_string()), Canned::Status { status, body });
    }

    /// Simulate an unreachable API: every request fails with a network error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.set(offline);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.borrow().clone()
    }

    pub fn write_calls(&self) -> usize {
        self.calls.borrow().iter().filter(|c| c.method.is_write()).count()
    }

    pub fn read_calls(&self) -> usize {
        self.calls.borrow().iter().filter(|c| !c.method.is_write()).count()
    }

    pub fn calls_to(&self, method: Method, path: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.method == method && c.path == path)
            .count()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    pub fn token(&self) -> String {
        self.token.borrow().clone()
    }
}

impl Transport for MockTransport {
    fn request(&self, method: Method, path: &str, body: Option<&Value>) -> ApiResult<Value> {
        self.calls.borrow_mut().push(RecordedCall {
            method,
            path: path.to_string(),
            body: body.cloned(),
        });

        if self.offline.get() {
            return Err(ApiError::Network("mock transport is offline".to_string()));
        }

        let canned = self.routes.borrow().get(&(method, path.to_string())).cloned();
        match canned {
            Some(Canned::Json(v)) => Ok(v),
            Some(Canned::Status { status, body }) => Err(error_from_response(status, &body, path)),
            None if method.is_write() => Ok(json!({})),
            None => Err(ApiError::NotFound(path.to_string())),
        }
    }

    fn set_token(&self, token: &str) {
        *self.token.borrow_mut() = token.to_string();
    }
}
