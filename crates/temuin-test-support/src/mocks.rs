//! In-process backend that answers [`Transport`] calls from scripted routes.
//!
//! Routes map `(method, path)` to a responder. One-shot replies take precedence
//! over the route, and a [`Gate`] can suspend the next matching call until the
//! test releases it, which is how tests pin down interleavings.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::{Notify, watch};

use temuin_client::{ApiRequest, ApiResponse, ClientResult, Method, Transport};

type Responder = Arc<dyn Fn(&ApiRequest) -> MockReply + Send + Sync>;
type RouteKey = (Method, String);

/// Status and JSON body returned by a mock route.
#[derive(Debug, Clone, PartialEq)]
pub struct MockReply {
    /// HTTP status code.
    pub status: u16,
    /// JSON body; `Value::Null` sends an empty body.
    pub body: Value,
}

impl MockReply {
    /// Reply with `status` and `body`.
    #[must_use]
    pub const fn json(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    /// `200` with `body`.
    #[must_use]
    pub const fn ok(body: Value) -> Self {
        Self::json(200, body)
    }

    /// Error reply in the backend's `{"message": ...}` shape.
    #[must_use]
    pub fn error(status: u16, message: &str) -> Self {
        Self::json(status, json!({ "message": message }))
    }

    fn into_response(self) -> ApiResponse {
        let body = if self.body.is_null() {
            Vec::new()
        } else {
            self.body.to_string().into_bytes()
        };
        ApiResponse {
            status: self.status,
            body,
        }
    }
}

/// One request observed by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// HTTP method.
    pub method: Method,
    /// Request path.
    pub path: String,
    /// Query parameters.
    pub query: Vec<(String, String)>,
    /// JSON body.
    pub body: Option<Value>,
    /// Bearer token attached to the attempt.
    pub bearer: Option<String>,
    /// Whether the attempt was a post-refresh replay.
    pub retry: bool,
}

impl RecordedCall {
    /// Value of query parameter `key`.
    #[must_use]
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }
}

/// Suspension point for one call.
#[derive(Debug, Default)]
pub struct Gate {
    arrived: Notify,
    released: Notify,
}

impl Gate {
    /// Wait until the held call has reached the backend.
    pub async fn arrived(&self) {
        self.arrived.notified().await;
    }

    /// Let the held call produce its reply.
    pub fn release(&self) {
        self.released.notify_one();
    }

    async fn pass(&self) {
        self.arrived.notify_one();
        self.released.notified().await;
    }
}

#[derive(Default)]
struct BackendState {
    routes: HashMap<RouteKey, Responder>,
    once: HashMap<RouteKey, VecDeque<MockReply>>,
    holds: HashMap<RouteKey, VecDeque<Arc<Gate>>>,
    calls: Vec<RecordedCall>,
}

/// Scripted backend; clones share routes and the call log.
#[derive(Clone)]
pub struct MockBackend {
    state: Arc<Mutex<BackendState>>,
    changes: Arc<watch::Sender<usize>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// Backend with no routes; every call answers `404`.
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            state: Arc::new(Mutex::new(BackendState::default())),
            changes: Arc::new(changes),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BackendState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Install (or replace) the responder for `method path`.
    pub fn on<F>(&self, method: Method, path: &str, responder: F)
    where
        F: Fn(&ApiRequest) -> MockReply + Send + Sync + 'static,
    {
        self.lock()
            .routes
            .insert((method, path.to_string()), Arc::new(responder));
    }

    /// Answer the next `method path` call with `reply`, ahead of the route.
    pub fn respond_once(&self, method: Method, path: &str, reply: MockReply) {
        self.lock()
            .once
            .entry((method, path.to_string()))
            .or_default()
            .push_back(reply);
    }

    /// Suspend the next `method path` call until the returned gate is released.
    #[must_use]
    pub fn hold(&self, method: Method, path: &str) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        self.lock()
            .holds
            .entry((method, path.to_string()))
            .or_default()
            .push_back(Arc::clone(&gate));
        gate
    }

    /// Every call in arrival order.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    /// Calls to `method path` in arrival order.
    #[must_use]
    pub fn calls_to(&self, method: Method, path: &str) -> Vec<RecordedCall> {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.method == method && call.path == path)
            .cloned()
            .collect()
    }

    /// Number of calls to `method path`.
    #[must_use]
    pub fn count(&self, method: Method, path: &str) -> usize {
        self.calls_to(method, path).len()
    }

    /// Paths of every call in arrival order.
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .map(|call| call.path.clone())
            .collect()
    }

    /// Wait until at least `expected` calls to `method path` have arrived.
    pub async fn wait_for_calls(&self, method: Method, path: &str, expected: usize) {
        let mut changes = self.changes.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = changes
            .wait_for(|_| self.count(method, path) >= expected)
            .await;
    }

    fn route(&self, request: &ApiRequest) -> (Option<Arc<Gate>>, Option<MockReply>, Option<Responder>) {
        let key = (request.method(), request.path().to_string());
        let mut state = self.lock();
        state.calls.push(RecordedCall {
            method: request.method(),
            path: request.path().to_string(),
            query: request.query().to_vec(),
            body: request.body().cloned(),
            bearer: request.bearer().map(str::to_string),
            retry: request.is_retry(),
        });
        let gate = state.holds.get_mut(&key).and_then(VecDeque::pop_front);
        let once = state.once.get_mut(&key).and_then(VecDeque::pop_front);
        let responder = state.routes.get(&key).cloned();
        (gate, once, responder)
    }
}

#[async_trait]
impl Transport for MockBackend {
    async fn execute(&self, request: &ApiRequest) -> ClientResult<ApiResponse> {
        let (gate, once, responder) = self.route(request);
        self.changes.send_modify(|calls| *calls += 1);
        if let Some(gate) = gate {
            gate.pass().await;
        }
        let reply = once
            .or_else(|| responder.map(|respond| respond(request)))
            .unwrap_or_else(|| {
                MockReply::error(
                    404,
                    &format!("no mock for {} {}", request.method().as_str(), request.path()),
                )
            });
        Ok(reply.into_response())
    }
}

impl std::fmt::Debug for MockBackend {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        formatter
            .debug_struct("MockBackend")
            .field("routes", &state.routes.len())
            .field("calls", &state.calls.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn once_replies_take_precedence_over_routes() {
        let backend = MockBackend::new();
        backend.on(Method::Get, "/providers", |_| MockReply::ok(json!([])));
        backend.respond_once(Method::Get, "/providers", MockReply::error(500, "boom"));

        let request = ApiRequest::get("/providers");
        assert_eq!(backend.execute(&request).await.expect("reply").status, 500);
        assert_eq!(backend.execute(&request).await.expect("reply").status, 200);
        assert_eq!(backend.count(Method::Get, "/providers"), 2);
    }

    #[tokio::test]
    async fn unknown_routes_answer_not_found() {
        let backend = MockBackend::new();
        let response = backend
            .execute(&ApiRequest::post("/nowhere"))
            .await
            .expect("reply");
        assert_eq!(response.status, 404);
    }

    #[tokio::test]
    async fn held_calls_wait_for_release() {
        let backend = MockBackend::new();
        backend.on(Method::Get, "/services", |_| MockReply::ok(json!([])));
        let gate = backend.hold(Method::Get, "/services");

        let pending = {
            let backend = backend.clone();
            tokio::spawn(async move { backend.execute(&ApiRequest::get("/services")).await })
        };
        gate.arrived().await;
        assert!(!pending.is_finished());
        gate.release();
        let response = pending.await.expect("join").expect("reply");
        assert_eq!(response.status, 200);
    }
}
