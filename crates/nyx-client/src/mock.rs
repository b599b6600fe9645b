//! Scripted in-memory transport for tests.
//!
//! Replies are queued per `(method, path)`. The last queued reply for a route
//! is sticky, so a single `respond` answers every subsequent call.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use nyx_types::{NyxError, Result};

use crate::transport::{HttpMethod, Transport, TransportRequest, TransportResponse};

#[derive(Debug, Clone)]
enum MockReply {
    Response(TransportResponse),
    Fail(String),
}

#[derive(Debug, Default)]
pub struct MockTransport {
    routes: Mutex<HashMap<(HttpMethod, String), VecDeque<MockReply>>>,
    requests: Mutex<Vec<TransportRequest>>,
    latency: Option<Duration>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every reply, to widen race windows in concurrency tests.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Queue a 200 reply with `body`.
    pub fn respond(&self, method: HttpMethod, path: &str, body: impl Into<String>) -> &Self {
        self.push(method, path, MockReply::Response(TransportResponse::ok(body)))
    }

    pub fn respond_status(
        &self,
        method: HttpMethod,
        path: &str,
        status: u16,
        body: impl Into<String>,
    ) -> &Self {
        self.push(
            method,
            path,
            MockReply::Response(TransportResponse {
                status,
                body: body.into(),
            }),
        )
    }

    /// Queue a connection-level failure.
    pub fn fail(&self, method: HttpMethod, path: &str, message: impl Into<String>) -> &Self {
        self.push(method, path, MockReply::Fail(message.into()))
    }

    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().expect("mock requests lock").clone()
    }

    pub fn count(&self, method: HttpMethod, path: &str) -> usize {
        self.requests
            .lock()
            .expect("mock requests lock")
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }

    pub fn total_requests(&self) -> usize {
        self.requests.lock().expect("mock requests lock").len()
    }

    fn push(&self, method: HttpMethod, path: &str, reply: MockReply) -> &Self {
        self.routes
            .lock()
            .expect("mock routes lock")
            .entry((method, path.to_string()))
            .or_default()
            .push_back(reply);
        self
    }

    fn next_reply(&self, method: HttpMethod, path: &str) -> Option<MockReply> {
        let mut routes = self.routes.lock().expect("mock routes lock");
        let queue = routes.get_mut(&(method, path.to_string()))?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(&self, request: TransportRequest) -> Result<TransportResponse> {
        let (method, path) = (request.method, request.path.clone());
        self.requests
            .lock()
            .expect("mock requests lock")
            .push(request);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        match self.next_reply(method, &path) {
            Some(MockReply::Response(response)) => Ok(response),
            Some(MockReply::Fail(message)) => Err(NyxError::Transport(message)),
            None => Err(NyxError::Transport(format!(
                "no mock reply for {method} {path}"
            ))),
        }
    }
}
