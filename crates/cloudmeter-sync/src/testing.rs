//! Scripted transport for unit tests

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio::time::Instant;

use crate::transport::{HttpResponse, Transport, TransportError};

type Reply = Result<HttpResponse, TransportError>;

#[derive(Default)]
struct Route {
    queued: VecDeque<Reply>,
    fallback: Option<Reply>,
}

/// A request seen by the scripted transport
#[derive(Debug, Clone)]
pub struct Call {
    pub path: String,
    pub form: Vec<(String, String)>,
    pub at: Instant,
}

impl Call {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.form
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Replies from per-route queues, then from the route's fallback
///
/// Routes are keyed by path, or by `path:id` for requests carrying an `id`
/// field. Unknown routes fail with a transport error.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<String, Route>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a one-shot reply
    pub fn push(&self, route: &str, reply: Reply) -> &Self {
        self.routes
            .lock()
            .unwrap()
            .entry(route.to_string())
            .or_default()
            .queued
            .push_back(reply);
        self
    }

    /// Reply used once the queue for `route` is drained
    pub fn always(&self, route: &str, reply: Reply) -> &Self {
        self.routes
            .lock()
            .unwrap()
            .entry(route.to_string())
            .or_default()
            .fallback = Some(reply);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, path: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.path == path)
            .count()
    }

    fn reply_for(&self, key: &str) -> Option<Reply> {
        let mut routes = self.routes.lock().unwrap();
        let route = routes.get_mut(key)?;
        route.queued.pop_front().or_else(|| route.fallback.clone())
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn post_form(
        &self,
        path: &str,
        form: &[(String, String)],
    ) -> Result<HttpResponse, TransportError> {
        let call = Call {
            path: path.to_string(),
            form: form.to_vec(),
            at: Instant::now(),
        };
        let keyed = call.field("id").map(|id| format!("{}:{}", path, id));
        self.calls.lock().unwrap().push(call);

        keyed
            .and_then(|key| self.reply_for(&key))
            .or_else(|| self.reply_for(path))
            .unwrap_or_else(|| Err(TransportError::Request(format!("no route for {}", path))))
    }
}

/// 200 response carrying `body` as JSON
pub fn ok(body: Value) -> Reply {
    Ok(HttpResponse::new(200, body.to_string()))
}

/// Response with a bare status code
pub fn status(code: u16) -> Reply {
    Ok(HttpResponse {
        status: code,
        reason: "Scripted".to_string(),
        body: String::new(),
    })
}
