//! Testing utilities for the courier workspace
//!
//! Scripted dispatchers, fixtures and context builders.

#![allow(missing_docs)]

use courier_expr::Bindings;
use courier_flow::{DispatchError, Dispatcher, FlowContext, FlowRegistry, FlowRuntime};
use courier_http::{HttpsRequestObject, HttpsResponseObject};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Once};

static TRACING_INIT: Once = Once::new();

/// Log to the test writer when `RUST_LOG` is set
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_ok() {
            let _ = tracing_subscriber::registry()
                .with(fmt::layer().with_test_writer())
                .with(EnvFilter::from_default_env())
                .try_init();
        }
    });
}

type Reply = Result<HttpsResponseObject, DispatchError>;

/// Dispatcher answering from a queue of canned replies
///
/// Every request is recorded. Once the queue runs dry the dispatcher
/// reports a dispatch error.
#[derive(Debug, Default)]
pub struct ScriptedDispatcher {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<HttpsRequestObject>>,
}

impl ScriptedDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replying(replies: impl IntoIterator<Item = HttpsResponseObject>) -> Self {
        let dispatcher = Self::new();
        for reply in replies {
            dispatcher.push(reply);
        }
        dispatcher
    }

    pub fn push(&self, response: HttpsResponseObject) {
        self.replies.lock().push_back(Ok(response));
    }

    pub fn push_error(&self, message: &str) {
        self.replies.lock().push_back(Err(DispatchError::new(message)));
    }

    pub fn requests(&self) -> Vec<HttpsRequestObject> {
        self.requests.lock().clone()
    }

    pub fn urls(&self) -> Vec<String> {
        self.requests.lock().iter().map(|r| r.url.clone()).collect()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().len()
    }
}

#[async_trait::async_trait]
impl Dispatcher for ScriptedDispatcher {
    async fn dispatch(&self, request: &HttpsRequestObject) -> Result<HttpsResponseObject, DispatchError> {
        self.requests.lock().push(request.clone());
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(DispatchError::new("no scripted reply left")))
    }
}

/// Bindings from a JSON object; anything else gives empty bindings
pub fn bindings(value: Value) -> Bindings {
    match value {
        Value::Object(map) => map.into_iter().collect(),
        _ => Bindings::new(),
    }
}

pub fn json_response(status: u16, body: &Value) -> HttpsResponseObject {
    HttpsResponseObject::new(status)
        .with_header("content-type", "application/json")
        .with_body(body.to_string())
}

pub fn status_response(status: u16) -> HttpsResponseObject {
    HttpsResponseObject::new(status)
}

/// Context over `dispatcher` with `registry` for `use` lookups
pub fn context_with(dispatcher: Arc<ScriptedDispatcher>, registry: FlowRegistry) -> FlowContext {
    FlowContext::new(Arc::new(FlowRuntime::new(dispatcher).with_registry(registry)))
}

pub fn context(dispatcher: Arc<ScriptedDispatcher>) -> FlowContext {
    context_with(dispatcher, FlowRegistry::new())
}
