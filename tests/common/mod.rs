//! Mock Overseerr server shared by the integration tests.
#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use arrsync::ClientOptions;
use axum::{
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri},
    response::IntoResponse,
    Json, Router,
};
use serde_json::{json, Value as JsonValue};

#[derive(Clone)]
pub struct MockResponse {
    status: StatusCode,
    body: JsonValue,
    delay: Duration,
}

impl MockResponse {
    pub fn json(status: StatusCode, body: JsonValue) -> Self {
        Self {
            status,
            body,
            delay: Duration::from_millis(0),
        }
    }

    pub fn status(status: StatusCode) -> Self {
        Self::json(status, json!({}))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub api_key: Option<String>,
    pub accept: Option<String>,
}

#[derive(Clone)]
struct MockState {
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    hits: Arc<AtomicUsize>,
}

async fn overseer_handler(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> impl IntoResponse {
    state.hits.fetch_add(1, Ordering::SeqCst);

    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
    };
    state
        .requests
        .lock()
        .expect("request log mutex must not be poisoned")
        .push(RecordedRequest {
            method,
            path: uri.path().to_owned(),
            api_key: header("x-api-key"),
            accept: header("accept"),
        });

    let response = {
        let mut queue = state
            .responses
            .lock()
            .expect("response queue mutex must not be poisoned");
        queue.pop_front().unwrap_or_else(|| {
            MockResponse::json(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"error": "no mock response available"}),
            )
        })
    };

    if !response.delay.is_zero() {
        tokio::time::sleep(response.delay).await;
    }

    (response.status, Json(response.body))
}

pub struct TestServer {
    pub base_url: String,
    hits: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    task: tokio::task::JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl TestServer {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .expect("request log mutex must not be poisoned")
            .clone()
    }

    pub fn paths(&self) -> Vec<(Method, String)> {
        self.requests()
            .into_iter()
            .map(|request| (request.method, request.path))
            .collect()
    }
}

pub async fn spawn_server(responses: Vec<MockResponse>) -> TestServer {
    let state = MockState {
        responses: Arc::new(Mutex::new(responses.into())),
        requests: Arc::new(Mutex::new(Vec::new())),
        hits: Arc::new(AtomicUsize::new(0)),
    };

    let app = Router::new()
        .fallback(overseer_handler)
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("must bind test listener");
    let address = listener.local_addr().expect("must have local addr");
    let task = tokio::spawn(async move {
        axum::serve(listener, app)
            .await
            .expect("mock server must run");
    });

    TestServer {
        base_url: format!("http://{address}"),
        hits: state.hits,
        requests: state.requests,
        task,
    }
}

/// Short timings so retry paths finish quickly.
pub fn fast_options(max_retries: u32) -> ClientOptions {
    ClientOptions {
        timeout_secs: 1,
        max_retries,
        initial_backoff_secs: 0.1,
        monitor_interval_secs: 1,
    }
}
