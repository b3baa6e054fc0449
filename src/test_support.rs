use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use reqwest::Method;
use tokio_util::sync::CancellationToken;

use crate::{Result, Transport, UpstreamRequest, UpstreamResponse};

#[derive(Clone, Debug)]
pub(crate) struct Scripted {
    status: u16,
    body: String,
    delay: Duration,
}

impl Scripted {
    pub(crate) fn status(status: u16) -> Self {
        Self::json(status, "{}")
    }

    pub(crate) fn json(status: u16, body: &str) -> Self {
        Self {
            status,
            body: body.to_owned(),
            delay: Duration::ZERO,
        }
    }

    pub(crate) fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// In-memory transport replaying scripted responses, falling back to a
/// repeating response (or 500) once the queue is empty.
#[derive(Debug, Default)]
pub(crate) struct ScriptedTransport {
    queue: Mutex<VecDeque<Scripted>>,
    fallback: Option<Scripted>,
    hits: AtomicUsize,
    requests: Mutex<Vec<(Method, String)>>,
    cancel_on_hit: Mutex<Option<(usize, CancellationToken)>>,
}

impl ScriptedTransport {
    pub(crate) fn new(responses: impl IntoIterator<Item = Scripted>) -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(responses.into_iter().collect()),
            ..Self::default()
        })
    }

    pub(crate) fn repeating(response: Scripted) -> Arc<Self> {
        Arc::new(Self {
            fallback: Some(response),
            ..Self::default()
        })
    }

    pub(crate) fn push(&self, response: Scripted) {
        self.queue
            .lock()
            .expect("queue mutex must not be poisoned")
            .push_back(response);
    }

    pub(crate) fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub(crate) fn requests(&self) -> Vec<(Method, String)> {
        self.requests
            .lock()
            .expect("request log mutex must not be poisoned")
            .clone()
    }

    /// Cancels `token` when the `hit`-th request arrives (1-based).
    pub(crate) fn cancel_on_hit(&self, hit: usize, token: CancellationToken) {
        *self
            .cancel_on_hit
            .lock()
            .expect("cancel mutex must not be poisoned") = Some((hit, token));
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(
        &self,
        request: &UpstreamRequest,
        _cancel: &CancellationToken,
    ) -> Result<UpstreamResponse> {
        let hit = self.hits.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests
            .lock()
            .expect("request log mutex must not be poisoned")
            .push((request.method.clone(), request.path.clone()));

        if let Some((at, token)) = self
            .cancel_on_hit
            .lock()
            .expect("cancel mutex must not be poisoned")
            .as_ref()
        {
            if *at == hit {
                token.cancel();
            }
        }

        let scripted = {
            let mut queue = self.queue.lock().expect("queue mutex must not be poisoned");
            queue
                .pop_front()
                .or_else(|| self.fallback.clone())
                .unwrap_or_else(|| Scripted::json(500, r#"{"error":"no scripted response"}"#))
        };

        if !scripted.delay.is_zero() {
            tokio::time::sleep(scripted.delay).await;
        }
        Ok(UpstreamResponse::new(scripted.status, scripted.body))
    }
}
