use std::time::Duration;

/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum OverseerError {
    /// Network or request execution error from `reqwest`.
    #[error("transport error: {0}")]
    Transport(reqwest::Error),
    /// A single attempt did not finish within the per-attempt timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    /// The circuit breaker is open and the call was not attempted.
    #[error("circuit open: upstream calls are suspended")]
    CircuitOpen,
    /// Non-success HTTP status code with raw response body.
    #[error("unexpected status {status}: {body}")]
    Http { status: u16, body: String },
    /// Success response that carried neither `mediaInfo.id` nor `id`.
    #[error("could not find media id in response")]
    MissingMediaId,
    /// Response body was not valid JSON.
    #[error("decode error: {0}")]
    Decode(String),
    /// The caller's cancellation token fired.
    #[error("operation cancelled")]
    Cancelled,
    /// Invalid or missing configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl OverseerError {
    /// Returns `true` for failures worth retrying at the transport level:
    /// connection problems and per-attempt timeouts. 5xx responses are
    /// classified on the response itself, see [`crate::UpstreamResponse::is_transient`].
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
