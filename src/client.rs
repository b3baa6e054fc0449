use std::{fmt, future::Future, sync::Arc, time::Instant};

use tokio_util::sync::CancellationToken;

use crate::{
    backoff::BackoffSchedule,
    breaker::CircuitState,
    pipeline::ResiliencePipeline,
    stats::{self, CallStatus, Operation, OperationStats},
    timer::sleep_or_cancel,
    transport::HttpTransport,
    wire::parse_media_id,
    Availability, ClientOptions, HealthReport, MediaLookup, MediaType, OverseerConfig, OverseerError,
    Result, Transport, UpstreamRequest,
};

pub const STATUS_PATH: &str = "/api/v1/status";

pub fn media_lookup_path(media_type: MediaType, external_id: i64) -> String {
    format!("/api/v1/{media_type}/{external_id}")
}

pub fn media_delete_path(media_id: i64) -> String {
    format!("/api/v1/media/{media_id}")
}

#[derive(Clone)]
/// Client for the Overseerr request catalog.
///
/// Every call goes through a [`ResiliencePipeline`]. Lookups and deletes
/// additionally run their own retry loop which decides when the upstream
/// counts as unavailable. Clones share the availability flag, the circuit
/// breaker and the counters.
pub struct OverseerClient {
    transport: Arc<dyn Transport>,
    pipeline: Arc<ResiliencePipeline>,
    options: ClientOptions,
    schedule: BackoffSchedule,
    available: Availability,
    stats: Arc<OperationStats>,
    endpoint: String,
}

impl fmt::Debug for OverseerClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverseerClient")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .field("options", &self.options)
            .field("available", &self.available.get())
            .finish()
    }
}

impl OverseerClient {
    /// Creates a client for `base_url` with default [`ClientOptions`].
    ///
    /// `api_key` is sent as `X-Api-Key` on every request when non-blank.
    pub fn new(base_url: impl Into<String>, api_key: Option<&str>) -> Result<Self> {
        let options = ClientOptions::default();
        let transport = HttpTransport::new(base_url, api_key, options.timeout())?;
        let endpoint = transport.base_url().to_owned();
        Ok(Self::build(Arc::new(transport), options, endpoint))
    }

    /// Creates a client from a loaded [`OverseerConfig`].
    pub fn from_config(config: &OverseerConfig) -> Result<Self> {
        config.options.validate()?;
        let transport = HttpTransport::new(
            config.base_url.as_str(),
            config.api_key.as_deref(),
            config.options.timeout(),
        )?;
        let endpoint = transport.base_url().to_owned();
        Ok(Self::build(
            Arc::new(transport),
            config.options.clone(),
            endpoint,
        ))
    }

    /// Creates a client from environment variables, see
    /// [`OverseerConfig::from_env`].
    pub fn from_env() -> Result<Self> {
        Self::from_config(&OverseerConfig::from_env()?)
    }

    /// Wraps an arbitrary raw transport in the resilience pipeline.
    pub fn with_transport(transport: Arc<dyn Transport>, options: ClientOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self::build(transport, options, "<custom transport>".to_owned()))
    }

    /// Applies client options such as timeout and retry behavior.
    ///
    /// Rebuilds the pipeline, so the circuit breaker starts closed again.
    pub fn with_options(mut self, options: ClientOptions) -> Result<Self> {
        options.validate()?;
        self.pipeline = Arc::new(ResiliencePipeline::new(
            Arc::clone(&self.transport),
            &options,
        ));
        self.schedule = BackoffSchedule::from_options(&options);
        self.options = options;
        Ok(self)
    }

    fn build(transport: Arc<dyn Transport>, options: ClientOptions, endpoint: String) -> Self {
        let available = Availability::default();
        stats::record_availability(available.get());
        Self {
            pipeline: Arc::new(ResiliencePipeline::new(Arc::clone(&transport), &options)),
            transport,
            schedule: BackoffSchedule::from_options(&options),
            options,
            available,
            stats: Arc::new(OperationStats::new()),
            endpoint,
        }
    }

    pub fn is_available(&self) -> bool {
        self.available.get()
    }

    /// Handle to the shared availability flag.
    pub fn availability(&self) -> Availability {
        self.available.clone()
    }

    pub fn stats(&self) -> &OperationStats {
        &self.stats
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.pipeline.circuit_state()
    }

    /// Probes `GET /api/v1/status` once through the pipeline.
    ///
    /// Never fails except on cancellation: an unhealthy upstream is reported
    /// in the returned [`HealthReport`] and clears the availability flag.
    pub async fn health_check(&self, cancel: &CancellationToken) -> Result<HealthReport> {
        let operation = Operation::Health;
        self.stats.record(operation, CallStatus::Start);

        let started = Instant::now();
        let outcome = self
            .pipeline
            .send(&UpstreamRequest::get(STATUS_PATH), cancel)
            .await;
        self.stats.record_latency(operation, started.elapsed());

        match outcome {
            Ok(response) if response.is_success() => {
                self.available.set(true);
                self.stats.record(operation, CallStatus::Ok);
                Ok(HealthReport::ok())
            }
            Ok(response) => {
                self.available.set(false);
                self.stats.record(operation, CallStatus::Error);
                self.stats.record_failure(operation);
                Ok(HealthReport::unhealthy(format!("status: {}", response.status)))
            }
            Err(err) if err.is_cancelled() => Err(err),
            Err(err) => {
                self.available.set(false);
                self.stats.record(operation, CallStatus::Exception);
                self.stats.record_failure(operation);
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %err, "overseer health check failed");
                Ok(HealthReport::unhealthy(err.to_string()))
            }
        }
    }

    /// Looks up the catalog id for an external (TMDB) id.
    ///
    /// Returns `Ok(None)` both when the upstream has no such media (404) and
    /// when the call was skipped because the upstream is marked unavailable.
    /// Use [`OverseerClient::lookup_media`] to tell the two apart.
    pub async fn lookup_media_id(
        &self,
        external_id: i64,
        media_type: MediaType,
        cancel: &CancellationToken,
    ) -> Result<Option<i64>> {
        self.lookup_media(external_id, media_type, cancel)
            .await
            .map(MediaLookup::media_id)
    }

    /// Same as [`OverseerClient::lookup_media_id`], keeping "not found" and
    /// "skipped" distinct.
    pub async fn lookup_media(
        &self,
        external_id: i64,
        media_type: MediaType,
        cancel: &CancellationToken,
    ) -> Result<MediaLookup> {
        let operation = Operation::GetMedia;
        self.stats.record(operation, CallStatus::Start);
        if !self.available.get() {
            #[cfg(feature = "tracing")]
            tracing::warn!(external_id, %media_type, "overseer unavailable, skipping lookup");
            self.stats.record(operation, CallStatus::Skipped);
            return Ok(MediaLookup::Skipped);
        }

        let request = UpstreamRequest::get(media_lookup_path(media_type, external_id));
        let found = self
            .with_retry(operation, cancel, || self.lookup_once(&request, cancel))
            .await?;

        self.available.set(true);
        match found {
            Some(media_id) => {
                self.stats.record(operation, CallStatus::Ok);
                Ok(MediaLookup::Found(media_id))
            }
            None => {
                self.stats.record(operation, CallStatus::NotFound);
                Ok(MediaLookup::NotFound)
            }
        }
    }

    /// Deletes a catalog entry, cascading to its requests upstream.
    ///
    /// Returns `Ok(false)` without calling the upstream while it is marked
    /// unavailable.
    pub async fn delete_media(&self, media_id: i64, cancel: &CancellationToken) -> Result<bool> {
        let operation = Operation::DeleteMedia;
        self.stats.record(operation, CallStatus::Start);
        if !self.available.get() {
            #[cfg(feature = "tracing")]
            tracing::warn!(media_id, "overseer unavailable, skipping delete");
            self.stats.record(operation, CallStatus::Skipped);
            return Ok(false);
        }

        let request = UpstreamRequest::delete(media_delete_path(media_id));
        self.with_retry(operation, cancel, || self.delete_once(&request, cancel))
            .await?;

        self.available.set(true);
        self.stats.record(operation, CallStatus::Ok);
        Ok(true)
    }

    async fn lookup_once(
        &self,
        request: &UpstreamRequest,
        cancel: &CancellationToken,
    ) -> Result<Option<i64>> {
        let response = self.pipeline.send(request, cancel).await?;
        if response.status == 404 {
            return Ok(None);
        }
        if response.is_success() {
            return parse_media_id(&response.body).map(Some);
        }
        Err(OverseerError::Http {
            status: response.status,
            body: response.body,
        })
    }

    async fn delete_once(&self, request: &UpstreamRequest, cancel: &CancellationToken) -> Result<()> {
        let response = self.pipeline.send(request, cancel).await?;
        if response.is_success() {
            return Ok(());
        }
        Err(OverseerError::Http {
            status: response.status,
            body: response.body,
        })
    }

    /// Runs `attempt` up to `max_retries + 1` times.
    ///
    /// Cancellation is returned immediately and not counted. Exhaustion
    /// marks the upstream unavailable and returns the last error.
    async fn with_retry<T, F, Fut>(
        &self,
        operation: Operation,
        cancel: &CancellationToken,
        mut attempt: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.options.max_retries.saturating_add(1);
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let started = Instant::now();
            let outcome = attempt().await;
            self.stats.record_latency(operation, started.elapsed());

            let err = match outcome {
                Ok(value) => return Ok(value),
                Err(err) if err.is_cancelled() => return Err(err),
                Err(err) => err,
            };
            self.stats.record_failure(operation);

            if attempts < max_attempts {
                let delay = self.schedule.delay(attempts);
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    operation = operation.as_str(),
                    attempt = attempts,
                    error = %err,
                    backoff_ms = delay.as_millis() as u64,
                    "attempt failed, backing off"
                );
                sleep_or_cancel(delay, cancel).await?;
                continue;
            }

            self.available.set(false);
            self.stats.record(operation, CallStatus::Error);
            #[cfg(feature = "tracing")]
            tracing::error!(
                operation = operation.as_str(),
                attempts,
                error = %err,
                "giving up, marking overseer unavailable"
            );
            return Err(err);
        }
    }
}
