use tokio_util::sync::CancellationToken;

use crate::{MediaLookup, MediaType, OverseerClient, OverseerError, Result};

/// What happened to one deletion event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeletionOutcome {
    /// Dry run is enabled; nothing was sent upstream.
    DryRun,
    /// The event carried no usable external id.
    NoExternalId,
    /// The upstream has no entry for the id.
    NotFound,
    /// The lookup was skipped because the upstream is marked unavailable.
    Skipped,
    Deleted { media_id: i64 },
    /// The delete was skipped because the upstream went unavailable.
    NotDeleted { media_id: i64 },
}

impl DeletionOutcome {
    /// Short message for the webhook response body.
    pub fn message(&self) -> &'static str {
        match self {
            Self::DryRun => "dry run",
            Self::NoExternalId => "no id found",
            Self::NotFound => "not found",
            Self::Skipped => "overseer unavailable",
            Self::Deleted { .. } => "processed",
            Self::NotDeleted { .. } => "not deleted",
        }
    }
}

/// Entry point for webhook handlers: turns a deletion event into upstream
/// lookup + delete calls.
#[derive(Clone, Debug)]
pub struct CleanupService {
    client: OverseerClient,
    dry_run: bool,
}

impl CleanupService {
    pub fn new(client: OverseerClient, dry_run: bool) -> Self {
        Self { client, dry_run }
    }

    pub fn client(&self) -> &OverseerClient {
        &self.client
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Handles a Radarr movie deletion.
    pub async fn process_radarr(
        &self,
        tmdb_id: i64,
        cancel: &CancellationToken,
    ) -> Result<DeletionOutcome> {
        self.process_deletion(tmdb_id, MediaType::Movie, cancel).await
    }

    /// Handles a Sonarr series deletion.
    pub async fn process_sonarr(
        &self,
        tmdb_id: i64,
        cancel: &CancellationToken,
    ) -> Result<DeletionOutcome> {
        self.process_deletion(tmdb_id, MediaType::Tv, cancel).await
    }

    /// Removes the upstream catalog entry for `external_id`.
    ///
    /// Dry runs and non-positive ids return before any upstream call.
    pub async fn process_deletion(
        &self,
        external_id: i64,
        media_type: MediaType,
        cancel: &CancellationToken,
    ) -> Result<DeletionOutcome> {
        if external_id <= 0 {
            #[cfg(feature = "tracing")]
            tracing::info!(external_id, %media_type, "no external id on event, nothing to delete");
            return Ok(DeletionOutcome::NoExternalId);
        }
        if self.dry_run {
            #[cfg(feature = "tracing")]
            tracing::warn!(external_id, %media_type, "[DRY_RUN] would process media deletion");
            return Ok(DeletionOutcome::DryRun);
        }
        if cancel.is_cancelled() {
            return Err(OverseerError::Cancelled);
        }

        let outcome = self.delete_by_external_id(external_id, media_type, cancel).await;
        #[cfg(feature = "tracing")]
        match &outcome {
            Ok(DeletionOutcome::Deleted { media_id }) => tracing::info!(
                media_id,
                external_id,
                %media_type,
                "deleted media from overseer"
            ),
            Ok(DeletionOutcome::NotDeleted { media_id }) => tracing::error!(
                media_id,
                external_id,
                %media_type,
                "failed to delete media from overseer"
            ),
            Ok(DeletionOutcome::NotFound) => tracing::info!(
                external_id,
                %media_type,
                "no media found in overseer"
            ),
            Ok(DeletionOutcome::Skipped) => tracing::warn!(
                external_id,
                %media_type,
                "overseer unavailable, deletion skipped"
            ),
            Ok(_) => {}
            Err(err) if err.is_cancelled() => tracing::debug!(
                external_id,
                %media_type,
                "media deletion cancelled"
            ),
            Err(err) => tracing::error!(
                error = %err,
                external_id,
                %media_type,
                "error while processing media deletion"
            ),
        }
        outcome
    }

    async fn delete_by_external_id(
        &self,
        external_id: i64,
        media_type: MediaType,
        cancel: &CancellationToken,
    ) -> Result<DeletionOutcome> {
        let media_id = match self
            .client
            .lookup_media(external_id, media_type, cancel)
            .await?
        {
            MediaLookup::Found(media_id) => media_id,
            MediaLookup::NotFound => return Ok(DeletionOutcome::NotFound),
            MediaLookup::Skipped => return Ok(DeletionOutcome::Skipped),
        };

        if cancel.is_cancelled() {
            return Err(OverseerError::Cancelled);
        }
        if self.client.delete_media(media_id, cancel).await? {
            Ok(DeletionOutcome::Deleted { media_id })
        } else {
            Ok(DeletionOutcome::NotDeleted { media_id })
        }
    }
}
