//! Listing writes
//!
//! Every write runs inside one `ListingUnitOfWork`: the base row first, then
//! each junction table (delete-then-insert), then images. A failure after
//! the base row is written rolls the unit back and surfaces
//! `PartialWriteFailed` naming the step.

mod archive;
mod validation;

pub use archive::{build_archive, localize_archive};
pub use validation::{check_common, check_references, check_shape};

use crate::catalog::ReferenceCatalog;
use crate::localization::Language;
use crate::model::{ArchivedListingView, Listing, ListingDetails, ListingDraft};
use baanboard_common::db::models::{ListingKind, ListingRow};
use baanboard_common::db::{Junction, ListingStore, ListingUnitOfWork};
use baanboard_common::errors::{AppError, Result, WriteStep};
use baanboard_common::metrics;
use chrono::Utc;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Owns every write to listings and their attachments
#[derive(Clone)]
pub struct ListingMutationService {
    store: Arc<dyn ListingStore>,
    catalog: ReferenceCatalog,
    default_image_url: String,
}

/// A failed step inside a unit of work
struct StepFailure {
    step: WriteStep,
    cause: AppError,
}

impl StepFailure {
    fn at(step: WriteStep) -> impl FnOnce(AppError) -> Self {
        move |cause| Self { step, cause }
    }
}

impl ListingMutationService {
    pub fn new(
        store: Arc<dyn ListingStore>,
        catalog: ReferenceCatalog,
        default_image_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            catalog,
            default_image_url: default_image_url.into(),
        }
    }

    /// Create a listing of `kind` owned by `agent_id`.
    ///
    /// A listing submitted without usable image URLs gets the placeholder
    /// image as its only image.
    #[instrument(skip(self, draft, cancel), fields(agent_id = %agent_id, kind = kind.as_str()))]
    pub async fn create(
        &self,
        agent_id: Uuid,
        kind: ListingKind,
        draft: ListingDraft,
        cancel: &CancellationToken,
    ) -> Result<Listing> {
        let outcome = self.create_inner(agent_id, kind, draft, cancel).await;
        record("create", outcome)
    }

    async fn create_inner(
        &self,
        agent_id: Uuid,
        kind: ListingKind,
        draft: ListingDraft,
        cancel: &CancellationToken,
    ) -> Result<Listing> {
        let mut fields = check_shape(kind, &draft)?;
        let catalog = self.catalog.load(Language::En, cancel).await?;
        check_references(&fields, &catalog)?;
        if fields.images.is_empty() {
            fields.images.push(self.default_image_url.clone());
        }

        let now = Utc::now();
        let listing = Listing {
            id: Uuid::new_v4(),
            agent_id,
            fields,
            created_at: now,
            updated_at: now,
        };

        let mut uow = self.store.begin().await.map_err(AppError::query_failed)?;
        if let Err(e) = uow.insert_listing(&listing.to_row()).await {
            discard(uow, listing.id).await;
            return Err(AppError::query_failed(e));
        }

        let written = write_attachments(uow.as_mut(), &listing).await;
        self.finish(uow, "create", listing.id, written).await?;

        info!(listing_id = %listing.id, "Listing created");
        Ok(listing)
    }

    /// Replace the editable fields of a listing owned by `agent_id`.
    ///
    /// Every junction table is rewritten. Images are not defaulted, so an
    /// update may leave a listing without images.
    #[instrument(skip(self, draft, cancel), fields(listing_id = %id, agent_id = %agent_id))]
    pub async fn update(
        &self,
        id: Uuid,
        agent_id: Uuid,
        draft: ListingDraft,
        cancel: &CancellationToken,
    ) -> Result<Listing> {
        let outcome = self.update_inner(id, agent_id, draft, cancel).await;
        record("update", outcome)
    }

    async fn update_inner(
        &self,
        id: Uuid,
        agent_id: Uuid,
        draft: ListingDraft,
        cancel: &CancellationToken,
    ) -> Result<Listing> {
        // The kind-specific checks need the stored kind
        check_common(&draft)?;
        let existing = self.owned_listing(id, agent_id, cancel).await?;
        let kind = existing.listing_kind().ok_or_else(|| AppError::Internal {
            message: format!("listing {} has invalid stored kind", id),
        })?;

        let fields = check_shape(kind, &draft)?;
        let catalog = self.catalog.load(Language::En, cancel).await?;
        check_references(&fields, &catalog)?;

        let listing = Listing {
            id,
            agent_id,
            fields,
            created_at: existing.created_at.with_timezone(&Utc),
            updated_at: Utc::now(),
        };

        let mut uow = self.store.begin().await.map_err(AppError::query_failed)?;
        match uow.update_listing(&listing.to_row()).await {
            Ok(0) => {
                discard(uow, id).await;
                return Err(self.missing_or_foreign(id, agent_id, cancel).await);
            }
            Ok(_) => {}
            Err(e) => {
                discard(uow, id).await;
                return Err(AppError::query_failed(e));
            }
        }

        let written = write_attachments(uow.as_mut(), &listing).await;
        self.finish(uow, "update", id, written).await?;

        info!("Listing updated");
        Ok(listing)
    }

    /// Archive a listing, then remove it and all its junction rows.
    /// Returns the archived snapshot.
    #[instrument(skip(self, cancel), fields(listing_id = %id, agent_id = %agent_id))]
    pub async fn soft_delete(
        &self,
        id: Uuid,
        agent_id: Uuid,
        deal_closed: bool,
        cancel: &CancellationToken,
    ) -> Result<ArchivedListingView> {
        let outcome = self.soft_delete_inner(id, agent_id, deal_closed, cancel).await;
        record("soft_delete", outcome)
    }

    async fn soft_delete_inner(
        &self,
        id: Uuid,
        agent_id: Uuid,
        deal_closed: bool,
        cancel: &CancellationToken,
    ) -> Result<ArchivedListingView> {
        let row = self.owned_listing(id, agent_id, cancel).await?;
        let mut attachments = self
            .store
            .load_attachments(&[id], cancel)
            .await
            .map_err(AppError::query_failed)?;
        let listing = Listing::from_row(row, attachments.remove(&id).unwrap_or_default())?;

        let catalog = self.catalog.load(Language::En, cancel).await?;
        let archive = build_archive(&listing, &catalog, deal_closed, Utc::now());
        let view = ArchivedListingView::from_row(&archive)?;

        let mut uow = self.store.begin().await.map_err(AppError::query_failed)?;
        if let Err(e) = uow.insert_archive(&archive).await {
            let failure = StepFailure {
                step: WriteStep::Archive,
                cause: e,
            };
            return Err(self.abort(uow, "soft_delete", id, failure).await);
        }

        match uow.delete_listing(id, agent_id).await {
            Ok(0) => {
                discard(uow, id).await;
                return Err(self.missing_or_foreign(id, agent_id, cancel).await);
            }
            Ok(_) => {}
            Err(e) => {
                let failure = StepFailure {
                    step: WriteStep::Delete,
                    cause: e,
                };
                return Err(self.abort(uow, "soft_delete", id, failure).await);
            }
        }
        self.finish(uow, "soft_delete", id, Ok(())).await?;

        info!(archive_id = %archive.id, deal_closed, "Listing archived");
        Ok(view)
    }

    /// Archived listings of `agent_id`, newest deletion first, with stored
    /// names rendered in `language`
    pub async fn archived(
        &self,
        agent_id: Uuid,
        language: Language,
        cancel: &CancellationToken,
    ) -> Result<Vec<ArchivedListingView>> {
        let (rows, catalog) = tokio::try_join!(
            async {
                self.store
                    .archived_listings(agent_id, cancel)
                    .await
                    .map_err(AppError::query_failed)
            },
            self.catalog.load(language, cancel),
        )?;

        debug!(agent_id = %agent_id, count = rows.len(), "Loaded archived listings");
        Ok(rows
            .iter()
            .filter_map(|row| localize_archive(row, &catalog))
            .collect())
    }

    /// Base row of `id` if `agent_id` owns it
    async fn owned_listing(
        &self,
        id: Uuid,
        agent_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<ListingRow> {
        let row = self
            .store
            .find_listing(id, cancel)
            .await
            .map_err(AppError::query_failed)?
            .ok_or_else(|| AppError::not_found("listing", id))?;

        if row.agent_id != agent_id {
            return Err(AppError::NotOwned { id: id.to_string() });
        }
        Ok(row)
    }

    /// Classify a write whose owner predicate matched no row
    async fn missing_or_foreign(
        &self,
        id: Uuid,
        agent_id: Uuid,
        cancel: &CancellationToken,
    ) -> AppError {
        match self.owned_listing(id, agent_id, cancel).await {
            Err(e) => e,
            Ok(_) => AppError::QueryFailed {
                cause: format!("write to listing {} matched no rows", id),
            },
        }
    }

    /// Commit a unit whose steps succeeded, or roll it back
    async fn finish(
        &self,
        uow: Box<dyn ListingUnitOfWork>,
        operation: &'static str,
        listing_id: Uuid,
        written: std::result::Result<(), StepFailure>,
    ) -> Result<()> {
        if let Err(failure) = written {
            return Err(self.abort(uow, operation, listing_id, failure).await);
        }

        let atomic = uow.is_atomic();
        uow.commit().await.map_err(|cause| {
            partial_write(
                operation,
                listing_id,
                StepFailure {
                    step: WriteStep::Commit,
                    cause,
                },
                atomic,
            )
        })
    }

    async fn abort(
        &self,
        uow: Box<dyn ListingUnitOfWork>,
        operation: &'static str,
        listing_id: Uuid,
        failure: StepFailure,
    ) -> AppError {
        let atomic = uow.is_atomic();
        let rolled_back = match uow.rollback().await {
            Ok(()) => atomic,
            Err(e) => {
                error!(operation, listing_id = %listing_id, error = %e, "Rollback failed");
                false
            }
        };
        partial_write(operation, listing_id, failure, rolled_back)
    }
}

fn partial_write(
    operation: &'static str,
    listing_id: Uuid,
    failure: StepFailure,
    rolled_back: bool,
) -> AppError {
    let step = failure.step;
    error!(
        operation,
        listing_id = %listing_id,
        step = step.as_str(),
        rolled_back,
        error = %failure.cause,
        "Listing write failed part-way"
    );
    metrics::record_partial_write(step.as_str());

    AppError::PartialWriteFailed {
        step,
        listing_id: listing_id.to_string(),
        rolled_back,
        message: failure.cause.to_string(),
    }
}

/// Roll back a unit that failed before anything needed reporting
async fn discard(uow: Box<dyn ListingUnitOfWork>, listing_id: Uuid) {
    if let Err(e) = uow.rollback().await {
        warn!(listing_id = %listing_id, error = %e, "Rollback failed");
    }
}

/// Rewrite all junction and image rows of `listing`
async fn write_attachments(
    uow: &mut dyn ListingUnitOfWork,
    listing: &Listing,
) -> std::result::Result<(), StepFailure> {
    let f = &listing.fields;
    let bedrooms = match &f.details {
        // Offers keep their bedroom type on the base row
        ListingDetails::Offer { .. } => Vec::new(),
        ListingDetails::Request { bedroom_ids, .. } => bedroom_ids.clone(),
    };

    for (junction, ids) in [
        (Junction::Locations, &f.location_ids),
        (Junction::Amenities, &f.amenity_ids),
        (Junction::Tags, &f.tag_ids),
        (Junction::Bedrooms, &bedrooms),
    ] {
        uow.replace_junction(junction, listing.id, ids)
            .await
            .map_err(StepFailure::at(junction.step()))?;
    }

    uow.replace_images(listing.id, &f.images)
        .await
        .map_err(StepFailure::at(WriteStep::Images))
}

/// Record the outcome of a mutation and pass it through
fn record<T>(operation: &'static str, outcome: Result<T>) -> Result<T> {
    let label = match &outcome {
        Ok(_) => "ok",
        Err(AppError::ValidationFailed { .. }) => "invalid",
        Err(AppError::NotFound { .. }) | Err(AppError::NotOwned { .. }) => "rejected",
        Err(AppError::PartialWriteFailed { .. }) => "partial_write",
        Err(AppError::Cancelled) => "cancelled",
        Err(e) => {
            warn!(operation, error = %e, "Listing mutation failed");
            "failed"
        }
    };
    metrics::record_mutation(operation, label);
    outcome
}
