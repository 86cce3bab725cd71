//! Repository pattern for database operations
//!
//! Implements the catalog and listing store traits over SeaORM. Every read
//! is raced against the caller's cancellation token; multi-step writes run
//! inside a database transaction.

use crate::db::models::*;
use crate::db::store::{
    abortable, AttachmentMap, CatalogStore, Junction, ListingAttachments, ListingQuery,
    ListingStore, ListingUnitOfWork, NumericColumn, RangePredicate, SortColumn,
};
use crate::db::DbPool;
use crate::errors::Result;
use async_trait::async_trait;
use sea_orm::sea_query::NullOrdering;
use sea_orm::{
    ActiveValue::NotSet, ColumnTrait, Condition, DatabaseConnection, DatabaseTransaction,
    EntityTrait, Order, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
    TransactionTrait,
};
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the read connection
    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    /// Get the write connection
    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }

    // ========================================================================
    // Health Check
    // ========================================================================

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }
}

fn numeric_column(col: NumericColumn) -> ListingColumn {
    match col {
        NumericColumn::Price => ListingColumn::Price,
        NumericColumn::Area => ListingColumn::Area,
        NumericColumn::PriceMin => ListingColumn::PriceMin,
        NumericColumn::PriceMax => ListingColumn::PriceMax,
        NumericColumn::AreaMin => ListingColumn::AreaMin,
        NumericColumn::AreaMax => ListingColumn::AreaMax,
    }
}

fn sort_column(col: SortColumn) -> ListingColumn {
    match col {
        SortColumn::CreatedAt => ListingColumn::CreatedAt,
        SortColumn::Price => ListingColumn::Price,
        SortColumn::PriceMax => ListingColumn::PriceMax,
    }
}

fn listing_condition(query: &ListingQuery) -> Condition {
    let mut cond = Condition::all().add(ListingColumn::Kind.eq(query.kind.as_str()));

    if let Some(agent_id) = query.agent_id {
        cond = cond.add(ListingColumn::AgentId.eq(agent_id));
    }
    if let Some(ids) = &query.ids {
        cond = cond.add(ListingColumn::Id.is_in(ids.iter().copied()));
    }
    if let Some(categories) = &query.category_ids {
        cond = cond.add(ListingColumn::CategoryId.is_in(categories.iter().copied()));
    }
    for predicate in &query.ranges {
        cond = match *predicate {
            RangePredicate::Gte(col, bound) => cond.add(numeric_column(col).gte(bound)),
            RangePredicate::Lte(col, bound) => cond.add(numeric_column(col).lte(bound)),
        };
    }
    cond
}

fn listing_active_model(row: &ListingRow) -> ListingActiveModel {
    ListingActiveModel {
        id: Set(row.id),
        kind: Set(row.kind.clone()),
        category_id: Set(row.category_id),
        title: Set(row.title.clone()),
        description: Set(row.description.clone()),
        project_name: Set(row.project_name.clone()),
        floor: Set(row.floor),
        move_in_date: Set(row.move_in_date),
        build_year: Set(row.build_year),
        price: Set(row.price),
        area: Set(row.area),
        bedroom_id: Set(row.bedroom_id),
        price_min: Set(row.price_min),
        price_max: Set(row.price_max),
        area_min: Set(row.area_min),
        area_max: Set(row.area_max),
        bathroom_count: Set(row.bathroom_count),
        commission_mode: Set(row.commission_mode.clone()),
        commission_value: Set(row.commission_value),
        agent_id: Set(row.agent_id),
        created_at: Set(row.created_at),
        updated_at: Set(row.updated_at),
    }
}

fn archive_active_model(archive: &ArchivedListing) -> ArchivedListingActiveModel {
    ArchivedListingActiveModel {
        id: Set(archive.id),
        original_id: Set(archive.original_id),
        kind: Set(archive.kind.clone()),
        category_name: Set(archive.category_name.clone()),
        title: Set(archive.title.clone()),
        description: Set(archive.description.clone()),
        project_name: Set(archive.project_name.clone()),
        floor: Set(archive.floor),
        move_in_date: Set(archive.move_in_date),
        build_year: Set(archive.build_year),
        price: Set(archive.price),
        area: Set(archive.area),
        price_min: Set(archive.price_min),
        price_max: Set(archive.price_max),
        area_min: Set(archive.area_min),
        area_max: Set(archive.area_max),
        bathroom_count: Set(archive.bathroom_count),
        commission_mode: Set(archive.commission_mode.clone()),
        commission_value: Set(archive.commission_value),
        locations: Set(archive.locations.clone()),
        amenities: Set(archive.amenities.clone()),
        tags: Set(archive.tags.clone()),
        bedrooms: Set(archive.bedrooms.clone()),
        images: Set(archive.images.clone()),
        agent_id: Set(archive.agent_id),
        deal_closed: Set(archive.deal_closed),
        closed_at: Set(archive.closed_at),
        created_at: Set(archive.created_at),
        deleted_at: Set(archive.deleted_at),
    }
}

fn dedup(ids: impl IntoIterator<Item = Uuid>) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

// ============================================================================
// Catalog reads
// ============================================================================

#[async_trait]
impl CatalogStore for Repository {
    async fn categories(&self, cancel: &CancellationToken) -> Result<Vec<Category>> {
        abortable(cancel, async {
            Ok(CategoryEntity::find()
                .order_by_asc(CategoryColumn::DisplayOrder)
                .all(self.read_conn())
                .await?)
        })
        .await
    }

    async fn bedroom_types(&self, cancel: &CancellationToken) -> Result<Vec<BedroomType>> {
        abortable(cancel, async {
            Ok(BedroomTypeEntity::find()
                .order_by_asc(BedroomTypeColumn::Name)
                .all(self.read_conn())
                .await?)
        })
        .await
    }

    async fn amenities(&self, cancel: &CancellationToken) -> Result<Vec<Amenity>> {
        abortable(cancel, async {
            Ok(AmenityEntity::find()
                .order_by_asc(AmenityColumn::Name)
                .all(self.read_conn())
                .await?)
        })
        .await
    }

    async fn tags(&self, cancel: &CancellationToken) -> Result<Vec<Tag>> {
        abortable(cancel, async {
            Ok(TagEntity::find()
                .order_by_asc(TagColumn::Name)
                .all(self.read_conn())
                .await?)
        })
        .await
    }

    async fn locations(&self, cancel: &CancellationToken) -> Result<Vec<Location>> {
        abortable(cancel, async {
            Ok(LocationEntity::find()
                .order_by_asc(LocationColumn::Name)
                .all(self.read_conn())
                .await?)
        })
        .await
    }
}

// ============================================================================
// Listing reads
// ============================================================================

#[async_trait]
impl ListingStore for Repository {
    async fn select_listings(
        &self,
        query: &ListingQuery,
        cancel: &CancellationToken,
    ) -> Result<Vec<ListingRow>> {
        let order = if query.order.ascending { Order::Asc } else { Order::Desc };

        let mut select = ListingEntity::find()
            .filter(listing_condition(query))
            .order_by_with_nulls(sort_column(query.order.column), order, NullOrdering::Last)
            .order_by_asc(ListingColumn::Id);

        if let Some(window) = query.window {
            select = select.offset(window.offset).limit(window.limit);
        }

        abortable(cancel, async { Ok(select.all(self.read_conn()).await?) }).await
    }

    async fn junction_listing_ids(
        &self,
        junction: Junction,
        ids: &[Uuid],
        cancel: &CancellationToken,
    ) -> Result<Vec<Uuid>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids = ids.to_vec();
        let conn = self.read_conn();

        abortable(cancel, async move {
            let listing_ids: Vec<Uuid> = match junction {
                Junction::Locations => ListingLocationEntity::find()
                    .select_only()
                    .column(ListingLocationColumn::ListingId)
                    .filter(ListingLocationColumn::LocationId.is_in(ids))
                    .into_tuple()
                    .all(conn)
                    .await?,
                Junction::Amenities => ListingAmenityEntity::find()
                    .select_only()
                    .column(ListingAmenityColumn::ListingId)
                    .filter(ListingAmenityColumn::AmenityId.is_in(ids))
                    .into_tuple()
                    .all(conn)
                    .await?,
                Junction::Tags => ListingTagEntity::find()
                    .select_only()
                    .column(ListingTagColumn::ListingId)
                    .filter(ListingTagColumn::TagId.is_in(ids))
                    .into_tuple()
                    .all(conn)
                    .await?,
                Junction::Bedrooms => ListingBedroomEntity::find()
                    .select_only()
                    .column(ListingBedroomColumn::ListingId)
                    .filter(ListingBedroomColumn::BedroomId.is_in(ids))
                    .into_tuple()
                    .all(conn)
                    .await?,
            };
            Ok(dedup(listing_ids))
        })
        .await
    }

    async fn listing_ids_with_bedroom(
        &self,
        ids: &[Uuid],
        cancel: &CancellationToken,
    ) -> Result<Vec<Uuid>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids = ids.to_vec();

        abortable(cancel, async {
            let listing_ids: Vec<Uuid> = ListingEntity::find()
                .select_only()
                .column(ListingColumn::Id)
                .filter(ListingColumn::BedroomId.is_in(ids))
                .into_tuple()
                .all(self.read_conn())
                .await?;
            Ok(listing_ids)
        })
        .await
    }

    async fn load_attachments(
        &self,
        listing_ids: &[Uuid],
        cancel: &CancellationToken,
    ) -> Result<AttachmentMap> {
        if listing_ids.is_empty() {
            return Ok(AttachmentMap::new());
        }
        let conn = self.read_conn();
        let ids = listing_ids.to_vec();

        abortable(cancel, async {
            let (locations, amenities, tags, bedrooms, images) = tokio::try_join!(
                ListingLocationEntity::find()
                    .filter(ListingLocationColumn::ListingId.is_in(ids.clone()))
                    .all(conn),
                ListingAmenityEntity::find()
                    .filter(ListingAmenityColumn::ListingId.is_in(ids.clone()))
                    .all(conn),
                ListingTagEntity::find()
                    .filter(ListingTagColumn::ListingId.is_in(ids.clone()))
                    .all(conn),
                ListingBedroomEntity::find()
                    .filter(ListingBedroomColumn::ListingId.is_in(ids.clone()))
                    .all(conn),
                ListingImageEntity::find()
                    .filter(ListingImageColumn::ListingId.is_in(ids.clone()))
                    .order_by_asc(ListingImageColumn::Position)
                    .all(conn),
            )?;

            let mut map: AttachmentMap = ids
                .iter()
                .map(|id| (*id, ListingAttachments::default()))
                .collect();

            for row in locations {
                map.entry(row.listing_id).or_default().location_ids.push(row.location_id);
            }
            for row in amenities {
                map.entry(row.listing_id).or_default().amenity_ids.push(row.amenity_id);
            }
            for row in tags {
                map.entry(row.listing_id).or_default().tag_ids.push(row.tag_id);
            }
            for row in bedrooms {
                map.entry(row.listing_id).or_default().bedroom_ids.push(row.bedroom_id);
            }
            for row in images {
                map.entry(row.listing_id).or_default().images.push(row.url);
            }

            Ok(map)
        })
        .await
    }

    async fn find_listing(
        &self,
        id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<Option<ListingRow>> {
        abortable(cancel, async {
            Ok(ListingEntity::find_by_id(id).one(self.read_conn()).await?)
        })
        .await
    }

    async fn agent_profiles(
        &self,
        ids: &[Uuid],
        cancel: &CancellationToken,
    ) -> Result<Vec<AgentProfile>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids = ids.to_vec();

        abortable(cancel, async {
            Ok(AgentProfileEntity::find()
                .filter(AgentProfileColumn::Id.is_in(ids))
                .all(self.read_conn())
                .await?)
        })
        .await
    }

    async fn archived_listings(
        &self,
        agent_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<Vec<ArchivedListing>> {
        abortable(cancel, async {
            Ok(ArchivedListingEntity::find()
                .filter(ArchivedListingColumn::AgentId.eq(agent_id))
                .order_by_desc(ArchivedListingColumn::DeletedAt)
                .all(self.read_conn())
                .await?)
        })
        .await
    }

    async fn begin(&self) -> Result<Box<dyn ListingUnitOfWork>> {
        let txn = self.write_conn().begin().await?;
        Ok(Box::new(TransactionUnitOfWork { txn }))
    }
}

// ============================================================================
// Transactional writes
// ============================================================================

/// Unit of work backed by a database transaction
pub struct TransactionUnitOfWork {
    txn: DatabaseTransaction,
}

impl TransactionUnitOfWork {
    async fn clear_junction(&self, junction: Junction, listing_id: Uuid) -> Result<()> {
        match junction {
            Junction::Locations => {
                ListingLocationEntity::delete_many()
                    .filter(ListingLocationColumn::ListingId.eq(listing_id))
                    .exec(&self.txn)
                    .await?;
            }
            Junction::Amenities => {
                ListingAmenityEntity::delete_many()
                    .filter(ListingAmenityColumn::ListingId.eq(listing_id))
                    .exec(&self.txn)
                    .await?;
            }
            Junction::Tags => {
                ListingTagEntity::delete_many()
                    .filter(ListingTagColumn::ListingId.eq(listing_id))
                    .exec(&self.txn)
                    .await?;
            }
            Junction::Bedrooms => {
                ListingBedroomEntity::delete_many()
                    .filter(ListingBedroomColumn::ListingId.eq(listing_id))
                    .exec(&self.txn)
                    .await?;
            }
        }
        Ok(())
    }

    async fn clear_images(&self, listing_id: Uuid) -> Result<()> {
        ListingImageEntity::delete_many()
            .filter(ListingImageColumn::ListingId.eq(listing_id))
            .exec(&self.txn)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ListingUnitOfWork for TransactionUnitOfWork {
    async fn insert_listing(&mut self, row: &ListingRow) -> Result<()> {
        ListingEntity::insert(listing_active_model(row))
            .exec_without_returning(&self.txn)
            .await?;
        Ok(())
    }

    async fn update_listing(&mut self, row: &ListingRow) -> Result<u64> {
        let mut patch = listing_active_model(row);
        patch.id = NotSet;
        patch.agent_id = NotSet;
        patch.created_at = NotSet;

        let result = ListingEntity::update_many()
            .set(patch)
            .filter(ListingColumn::Id.eq(row.id))
            .filter(ListingColumn::AgentId.eq(row.agent_id))
            .exec(&self.txn)
            .await?;

        Ok(result.rows_affected)
    }

    async fn replace_junction(
        &mut self,
        junction: Junction,
        listing_id: Uuid,
        ids: &[Uuid],
    ) -> Result<()> {
        self.clear_junction(junction, listing_id).await?;
        if ids.is_empty() {
            return Ok(());
        }

        match junction {
            Junction::Locations => {
                ListingLocationEntity::insert_many(ids.iter().map(|id| {
                    listing_location::ActiveModel {
                        listing_id: Set(listing_id),
                        location_id: Set(*id),
                    }
                }))
                .exec_without_returning(&self.txn)
                .await?;
            }
            Junction::Amenities => {
                ListingAmenityEntity::insert_many(ids.iter().map(|id| {
                    listing_amenity::ActiveModel {
                        listing_id: Set(listing_id),
                        amenity_id: Set(*id),
                    }
                }))
                .exec_without_returning(&self.txn)
                .await?;
            }
            Junction::Tags => {
                ListingTagEntity::insert_many(ids.iter().map(|id| listing_tag::ActiveModel {
                    listing_id: Set(listing_id),
                    tag_id: Set(*id),
                }))
                .exec_without_returning(&self.txn)
                .await?;
            }
            Junction::Bedrooms => {
                ListingBedroomEntity::insert_many(ids.iter().map(|id| {
                    listing_bedroom::ActiveModel {
                        listing_id: Set(listing_id),
                        bedroom_id: Set(*id),
                    }
                }))
                .exec_without_returning(&self.txn)
                .await?;
            }
        }
        Ok(())
    }

    async fn replace_images(&mut self, listing_id: Uuid, urls: &[String]) -> Result<()> {
        self.clear_images(listing_id).await?;
        if urls.is_empty() {
            return Ok(());
        }

        ListingImageEntity::insert_many(urls.iter().enumerate().map(|(position, url)| {
            listing_image::ActiveModel {
                listing_id: Set(listing_id),
                position: Set(position as i32),
                url: Set(url.clone()),
            }
        }))
        .exec_without_returning(&self.txn)
        .await?;
        Ok(())
    }

    async fn insert_archive(&mut self, archive: &ArchivedListing) -> Result<()> {
        ArchivedListingEntity::insert(archive_active_model(archive))
            .exec_without_returning(&self.txn)
            .await?;
        Ok(())
    }

    async fn delete_listing(&mut self, id: Uuid, agent_id: Uuid) -> Result<u64> {
        let owned = ListingEntity::find()
            .filter(ListingColumn::Id.eq(id))
            .filter(ListingColumn::AgentId.eq(agent_id))
            .count(&self.txn)
            .await?;
        if owned == 0 {
            return Ok(0);
        }

        for junction in Junction::ALL {
            self.clear_junction(junction, id).await?;
        }
        self.clear_images(id).await?;

        let result = ListingEntity::delete_many()
            .filter(ListingColumn::Id.eq(id))
            .filter(ListingColumn::AgentId.eq(agent_id))
            .exec(&self.txn)
            .await?;

        Ok(result.rows_affected)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.txn.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.txn.rollback().await?;
        Ok(())
    }

    fn is_atomic(&self) -> bool {
        true
    }
}
