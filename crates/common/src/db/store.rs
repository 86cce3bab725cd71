//! Store traits the listing pipeline compiles its reads and writes against
//!
//! `Repository` implements them over PostgreSQL; `MemoryStore` implements
//! them in process for tests and local runs.

use crate::db::models::{
    AgentProfile, Amenity, ArchivedListing, BedroomType, Category, ListingKind, ListingRow,
    Location, Tag,
};
use crate::errors::{AppError, Result, WriteStep};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Many-to-many table linking a listing to reference entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Junction {
    Locations,
    Amenities,
    Tags,
    Bedrooms,
}

impl Junction {
    pub const ALL: [Junction; 4] = [
        Junction::Locations,
        Junction::Amenities,
        Junction::Tags,
        Junction::Bedrooms,
    ];

    pub fn table(&self) -> &'static str {
        match self {
            Junction::Locations => "listing_locations",
            Junction::Amenities => "listing_amenities",
            Junction::Tags => "listing_tags",
            Junction::Bedrooms => "listing_bedrooms",
        }
    }

    /// Write step reported when replacing this junction fails
    pub fn step(&self) -> WriteStep {
        match self {
            Junction::Locations => WriteStep::Locations,
            Junction::Amenities => WriteStep::Amenities,
            Junction::Tags => WriteStep::Tags,
            Junction::Bedrooms => WriteStep::Bedrooms,
        }
    }
}

/// Numeric listing columns usable in range predicates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumericColumn {
    Price,
    Area,
    PriceMin,
    PriceMax,
    AreaMin,
    AreaMax,
}

impl NumericColumn {
    pub fn value(&self, row: &ListingRow) -> Option<f64> {
        match self {
            NumericColumn::Price => row.price,
            NumericColumn::Area => row.area,
            NumericColumn::PriceMin => row.price_min,
            NumericColumn::PriceMax => row.price_max,
            NumericColumn::AreaMin => row.area_min,
            NumericColumn::AreaMax => row.area_max,
        }
    }
}

/// `gte` / `lte` predicate on a numeric column. Null never matches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RangePredicate {
    Gte(NumericColumn, f64),
    Lte(NumericColumn, f64),
}

impl RangePredicate {
    pub fn matches(&self, row: &ListingRow) -> bool {
        match *self {
            RangePredicate::Gte(col, bound) => col.value(row).is_some_and(|v| v >= bound),
            RangePredicate::Lte(col, bound) => col.value(row).is_some_and(|v| v <= bound),
        }
    }
}

/// Column a listing query is ordered by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortColumn {
    CreatedAt,
    Price,
    PriceMax,
}

/// Ordering of a listing query. Nulls sort last; ties break on id ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListingOrder {
    pub column: SortColumn,
    pub ascending: bool,
}

impl Default for ListingOrder {
    fn default() -> Self {
        Self {
            column: SortColumn::CreatedAt,
            ascending: false,
        }
    }
}

/// Offset/limit window applied after ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub offset: u64,
    pub limit: u64,
}

/// A compiled listing select: `eq`, `in`, `gte`/`lte`, ordering and window
#[derive(Debug, Clone, PartialEq)]
pub struct ListingQuery {
    pub kind: ListingKind,
    pub agent_id: Option<Uuid>,
    /// Restrict to these ids (`in` filter)
    pub ids: Option<Vec<Uuid>>,
    pub category_ids: Option<Vec<Uuid>>,
    pub ranges: Vec<RangePredicate>,
    pub order: ListingOrder,
    pub window: Option<Window>,
}

impl ListingQuery {
    pub fn new(kind: ListingKind) -> Self {
        Self {
            kind,
            agent_id: None,
            ids: None,
            category_ids: None,
            ranges: Vec::new(),
            order: ListingOrder::default(),
            window: None,
        }
    }

    /// Whether a row passes every predicate (ordering and window aside)
    pub fn matches(&self, row: &ListingRow) -> bool {
        if row.kind != self.kind.as_str() {
            return false;
        }
        if let Some(agent_id) = self.agent_id {
            if row.agent_id != agent_id {
                return false;
            }
        }
        if let Some(ids) = &self.ids {
            if !ids.contains(&row.id) {
                return false;
            }
        }
        if let Some(categories) = &self.category_ids {
            if !categories.contains(&row.category_id) {
                return false;
            }
        }
        self.ranges.iter().all(|p| p.matches(row))
    }
}

/// Junction and image rows of one listing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingAttachments {
    pub location_ids: Vec<Uuid>,
    pub amenity_ids: Vec<Uuid>,
    pub tag_ids: Vec<Uuid>,
    pub bedroom_ids: Vec<Uuid>,
    /// Image URLs in display order
    pub images: Vec<String>,
}

impl ListingAttachments {
    pub fn ids(&self, junction: Junction) -> &[Uuid] {
        match junction {
            Junction::Locations => &self.location_ids,
            Junction::Amenities => &self.amenity_ids,
            Junction::Tags => &self.tag_ids,
            Junction::Bedrooms => &self.bedroom_ids,
        }
    }

    pub fn ids_mut(&mut self, junction: Junction) -> &mut Vec<Uuid> {
        match junction {
            Junction::Locations => &mut self.location_ids,
            Junction::Amenities => &mut self.amenity_ids,
            Junction::Tags => &mut self.tag_ids,
            Junction::Bedrooms => &mut self.bedroom_ids,
        }
    }
}

/// Attachments keyed by listing id
pub type AttachmentMap = HashMap<Uuid, ListingAttachments>;

/// Read access to the reference tables
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn categories(&self, cancel: &CancellationToken) -> Result<Vec<Category>>;

    async fn bedroom_types(&self, cancel: &CancellationToken) -> Result<Vec<BedroomType>>;

    async fn amenities(&self, cancel: &CancellationToken) -> Result<Vec<Amenity>>;

    async fn tags(&self, cancel: &CancellationToken) -> Result<Vec<Tag>>;

    async fn locations(&self, cancel: &CancellationToken) -> Result<Vec<Location>>;
}

/// Listing reads plus the entry point for multi-step writes
#[async_trait]
pub trait ListingStore: Send + Sync {
    async fn select_listings(
        &self,
        query: &ListingQuery,
        cancel: &CancellationToken,
    ) -> Result<Vec<ListingRow>>;

    /// Ids of listings with any junction row pointing at one of `ids`
    async fn junction_listing_ids(
        &self,
        junction: Junction,
        ids: &[Uuid],
        cancel: &CancellationToken,
    ) -> Result<Vec<Uuid>>;

    /// Ids of listings whose single-valued `bedroom_id` is one of `ids`
    async fn listing_ids_with_bedroom(
        &self,
        ids: &[Uuid],
        cancel: &CancellationToken,
    ) -> Result<Vec<Uuid>>;

    async fn load_attachments(
        &self,
        listing_ids: &[Uuid],
        cancel: &CancellationToken,
    ) -> Result<AttachmentMap>;

    async fn find_listing(
        &self,
        id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<Option<ListingRow>>;

    async fn agent_profiles(
        &self,
        ids: &[Uuid],
        cancel: &CancellationToken,
    ) -> Result<Vec<AgentProfile>>;

    /// Archive rows of one agent, newest deletion first
    async fn archived_listings(
        &self,
        agent_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<Vec<ArchivedListing>>;

    async fn begin(&self) -> Result<Box<dyn ListingUnitOfWork>>;
}

/// Scope of one multi-step listing write
#[async_trait]
pub trait ListingUnitOfWork: Send {
    async fn insert_listing(&mut self, row: &ListingRow) -> Result<()>;

    /// Overwrite the base row where both `id` and `agent_id` match.
    /// Returns rows affected.
    async fn update_listing(&mut self, row: &ListingRow) -> Result<u64>;

    /// Delete every row of `junction` for the listing, then insert `ids`
    async fn replace_junction(
        &mut self,
        junction: Junction,
        listing_id: Uuid,
        ids: &[Uuid],
    ) -> Result<()>;

    async fn replace_images(&mut self, listing_id: Uuid, urls: &[String]) -> Result<()>;

    async fn insert_archive(&mut self, archive: &ArchivedListing) -> Result<()>;

    /// Delete the base row and its junction rows where both `id` and
    /// `agent_id` match. Returns rows affected on the base table.
    async fn delete_listing(&mut self, id: Uuid, agent_id: Uuid) -> Result<u64>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;

    /// True when rollback discards every write of this unit
    fn is_atomic(&self) -> bool;
}

/// Race a store future against a cancellation token.
///
/// Cancellation drops the future, releasing whatever connection it held.
pub async fn abortable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if cancel.is_cancelled() {
        return Err(AppError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AppError::Cancelled),
        res = fut => res,
    }
}
