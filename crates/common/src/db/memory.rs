//! In-process implementation of the store traits
//!
//! Backs unit tests and local runs without PostgreSQL. Supports fault
//! injection and artificial latency per operation and counts every call.

use crate::db::models::{
    AgentProfile, Amenity, ArchivedListing, BedroomType, Category, ListingRow, Location, Tag,
};
use crate::db::store::{
    abortable, AttachmentMap, CatalogStore, Junction, ListingAttachments, ListingQuery,
    ListingStore, ListingUnitOfWork, SortColumn,
};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Store operations that can be counted, delayed, or made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Categories,
    BedroomTypes,
    Amenities,
    Tags,
    Locations,
    SelectListings,
    JunctionIds(Junction),
    BedroomColumnIds,
    LoadAttachments,
    FindListing,
    AgentProfiles,
    ArchivedListings,
    Begin,
    InsertListing,
    UpdateListing,
    ReplaceJunction(Junction),
    ReplaceImages,
    InsertArchive,
    DeleteListing,
    Commit,
}

#[derive(Debug, Default, Clone)]
struct MemoryState {
    categories: Vec<Category>,
    bedroom_types: Vec<BedroomType>,
    amenities: Vec<Amenity>,
    tags: Vec<Tag>,
    locations: Vec<Location>,
    agents: HashMap<Uuid, AgentProfile>,
    listings: HashMap<Uuid, ListingRow>,
    attachments: HashMap<Uuid, ListingAttachments>,
    archives: Vec<ArchivedListing>,
}

#[derive(Debug, Clone)]
enum Write {
    InsertListing(ListingRow),
    UpdateListing(ListingRow),
    ReplaceJunction(Junction, Uuid, Vec<Uuid>),
    ReplaceImages(Uuid, Vec<String>),
    InsertArchive(ArchivedListing),
    DeleteListing(Uuid),
}

impl MemoryState {
    fn owned(&self, id: Uuid, agent_id: Uuid) -> bool {
        self.listings.get(&id).is_some_and(|row| row.agent_id == agent_id)
    }

    fn apply(&mut self, write: Write) {
        match write {
            Write::InsertListing(row) => {
                self.listings.insert(row.id, row);
            }
            Write::UpdateListing(row) => {
                if let Some(existing) = self.listings.get_mut(&row.id) {
                    let created_at = existing.created_at;
                    *existing = ListingRow { created_at, ..row };
                }
            }
            Write::ReplaceJunction(junction, listing_id, ids) => {
                *self.attachments.entry(listing_id).or_default().ids_mut(junction) = ids;
            }
            Write::ReplaceImages(listing_id, urls) => {
                self.attachments.entry(listing_id).or_default().images = urls;
            }
            Write::InsertArchive(archive) => {
                self.archives.push(archive);
            }
            Write::DeleteListing(id) => {
                self.listings.remove(&id);
                self.attachments.remove(&id);
            }
        }
    }
}

fn compare_listings(
    a: &ListingRow,
    b: &ListingRow,
    column: SortColumn,
    ascending: bool,
) -> Ordering {
    let directed = |ord: Ordering| if ascending { ord } else { ord.reverse() };

    let primary = match column {
        SortColumn::CreatedAt => directed(a.created_at.cmp(&b.created_at)),
        SortColumn::Price | SortColumn::PriceMax => {
            let (x, y) = if column == SortColumn::Price {
                (a.price, b.price)
            } else {
                (a.price_max, b.price_max)
            };
            match (x, y) {
                (Some(x), Some(y)) => directed(x.partial_cmp(&y).unwrap_or(Ordering::Equal)),
                // Nulls last regardless of direction
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            }
        }
    };
    primary.then_with(|| a.id.cmp(&b.id))
}

/// In-memory listing and catalog store
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
    faults: Arc<Mutex<HashSet<StoreOp>>>,
    latency: Arc<Mutex<HashMap<StoreOp, Duration>>>,
    calls: Arc<Mutex<HashMap<StoreOp, usize>>>,
    non_atomic: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Seeding
    // ========================================================================

    pub fn seed_categories(&self, rows: impl IntoIterator<Item = Category>) {
        self.write_state(|s| s.categories.extend(rows));
    }

    pub fn seed_bedroom_types(&self, rows: impl IntoIterator<Item = BedroomType>) {
        self.write_state(|s| s.bedroom_types.extend(rows));
    }

    pub fn seed_amenities(&self, rows: impl IntoIterator<Item = Amenity>) {
        self.write_state(|s| s.amenities.extend(rows));
    }

    pub fn seed_tags(&self, rows: impl IntoIterator<Item = Tag>) {
        self.write_state(|s| s.tags.extend(rows));
    }

    pub fn seed_locations(&self, rows: impl IntoIterator<Item = Location>) {
        self.write_state(|s| s.locations.extend(rows));
    }

    pub fn seed_agent(&self, profile: AgentProfile) {
        self.write_state(|s| {
            s.agents.insert(profile.id, profile);
        });
    }

    /// Insert a listing directly, bypassing any unit of work
    pub fn seed_listing(&self, row: ListingRow, attachments: ListingAttachments) {
        self.write_state(|s| {
            s.attachments.insert(row.id, attachments);
            s.listings.insert(row.id, row);
        });
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    pub fn listing(&self, id: Uuid) -> Option<ListingRow> {
        self.read_state(|s| s.listings.get(&id).cloned())
    }

    pub fn attachments(&self, id: Uuid) -> Option<ListingAttachments> {
        self.read_state(|s| s.attachments.get(&id).cloned())
    }

    pub fn archives(&self) -> Vec<ArchivedListing> {
        self.read_state(|s| s.archives.clone())
    }

    pub fn listing_count(&self) -> usize {
        self.read_state(|s| s.listings.len())
    }

    // ========================================================================
    // Fault injection
    // ========================================================================

    /// Make every subsequent call of `op` fail
    pub fn fail_on(&self, op: StoreOp) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.insert(op);
        }
    }

    pub fn clear_faults(&self) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.clear();
        }
    }

    /// Delay every subsequent call of `op`
    pub fn set_latency(&self, op: StoreOp, delay: Duration) {
        if let Ok(mut latency) = self.latency.lock() {
            latency.insert(op, delay);
        }
    }

    pub fn clear_latency(&self) {
        if let Ok(mut latency) = self.latency.lock() {
            latency.clear();
        }
    }

    /// Apply unit-of-work writes immediately, as a store without
    /// transactions would
    pub fn set_non_atomic(&self, non_atomic: bool) {
        self.non_atomic.store(non_atomic, AtomicOrdering::SeqCst);
    }

    /// Number of calls made to `op`
    pub fn calls(&self, op: StoreOp) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.get(&op).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn read_state<T>(&self, f: impl FnOnce(&MemoryState) -> T) -> T {
        match self.state.read() {
            Ok(guard) => f(&guard),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }

    fn write_state<T>(&self, f: impl FnOnce(&mut MemoryState) -> T) -> T {
        match self.state.write() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    /// Count the call, then fail or delay it as configured
    async fn enter(&self, op: StoreOp) -> Result<()> {
        if let Ok(mut calls) = self.calls.lock() {
            *calls.entry(op).or_insert(0) += 1;
        }

        let delay = self
            .latency
            .lock()
            .ok()
            .and_then(|latency| latency.get(&op).copied());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failing = self.faults.lock().map(|f| f.contains(&op)).unwrap_or(false);
        if failing {
            return Err(AppError::Internal {
                message: format!("injected store failure in {:?}", op),
            });
        }
        Ok(())
    }

    async fn read<T: Send>(
        &self,
        op: StoreOp,
        cancel: &CancellationToken,
        f: impl FnOnce(&MemoryState) -> T + Send,
    ) -> Result<T> {
        abortable(cancel, async {
            self.enter(op).await?;
            Ok(self.read_state(f))
        })
        .await
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn categories(&self, cancel: &CancellationToken) -> Result<Vec<Category>> {
        self.read(StoreOp::Categories, cancel, |s| s.categories.clone()).await
    }

    async fn bedroom_types(&self, cancel: &CancellationToken) -> Result<Vec<BedroomType>> {
        self.read(StoreOp::BedroomTypes, cancel, |s| s.bedroom_types.clone()).await
    }

    async fn amenities(&self, cancel: &CancellationToken) -> Result<Vec<Amenity>> {
        self.read(StoreOp::Amenities, cancel, |s| s.amenities.clone()).await
    }

    async fn tags(&self, cancel: &CancellationToken) -> Result<Vec<Tag>> {
        self.read(StoreOp::Tags, cancel, |s| s.tags.clone()).await
    }

    async fn locations(&self, cancel: &CancellationToken) -> Result<Vec<Location>> {
        self.read(StoreOp::Locations, cancel, |s| s.locations.clone()).await
    }
}

#[async_trait]
impl ListingStore for MemoryStore {
    async fn select_listings(
        &self,
        query: &ListingQuery,
        cancel: &CancellationToken,
    ) -> Result<Vec<ListingRow>> {
        self.read(StoreOp::SelectListings, cancel, |s| {
            let mut rows: Vec<ListingRow> = s
                .listings
                .values()
                .filter(|row| query.matches(row))
                .cloned()
                .collect();
            rows.sort_by(|a, b| {
                compare_listings(a, b, query.order.column, query.order.ascending)
            });

            match query.window {
                Some(window) => rows
                    .into_iter()
                    .skip(window.offset as usize)
                    .take(window.limit as usize)
                    .collect(),
                None => rows,
            }
        })
        .await
    }

    async fn junction_listing_ids(
        &self,
        junction: Junction,
        ids: &[Uuid],
        cancel: &CancellationToken,
    ) -> Result<Vec<Uuid>> {
        self.read(StoreOp::JunctionIds(junction), cancel, |s| {
            let mut matched: Vec<Uuid> = s
                .attachments
                .iter()
                .filter(|(_, a)| a.ids(junction).iter().any(|id| ids.contains(id)))
                .map(|(listing_id, _)| *listing_id)
                .collect();
            matched.sort();
            matched
        })
        .await
    }

    async fn listing_ids_with_bedroom(
        &self,
        ids: &[Uuid],
        cancel: &CancellationToken,
    ) -> Result<Vec<Uuid>> {
        self.read(StoreOp::BedroomColumnIds, cancel, |s| {
            let mut matched: Vec<Uuid> = s
                .listings
                .values()
                .filter(|row| row.bedroom_id.is_some_and(|b| ids.contains(&b)))
                .map(|row| row.id)
                .collect();
            matched.sort();
            matched
        })
        .await
    }

    async fn load_attachments(
        &self,
        listing_ids: &[Uuid],
        cancel: &CancellationToken,
    ) -> Result<AttachmentMap> {
        self.read(StoreOp::LoadAttachments, cancel, |s| {
            listing_ids
                .iter()
                .map(|id| (*id, s.attachments.get(id).cloned().unwrap_or_default()))
                .collect()
        })
        .await
    }

    async fn find_listing(
        &self,
        id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<Option<ListingRow>> {
        self.read(StoreOp::FindListing, cancel, |s| s.listings.get(&id).cloned())
            .await
    }

    async fn agent_profiles(
        &self,
        ids: &[Uuid],
        cancel: &CancellationToken,
    ) -> Result<Vec<AgentProfile>> {
        self.read(StoreOp::AgentProfiles, cancel, |s| {
            ids.iter().filter_map(|id| s.agents.get(id).cloned()).collect()
        })
        .await
    }

    async fn archived_listings(
        &self,
        agent_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<Vec<ArchivedListing>> {
        self.read(StoreOp::ArchivedListings, cancel, |s| {
            let mut rows: Vec<ArchivedListing> = s
                .archives
                .iter()
                .filter(|a| a.agent_id == agent_id)
                .cloned()
                .collect();
            rows.sort_by(|a, b| b.deleted_at.cmp(&a.deleted_at));
            rows
        })
        .await
    }

    async fn begin(&self) -> Result<Box<dyn ListingUnitOfWork>> {
        self.enter(StoreOp::Begin).await?;
        Ok(Box::new(MemoryUnitOfWork {
            store: self.clone(),
            atomic: !self.non_atomic.load(AtomicOrdering::SeqCst),
            staged: Vec::new(),
            inserted: Vec::new(),
        }))
    }
}

/// Unit of work over a `MemoryStore`.
///
/// Atomic units stage writes and apply them on commit. Non-atomic units
/// apply each write immediately; their rollback clears junction and image
/// rows of listings they inserted, leaving the base rows in place.
pub struct MemoryUnitOfWork {
    store: MemoryStore,
    atomic: bool,
    staged: Vec<Write>,
    inserted: Vec<Uuid>,
}

impl MemoryUnitOfWork {
    fn push(&mut self, write: Write) {
        if self.atomic {
            self.staged.push(write);
        } else {
            self.store.write_state(|s| s.apply(write));
        }
    }
}

#[async_trait]
impl ListingUnitOfWork for MemoryUnitOfWork {
    async fn insert_listing(&mut self, row: &ListingRow) -> Result<()> {
        self.store.enter(StoreOp::InsertListing).await?;
        let exists = self.store.read_state(|s| s.listings.contains_key(&row.id));
        if exists {
            return Err(AppError::Internal {
                message: format!("duplicate listing id {}", row.id),
            });
        }
        self.inserted.push(row.id);
        self.push(Write::InsertListing(row.clone()));
        Ok(())
    }

    async fn update_listing(&mut self, row: &ListingRow) -> Result<u64> {
        self.store.enter(StoreOp::UpdateListing).await?;
        if !self.store.read_state(|s| s.owned(row.id, row.agent_id)) {
            return Ok(0);
        }
        self.push(Write::UpdateListing(row.clone()));
        Ok(1)
    }

    async fn replace_junction(
        &mut self,
        junction: Junction,
        listing_id: Uuid,
        ids: &[Uuid],
    ) -> Result<()> {
        self.store.enter(StoreOp::ReplaceJunction(junction)).await?;
        self.push(Write::ReplaceJunction(junction, listing_id, ids.to_vec()));
        Ok(())
    }

    async fn replace_images(&mut self, listing_id: Uuid, urls: &[String]) -> Result<()> {
        self.store.enter(StoreOp::ReplaceImages).await?;
        self.push(Write::ReplaceImages(listing_id, urls.to_vec()));
        Ok(())
    }

    async fn insert_archive(&mut self, archive: &ArchivedListing) -> Result<()> {
        self.store.enter(StoreOp::InsertArchive).await?;
        self.push(Write::InsertArchive(archive.clone()));
        Ok(())
    }

    async fn delete_listing(&mut self, id: Uuid, agent_id: Uuid) -> Result<u64> {
        self.store.enter(StoreOp::DeleteListing).await?;
        if !self.store.read_state(|s| s.owned(id, agent_id)) {
            return Ok(0);
        }
        self.push(Write::DeleteListing(id));
        Ok(1)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.store.enter(StoreOp::Commit).await?;
        let MemoryUnitOfWork { store, staged, .. } = *self;
        store.write_state(|s| {
            for write in staged {
                s.apply(write);
            }
        });
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        if self.atomic {
            return Ok(());
        }
        let MemoryUnitOfWork { store, inserted, .. } = *self;
        store.write_state(|s| {
            for id in &inserted {
                s.attachments.remove(id);
            }
        });
        Ok(())
    }

    fn is_atomic(&self) -> bool {
        self.atomic
    }
}
