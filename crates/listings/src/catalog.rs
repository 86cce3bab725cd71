//! Reference catalog
//!
//! Loads the five reference tables concurrently, localizes them for one
//! language and memoizes the result per language for the cache TTL.

use crate::localization::{display_name, Language, ReferenceEntity};
use baanboard_common::cache::ReferenceCache;
use baanboard_common::db::models::{Amenity, BedroomType, Category, Location, Tag};
use baanboard_common::db::CatalogStore;
use baanboard_common::errors::{AppError, Result};
use baanboard_common::metrics;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// A reference row together with its display name in the snapshot language
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocalizedEntry<T> {
    #[serde(flatten)]
    pub entity: T,
    pub display_name: String,
}

impl<T: ReferenceEntity> LocalizedEntry<T> {
    fn new(entity: T, language: Language) -> Self {
        let display_name = display_name(&entity, language).to_string();
        Self { entity, display_name }
    }

    /// Matches the canonical name or the Thai name
    fn matches_name(&self, name: &str) -> bool {
        let name = name.trim();
        self.entity.name() == name
            || self.entity.display_name_th().is_some_and(|th| th == name)
    }
}

/// Reference table selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefTable {
    Categories,
    BedroomTypes,
    Amenities,
    Tags,
    Locations,
}

/// All reference tables, localized for one language
#[derive(Debug, Clone, Serialize)]
pub struct CatalogSnapshot {
    pub language: Language,
    pub categories: Vec<LocalizedEntry<Category>>,
    pub bedroom_types: Vec<LocalizedEntry<BedroomType>>,
    pub amenities: Vec<LocalizedEntry<Amenity>>,
    pub tags: Vec<LocalizedEntry<Tag>>,
    pub locations: Vec<LocalizedEntry<Location>>,
}

fn localize<T: ReferenceEntity>(rows: Vec<T>, language: Language) -> Vec<LocalizedEntry<T>> {
    rows.into_iter().map(|row| LocalizedEntry::new(row, language)).collect()
}

fn by_id<T: ReferenceEntity>(entries: &[LocalizedEntry<T>], id: Uuid) -> Option<(&str, &str)> {
    entries
        .iter()
        .find(|e| e.entity.id() == id)
        .map(|e| (e.entity.name(), e.display_name.as_str()))
}

fn by_name<'a, T: ReferenceEntity>(
    entries: &'a [LocalizedEntry<T>],
    name: &str,
) -> Option<(Uuid, &'a str)> {
    entries
        .iter()
        .find(|e| e.matches_name(name))
        .map(|e| (e.entity.id(), e.display_name.as_str()))
}

impl CatalogSnapshot {
    /// Build a snapshot from raw rows. Categories sort by display order,
    /// everything else by canonical name.
    pub fn new(
        language: Language,
        mut categories: Vec<Category>,
        mut bedroom_types: Vec<BedroomType>,
        mut amenities: Vec<Amenity>,
        mut tags: Vec<Tag>,
        mut locations: Vec<Location>,
    ) -> Self {
        categories.sort_by(|a, b| {
            a.display_order
                .cmp(&b.display_order)
                .then_with(|| a.name.cmp(&b.name))
        });
        bedroom_types.sort_by(|a, b| a.name.cmp(&b.name));
        amenities.sort_by(|a, b| a.name.cmp(&b.name));
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        locations.sort_by(|a, b| a.name.cmp(&b.name));

        Self {
            language,
            categories: localize(categories, language),
            bedroom_types: localize(bedroom_types, language),
            amenities: localize(amenities, language),
            tags: localize(tags, language),
            locations: localize(locations, language),
        }
    }

    /// (canonical name, display name) of an id
    fn lookup(&self, table: RefTable, id: Uuid) -> Option<(&str, &str)> {
        match table {
            RefTable::Categories => by_id(&self.categories, id),
            RefTable::BedroomTypes => by_id(&self.bedroom_types, id),
            RefTable::Amenities => by_id(&self.amenities, id),
            RefTable::Tags => by_id(&self.tags, id),
            RefTable::Locations => by_id(&self.locations, id),
        }
    }

    pub fn contains(&self, table: RefTable, id: Uuid) -> bool {
        self.lookup(table, id).is_some()
    }

    pub fn canonical_name(&self, table: RefTable, id: Uuid) -> Option<&str> {
        self.lookup(table, id).map(|(name, _)| name)
    }

    pub fn display_name(&self, table: RefTable, id: Uuid) -> Option<&str> {
        self.lookup(table, id).map(|(_, display)| display)
    }

    /// Resolve a stored name (canonical or Thai) back to its entry.
    /// Returns the id and the display name in this snapshot's language.
    pub fn find_by_name(&self, table: RefTable, name: &str) -> Option<(Uuid, &str)> {
        match table {
            RefTable::Categories => by_name(&self.categories, name),
            RefTable::BedroomTypes => by_name(&self.bedroom_types, name),
            RefTable::Amenities => by_name(&self.amenities, name),
            RefTable::Tags => by_name(&self.tags, name),
            RefTable::Locations => by_name(&self.locations, name),
        }
    }

    /// Render a stored name in this snapshot's language. Names no longer in
    /// the catalog are returned unchanged.
    pub fn localize_name(&self, table: RefTable, name: &str) -> String {
        self.find_by_name(table, name)
            .map(|(_, display)| display.to_string())
            .unwrap_or_else(|| name.to_string())
    }

    /// Ids of `ids` that exist in `table`, order kept, duplicates removed
    pub fn known_ids(&self, table: RefTable, ids: &[Uuid]) -> Vec<Uuid> {
        let mut known: Vec<Uuid> = Vec::with_capacity(ids.len());
        for id in ids {
            if self.contains(table, *id) && !known.contains(id) {
                known.push(*id);
            }
        }
        known
    }
}

/// Cached, localized access to the reference tables
#[derive(Clone)]
pub struct ReferenceCatalog {
    store: Arc<dyn CatalogStore>,
    cache: Arc<ReferenceCache<CatalogSnapshot>>,
}

impl ReferenceCatalog {
    pub fn new(store: Arc<dyn CatalogStore>, cache: Arc<ReferenceCache<CatalogSnapshot>>) -> Self {
        Self { store, cache }
    }

    /// Catalog with its own cache of the given TTL
    pub fn with_ttl(store: Arc<dyn CatalogStore>, ttl: Duration) -> Self {
        Self::new(store, Arc::new(ReferenceCache::new(ttl)))
    }

    pub fn cache(&self) -> &ReferenceCache<CatalogSnapshot> {
        &self.cache
    }

    /// Localized catalog for `language`.
    ///
    /// Served from cache while fresh. On a miss all five tables are fetched
    /// concurrently; any failure fails the whole load and leaves the cache
    /// untouched. Concurrent misses for one language share a single fetch;
    /// different languages load independently.
    pub async fn load(
        &self,
        language: Language,
        cancel: &CancellationToken,
    ) -> Result<Arc<CatalogSnapshot>> {
        let key = language.as_str();

        let loaded = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AppError::Cancelled),
            loaded = self.cache.get_or_load(key, self.fetch(language, cancel)) => loaded?,
        };

        metrics::record_catalog_cache(!loaded.fresh, key);
        if loaded.fresh {
            info!(
                language = key,
                categories = loaded.value.categories.len(),
                locations = loaded.value.locations.len(),
                "Reference catalog loaded"
            );
        }

        Ok(loaded.value)
    }

    async fn fetch(
        &self,
        language: Language,
        cancel: &CancellationToken,
    ) -> Result<CatalogSnapshot> {
        let fetched = tokio::try_join!(
            self.store.categories(cancel),
            self.store.bedroom_types(cancel),
            self.store.amenities(cancel),
            self.store.tags(cancel),
            self.store.locations(cancel),
        );

        let (categories, bedroom_types, amenities, tags, locations) = fetched.map_err(|e| {
            if !e.is_cancelled() {
                warn!(language = %language, error = %e, "Reference catalog load failed");
            }
            AppError::query_failed(e)
        })?;

        Ok(CatalogSnapshot::new(
            language,
            categories,
            bedroom_types,
            amenities,
            tags,
            locations,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::Fixture;
    use baanboard_common::db::StoreOp;

    #[tokio::test]
    async fn test_load_sorts_tables() {
        let fx = Fixture::new();
        let snapshot = fx.catalog.load(Language::En, &fx.cancel).await.unwrap();

        let orders: Vec<i32> = snapshot.categories.iter().map(|c| c.entity.display_order).collect();
        let mut sorted = orders.clone();
        sorted.sort();
        assert_eq!(orders, sorted);

        let names: Vec<&str> = snapshot.locations.iter().map(|l| l.entity.name.as_str()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_store() {
        let fx = Fixture::new();
        fx.catalog.load(Language::En, &fx.cancel).await.unwrap();
        fx.catalog.load(Language::En, &fx.cancel).await.unwrap();

        assert_eq!(fx.store.calls(StoreOp::Categories), 1);
        assert_eq!(fx.store.calls(StoreOp::Locations), 1);
    }

    #[tokio::test]
    async fn test_cache_is_keyed_by_language() {
        let fx = Fixture::new();
        let en = fx.catalog.load(Language::En, &fx.cancel).await.unwrap();
        let th = fx.catalog.load(Language::Th, &fx.cancel).await.unwrap();

        assert_eq!(fx.store.calls(StoreOp::Tags), 2);
        assert_eq!(en.display_name(RefTable::Locations, fx.sukhumvit), Some("Sukhumvit"));
        assert_eq!(th.display_name(RefTable::Locations, fx.sukhumvit), Some("สุขุมวิท"));
    }

    #[tokio::test]
    async fn test_entry_expires_after_ttl() {
        let fx = Fixture::new();
        let catalog = ReferenceCatalog::with_ttl(
            Arc::new(fx.store.clone()),
            Duration::from_millis(100),
        );

        catalog.load(Language::En, &fx.cancel).await.unwrap();
        catalog.load(Language::En, &fx.cancel).await.unwrap();
        assert_eq!(fx.store.calls(StoreOp::Amenities), 1);

        tokio::time::sleep(Duration::from_millis(250)).await;
        catalog.load(Language::En, &fx.cancel).await.unwrap();
        assert_eq!(fx.store.calls(StoreOp::Amenities), 2);
    }

    #[tokio::test]
    async fn test_any_table_failure_fails_whole_load() {
        let fx = Fixture::new();
        fx.store.fail_on(StoreOp::Tags);

        let err = fx.catalog.load(Language::En, &fx.cancel).await.unwrap_err();
        assert!(matches!(err, AppError::QueryFailed { .. }));
        assert!(fx.catalog.cache().get("en").await.is_none());

        fx.store.clear_faults();
        assert!(fx.catalog.load(Language::En, &fx.cancel).await.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_misses_coalesce() {
        let fx = Fixture::new();
        fx.store.set_latency(StoreOp::Categories, Duration::from_millis(50));

        let (a, b) = tokio::join!(
            fx.catalog.load(Language::Th, &fx.cancel),
            fx.catalog.load(Language::Th, &fx.cancel),
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(fx.store.calls(StoreOp::Categories), 1);
    }

    #[tokio::test]
    async fn test_languages_refresh_independently() {
        let fx = Fixture::new();
        fx.store.set_latency(StoreOp::Categories, Duration::from_millis(50));

        let (en, th) = tokio::join!(
            fx.catalog.load(Language::En, &fx.cancel),
            fx.catalog.load(Language::Th, &fx.cancel),
        );

        assert_eq!(en.unwrap().language, Language::En);
        assert_eq!(th.unwrap().language, Language::Th);
        assert_eq!(fx.store.calls(StoreOp::Categories), 2);
    }

    #[tokio::test]
    async fn test_cancelled_load_leaves_cache_empty() {
        let fx = Fixture::new();
        fx.store.set_latency(StoreOp::Locations, Duration::from_millis(200));

        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let err = fx.catalog.load(Language::En, &cancel).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(fx.catalog.cache().get("en").await.is_none());
    }

    #[tokio::test]
    async fn test_name_cross_reference() {
        let fx = Fixture::new();
        let th = fx.catalog.load(Language::Th, &fx.cancel).await.unwrap();

        assert_eq!(th.localize_name(RefTable::Locations, "Sukhumvit"), "สุขุมวิท");
        assert_eq!(
            th.find_by_name(RefTable::Locations, "สุขุมวิท").map(|(id, _)| id),
            Some(fx.sukhumvit)
        );
        assert_eq!(th.localize_name(RefTable::Locations, "Atlantis"), "Atlantis");
    }

    #[tokio::test]
    async fn test_known_ids_drops_unknown_and_duplicates() {
        let fx = Fixture::new();
        let en = fx.catalog.load(Language::En, &fx.cancel).await.unwrap();

        let stray = Uuid::new_v4();
        let known = en.known_ids(
            RefTable::Locations,
            &[fx.sukhumvit, stray, fx.sukhumvit, fx.silom],
        );
        assert_eq!(known, vec![fx.sukhumvit, fx.silom]);
    }
}
