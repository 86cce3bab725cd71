//! Filter-to-query compilation
//!
//! Direct-column filters (kind, owner, category, numeric ranges) become
//! predicates on the base select. Many-to-many filters (locations,
//! bedrooms) are resolved to listing-id sets first and intersected into the
//! base select as an `in` filter. Any filter that can no longer match
//! short-circuits before the base select runs.

use super::{Filters, SearchRequest, SortOption};
use crate::catalog::{CatalogSnapshot, RefTable, ReferenceCatalog};
use crate::localization::Language;
use crate::view::{assemble_views, ListingView};
use baanboard_common::config::ListingsConfig;
use baanboard_common::db::models::ListingKind;
use baanboard_common::db::{
    Junction, ListingOrder, ListingQuery, ListingStore, NumericColumn, RangePredicate,
    SortColumn, Window,
};
use baanboard_common::errors::{AppError, Result};
use baanboard_common::metrics;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Largest offset a PostgreSQL `OFFSET` (bigint) accepts
const MAX_OFFSET: u64 = i64::MAX as u64;

/// Compiles `Filters` into store reads and assembles view-ready results
#[derive(Clone)]
pub struct FilterEngine {
    store: Arc<dyn ListingStore>,
    catalog: ReferenceCatalog,
    default_page_size: u64,
    max_page_size: u64,
}

impl FilterEngine {
    pub fn new(
        store: Arc<dyn ListingStore>,
        catalog: ReferenceCatalog,
        config: &ListingsConfig,
    ) -> Self {
        let max_page_size = config.max_page_size.max(1);
        Self {
            store,
            catalog,
            default_page_size: config.default_page_size.clamp(1, max_page_size),
            max_page_size,
        }
    }

    /// Public search over all agents' listings
    pub async fn search(
        &self,
        request: &SearchRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<ListingView>> {
        self.run(request, None, cancel).await
    }

    /// Listings owned by one agent
    pub async fn my_listings(
        &self,
        agent_id: Uuid,
        kind: ListingKind,
        sort: SortOption,
        language: Language,
        cancel: &CancellationToken,
    ) -> Result<Vec<ListingView>> {
        let request = SearchRequest::new(Filters::new(kind))
            .sorted(sort)
            .in_language(language);
        self.run(&request, Some(agent_id), cancel).await
    }

    #[instrument(skip(self, request, cancel), fields(kind = request.filters.kind.as_str()))]
    async fn run(
        &self,
        request: &SearchRequest,
        agent_id: Option<Uuid>,
        cancel: &CancellationToken,
    ) -> Result<Vec<ListingView>> {
        let start = Instant::now();
        let kind = request.filters.kind;

        let outcome = self.execute(request, agent_id, cancel).await;
        match &outcome {
            Ok(views) => {
                metrics::record_search(start.elapsed().as_secs_f64(), kind.as_str(), views.len());
                debug!(results = views.len(), "Search completed");
            }
            Err(AppError::Cancelled) => debug!("Search cancelled"),
            Err(e) => warn!(error = %e, "Search failed"),
        }
        outcome
    }

    async fn execute(
        &self,
        request: &SearchRequest,
        agent_id: Option<Uuid>,
        cancel: &CancellationToken,
    ) -> Result<Vec<ListingView>> {
        let catalog = self.catalog.load(request.language, cancel).await?;

        let Some(mut query) = self
            .compile(&request.filters, agent_id, &catalog, cancel)
            .await
            .map_err(AppError::query_failed)?
        else {
            return Ok(Vec::new());
        };
        query.order = order_for(request.filters.kind, request.sort);
        query.window = request.page.map(|page| {
            let limit = page
                .limit
                .unwrap_or(self.default_page_size)
                .clamp(1, self.max_page_size);
            Window {
                offset: page
                    .page
                    .saturating_sub(1)
                    .saturating_mul(limit)
                    .min(MAX_OFFSET),
                limit,
            }
        });

        let rows = self
            .store
            .select_listings(&query, cancel)
            .await
            .map_err(AppError::query_failed)?;

        assemble_views(self.store.as_ref(), rows, &catalog, cancel)
            .await
            .map_err(AppError::query_failed)
    }

    /// Build the base select, or `None` when no listing can match
    async fn compile(
        &self,
        filters: &Filters,
        agent_id: Option<Uuid>,
        catalog: &CatalogSnapshot,
        cancel: &CancellationToken,
    ) -> Result<Option<ListingQuery>> {
        let mut query = ListingQuery::new(filters.kind);
        query.agent_id = agent_id;
        query.ranges = range_predicates(filters);

        if !filters.category_ids.is_empty() {
            let known = catalog.known_ids(RefTable::Categories, &filters.category_ids);
            if known.is_empty() {
                return Ok(None);
            }
            query.category_ids = Some(known);
        }

        let mut ids: Option<BTreeSet<Uuid>> = None;

        if !filters.location_ids.is_empty() {
            let known = catalog.known_ids(RefTable::Locations, &filters.location_ids);
            if known.is_empty() {
                return Ok(None);
            }
            let matched: BTreeSet<Uuid> = self
                .store
                .junction_listing_ids(Junction::Locations, &known, cancel)
                .await?
                .into_iter()
                .collect();
            if matched.is_empty() {
                return Ok(None);
            }
            ids = Some(matched);
        }

        if !filters.bedroom_ids.is_empty() {
            let known = catalog.known_ids(RefTable::BedroomTypes, &filters.bedroom_ids);
            if known.is_empty() {
                return Ok(None);
            }
            let matched = self.bedroom_matches(filters.kind, &known, cancel).await?;
            let narrowed: BTreeSet<Uuid> = match ids {
                Some(current) => current.intersection(&matched).copied().collect(),
                None => matched,
            };
            if narrowed.is_empty() {
                return Ok(None);
            }
            ids = Some(narrowed);
        }

        query.ids = ids.map(|set| set.into_iter().collect());
        Ok(Some(query))
    }

    /// Requests keep bedroom types in the junction table. Offers carry a
    /// single `bedroom_id` column, so both sources are unioned for them.
    async fn bedroom_matches(
        &self,
        kind: ListingKind,
        bedroom_ids: &[Uuid],
        cancel: &CancellationToken,
    ) -> Result<BTreeSet<Uuid>> {
        match kind {
            ListingKind::Request => Ok(self
                .store
                .junction_listing_ids(Junction::Bedrooms, bedroom_ids, cancel)
                .await?
                .into_iter()
                .collect()),
            ListingKind::Offer => {
                let (junction, direct) = tokio::try_join!(
                    self.store
                        .junction_listing_ids(Junction::Bedrooms, bedroom_ids, cancel),
                    self.store.listing_ids_with_bedroom(bedroom_ids, cancel),
                )?;
                Ok(junction.into_iter().chain(direct).collect())
            }
        }
    }
}

fn range_predicates(filters: &Filters) -> Vec<RangePredicate> {
    let (price_lo, price_hi, area_lo, area_hi) = match filters.kind {
        ListingKind::Offer => (
            NumericColumn::Price,
            NumericColumn::Price,
            NumericColumn::Area,
            NumericColumn::Area,
        ),
        ListingKind::Request => (
            NumericColumn::PriceMin,
            NumericColumn::PriceMax,
            NumericColumn::AreaMin,
            NumericColumn::AreaMax,
        ),
    };

    let mut predicates = Vec::new();
    for (range, lo, hi) in [
        (filters.price_range, price_lo, price_hi),
        (filters.area_range, area_lo, area_hi),
    ] {
        let Some(range) = range else { continue };
        if let Some(min) = range.min {
            predicates.push(RangePredicate::Gte(lo, min));
        }
        if let Some(max) = range.max {
            predicates.push(RangePredicate::Lte(hi, max));
        }
    }
    predicates
}

/// "Price" is `price` for offers and the upper bound of a request's range
fn order_for(kind: ListingKind, sort: SortOption) -> ListingOrder {
    let price = match kind {
        ListingKind::Offer => SortColumn::Price,
        ListingKind::Request => SortColumn::PriceMax,
    };
    match sort {
        SortOption::Newest => ListingOrder::default(),
        SortOption::Oldest => ListingOrder {
            column: SortColumn::CreatedAt,
            ascending: true,
        },
        SortOption::PriceAsc => ListingOrder {
            column: price,
            ascending: true,
        },
        SortOption::PriceDesc => ListingOrder {
            column: price,
            ascending: false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{Fixture, PLACEHOLDER};
    use crate::model::{ListingDetails, NumericRange};
    use baanboard_common::db::StoreOp;

    fn ids(views: &[ListingView]) -> Vec<Uuid> {
        views.iter().map(|v| v.listing.id).collect()
    }

    fn offers() -> Filters {
        Filters::new(ListingKind::Offer)
    }

    fn requests() -> Filters {
        Filters::new(ListingKind::Request)
    }

    #[tokio::test]
    async fn test_created_offer_is_found_with_placeholder_image() {
        let fx = Fixture::new();
        let created = fx
            .mutations()
            .create(fx.agent, ListingKind::Offer, fx.offer_draft(), &fx.cancel)
            .await
            .unwrap();

        let results = fx
            .engine()
            .search(&SearchRequest::new(offers()), &fx.cancel)
            .await
            .unwrap();

        assert_eq!(ids(&results), vec![created.id]);
        let view = &results[0];
        assert_eq!(view.listing.fields.commission.value, 50.0);
        assert_eq!(view.listing.fields.images, vec![PLACEHOLDER.to_string()]);
        assert_eq!(view.locations[0].name, "Sukhumvit");
        assert_eq!(view.agent.name, "Ploy");
    }

    #[tokio::test]
    async fn test_location_filter_round_trip() {
        let fx = Fixture::new();
        let engine = fx.engine();
        let id = fx.seed(
            fx.agent,
            ListingDetails::Offer {
                price: 12_000.0,
                area: 30.0,
                bedroom_id: fx.studio,
            },
            vec![fx.sukhumvit, fx.thonglor],
            10,
        );

        for locations in [
            vec![fx.sukhumvit],
            vec![fx.thonglor],
            vec![fx.sukhumvit, fx.silom],
        ] {
            let mut filters = offers();
            filters.location_ids = locations;
            let found = engine.search(&SearchRequest::new(filters), &fx.cancel).await.unwrap();
            assert_eq!(ids(&found), vec![id]);
        }

        let mut disjoint = offers();
        disjoint.location_ids = vec![fx.silom];
        let found = engine.search(&SearchRequest::new(disjoint), &fx.cancel).await.unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_empty_junction_match_skips_base_select() {
        let fx = Fixture::new();
        fx.seed_offer(12_000.0, 30.0, fx.studio, 10);

        let mut filters = offers();
        filters.location_ids = vec![fx.silom];
        let found = fx.engine().search(&SearchRequest::new(filters), &fx.cancel).await.unwrap();

        assert!(found.is_empty());
        assert_eq!(fx.store.calls(StoreOp::JunctionIds(Junction::Locations)), 1);
        assert_eq!(fx.store.calls(StoreOp::SelectListings), 0);
    }

    #[tokio::test]
    async fn test_unknown_filter_ids_short_circuit() {
        let fx = Fixture::new();
        fx.seed_offer(12_000.0, 30.0, fx.studio, 10);

        let mut filters = offers();
        filters.category_ids = vec![Uuid::new_v4()];
        let found = fx.engine().search(&SearchRequest::new(filters), &fx.cancel).await.unwrap();

        assert!(found.is_empty());
        assert_eq!(fx.store.calls(StoreOp::SelectListings), 0);

        // Unknown ids next to known ones are ignored
        let mut filters = offers();
        filters.category_ids = vec![Uuid::new_v4(), fx.condo];
        let found = fx.engine().search(&SearchRequest::new(filters), &fx.cancel).await.unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn test_repeated_search_is_stable() {
        let fx = Fixture::new();
        for age in [30, 10, 20, 40] {
            fx.seed_offer(10_000.0 + age as f64, 30.0, fx.studio, age);
        }
        let engine = fx.engine();
        let request = SearchRequest::new(offers()).sorted(SortOption::PriceDesc);

        let first = engine.search(&request, &fx.cancel).await.unwrap();
        let second = engine.search(&request, &fx.cancel).await.unwrap();
        assert_eq!(ids(&first), ids(&second));
        assert_eq!(first.len(), 4);
    }

    #[tokio::test]
    async fn test_offer_bedroom_filter_uses_direct_column() {
        let fx = Fixture::new();
        let studio = fx.seed_offer(12_000.0, 30.0, fx.studio, 10);
        fx.seed_offer(25_000.0, 60.0, fx.two_bed, 20);
        let engine = fx.engine();

        let mut filters = offers();
        filters.bedroom_ids = vec![fx.studio, fx.one_bed];
        let found = engine.search(&SearchRequest::new(filters), &fx.cancel).await.unwrap();
        assert_eq!(ids(&found), vec![studio]);
        assert_eq!(fx.store.calls(StoreOp::BedroomColumnIds), 1);
    }

    #[tokio::test]
    async fn test_request_bedroom_filter_uses_junction_only() {
        let fx = Fixture::new();
        let family = fx.seed_request(
            NumericRange::new(None, Some(30_000.0)),
            vec![fx.one_bed, fx.two_bed],
            10,
        );
        fx.seed_request(NumericRange::new(None, Some(9_000.0)), vec![fx.studio], 20);

        let mut filters = requests();
        filters.bedroom_ids = vec![fx.two_bed];
        let found = fx.engine().search(&SearchRequest::new(filters), &fx.cancel).await.unwrap();

        assert_eq!(ids(&found), vec![family]);
        assert_eq!(fx.store.calls(StoreOp::BedroomColumnIds), 0);
    }

    #[tokio::test]
    async fn test_location_and_bedroom_filters_intersect() {
        let fx = Fixture::new();
        let in_sukhumvit = fx.seed_offer(12_000.0, 30.0, fx.studio, 10);
        fx.seed(
            fx.agent,
            ListingDetails::Offer {
                price: 12_000.0,
                area: 30.0,
                bedroom_id: fx.studio,
            },
            vec![fx.silom],
            20,
        );

        let mut filters = offers();
        filters.location_ids = vec![fx.sukhumvit];
        filters.bedroom_ids = vec![fx.studio];
        let found = fx.engine().search(&SearchRequest::new(filters), &fx.cancel).await.unwrap();
        assert_eq!(ids(&found), vec![in_sukhumvit]);
    }

    #[tokio::test]
    async fn test_offer_price_and_area_ranges() {
        let fx = Fixture::new();
        fx.seed_offer(10_000.0, 25.0, fx.studio, 10);
        let mid = fx.seed_offer(20_000.0, 45.0, fx.one_bed, 20);
        fx.seed_offer(30_000.0, 80.0, fx.two_bed, 30);

        let mut filters = offers();
        filters.price_range = Some(NumericRange::new(Some(15_000.0), Some(25_000.0)));
        filters.area_range = Some(NumericRange::new(Some(40.0), None));
        let found = fx.engine().search(&SearchRequest::new(filters), &fx.cancel).await.unwrap();
        assert_eq!(ids(&found), vec![mid]);
    }

    #[tokio::test]
    async fn test_request_ranges_use_min_max_columns() {
        let fx = Fixture::new();
        let fits = fx.seed_request(
            NumericRange::new(Some(20_000.0), Some(25_000.0)),
            vec![fx.one_bed],
            10,
        );
        fx.seed_request(
            NumericRange::new(Some(20_000.0), Some(40_000.0)),
            vec![fx.one_bed],
            20,
        );
        fx.seed_request(NumericRange::new(Some(5_000.0), Some(9_000.0)), vec![fx.studio], 30);

        let mut filters = requests();
        filters.price_range = Some(NumericRange::new(Some(15_000.0), Some(30_000.0)));
        let found = fx.engine().search(&SearchRequest::new(filters), &fx.cancel).await.unwrap();
        assert_eq!(ids(&found), vec![fits]);
    }

    #[tokio::test]
    async fn test_sorting() {
        let fx = Fixture::new();
        let cheap = fx.seed_offer(10_000.0, 30.0, fx.studio, 30);
        let pricey = fx.seed_offer(50_000.0, 90.0, fx.two_bed, 20);
        let newest = fx.seed_offer(20_000.0, 40.0, fx.one_bed, 10);
        let engine = fx.engine();

        let by = |sort| {
            let engine = engine.clone();
            let cancel = fx.cancel.clone();
            async move {
                let request = SearchRequest::new(offers()).sorted(sort);
                ids(&engine.search(&request, &cancel).await.unwrap())
            }
        };

        assert_eq!(by(SortOption::Newest).await, vec![newest, pricey, cheap]);
        assert_eq!(by(SortOption::Oldest).await, vec![cheap, pricey, newest]);
        assert_eq!(by(SortOption::PriceAsc).await, vec![cheap, newest, pricey]);
        assert_eq!(by(SortOption::PriceDesc).await, vec![pricey, newest, cheap]);
    }

    #[tokio::test]
    async fn test_request_price_sort_puts_open_ended_last() {
        let fx = Fixture::new();
        let open = fx.seed_request(NumericRange::new(Some(10_000.0), None), vec![fx.studio], 10);
        let low = fx.seed_request(NumericRange::new(None, Some(15_000.0)), vec![fx.studio], 20);
        let high = fx.seed_request(NumericRange::new(None, Some(40_000.0)), vec![fx.studio], 30);

        let request = SearchRequest::new(requests()).sorted(SortOption::PriceAsc);
        let found = fx.engine().search(&request, &fx.cancel).await.unwrap();
        assert_eq!(ids(&found), vec![low, high, open]);
    }

    #[tokio::test]
    async fn test_pagination_window() {
        let fx = Fixture::new();
        let newest_first: Vec<Uuid> = (1..=5)
            .map(|age| fx.seed_offer(10_000.0, 30.0, fx.studio, age * 10))
            .collect();
        let engine = fx.engine();

        let page = engine
            .search(&SearchRequest::new(offers()).paged(2, 2), &fx.cancel)
            .await
            .unwrap();
        assert_eq!(ids(&page), newest_first[2..4].to_vec());

        let past_end = engine
            .search(&SearchRequest::new(offers()).paged(4, 2), &fx.cancel)
            .await
            .unwrap();
        assert!(past_end.is_empty());
    }

    #[tokio::test]
    async fn test_huge_page_number_yields_empty_page() {
        let fx = Fixture::new();
        fx.seed_offer(10_000.0, 30.0, fx.studio, 10);

        for page in [u64::MAX / 2, u64::MAX] {
            let found = fx
                .engine()
                .search(&SearchRequest::new(offers()).paged(page, 10), &fx.cancel)
                .await
                .unwrap();
            assert!(found.is_empty());
        }
    }

    #[tokio::test]
    async fn test_my_listings_restricts_to_owner() {
        let fx = Fixture::new();
        let mine = fx.seed_offer(10_000.0, 30.0, fx.studio, 10);
        fx.seed(
            fx.other_agent,
            ListingDetails::Offer {
                price: 10_000.0,
                area: 30.0,
                bedroom_id: fx.studio,
            },
            vec![fx.sukhumvit],
            20,
        );

        let found = fx
            .engine()
            .my_listings(
                fx.agent,
                ListingKind::Offer,
                SortOption::Newest,
                Language::En,
                &fx.cancel,
            )
            .await
            .unwrap();
        assert_eq!(ids(&found), vec![mine]);
    }

    #[tokio::test]
    async fn test_results_are_localized() {
        let fx = Fixture::new();
        fx.seed_offer(10_000.0, 30.0, fx.studio, 10);

        let request = SearchRequest::new(offers()).in_language(Language::Th);
        let found = fx.engine().search(&request, &fx.cancel).await.unwrap();

        assert_eq!(found[0].locations[0].display_name, "สุขุมวิท");
        assert_eq!(found[0].bedrooms[0].display_name, "สตูดิโอ");
        assert_eq!(found[0].category.as_ref().map(|c| c.name.as_str()), Some("condo"));
    }

    #[tokio::test]
    async fn test_store_failures_surface_as_query_failed() {
        for op in [
            StoreOp::SelectListings,
            StoreOp::JunctionIds(Junction::Locations),
            StoreOp::LoadAttachments,
            StoreOp::Categories,
        ] {
            let fx = Fixture::new();
            fx.seed_offer(10_000.0, 30.0, fx.studio, 10);
            fx.store.fail_on(op);

            let mut filters = offers();
            filters.location_ids = vec![fx.sukhumvit];
            let err = fx
                .engine()
                .search(&SearchRequest::new(filters), &fx.cancel)
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::QueryFailed { .. }), "{:?}: {:?}", op, err);
        }
    }

    #[tokio::test]
    async fn test_cancelled_search_is_not_a_failure() {
        let fx = Fixture::new();
        fx.seed_offer(10_000.0, 30.0, fx.studio, 10);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = fx
            .engine()
            .search(&SearchRequest::new(offers()), &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
