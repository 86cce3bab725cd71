//! Listing to archive-row mapping

use crate::catalog::{CatalogSnapshot, RefTable};
use crate::model::{ArchivedListingView, Listing, ListingDetails};
use baanboard_common::db::models::ArchivedListing;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

fn names(catalog: &CatalogSnapshot, table: RefTable, ids: &[Uuid]) -> Value {
    let names: Vec<Value> = ids
        .iter()
        .map(|id| match catalog.canonical_name(table, *id) {
            Some(name) => Value::String(name.to_string()),
            None => {
                warn!(reference = %id, table = ?table, "Archiving reference missing from catalog");
                Value::String(id.to_string())
            }
        })
        .collect();
    Value::Array(names)
}

/// Denormalized snapshot of `listing`, with every reference stored as its
/// canonical name
pub fn build_archive(
    listing: &Listing,
    catalog: &CatalogSnapshot,
    deal_closed: bool,
    now: DateTime<Utc>,
) -> ArchivedListing {
    let f = &listing.fields;
    let (price, area, price_min, price_max, area_min, area_max) = match &f.details {
        ListingDetails::Offer { price, area, .. } => {
            (Some(*price), Some(*area), None, None, None, None)
        }
        ListingDetails::Request {
            price_range,
            area_range,
            ..
        } => (
            None,
            None,
            price_range.min,
            price_range.max,
            area_range.min,
            area_range.max,
        ),
    };

    ArchivedListing {
        id: Uuid::new_v4(),
        original_id: listing.id,
        kind: listing.kind().as_str().to_string(),
        category_name: catalog
            .canonical_name(RefTable::Categories, f.category_id)
            .map(String::from),
        title: f.title.clone(),
        description: f.description.clone(),
        project_name: f.extras.project_name.clone(),
        floor: f.extras.floor,
        move_in_date: f.extras.move_in_date,
        build_year: f.extras.build_year,
        price,
        area,
        price_min,
        price_max,
        area_min,
        area_max,
        bathroom_count: f.bathroom_count,
        commission_mode: f.commission.mode.as_str().to_string(),
        commission_value: f.commission.value,
        locations: names(catalog, RefTable::Locations, &f.location_ids),
        amenities: names(catalog, RefTable::Amenities, &f.amenity_ids),
        tags: names(catalog, RefTable::Tags, &f.tag_ids),
        bedrooms: names(catalog, RefTable::BedroomTypes, &f.details.bedroom_ids()),
        images: Value::Array(f.images.iter().cloned().map(Value::String).collect()),
        agent_id: listing.agent_id,
        deal_closed,
        closed_at: deal_closed.then(|| now.into()),
        created_at: listing.created_at.into(),
        deleted_at: now.into(),
    }
}

/// Render an archive row's stored names in `catalog`'s language
pub fn localize_archive(
    row: &ArchivedListing,
    catalog: &CatalogSnapshot,
) -> Option<ArchivedListingView> {
    let mut view = match ArchivedListingView::from_row(row) {
        Ok(view) => view,
        Err(e) => {
            warn!(archive_id = %row.id, error = %e, "Skipping malformed archive row");
            return None;
        }
    };

    let localize = |table: RefTable, names: &mut Vec<String>| {
        for name in names.iter_mut() {
            *name = catalog.localize_name(table, name);
        }
    };
    localize(RefTable::Locations, &mut view.locations);
    localize(RefTable::Amenities, &mut view.amenities);
    localize(RefTable::Tags, &mut view.tags);
    localize(RefTable::BedroomTypes, &mut view.bedrooms);
    view.category = view
        .category
        .map(|name| catalog.localize_name(RefTable::Categories, &name));

    Some(view)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::Fixture;
    use crate::localization::Language;
    use crate::mutation::validation::validate_draft;
    use baanboard_common::db::models::ListingKind;

    #[tokio::test]
    async fn test_archive_stores_names_and_localizes_on_read() {
        let fx = Fixture::new();
        let en = fx.catalog.load(Language::En, &fx.cancel).await.unwrap();
        let fields = validate_draft(ListingKind::Offer, &fx.offer_draft(), &en).unwrap();
        let now = Utc::now();
        let listing = Listing {
            id: Uuid::new_v4(),
            agent_id: fx.agent,
            fields,
            created_at: now,
            updated_at: now,
        };

        let row = build_archive(&listing, &en, true, now);
        assert_eq!(ArchivedListing::names(&row.locations), vec!["Sukhumvit"]);
        assert_eq!(ArchivedListing::names(&row.bedrooms), vec!["studio"]);
        assert_eq!(row.category_name.as_deref(), Some("condo"));
        assert!(row.closed_at.is_some());
        assert_eq!(row.price, Some(15_000.0));
        assert!(row.price_min.is_none());

        let th = fx.catalog.load(Language::Th, &fx.cancel).await.unwrap();
        let view = localize_archive(&row, &th).unwrap();
        assert_eq!(view.locations, vec!["สุขุมวิท"]);
        assert_eq!(view.category.as_deref(), Some("คอนโด"));
        assert_eq!(view.amenities, vec!["สระว่ายน้ำ"]);
    }

    #[tokio::test]
    async fn test_open_archive_has_no_close_date() {
        let fx = Fixture::new();
        let en = fx.catalog.load(Language::En, &fx.cancel).await.unwrap();
        let fields = validate_draft(ListingKind::Request, &fx.request_draft(), &en).unwrap();
        let now = Utc::now();
        let listing = Listing {
            id: Uuid::new_v4(),
            agent_id: fx.agent,
            fields,
            created_at: now,
            updated_at: now,
        };

        let row = build_archive(&listing, &en, false, now);
        assert!(row.closed_at.is_none());
        assert_eq!(row.price_max, Some(30_000.0));
        assert_eq!(
            ArchivedListing::names(&row.bedrooms),
            vec!["1_bedroom", "2_bedrooms"]
        );
    }
}
