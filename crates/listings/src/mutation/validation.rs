//! Draft validation
//!
//! Turns a flat `ListingDraft` into `ListingFields` for one listing kind, or
//! fails with the name of the first offending field. Nothing here touches
//! the store; reference checks run against an already loaded catalog.

use crate::catalog::{CatalogSnapshot, RefTable};
use crate::model::{ListingDetails, ListingDraft, ListingExtras, ListingFields, NumericRange};
use baanboard_common::db::models::ListingKind;
use baanboard_common::errors::{AppError, Result};
use uuid::Uuid;
use validator::Validate;

/// Checks that need neither the store nor the listing kind
pub fn check_common(draft: &ListingDraft) -> Result<()> {
    check_field_constraints(draft)?;

    if draft.title.trim().is_empty() {
        return Err(AppError::validation("title", "Title must not be blank"));
    }
    if draft.category_id.is_none() {
        return Err(AppError::validation("category_id", "Category is required"));
    }
    if draft.location_ids.is_empty() {
        return Err(AppError::validation(
            "location_ids",
            "At least one location is required",
        ));
    }
    match draft.commission {
        None => Err(AppError::validation("commission", "Commission is required")),
        Some(c) if !c.value.is_finite() || c.value < 0.0 => Err(AppError::validation(
            "commission",
            "Commission must be zero or more",
        )),
        Some(_) => Ok(()),
    }
}

/// Shape `draft` into the fields of a listing of `kind`. No reference
/// lookups happen here.
pub fn check_shape(kind: ListingKind, draft: &ListingDraft) -> Result<ListingFields> {
    check_common(draft)?;
    let (Some(category_id), Some(commission)) = (draft.category_id, draft.commission) else {
        return Err(AppError::validation("category_id", "Category is required"));
    };

    let details = match kind {
        ListingKind::Offer => offer_details(draft)?,
        ListingKind::Request => request_details(draft)?,
    };

    Ok(ListingFields {
        category_id,
        title: draft.title.trim().to_string(),
        description: draft.description.trim().to_string(),
        location_ids: dedup(&draft.location_ids),
        amenity_ids: dedup(&draft.amenity_ids),
        tag_ids: dedup(&draft.tag_ids),
        bathroom_count: draft.bathroom_count,
        commission,
        images: clean_images(&draft.images),
        details,
        extras: ListingExtras {
            project_name: draft
                .project_name
                .as_deref()
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(String::from),
            floor: draft.floor,
            move_in_date: draft.move_in_date,
            build_year: draft.build_year,
        },
    })
}

/// Every id in `fields` must exist in the reference catalog
pub fn check_references(fields: &ListingFields, catalog: &CatalogSnapshot) -> Result<()> {
    require_known(catalog, RefTable::Categories, "category_id", &[fields.category_id])?;
    require_known(catalog, RefTable::Locations, "location_ids", &fields.location_ids)?;
    require_known(catalog, RefTable::Amenities, "amenity_ids", &fields.amenity_ids)?;
    require_known(catalog, RefTable::Tags, "tag_ids", &fields.tag_ids)?;

    let bedroom_field = match fields.details.kind() {
        ListingKind::Offer => "bedroom_id",
        ListingKind::Request => "bedroom_ids",
    };
    require_known(
        catalog,
        RefTable::BedroomTypes,
        bedroom_field,
        &fields.details.bedroom_ids(),
    )
}

/// Shape and reference checks together
#[cfg(test)]
pub(crate) fn validate_draft(
    kind: ListingKind,
    draft: &ListingDraft,
    catalog: &CatalogSnapshot,
) -> Result<ListingFields> {
    let fields = check_shape(kind, draft)?;
    check_references(&fields, catalog)?;
    Ok(fields)
}

/// Image URLs in order, blanks dropped
pub fn clean_images(images: &[String]) -> Vec<String> {
    images
        .iter()
        .map(|url| url.trim())
        .filter(|url| !url.is_empty())
        .map(String::from)
        .collect()
}

/// Derive-level constraints. Reports the alphabetically first failing field
/// so the result does not depend on map iteration order.
fn check_field_constraints(draft: &ListingDraft) -> Result<()> {
    let Err(errors) = draft.validate() else {
        return Ok(());
    };
    let field_errors = errors.field_errors();
    let mut fields: Vec<_> = field_errors.keys().collect();
    fields.sort();

    match fields.first() {
        Some(field) => {
            let code = field_errors
                .get(*field)
                .and_then(|errs| errs.first())
                .map(|e| e.code.to_string())
                .unwrap_or_default();
            Err(AppError::validation(
                field.to_string(),
                format!("Invalid value ({})", code),
            ))
        }
        None => Err(AppError::validation("listing", errors.to_string())),
    }
}

fn non_negative(field: &str, value: Option<f64>) -> Result<f64> {
    match value {
        Some(v) if v.is_finite() && v >= 0.0 => Ok(v),
        Some(_) => Err(AppError::validation(field, "Must be zero or more")),
        None => Err(AppError::validation(field, "Required for offers")),
    }
}

fn offer_details(draft: &ListingDraft) -> Result<ListingDetails> {
    for (field, present) in [
        ("price_range", draft.price_range.is_some()),
        ("area_range", draft.area_range.is_some()),
        ("bedroom_ids", draft.bedroom_ids.is_some()),
    ] {
        if present {
            return Err(AppError::validation(field, "Not allowed for offers"));
        }
    }

    Ok(ListingDetails::Offer {
        price: non_negative("price", draft.price)?,
        area: non_negative("area", draft.area)?,
        bedroom_id: draft
            .bedroom_id
            .ok_or_else(|| AppError::validation("bedroom_id", "Required for offers"))?,
    })
}

fn request_details(draft: &ListingDraft) -> Result<ListingDetails> {
    for (field, present) in [
        ("price", draft.price.is_some()),
        ("area", draft.area.is_some()),
        ("bedroom_id", draft.bedroom_id.is_some()),
    ] {
        if present {
            return Err(AppError::validation(field, "Not allowed for requests"));
        }
    }

    let bedroom_ids = dedup(draft.bedroom_ids.as_deref().unwrap_or_default());
    if bedroom_ids.is_empty() {
        return Err(AppError::validation(
            "bedroom_ids",
            "At least one bedroom type is required",
        ));
    }

    Ok(ListingDetails::Request {
        price_range: check_range("price_range", draft.price_range.unwrap_or_default())?,
        area_range: check_range("area_range", draft.area_range.unwrap_or_default())?,
        bedroom_ids,
    })
}

fn check_range(field: &str, range: NumericRange) -> Result<NumericRange> {
    for bound in [range.min, range.max].into_iter().flatten() {
        if !bound.is_finite() || bound < 0.0 {
            return Err(AppError::validation(field, "Bounds must be zero or more"));
        }
    }
    if let (Some(min), Some(max)) = (range.min, range.max) {
        if min > max {
            return Err(AppError::validation(field, "Minimum exceeds maximum"));
        }
    }
    Ok(range)
}

fn require_known(
    catalog: &CatalogSnapshot,
    table: RefTable,
    field: &str,
    ids: &[Uuid],
) -> Result<()> {
    match ids.iter().find(|id| !catalog.contains(table, **id)) {
        Some(id) => Err(AppError::validation(
            field,
            format!("Unknown reference {}", id),
        )),
        None => Ok(()),
    }
}

fn dedup(ids: &[Uuid]) -> Vec<Uuid> {
    let mut out: Vec<Uuid> = Vec::with_capacity(ids.len());
    for id in ids {
        if !out.contains(id) {
            out.push(*id);
        }
    }
    out
}
