//! Listing domain model
//!
//! A listing is either an offer (a concrete property with price, area and a
//! single bedroom type) or a request (a client search with price/area ranges
//! and a set of acceptable bedroom types). The kind-specific shape lives in
//! `ListingDetails` so a listing can never carry both.

use baanboard_common::db::models::{ArchivedListing, CommissionMode, ListingKind, ListingRow};
use baanboard_common::db::ListingAttachments;
use baanboard_common::errors::{AppError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Optional lower and upper bound
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NumericRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl NumericRange {
    pub fn new(min: Option<f64>, max: Option<f64>) -> Self {
        Self { min, max }
    }
}

/// Commission split offered to co-agents
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Commission {
    pub mode: CommissionMode,
    pub value: f64,
}

/// Kind-specific listing fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ListingDetails {
    Offer {
        price: f64,
        area: f64,
        bedroom_id: Uuid,
    },
    Request {
        price_range: NumericRange,
        area_range: NumericRange,
        bedroom_ids: Vec<Uuid>,
    },
}

impl ListingDetails {
    pub fn kind(&self) -> ListingKind {
        match self {
            ListingDetails::Offer { .. } => ListingKind::Offer,
            ListingDetails::Request { .. } => ListingKind::Request,
        }
    }

    /// Bedroom type ids, one for offers
    pub fn bedroom_ids(&self) -> Vec<Uuid> {
        match self {
            ListingDetails::Offer { bedroom_id, .. } => vec![*bedroom_id],
            ListingDetails::Request { bedroom_ids, .. } => bedroom_ids.clone(),
        }
    }
}

/// Optional property facts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListingExtras {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub floor: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub move_in_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_year: Option<i32>,
}

/// Everything about a listing an agent can edit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingFields {
    pub category_id: Uuid,
    pub title: String,
    pub description: String,
    pub location_ids: Vec<Uuid>,
    pub amenity_ids: Vec<Uuid>,
    pub tag_ids: Vec<Uuid>,
    pub bathroom_count: i32,
    pub commission: Commission,
    /// Image URLs in display order
    pub images: Vec<String>,
    #[serde(flatten)]
    pub details: ListingDetails,
    #[serde(flatten)]
    pub extras: ListingExtras,
}

/// A persisted listing with its relational attachments resolved to ids
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: Uuid,
    pub agent_id: Uuid,
    #[serde(flatten)]
    pub fields: ListingFields,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn corrupt(id: Uuid, what: &str) -> AppError {
    AppError::Internal {
        message: format!("listing {} has invalid stored {}", id, what),
    }
}

impl Listing {
    pub fn kind(&self) -> ListingKind {
        self.fields.details.kind()
    }

    /// Assemble a listing from its base row and attachment rows
    pub fn from_row(row: ListingRow, attachments: ListingAttachments) -> Result<Self> {
        let id = row.id;
        let kind = row.listing_kind().ok_or_else(|| corrupt(id, "kind"))?;
        let mode = CommissionMode::parse(&row.commission_mode)
            .ok_or_else(|| corrupt(id, "commission mode"))?;

        let details = match kind {
            ListingKind::Offer => ListingDetails::Offer {
                price: row.price.ok_or_else(|| corrupt(id, "price"))?,
                area: row.area.ok_or_else(|| corrupt(id, "area"))?,
                bedroom_id: row.bedroom_id.ok_or_else(|| corrupt(id, "bedroom"))?,
            },
            ListingKind::Request => ListingDetails::Request {
                price_range: NumericRange::new(row.price_min, row.price_max),
                area_range: NumericRange::new(row.area_min, row.area_max),
                bedroom_ids: attachments.bedroom_ids,
            },
        };

        Ok(Self {
            id,
            agent_id: row.agent_id,
            fields: ListingFields {
                category_id: row.category_id,
                title: row.title,
                description: row.description,
                location_ids: attachments.location_ids,
                amenity_ids: attachments.amenity_ids,
                tag_ids: attachments.tag_ids,
                bathroom_count: row.bathroom_count,
                commission: Commission {
                    mode,
                    value: row.commission_value,
                },
                images: attachments.images,
                details,
                extras: ListingExtras {
                    project_name: row.project_name,
                    floor: row.floor,
                    move_in_date: row.move_in_date,
                    build_year: row.build_year,
                },
            },
            created_at: row.created_at.with_timezone(&Utc),
            updated_at: row.updated_at.with_timezone(&Utc),
        })
    }

    /// Base row for this listing. Junction and image rows are written separately.
    pub fn to_row(&self) -> ListingRow {
        let f = &self.fields;
        let mut row = ListingRow {
            id: self.id,
            kind: self.kind().as_str().to_string(),
            category_id: f.category_id,
            title: f.title.clone(),
            description: f.description.clone(),
            project_name: f.extras.project_name.clone(),
            floor: f.extras.floor,
            move_in_date: f.extras.move_in_date,
            build_year: f.extras.build_year,
            price: None,
            area: None,
            bedroom_id: None,
            price_min: None,
            price_max: None,
            area_min: None,
            area_max: None,
            bathroom_count: f.bathroom_count,
            commission_mode: f.commission.mode.as_str().to_string(),
            commission_value: f.commission.value,
            agent_id: self.agent_id,
            created_at: self.created_at.into(),
            updated_at: self.updated_at.into(),
        };

        match &f.details {
            ListingDetails::Offer { price, area, bedroom_id } => {
                row.price = Some(*price);
                row.area = Some(*area);
                row.bedroom_id = Some(*bedroom_id);
            }
            ListingDetails::Request { price_range, area_range, .. } => {
                row.price_min = price_range.min;
                row.price_max = price_range.max;
                row.area_min = area_range.min;
                row.area_max = area_range.max;
            }
        }
        row
    }
}

/// Create/update input as submitted by an agent.
///
/// Flat on purpose: which of the kind-specific fields must be present is
/// checked against the listing kind before anything is written.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct ListingDraft {
    pub category_id: Option<Uuid>,

    #[validate(length(min = 1, max = 200))]
    #[serde(default)]
    pub title: String,

    #[validate(length(max = 5000))]
    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub location_ids: Vec<Uuid>,

    #[serde(default)]
    pub amenity_ids: Vec<Uuid>,

    #[serde(default)]
    pub tag_ids: Vec<Uuid>,

    #[validate(range(min = 1))]
    #[serde(default)]
    pub bathroom_count: i32,

    pub commission: Option<Commission>,

    #[serde(default)]
    pub images: Vec<String>,

    // Offer
    pub price: Option<f64>,
    pub area: Option<f64>,
    pub bedroom_id: Option<Uuid>,

    // Request
    pub price_range: Option<NumericRange>,
    pub area_range: Option<NumericRange>,
    pub bedroom_ids: Option<Vec<Uuid>>,

    #[validate(length(max = 200))]
    pub project_name: Option<String>,

    #[validate(range(min = 0, max = 200))]
    pub floor: Option<i32>,

    pub move_in_date: Option<NaiveDate>,

    #[validate(range(min = 1900, max = 2100))]
    pub build_year: Option<i32>,
}

/// Archived listing rendered for one language
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArchivedListingView {
    pub id: Uuid,
    pub original_id: Uuid,
    pub kind: ListingKind,
    pub category: Option<String>,
    pub title: String,
    pub description: String,
    #[serde(flatten)]
    pub extras: ListingExtras,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_range: Option<NumericRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area_range: Option<NumericRange>,
    pub bathroom_count: i32,
    pub commission: Commission,
    pub locations: Vec<String>,
    pub amenities: Vec<String>,
    pub tags: Vec<String>,
    pub bedrooms: Vec<String>,
    pub images: Vec<String>,
    pub deal_closed: bool,
    pub closed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: DateTime<Utc>,
}

impl ArchivedListingView {
    /// Decode an archive row. Names are left canonical; the caller localizes.
    pub fn from_row(row: &ArchivedListing) -> Result<Self> {
        let kind = ListingKind::parse(&row.kind).ok_or_else(|| corrupt(row.original_id, "kind"))?;
        let mode = CommissionMode::parse(&row.commission_mode)
            .ok_or_else(|| corrupt(row.original_id, "commission mode"))?;

        let (price_range, area_range) = match kind {
            ListingKind::Offer => (None, None),
            ListingKind::Request => (
                Some(NumericRange::new(row.price_min, row.price_max)),
                Some(NumericRange::new(row.area_min, row.area_max)),
            ),
        };

        Ok(Self {
            id: row.id,
            original_id: row.original_id,
            kind,
            category: row.category_name.clone(),
            title: row.title.clone(),
            description: row.description.clone(),
            extras: ListingExtras {
                project_name: row.project_name.clone(),
                floor: row.floor,
                move_in_date: row.move_in_date,
                build_year: row.build_year,
            },
            price: row.price,
            area: row.area,
            price_range,
            area_range,
            bathroom_count: row.bathroom_count,
            commission: Commission {
                mode,
                value: row.commission_value,
            },
            locations: ArchivedListing::names(&row.locations),
            amenities: ArchivedListing::names(&row.amenities),
            tags: ArchivedListing::names(&row.tags),
            bedrooms: ArchivedListing::names(&row.bedrooms),
            images: ArchivedListing::names(&row.images),
            deal_closed: row.deal_closed,
            closed_at: row.closed_at.map(|t| t.with_timezone(&Utc)),
            created_at: row.created_at.with_timezone(&Utc),
            deleted_at: row.deleted_at.with_timezone(&Utc),
        })
    }
}
