//! Archived listing: denormalized snapshot written at soft-delete time
//!
//! Relational fields are stored as canonical names, not ids, so the row
//! stays readable after reference data changes.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "archived_listings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(indexed)]
    pub original_id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub kind: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub category_name: Option<String>,

    #[sea_orm(column_type = "Text")]
    pub title: String,

    #[sea_orm(column_type = "Text")]
    pub description: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub project_name: Option<String>,

    pub floor: Option<i32>,

    pub move_in_date: Option<Date>,

    pub build_year: Option<i32>,

    pub price: Option<f64>,
    pub area: Option<f64>,
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
    pub area_min: Option<f64>,
    pub area_max: Option<f64>,

    pub bathroom_count: i32,

    #[sea_orm(column_type = "Text")]
    pub commission_mode: String,

    pub commission_value: f64,

    /// JSON array of location names
    #[sea_orm(column_type = "JsonBinary")]
    pub locations: Json,

    /// JSON array of amenity names
    #[sea_orm(column_type = "JsonBinary")]
    pub amenities: Json,

    /// JSON array of tag names
    #[sea_orm(column_type = "JsonBinary")]
    pub tags: Json,

    /// JSON array of bedroom type names (one entry for offers)
    #[sea_orm(column_type = "JsonBinary")]
    pub bedrooms: Json,

    /// JSON array of image URLs in display order
    #[sea_orm(column_type = "JsonBinary")]
    pub images: Json,

    #[sea_orm(indexed)]
    pub agent_id: Uuid,

    pub deal_closed: bool,

    pub closed_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,

    pub deleted_at: DateTimeWithTimeZone,
}

impl Model {
    /// Decode one of the JSON name columns
    pub fn names(value: &Json) -> Vec<String> {
        value
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
