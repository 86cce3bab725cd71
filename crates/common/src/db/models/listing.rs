//! Listing entity: a property offer or a client search-request

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Discriminator stored in `listings.kind`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingKind {
    Offer,
    Request,
}

impl ListingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingKind::Offer => "offer",
            ListingKind::Request => "request",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "offer" | "property" => Some(ListingKind::Offer),
            "request" | "client-request" => Some(ListingKind::Request),
            _ => None,
        }
    }
}

impl From<ListingKind> for String {
    fn from(kind: ListingKind) -> Self {
        kind.as_str().to_string()
    }
}

/// How the commission split is expressed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommissionMode {
    Percentage,
    Fixed,
}

impl CommissionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommissionMode::Percentage => "percentage",
            CommissionMode::Fixed => "fixed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "percentage" => Some(CommissionMode::Percentage),
            "fixed" => Some(CommissionMode::Fixed),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "listings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(column_type = "Text", indexed)]
    pub kind: String,

    pub category_id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub title: String,

    #[sea_orm(column_type = "Text")]
    pub description: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub project_name: Option<String>,

    pub floor: Option<i32>,

    pub move_in_date: Option<Date>,

    pub build_year: Option<i32>,

    /// Offer only
    pub price: Option<f64>,

    /// Offer only
    pub area: Option<f64>,

    /// Offer only; requests keep their bedrooms in `listing_bedrooms`
    pub bedroom_id: Option<Uuid>,

    /// Request only
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
    pub area_min: Option<f64>,
    pub area_max: Option<f64>,

    pub bathroom_count: i32,

    #[sea_orm(column_type = "Text")]
    pub commission_mode: String,

    pub commission_value: f64,

    #[sea_orm(indexed)]
    pub agent_id: Uuid,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    pub fn listing_kind(&self) -> Option<ListingKind> {
        ListingKind::parse(&self.kind)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::category::Entity",
        from = "Column::CategoryId",
        to = "super::category::Column::Id"
    )]
    Category,

    #[sea_orm(
        belongs_to = "super::agent_profile::Entity",
        from = "Column::AgentId",
        to = "super::agent_profile::Column::Id"
    )]
    Agent,

    #[sea_orm(has_many = "super::listing_location::Entity", on_delete = "Cascade")]
    Locations,

    #[sea_orm(has_many = "super::listing_amenity::Entity", on_delete = "Cascade")]
    Amenities,

    #[sea_orm(has_many = "super::listing_tag::Entity", on_delete = "Cascade")]
    Tags,

    #[sea_orm(has_many = "super::listing_bedroom::Entity", on_delete = "Cascade")]
    Bedrooms,

    #[sea_orm(has_many = "super::listing_image::Entity", on_delete = "Cascade")]
    Images,
}

impl Related<super::category::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Category.def()
    }
}

impl Related<super::agent_profile::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Agent.def()
    }
}

impl Related<super::listing_location::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Locations.def()
    }
}

impl Related<super::listing_image::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Images.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
