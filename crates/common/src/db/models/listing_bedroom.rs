//! Junction between client requests and the bedroom types they accept
//!
//! Offers never have rows here; they use `listings.bedroom_id`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "listing_bedrooms")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub listing_id: Uuid,

    #[sea_orm(primary_key, auto_increment = false, indexed)]
    pub bedroom_id: Uuid,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::listing::Entity",
        from = "Column::ListingId",
        to = "super::listing::Column::Id",
        on_delete = "Cascade"
    )]
    Listing,

    #[sea_orm(
        belongs_to = "super::bedroom_type::Entity",
        from = "Column::BedroomId",
        to = "super::bedroom_type::Column::Id"
    )]
    BedroomType,
}

impl Related<super::listing::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Listing.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
