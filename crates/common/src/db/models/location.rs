//! Location reference table: areas, sub-areas and transit stations

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Location kind enum
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationKind {
    Area,
    SubArea,
    Bts,
    Mrt,
}

impl From<String> for LocationKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "sub_area" => LocationKind::SubArea,
            "bts" => LocationKind::Bts,
            "mrt" => LocationKind::Mrt,
            _ => LocationKind::Area,
        }
    }
}

impl From<LocationKind> for String {
    fn from(kind: LocationKind) -> Self {
        match kind {
            LocationKind::Area => "area".to_string(),
            LocationKind::SubArea => "sub_area".to_string(),
            LocationKind::Bts => "bts".to_string(),
            LocationKind::Mrt => "mrt".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "reference_locations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub name: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub display_name_th: Option<String>,

    #[sea_orm(column_type = "Text")]
    pub kind: String,

    /// Set for sub-areas; points at the enclosing area
    pub parent_id: Option<Uuid>,
}

impl Model {
    pub fn location_kind(&self) -> LocationKind {
        LocationKind::from(self.kind.clone())
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "Entity",
        from = "Column::ParentId",
        to = "Column::Id"
    )]
    Parent,
}

impl ActiveModelBehavior for ActiveModel {}
