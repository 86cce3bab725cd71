//! Listing search
//!
//! `FilterEngine` compiles a `Filters` value into store queries;
//! `SearchSession` makes sure only the latest issued search updates
//! visible state.

mod engine;
mod session;

pub use engine::FilterEngine;
pub use session::{SearchSession, SearchSessions, SearchState, SearchTicket};

use crate::localization::Language;
use crate::model::NumericRange;
use baanboard_common::db::models::ListingKind;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Search filters. Empty id lists mean "no filter".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filters {
    /// Listing kind (mandatory)
    pub kind: ListingKind,

    #[serde(default)]
    pub category_ids: Vec<Uuid>,

    #[serde(default)]
    pub bedroom_ids: Vec<Uuid>,

    #[serde(default)]
    pub location_ids: Vec<Uuid>,

    /// Price bounds: `price` for offers, `price_min`/`price_max` for requests
    #[serde(default)]
    pub price_range: Option<NumericRange>,

    /// Area bounds: `area` for offers, `area_min`/`area_max` for requests
    #[serde(default)]
    pub area_range: Option<NumericRange>,
}

impl Filters {
    pub fn new(kind: ListingKind) -> Self {
        Self {
            kind,
            category_ids: Vec::new(),
            bedroom_ids: Vec::new(),
            location_ids: Vec::new(),
            price_range: None,
            area_range: None,
        }
    }
}

/// Result ordering
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOption {
    /// Most recently created first
    #[default]
    Newest,
    /// Earliest created first
    Oldest,
    PriceAsc,
    PriceDesc,
}

/// Pagination window, 1-based
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub page: u64,
    pub limit: Option<u64>,
}

/// A complete search request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    #[serde(flatten)]
    pub filters: Filters,

    #[serde(default)]
    pub sort: SortOption,

    #[serde(default)]
    pub page: Option<Page>,

    #[serde(default)]
    pub language: Language,
}

impl SearchRequest {
    pub fn new(filters: Filters) -> Self {
        Self {
            filters,
            sort: SortOption::default(),
            page: None,
            language: Language::default(),
        }
    }

    pub fn sorted(mut self, sort: SortOption) -> Self {
        self.sort = sort;
        self
    }

    pub fn paged(mut self, page: u64, limit: u64) -> Self {
        self.page = Some(Page {
            page,
            limit: Some(limit),
        });
        self
    }

    pub fn in_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }
}
