//! Baanboard listing core
//!
//! Provides:
//! - Reference catalog with a per-language TTL cache
//! - Localized display names for reference entities
//! - Listing model and view assembly
//! - Filter engine and superseding search sessions
//! - Listing mutations with archival on delete
//! - Premium-gated contact reveal

pub mod catalog;
pub mod contact;
pub mod filter;
pub mod localization;
pub mod model;
pub mod mutation;
pub mod view;

#[cfg(test)]
pub(crate) mod fixtures;

pub use catalog::{CatalogSnapshot, LocalizedEntry, RefTable, ReferenceCatalog};
pub use contact::{ContactDetails, ContactGate};
pub use filter::{
    FilterEngine, Filters, Page, SearchRequest, SearchSession, SearchSessions, SearchState,
    SearchTicket, SortOption,
};
pub use localization::{display_name, Language, ReferenceEntity};
pub use model::{
    ArchivedListingView, Commission, Listing, ListingDetails, ListingDraft, ListingExtras,
    ListingFields, NumericRange,
};
pub use mutation::ListingMutationService;
pub use view::{AgentSummary, ListingView, RefName};
