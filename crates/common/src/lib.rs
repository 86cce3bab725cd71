//! Baanboard Common Library
//!
//! Shared code for the Baanboard services including:
//! - Database entities, store traits and their implementations
//! - Error types and handling
//! - Configuration management
//! - Authentication of agent sessions
//! - Object storage and subscription boundaries
//! - Metrics and observability

pub mod auth;
pub mod billing;
pub mod config;
pub mod db;
pub mod errors;
pub mod metrics;
pub mod storage;
pub mod cache;

// Re-export commonly used types
pub use errors::{AppError, Result};
pub use config::AppConfig;
pub use db::{CatalogStore, ListingStore, ListingUnitOfWork, Repository};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Language tag used when a request does not name one
pub const DEFAULT_LANGUAGE: &str = "en";

/// Placeholder image attached to listings created without any photo
pub const DEFAULT_LISTING_IMAGE: &str =
    "https://images.unsplash.com/photo-1523731407965-2430cd12f5e4?q=80&w=800&auto=format&";
