//! Shared handler state

use axum::extract::FromRef;
use baanboard_common::{
    auth::JwtManager,
    billing::SubscriptionProvider,
    config::AppConfig,
    db::{CatalogStore, DbPool, ListingStore},
    errors::{AppError, Result},
    storage::{BlobStore, MediaService},
};
use baanboard_listings::{
    ContactGate, FilterEngine, Language, ListingMutationService, ReferenceCatalog,
    SearchSessions,
};
use std::sync::Arc;

/// Backends the services run against
pub struct Backends {
    /// Present when serving from PostgreSQL
    pub db: Option<DbPool>,
    pub catalog_store: Arc<dyn CatalogStore>,
    pub listing_store: Arc<dyn ListingStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub billing: Arc<dyn SubscriptionProvider>,
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: Option<DbPool>,
    pub catalog: ReferenceCatalog,
    pub engine: FilterEngine,
    pub search_sessions: SearchSessions,
    pub mutations: ListingMutationService,
    pub contact: ContactGate,
    pub media: MediaService,
    pub billing: Arc<dyn SubscriptionProvider>,
    pub jwt: Arc<JwtManager>,
}

impl AppState {
    pub fn new(config: AppConfig, backends: Backends) -> Result<Self> {
        let secret = config
            .auth
            .jwt_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::Configuration {
                message: "auth.jwt_secret is not set".to_string(),
            })?;
        let jwt = Arc::new(JwtManager::new(secret, config.auth.jwt_expiration_secs));

        let catalog = ReferenceCatalog::with_ttl(backends.catalog_store, config.catalog_ttl());
        let store = backends.listing_store;

        Ok(Self {
            engine: FilterEngine::new(store.clone(), catalog.clone(), &config.listings),
            search_sessions: SearchSessions::new(
                config.listings.max_search_sessions,
                config.search_session_idle(),
            ),
            mutations: ListingMutationService::new(
                store.clone(),
                catalog.clone(),
                config.listings.default_image_url.clone(),
            ),
            contact: ContactGate::new(store),
            media: MediaService::new(backends.blobs, config.storage.clone()),
            billing: backends.billing,
            db: backends.db,
            catalog,
            jwt,
            config: Arc::new(config),
        })
    }

    /// `lang` query value, or the configured default language
    pub fn language(&self, lang: Option<&str>) -> Language {
        Language::parse(lang.unwrap_or(&self.config.catalog.default_language))
    }
}

impl FromRef<AppState> for Arc<JwtManager> {
    fn from_ref(state: &AppState) -> Self {
        state.jwt.clone()
    }
}
