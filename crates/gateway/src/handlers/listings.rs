//! Listing handlers

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use baanboard_common::{
    auth::AuthContext,
    db::models::ListingKind,
    errors::{AppError, Result},
};
use baanboard_listings::{
    ArchivedListingView, ContactDetails, Listing, ListingDraft, ListingView, SearchRequest,
    SortOption,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{request_scope, LanguageQuery};
use crate::AppState;

/// Create request: the listing kind plus the draft fields
#[derive(Debug, Deserialize)]
pub struct CreateListingRequest {
    pub kind: ListingKind,
    #[serde(flatten)]
    pub draft: ListingDraft,
}

#[derive(Debug, Deserialize)]
pub struct MyListingsQuery {
    pub kind: ListingKind,
    #[serde(default)]
    pub sort: SortOption,
    pub lang: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteQuery {
    #[serde(default)]
    pub deal_closed: bool,
}

#[derive(Serialize)]
pub struct ListingsResponse {
    pub listings: Vec<ListingView>,
    pub count: usize,
}

impl From<Vec<ListingView>> for ListingsResponse {
    fn from(listings: Vec<ListingView>) -> Self {
        Self {
            count: listings.len(),
            listings,
        }
    }
}

#[derive(Serialize)]
pub struct ArchivedResponse {
    pub archived: Vec<ArchivedListingView>,
}

/// Client-chosen id grouping the searches of one browse page
pub const SEARCH_SESSION_HEADER: &str = "x-search-session";

const MAX_SESSION_ID_LEN: usize = 64;

fn search_session_id(headers: &HeaderMap) -> Result<Option<&str>> {
    let Some(value) = headers.get(SEARCH_SESSION_HEADER) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .map(str::trim)
        .filter(|id| !id.is_empty() && id.len() <= MAX_SESSION_ID_LEN)
        .map(Some)
        .ok_or_else(|| {
            AppError::validation(
                SEARCH_SESSION_HEADER,
                "Session id must be 1-64 visible characters",
            )
        })
}

/// Public search over every agent's listings.
///
/// Searches sharing an `x-search-session` id supersede each other: a newer
/// one cancels the older, which then answers with `Cancelled`.
pub async fn search(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SearchRequest>,
) -> Result<Json<ListingsResponse>> {
    let (cancel, _scope) = request_scope();

    let views = match search_session_id(&headers)? {
        Some(id) => {
            let session = state.search_sessions.get(id).await;
            session.search_within(&state.engine, &request, &cancel).await?
        }
        None => state.engine.search(&request, &cancel).await?,
    };
    Ok(Json(views.into()))
}

/// Listings of the signed-in agent
pub async fn my_listings(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(query): Query<MyListingsQuery>,
) -> Result<Json<ListingsResponse>> {
    let (cancel, _scope) = request_scope();
    let language = state.language(query.lang.as_deref());

    let views = state
        .engine
        .my_listings(auth.agent_id, query.kind, query.sort, language, &cancel)
        .await?;
    Ok(Json(views.into()))
}

pub async fn create_listing(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<CreateListingRequest>,
) -> Result<(StatusCode, Json<Listing>)> {
    let (cancel, _scope) = request_scope();

    let listing = state
        .mutations
        .create(auth.agent_id, request.kind, request.draft, &cancel)
        .await?;

    tracing::info!(
        listing_id = %listing.id,
        agent_id = %auth.agent_id,
        request_id = %auth.request_id,
        "Listing created"
    );

    Ok((StatusCode::CREATED, Json(listing)))
}

pub async fn update_listing(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(listing_id): Path<Uuid>,
    Json(draft): Json<ListingDraft>,
) -> Result<Json<Listing>> {
    let (cancel, _scope) = request_scope();

    let listing = state
        .mutations
        .update(listing_id, auth.agent_id, draft, &cancel)
        .await?;
    Ok(Json(listing))
}

/// Archive then remove a listing; `?deal_closed=true` marks the deal closed
pub async fn delete_listing(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(listing_id): Path<Uuid>,
    Query(query): Query<DeleteQuery>,
) -> Result<Json<ArchivedListingView>> {
    let (cancel, _scope) = request_scope();

    let archived = state
        .mutations
        .soft_delete(listing_id, auth.agent_id, query.deal_closed, &cancel)
        .await?;
    Ok(Json(archived))
}

/// Archive history of the signed-in agent
pub async fn archived(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(query): Query<LanguageQuery>,
) -> Result<Json<ArchivedResponse>> {
    let (cancel, _scope) = request_scope();
    let language = state.language(query.lang.as_deref());

    let archived = state
        .mutations
        .archived(auth.agent_id, language, &cancel)
        .await?;
    Ok(Json(ArchivedResponse { archived }))
}

/// Phone and LINE id of a listing's agent, for premium viewers
pub async fn contact(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(listing_id): Path<Uuid>,
) -> Result<Json<ContactDetails>> {
    let (cancel, _scope) = request_scope();

    let details = state
        .contact
        .reveal(listing_id, auth.agent_id, &cancel)
        .await?;
    Ok(Json(details))
}
