//! Reference data handler

use axum::{
    extract::{Query, State},
    Json,
};
use baanboard_common::errors::Result;
use baanboard_listings::CatalogSnapshot;

use super::{request_scope, LanguageQuery};
use crate::AppState;

/// All reference tables with display names in the requested language
pub async fn reference(
    State(state): State<AppState>,
    Query(query): Query<LanguageQuery>,
) -> Result<Json<CatalogSnapshot>> {
    let (cancel, _scope) = request_scope();
    let language = state.language(query.lang.as_deref());

    let snapshot = state.catalog.load(language, &cancel).await?;
    Ok(Json(CatalogSnapshot::clone(&snapshot)))
}

#[cfg(test)]
mod tests {
    use crate::test_support::TestApp;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_reference_is_localized_per_language() {
        let app = TestApp::new();

        let (status, body) = app.send("GET", "/v1/reference?lang=th", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["language"], "th");
        assert_eq!(body["locations"][0]["display_name"], "สุขุมวิท");

        let (_, body) = app.send("GET", "/v1/reference", None, None).await;
        assert_eq!(body["language"], "en");
        assert_eq!(body["locations"][0]["display_name"], "Sukhumvit");
    }

    #[tokio::test]
    async fn test_untranslated_entry_falls_back_to_name() {
        let app = TestApp::new();

        let (_, body) = app.send("GET", "/v1/reference?lang=th-TH", None, None).await;
        let bedrooms = body["bedroom_types"].as_array().cloned().unwrap_or_default();
        let two_bed = bedrooms
            .iter()
            .find(|b| b["name"] == "2_bedrooms")
            .expect("2_bedrooms entry");
        assert_eq!(two_bed["display_name"], "2_bedrooms");
    }
}
