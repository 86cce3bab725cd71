//! Subscription handlers

use axum::{
    extract::State,
    http::{header, HeaderMap},
    Json,
};
use baanboard_common::{
    auth::{extract_bearer, AuthContext},
    billing::CheckoutMode,
    errors::{AppError, Result},
};
use serde::{Deserialize, Serialize};

use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct CheckoutRequest {
    /// Defaults to the configured premium plan
    pub price_id: Option<String>,
    pub mode: Option<CheckoutMode>,
}

#[derive(Serialize)]
pub struct RedirectResponse {
    pub url: String,
}

/// Start a checkout session for the signed-in agent
pub async fn checkout(
    State(state): State<AppState>,
    auth: AuthContext,
    headers: HeaderMap,
    Json(request): Json<CheckoutRequest>,
) -> Result<Json<RedirectResponse>> {
    let price_id = request
        .price_id
        .or_else(|| state.config.billing.premium_price_id.clone())
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| AppError::validation("price_id", "No price selected"))?;

    // The checkout function identifies the agent by their own session token
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(extract_bearer)
        .ok_or_else(|| AppError::Unauthorized {
            message: "Missing bearer token".to_string(),
        })?;

    let mode = request.mode.unwrap_or(CheckoutMode::Subscription);
    let url = state
        .billing
        .create_checkout_session(token, &price_id, mode)
        .await?;

    tracing::info!(agent_id = %auth.agent_id, price_id = %price_id, "Checkout session created");
    Ok(Json(RedirectResponse { url }))
}

/// Customer portal for managing an existing subscription
pub async fn portal(
    State(state): State<AppState>,
    _auth: AuthContext,
) -> Result<Json<RedirectResponse>> {
    let url = state.billing.create_portal_session().await?;
    Ok(Json(RedirectResponse { url }))
}

#[cfg(test)]
mod tests {
    use crate::test_support::TestApp;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_portal_requires_session() {
        let app = TestApp::new();

        let (status, _) = app.send("GET", "/v1/billing/portal", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = app.send("GET", "/v1/billing/portal", Some(app.agent), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["url"], app.state.config.billing.portal_url.as_str());
    }

    #[tokio::test]
    async fn test_checkout_without_price_is_rejected() {
        let app = TestApp::new();

        let (status, body) = app
            .send("POST", "/v1/billing/checkout", Some(app.agent), Some(json!({})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["field"], "price_id");
    }

    #[tokio::test]
    async fn test_checkout_without_endpoint_is_a_configuration_error() {
        let app = TestApp::new();

        let (status, body) = app
            .send(
                "POST",
                "/v1/billing/checkout",
                Some(app.agent),
                Some(json!({ "price_id": "price_premium", "mode": "subscription" })),
            )
            .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body["error"]["message"],
            baanboard_common::errors::GENERIC_USER_MESSAGE
        );
    }
}
