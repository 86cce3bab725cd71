//! Router over a seeded in-memory store for route tests

use crate::{create_router, AppState, Backends};
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use baanboard_common::{
    billing::HttpSubscriptionProvider,
    config::AppConfig,
    db::models::{AgentProfile, BedroomType, Category, Location},
    db::MemoryStore,
    storage::MemoryBlobStore,
};
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: MemoryStore,
    pub blobs: MemoryBlobStore,
    pub condo: Uuid,
    pub studio: Uuid,
    pub two_bed: Uuid,
    pub sukhumvit: Uuid,
    /// Agent without premium
    pub agent: Uuid,
    /// Agent with an active premium subscription
    pub premium_agent: Uuid,
}

impl TestApp {
    pub fn new() -> Self {
        let mut config = AppConfig::default();
        config.auth.jwt_secret = Some("test-secret".into());
        config.rate_limit.enabled = false;
        config.database.in_memory = true;
        config.storage.max_upload_bytes = 1024;

        let store = MemoryStore::new();
        let blobs = MemoryBlobStore::new();
        let ids: Vec<Uuid> = (0..6).map(|_| Uuid::new_v4()).collect();
        let (condo, studio, two_bed, sukhumvit, agent, premium_agent) =
            (ids[0], ids[1], ids[2], ids[3], ids[4], ids[5]);

        store.seed_categories([Category {
            id: condo,
            name: "condo".into(),
            display_name_th: Some("คอนโด".into()),
            display_order: 1,
        }]);
        store.seed_bedroom_types([
            BedroomType { id: studio, name: "studio".into(), display_name_th: Some("สตูดิโอ".into()) },
            BedroomType { id: two_bed, name: "2_bedrooms".into(), display_name_th: None },
        ]);
        store.seed_locations([Location {
            id: sukhumvit,
            name: "Sukhumvit".into(),
            display_name_th: Some("สุขุมวิท".into()),
            kind: "area".into(),
            parent_id: None,
        }]);
        store.seed_agent(AgentProfile {
            id: agent,
            phone: "+66811111111".into(),
            name: "Ploy".into(),
            line_id: Some("ploy.agent".into()),
            avatar_url: None,
            premium_until: None,
            premium_trial_used: false,
        });
        store.seed_agent(AgentProfile {
            id: premium_agent,
            phone: "+66822222222".into(),
            name: "Beam".into(),
            line_id: None,
            avatar_url: None,
            premium_until: Some((Utc::now() + ChronoDuration::days(30)).into()),
            premium_trial_used: true,
        });

        let billing = HttpSubscriptionProvider::new(config.billing.clone())
            .expect("billing client");
        let shared = Arc::new(store.clone());
        let state = AppState::new(
            config,
            Backends {
                db: None,
                catalog_store: shared.clone(),
                listing_store: shared,
                blobs: Arc::new(blobs.clone()),
                billing: Arc::new(billing),
            },
        )
        .expect("state");

        Self {
            router: create_router(state.clone()),
            state,
            store,
            blobs,
            condo,
            studio,
            two_bed,
            sukhumvit,
            agent,
            premium_agent,
        }
    }

    pub fn token(&self, agent_id: Uuid) -> String {
        self.state.jwt.generate_token(agent_id, None).expect("token")
    }

    pub fn offer_body(&self) -> Value {
        json!({
            "kind": "offer",
            "category_id": self.condo,
            "title": "Cozy studio near BTS",
            "location_ids": [self.sukhumvit],
            "bathroom_count": 1,
            "commission": { "mode": "percentage", "value": 50.0 },
            "price": 15000.0,
            "area": 35.0,
            "bedroom_id": self.studio,
        })
    }

    /// Send a request and decode the JSON body (`Null` when empty)
    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        agent: Option<Uuid>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(agent) = agent {
            let bearer = format!("Bearer {}", self.token(agent));
            builder = builder.header(header::AUTHORIZATION, bearer);
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");

        self.call(request).await
    }

    pub async fn call(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    /// Create an offer through the API and return its id
    pub async fn create_offer(&self, agent: Uuid) -> Uuid {
        let (status, body) = self
            .send("POST", "/v1/listings", Some(agent), Some(self.offer_body()))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body["id"].as_str().and_then(|id| id.parse().ok()).expect("listing id")
    }
}
