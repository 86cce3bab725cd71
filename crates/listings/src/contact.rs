//! Premium-gated contact reveal

use baanboard_common::db::ListingStore;
use baanboard_common::errors::{AppError, Result};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Contact details of a listing's agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContactDetails {
    pub agent_id: Uuid,
    pub phone: String,
    pub line_id: Option<String>,
}

/// Reveals an agent's phone and LINE id to premium viewers only
#[derive(Clone)]
pub struct ContactGate {
    store: Arc<dyn ListingStore>,
}

impl ContactGate {
    pub fn new(store: Arc<dyn ListingStore>) -> Self {
        Self { store }
    }

    #[instrument(skip(self, cancel), fields(listing_id = %listing_id, viewer_id = %viewer_id))]
    pub async fn reveal(
        &self,
        listing_id: Uuid,
        viewer_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<ContactDetails> {
        let listing = self
            .store
            .find_listing(listing_id, cancel)
            .await
            .map_err(AppError::query_failed)?
            .ok_or_else(|| AppError::not_found("listing", listing_id))?;

        // The owner always sees their own details
        let mut wanted = vec![listing.agent_id];
        if viewer_id != listing.agent_id {
            wanted.push(viewer_id);
        }
        let profiles = self
            .store
            .agent_profiles(&wanted, cancel)
            .await
            .map_err(AppError::query_failed)?;

        if viewer_id != listing.agent_id {
            let premium = profiles
                .iter()
                .find(|p| p.id == viewer_id)
                .is_some_and(|p| p.is_premium_at(Utc::now()));
            if !premium {
                debug!("Contact reveal refused without premium");
                return Err(AppError::PremiumRequired);
            }
        }

        let owner = profiles
            .into_iter()
            .find(|p| p.id == listing.agent_id)
            .ok_or_else(|| AppError::not_found("agent_profile", listing.agent_id))?;

        Ok(ContactDetails {
            agent_id: owner.id,
            phone: owner.phone,
            line_id: owner.line_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::Fixture;
    use baanboard_common::db::models::AgentProfile;
    use chrono::Duration as ChronoDuration;

    #[tokio::test]
    async fn test_premium_viewer_sees_contact() {
        let fx = Fixture::new();
        let listing = fx.seed_offer(12_000.0, 30.0, fx.studio, 10);
        let gate = ContactGate::new(Arc::new(fx.store.clone()));

        let contact = gate.reveal(listing, fx.other_agent, &fx.cancel).await.unwrap();
        assert_eq!(contact.phone, "+66811111111");
        assert_eq!(contact.line_id.as_deref(), Some("ploy.agent"));
    }

    #[tokio::test]
    async fn test_non_premium_viewer_is_refused() {
        let fx = Fixture::new();
        let listing = fx.seed_offer(12_000.0, 30.0, fx.studio, 10);
        let lapsed = Uuid::new_v4();
        fx.store.seed_agent(AgentProfile {
            id: lapsed,
            phone: "+66833333333".into(),
            name: "Mint".into(),
            line_id: None,
            avatar_url: None,
            premium_until: Some((Utc::now() - ChronoDuration::days(1)).into()),
            premium_trial_used: true,
        });
        let gate = ContactGate::new(Arc::new(fx.store.clone()));

        for viewer in [lapsed, Uuid::new_v4()] {
            let err = tokio_test::assert_err!(gate.reveal(listing, viewer, &fx.cancel).await);
            assert!(matches!(err, AppError::PremiumRequired));
        }
    }

    #[tokio::test]
    async fn test_owner_sees_own_contact_and_missing_listing_is_not_found() {
        let fx = Fixture::new();
        let listing = fx.seed_offer(12_000.0, 30.0, fx.studio, 10);
        let gate = ContactGate::new(Arc::new(fx.store.clone()));

        assert!(gate.reveal(listing, fx.agent, &fx.cancel).await.is_ok());
        let err = gate
            .reveal(Uuid::new_v4(), fx.other_agent, &fx.cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
    }
}
