//! View-ready listing records
//!
//! Pairs a listing with localized names for every reference it points at
//! and a short summary of the owning agent.

use crate::catalog::{CatalogSnapshot, RefTable};
use crate::model::Listing;
use baanboard_common::db::models::{AgentProfile, ListingRow};
use baanboard_common::db::{AttachmentMap, ListingStore};
use baanboard_common::errors::Result;
use serde::Serialize;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use uuid::Uuid;

/// Shown when a listing's agent has no profile
pub const UNKNOWN_AGENT_NAME: &str = "Unknown Agent";

/// Avatar used when an agent has not uploaded one
pub fn default_avatar_url(agent_id: Uuid) -> String {
    format!("https://api.dicebear.com/7.x/avataaars/svg?seed={}", agent_id)
}

/// A referenced catalog entry with its localized name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefName {
    pub id: Uuid,
    pub name: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentSummary {
    pub id: Uuid,
    pub name: String,
    pub avatar_url: String,
}

impl AgentSummary {
    pub fn from_profile(agent_id: Uuid, profile: Option<&AgentProfile>) -> Self {
        match profile {
            Some(p) => Self {
                id: agent_id,
                name: p.name.clone(),
                avatar_url: p
                    .avatar_url
                    .clone()
                    .filter(|url| !url.trim().is_empty())
                    .unwrap_or_else(|| default_avatar_url(agent_id)),
            },
            None => Self {
                id: agent_id,
                name: UNKNOWN_AGENT_NAME.to_string(),
                avatar_url: default_avatar_url(agent_id),
            },
        }
    }
}

/// Listing plus everything needed to render it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListingView {
    #[serde(flatten)]
    pub listing: Listing,
    pub category: Option<RefName>,
    pub locations: Vec<RefName>,
    pub amenities: Vec<RefName>,
    pub tags: Vec<RefName>,
    pub bedrooms: Vec<RefName>,
    pub agent: AgentSummary,
}

fn names(catalog: &CatalogSnapshot, table: RefTable, ids: &[Uuid]) -> Vec<RefName> {
    ids.iter().filter_map(|id| ref_name(catalog, table, *id)).collect()
}

fn ref_name(catalog: &CatalogSnapshot, table: RefTable, id: Uuid) -> Option<RefName> {
    let name = catalog.canonical_name(table, id)?;
    let display_name = catalog.display_name(table, id)?;
    Some(RefName {
        id,
        name: name.to_string(),
        display_name: display_name.to_string(),
    })
}

impl ListingView {
    pub fn new(listing: Listing, catalog: &CatalogSnapshot, agent: Option<&AgentProfile>) -> Self {
        let f = &listing.fields;
        let category = ref_name(catalog, RefTable::Categories, f.category_id);
        let locations = names(catalog, RefTable::Locations, &f.location_ids);
        let amenities = names(catalog, RefTable::Amenities, &f.amenity_ids);
        let tags = names(catalog, RefTable::Tags, &f.tag_ids);
        let bedrooms = names(catalog, RefTable::BedroomTypes, &f.details.bedroom_ids());
        let agent = AgentSummary::from_profile(listing.agent_id, agent);

        Self {
            listing,
            category,
            locations,
            amenities,
            tags,
            bedrooms,
            agent,
        }
    }
}

/// Turn base rows into views: attachments and agent profiles are loaded in
/// one round each. Rows whose stored shape is invalid are skipped and logged.
pub async fn assemble_views(
    store: &dyn ListingStore,
    rows: Vec<ListingRow>,
    catalog: &CatalogSnapshot,
    cancel: &CancellationToken,
) -> Result<Vec<ListingView>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    let mut agent_ids: Vec<Uuid> = rows.iter().map(|r| r.agent_id).collect();
    agent_ids.sort();
    agent_ids.dedup();

    let (mut attachments, profiles): (AttachmentMap, Vec<AgentProfile>) = tokio::try_join!(
        store.load_attachments(&ids, cancel),
        store.agent_profiles(&agent_ids, cancel),
    )?;
    let profiles: HashMap<Uuid, AgentProfile> = profiles.into_iter().map(|p| (p.id, p)).collect();

    let mut views = Vec::with_capacity(rows.len());
    for row in rows {
        let id = row.id;
        let attached = attachments.remove(&id).unwrap_or_default();
        match Listing::from_row(row, attached) {
            Ok(listing) => {
                let agent = profiles.get(&listing.agent_id);
                views.push(ListingView::new(listing, catalog, agent));
            }
            Err(e) => warn!(listing_id = %id, error = %e, "Skipping malformed listing"),
        }
    }
    Ok(views)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_summary_defaults() {
        let agent_id = Uuid::new_v4();
        let missing = AgentSummary::from_profile(agent_id, None);
        assert_eq!(missing.name, UNKNOWN_AGENT_NAME);
        assert!(missing.avatar_url.ends_with(&agent_id.to_string()));

        let profile = AgentProfile {
            id: agent_id,
            phone: "+66800000000".into(),
            name: "Nok".into(),
            line_id: None,
            avatar_url: Some(String::new()),
            premium_until: None,
            premium_trial_used: false,
        };
        let summary = AgentSummary::from_profile(agent_id, Some(&profile));
        assert_eq!(summary.name, "Nok");
        assert_eq!(summary.avatar_url, default_avatar_url(agent_id));
    }
}
