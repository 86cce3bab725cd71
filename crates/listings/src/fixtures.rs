//! Shared test fixture: a seeded in-memory store and the services over it

use crate::catalog::ReferenceCatalog;
use crate::filter::FilterEngine;
use crate::model::{
    Commission, Listing, ListingDetails, ListingDraft, ListingExtras, ListingFields, NumericRange,
};
use crate::mutation::ListingMutationService;
use baanboard_common::db::models::{
    AgentProfile, Amenity, BedroomType, Category, CommissionMode, Location, Tag,
};
use baanboard_common::config::ListingsConfig;
use baanboard_common::db::{ListingAttachments, MemoryStore};
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub const PLACEHOLDER: &str = "https://img.test/placeholder.jpg";

pub struct Fixture {
    pub store: MemoryStore,
    pub catalog: ReferenceCatalog,
    pub cancel: CancellationToken,

    pub condo: Uuid,
    pub house: Uuid,
    pub studio: Uuid,
    pub one_bed: Uuid,
    pub two_bed: Uuid,
    pub pool: Uuid,
    pub gym: Uuid,
    pub pet_friendly: Uuid,
    pub sukhumvit: Uuid,
    pub silom: Uuid,
    pub thonglor: Uuid,

    pub agent: Uuid,
    pub other_agent: Uuid,
}

fn location(id: Uuid, name: &str, th: &str, kind: &str) -> Location {
    Location {
        id,
        name: name.into(),
        display_name_th: Some(th.into()),
        kind: kind.into(),
        parent_id: None,
    }
}

impl Fixture {
    pub fn new() -> Self {
        let store = MemoryStore::new();
        let ids: Vec<Uuid> = (0..13).map(|_| Uuid::new_v4()).collect();
        let fx = Self {
            catalog: ReferenceCatalog::with_ttl(Arc::new(store.clone()), Duration::from_secs(3600)),
            store,
            cancel: CancellationToken::new(),
            condo: ids[0],
            house: ids[1],
            studio: ids[2],
            one_bed: ids[3],
            two_bed: ids[4],
            pool: ids[5],
            gym: ids[6],
            pet_friendly: ids[7],
            sukhumvit: ids[8],
            silom: ids[9],
            thonglor: ids[10],
            agent: ids[11],
            other_agent: ids[12],
        };

        fx.store.seed_categories([
            Category {
                id: fx.house,
                name: "house".into(),
                display_name_th: Some("บ้าน".into()),
                display_order: 2,
            },
            Category {
                id: fx.condo,
                name: "condo".into(),
                display_name_th: Some("คอนโด".into()),
                display_order: 1,
            },
        ]);
        fx.store.seed_bedroom_types([
            BedroomType { id: fx.two_bed, name: "2_bedrooms".into(), display_name_th: Some("2 ห้องนอน".into()) },
            BedroomType { id: fx.studio, name: "studio".into(), display_name_th: Some("สตูดิโอ".into()) },
            BedroomType { id: fx.one_bed, name: "1_bedroom".into(), display_name_th: None },
        ]);
        fx.store.seed_amenities([
            Amenity { id: fx.pool, name: "pool".into(), display_name_th: Some("สระว่ายน้ำ".into()) },
            Amenity { id: fx.gym, name: "gym".into(), display_name_th: Some("ฟิตเนส".into()) },
        ]);
        fx.store.seed_tags([Tag {
            id: fx.pet_friendly,
            name: "pet_friendly".into(),
            display_name_th: Some("เลี้ยงสัตว์ได้".into()),
        }]);
        fx.store.seed_locations([
            location(fx.thonglor, "Thonglor", "ทองหล่อ", "bts"),
            location(fx.sukhumvit, "Sukhumvit", "สุขุมวิท", "area"),
            location(fx.silom, "Silom", "สีลม", "area"),
        ]);
        fx.store.seed_agent(AgentProfile {
            id: fx.agent,
            phone: "+66811111111".into(),
            name: "Ploy".into(),
            line_id: Some("ploy.agent".into()),
            avatar_url: None,
            premium_until: None,
            premium_trial_used: false,
        });
        fx.store.seed_agent(AgentProfile {
            id: fx.other_agent,
            phone: "+66822222222".into(),
            name: "Beam".into(),
            line_id: None,
            avatar_url: Some("https://img.test/beam.png".into()),
            premium_until: Some((Utc::now() + ChronoDuration::days(30)).into()),
            premium_trial_used: true,
        });

        fx
    }

    pub fn engine(&self) -> FilterEngine {
        FilterEngine::new(
            Arc::new(self.store.clone()),
            self.catalog.clone(),
            &ListingsConfig::default(),
        )
    }

    pub fn mutations(&self) -> ListingMutationService {
        ListingMutationService::new(
            Arc::new(self.store.clone()),
            self.catalog.clone(),
            PLACEHOLDER.to_string(),
        )
    }

    /// Offer in Sukhumvit: 15,000 THB, 35 sqm, studio, condo
    pub fn offer_draft(&self) -> ListingDraft {
        ListingDraft {
            category_id: Some(self.condo),
            title: "Cozy studio near BTS".into(),
            description: "Fully furnished".into(),
            location_ids: vec![self.sukhumvit],
            amenity_ids: vec![self.pool],
            tag_ids: vec![],
            bathroom_count: 1,
            commission: Some(Commission {
                mode: CommissionMode::Percentage,
                value: 50.0,
            }),
            images: vec![],
            price: Some(15_000.0),
            area: Some(35.0),
            bedroom_id: Some(self.studio),
            ..Default::default()
        }
    }

    /// Request for Silom: up to 30,000 THB, 1 or 2 bedrooms
    pub fn request_draft(&self) -> ListingDraft {
        ListingDraft {
            category_id: Some(self.condo),
            title: "Family looking for 2BR".into(),
            description: String::new(),
            location_ids: vec![self.silom],
            amenity_ids: vec![],
            tag_ids: vec![self.pet_friendly],
            bathroom_count: 2,
            commission: Some(Commission {
                mode: CommissionMode::Fixed,
                value: 10_000.0,
            }),
            images: vec![],
            price_range: Some(NumericRange::new(Some(20_000.0), Some(30_000.0))),
            area_range: Some(NumericRange::new(Some(50.0), None)),
            bedroom_ids: Some(vec![self.one_bed, self.two_bed]),
            ..Default::default()
        }
    }

    /// Insert a listing directly into the store, created `age_secs` ago
    pub fn seed(
        &self,
        agent_id: Uuid,
        details: ListingDetails,
        location_ids: Vec<Uuid>,
        age_secs: i64,
    ) -> Uuid {
        let created = Utc::now() - ChronoDuration::seconds(age_secs);
        let listing = Listing {
            id: Uuid::new_v4(),
            agent_id,
            fields: ListingFields {
                category_id: self.condo,
                title: "Seeded listing".into(),
                description: String::new(),
                location_ids: location_ids.clone(),
                amenity_ids: vec![],
                tag_ids: vec![],
                bathroom_count: 1,
                commission: Commission {
                    mode: CommissionMode::Percentage,
                    value: 50.0,
                },
                images: vec![PLACEHOLDER.to_string()],
                details: details.clone(),
                extras: ListingExtras::default(),
            },
            created_at: created,
            updated_at: created,
        };
        let bedroom_ids = match details {
            ListingDetails::Offer { .. } => vec![],
            ListingDetails::Request { bedroom_ids, .. } => bedroom_ids,
        };
        self.store.seed_listing(
            listing.to_row(),
            ListingAttachments {
                location_ids,
                bedroom_ids,
                images: vec![PLACEHOLDER.to_string()],
                ..Default::default()
            },
        );
        listing.id
    }

    pub fn seed_offer(&self, price: f64, area: f64, bedroom_id: Uuid, age_secs: i64) -> Uuid {
        self.seed(
            self.agent,
            ListingDetails::Offer {
                price,
                area,
                bedroom_id,
            },
            vec![self.sukhumvit],
            age_secs,
        )
    }

    pub fn seed_request(
        &self,
        price_range: NumericRange,
        bedroom_ids: Vec<Uuid>,
        age_secs: i64,
    ) -> Uuid {
        self.seed(
            self.agent,
            ListingDetails::Request {
                price_range,
                area_range: NumericRange::default(),
                bedroom_ids,
            },
            vec![self.silom],
            age_secs,
        )
    }
}
