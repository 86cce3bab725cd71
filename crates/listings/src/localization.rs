//! Display-name resolution for reference entities
//!
//! Stored data is canonical (English names, ids). Everything shown to a
//! user goes through `display_name`.

use baanboard_common::db::models::{Amenity, BedroomType, Category, Location, Tag};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Supported UI languages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Th,
}

impl Language {
    /// Parse a language tag. `th`, `th-TH` and friends are Thai; anything
    /// else falls back to English.
    pub fn parse(tag: &str) -> Self {
        let primary = tag.split(['-', '_']).next().unwrap_or_default();
        if primary.eq_ignore_ascii_case("th") {
            Language::Th
        } else {
            Language::En
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Th => "th",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A catalog row with a canonical name and an optional Thai name
pub trait ReferenceEntity {
    fn id(&self) -> Uuid;

    /// Canonical (English) name
    fn name(&self) -> &str;

    fn display_name_th(&self) -> Option<&str>;
}

/// Thai name when `language` is Thai and one is set, else the canonical name
pub fn display_name<E: ReferenceEntity + ?Sized>(entity: &E, language: Language) -> &str {
    match (language, entity.display_name_th()) {
        (Language::Th, Some(th)) if !th.trim().is_empty() => th,
        _ => entity.name(),
    }
}

macro_rules! reference_entity {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl ReferenceEntity for $ty {
                fn id(&self) -> Uuid {
                    self.id
                }

                fn name(&self) -> &str {
                    &self.name
                }

                fn display_name_th(&self) -> Option<&str> {
                    self.display_name_th.as_deref()
                }
            }
        )+
    };
}

reference_entity!(Category, BedroomType, Amenity, Tag, Location);
