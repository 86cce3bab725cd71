//! SeaORM entity models
//!
//! Database entities for the listing store and its reference catalog

pub mod listing;
pub mod listing_location;
pub mod listing_amenity;
pub mod listing_tag;
pub mod listing_bedroom;
pub mod listing_image;
pub mod archived_listing;
pub mod category;
pub mod bedroom_type;
pub mod amenity;
pub mod tag;
pub mod location;
pub mod agent_profile;

pub use listing::{
    Entity as ListingEntity,
    Model as ListingRow,
    ActiveModel as ListingActiveModel,
    Column as ListingColumn,
    CommissionMode,
    ListingKind,
};

pub use listing_location::{
    Entity as ListingLocationEntity,
    Model as ListingLocation,
    Column as ListingLocationColumn,
};

pub use listing_amenity::{
    Entity as ListingAmenityEntity,
    Model as ListingAmenity,
    Column as ListingAmenityColumn,
};

pub use listing_tag::{
    Entity as ListingTagEntity,
    Model as ListingTag,
    Column as ListingTagColumn,
};

pub use listing_bedroom::{
    Entity as ListingBedroomEntity,
    Model as ListingBedroom,
    Column as ListingBedroomColumn,
};

pub use listing_image::{
    Entity as ListingImageEntity,
    Model as ListingImage,
    Column as ListingImageColumn,
};

pub use archived_listing::{
    Entity as ArchivedListingEntity,
    Model as ArchivedListing,
    ActiveModel as ArchivedListingActiveModel,
    Column as ArchivedListingColumn,
};

pub use category::{
    Entity as CategoryEntity,
    Model as Category,
    Column as CategoryColumn,
};

pub use bedroom_type::{
    Entity as BedroomTypeEntity,
    Model as BedroomType,
    Column as BedroomTypeColumn,
};

pub use amenity::{
    Entity as AmenityEntity,
    Model as Amenity,
    Column as AmenityColumn,
};

pub use tag::{
    Entity as TagEntity,
    Model as Tag,
    Column as TagColumn,
};

pub use location::{
    Entity as LocationEntity,
    Model as Location,
    Column as LocationColumn,
    LocationKind,
};

pub use agent_profile::{
    Entity as AgentProfileEntity,
    Model as AgentProfile,
    Column as AgentProfileColumn,
};
