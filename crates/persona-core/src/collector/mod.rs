//! Collectors - one per data source.
//!
//! # Two layers
//! - **Typed**: `CollectorPayload`, `Collector<P>` - payload type fixed per source
//! - **Dyn**: `DynCollector` - object-safe, stored in `CollectorRegistry`

pub mod handler;
pub mod http;
pub mod payload;
pub mod registry;

pub use self::handler::{Collector, DynCollector, FnCollector, TypedCollector};
pub use self::http::{PageCollector, SocialSearchCollector};
pub use self::payload::{
    CollectorPayload, CompetitorPayload, ReviewsPayload, SocialPayload, WebsitePayload,
    payload_for,
};
pub use self::registry::{CollectorRegistry, RegistryError};
