// src/health/mod.rs
mod aggregate;
mod status;

pub use aggregate::{
    Aggregator, GroupExtractor, GroupingMode, ListingPolicy, Snapshot, StateCounts, UNKNOWN_LABEL,
};
pub use status::{parse_listing, BackendRecord, HealthStatus, ListingLine, LISTING_HEADER_PREFIX};
