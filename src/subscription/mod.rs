//! Subscription collection: fetching sources, decoding descriptor lines,
//! and collapsing the result into a unique set.

pub mod decoder;
pub mod dedup;
pub mod fetcher;
pub mod models;

pub use decoder::ProfileDecoder;
pub use dedup::Deduplicator;
pub use fetcher::{FetchOutcome, SourceFetcher};
pub use models::{CompiledProfile, CountryInfo, Descriptor, ProbeReport, ProbeStatus, Protocol};
