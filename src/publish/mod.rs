//! Artifact rendering and publication to the versioned remote store.

pub mod publisher;
pub mod render;
pub mod store;

pub use publisher::ArtifactPublisher;
pub use store::{GithubStore, RemoteStore, StoredFile};
