//! Artifact publication
//!
//! Publishing is best-effort per run: each artifact reads its current
//! revision marker, then issues a create (no marker) or an update (carrying
//! the marker). Any failure is logged and confined to that artifact.

use crate::config::Config;
use crate::publish::render;
use crate::publish::store::RemoteStore;
use crate::subscription::models::CompiledProfile;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

pub struct ArtifactPublisher {
    store: Arc<dyn RemoteStore>,
    plain_path: String,
    singbox_path: String,
    test_url: String,
}

impl ArtifactPublisher {
    pub fn new(config: &Config, store: Arc<dyn RemoteStore>) -> Self {
        Self {
            store,
            plain_path: config.plain_artifact_path.clone(),
            singbox_path: config.singbox_artifact_path.clone(),
            test_url: config.test_url.clone(),
        }
    }

    /// Render and publish both artifacts. Returns how many were written.
    pub async fn publish_all(&self, profiles: &[CompiledProfile]) -> usize {
        let message = format!(
            "Refresh subscriptions: {} profiles at {}",
            profiles.len(),
            Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
        );

        let mut published = 0;

        let plain = render::plain_artifact(profiles);
        if self.publish_artifact(&self.plain_path, &plain, &message).await {
            published += 1;
        }

        match render::singbox_artifact(profiles, &self.test_url) {
            Ok(singbox) => {
                if self
                    .publish_artifact(&self.singbox_path, &singbox, &message)
                    .await
                {
                    published += 1;
                }
            }
            Err(error) => {
                warn!(%error, "structured artifact could not be rendered");
            }
        }

        published
    }

    /// Create-or-update one artifact path. Returns false when any store call
    /// failed; the sibling artifact is unaffected either way.
    async fn publish_artifact(&self, path: &str, content: &str, message: &str) -> bool {
        let existing = match self.store.get(path).await {
            Ok(existing) => existing,
            Err(error) => {
                warn!(path, %error, "revision lookup failed, skipping this artifact");
                return false;
            }
        };

        let result = match &existing {
            Some(file) => self.store.update(path, content, &file.sha, message).await,
            None => self.store.create(path, content, message).await,
        };

        match result {
            Ok(()) => {
                info!(
                    path,
                    created = existing.is_none(),
                    bytes = content.len(),
                    "artifact published"
                );
                true
            }
            Err(error) => {
                warn!(path, %error, "artifact publish failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publish::store::StoredFile;
    use crate::subscription::models::{CountryInfo, Descriptor, Protocol};
    use crate::Result;
    use anyhow::bail;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Get(String),
        Create(String),
        Update(String, String),
    }

    /// In-memory store that records every call and can fail reads or writes
    struct RecordingStore {
        calls: Mutex<Vec<Call>>,
        files: Mutex<HashMap<String, StoredFile>>,
        failing_reads: Vec<String>,
        failing_writes: bool,
    }

    impl RecordingStore {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                files: Mutex::new(HashMap::new()),
                failing_reads: Vec::new(),
                failing_writes: false,
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RemoteStore for RecordingStore {
        async fn get(&self, path: &str) -> Result<Option<StoredFile>> {
            self.calls.lock().unwrap().push(Call::Get(path.to_string()));
            if self.failing_reads.iter().any(|p| p == path) {
                bail!("injected read failure");
            }
            Ok(self.files.lock().unwrap().get(path).cloned())
        }

        async fn create(&self, path: &str, content: &str, _message: &str) -> Result<()> {
            self.calls.lock().unwrap().push(Call::Create(path.to_string()));
            if self.failing_writes {
                bail!("injected write failure");
            }
            self.files.lock().unwrap().insert(
                path.to_string(),
                StoredFile {
                    content: content.to_string(),
                    sha: format!("sha-of-{path}-v1"),
                },
            );
            Ok(())
        }

        async fn update(&self, path: &str, content: &str, sha: &str, _message: &str) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Update(path.to_string(), sha.to_string()));
            if self.failing_writes {
                bail!("injected write failure");
            }
            let mut files = self.files.lock().unwrap();
            let current = files.get(path).cloned();
            match current {
                Some(file) if file.sha == sha => {
                    files.insert(
                        path.to_string(),
                        StoredFile {
                            content: content.to_string(),
                            sha: format!("{sha}+"),
                        },
                    );
                    Ok(())
                }
                _ => bail!("stale revision marker"),
            }
        }
    }

    fn profiles() -> Vec<CompiledProfile> {
        vec![CompiledProfile {
            descriptor: Descriptor {
                protocol: Protocol::Trojan,
                address: "1.1.1.1".to_string(),
                port: 443,
                uuid: None,
                password: Some("pw".to_string()),
                method: None,
                alter_id: 0,
                network: "tcp".to_string(),
                tls: true,
                sni: None,
                host: None,
                path: None,
                name: "US-01".to_string(),
            },
            country: CountryInfo::new("US"),
            rank: 1,
        }]
    }

    fn publisher_with(store: Arc<RecordingStore>) -> ArtifactPublisher {
        ArtifactPublisher::new(&Config::for_tests(), store)
    }

    #[tokio::test]
    async fn test_first_publish_creates_never_updates() {
        let store = Arc::new(RecordingStore::new());
        let publisher = publisher_with(store.clone());

        let published = publisher.publish_all(&profiles()).await;
        assert_eq!(published, 2);

        let calls = store.calls();
        assert!(calls.iter().any(|c| matches!(c, Call::Create(p) if p == "subs/plain.txt")));
        assert!(calls.iter().any(|c| matches!(c, Call::Create(p) if p == "subs/singbox.json")));
        assert!(!calls.iter().any(|c| matches!(c, Call::Update(_, _))));
    }

    #[tokio::test]
    async fn test_second_publish_updates_with_fresh_marker() {
        let store = Arc::new(RecordingStore::new());
        let publisher = publisher_with(store.clone());

        publisher.publish_all(&profiles()).await;
        let published = publisher.publish_all(&profiles()).await;
        assert_eq!(published, 2);

        let calls = store.calls();
        let updates: Vec<_> = calls
            .iter()
            .filter_map(|c| match c {
                Call::Update(path, sha) => Some((path.clone(), sha.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(updates.len(), 2);
        // The marker is the one obtained from the read just before
        assert!(updates
            .iter()
            .any(|(path, sha)| path == "subs/plain.txt" && sha == "sha-of-subs/plain.txt-v1"));
    }

    #[tokio::test]
    async fn test_read_failure_skips_only_that_artifact() {
        let mut store = RecordingStore::new();
        store.failing_reads = vec!["subs/plain.txt".to_string()];
        let store = Arc::new(store);
        let publisher = publisher_with(store.clone());

        let published = publisher.publish_all(&profiles()).await;
        assert_eq!(published, 1);

        let calls = store.calls();
        assert!(!calls.iter().any(|c| matches!(c, Call::Create(p) if p == "subs/plain.txt")));
        assert!(calls.iter().any(|c| matches!(c, Call::Create(p) if p == "subs/singbox.json")));
    }

    #[tokio::test]
    async fn test_write_failure_is_swallowed() {
        let mut store = RecordingStore::new();
        store.failing_writes = true;
        let store = Arc::new(store);
        let publisher = publisher_with(store.clone());

        // Both creates fail; publish_all reports zero but does not error
        let published = publisher.publish_all(&profiles()).await;
        assert_eq!(published, 0);
        assert_eq!(
            store
                .calls()
                .iter()
                .filter(|c| matches!(c, Call::Create(_)))
                .count(),
            2
        );
    }
}
