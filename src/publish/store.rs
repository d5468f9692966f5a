//! Versioned remote store
//!
//! Contract: read a path's content and revision marker, create a new file,
//! or update an existing one carrying the marker so the store can detect a
//! concurrent modification. The GitHub contents API is the production
//! implementation; the trait keeps the publisher testable without it.

use crate::config::Config;
use crate::subscription::decoder::decode_base64_forgiving;
use crate::Result;
use anyhow::{bail, Context};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

/// Stored content plus its revision marker
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub content: String,
    pub sha: String,
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// `Ok(None)` means the path does not exist yet, a normal condition on
    /// first publish.
    async fn get(&self, path: &str) -> Result<Option<StoredFile>>;
    async fn create(&self, path: &str, content: &str, message: &str) -> Result<()>;
    async fn update(&self, path: &str, content: &str, sha: &str, message: &str) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    sha: String,
    #[serde(default)]
    content: String,
}

/// GitHub contents-API store
pub struct GithubStore {
    client: Client,
    api_base: String,
    owner: String,
    repo: String,
    branch: String,
    token: String,
}

impl GithubStore {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("subfresh/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let store = &config.store;
        Ok(Self {
            client,
            api_base: store.api_base.trim_end_matches('/').to_string(),
            owner: store.owner.clone(),
            repo: store.repo.clone(),
            branch: store.branch.clone(),
            token: store.token.clone(),
        })
    }

    fn contents_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.api_base, self.owner, self.repo, path
        )
    }

    async fn put(&self, path: &str, body: serde_json::Value) -> Result<()> {
        let response = self
            .client
            .put(self.contents_url(path))
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .json(&body)
            .send()
            .await
            .context("remote store write request failed")?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            bail!("remote store write for {path} returned {status}: {detail}");
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for GithubStore {
    async fn get(&self, path: &str) -> Result<Option<StoredFile>> {
        let response = self
            .client
            .get(self.contents_url(path))
            .query(&[("ref", self.branch.as_str())])
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .context("remote store read request failed")?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            bail!("remote store read for {path} returned {}", response.status());
        }

        let body: ContentsResponse = response
            .json()
            .await
            .context("remote store read returned an unreadable body")?;
        // The API wraps base64 content across lines
        let compact: String = body.content.chars().filter(|c| !c.is_whitespace()).collect();
        let content = match decode_base64_forgiving(&compact) {
            Some(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            None => String::new(),
        };
        Ok(Some(StoredFile {
            content,
            sha: body.sha,
        }))
    }

    async fn create(&self, path: &str, content: &str, message: &str) -> Result<()> {
        let body = serde_json::json!({
            "message": message,
            "content": STANDARD.encode(content),
            "branch": self.branch,
        });
        self.put(path, body).await
    }

    async fn update(&self, path: &str, content: &str, sha: &str, message: &str) -> Result<()> {
        let body = serde_json::json!({
            "message": message,
            "content": STANDARD.encode(content),
            "branch": self.branch,
            "sha": sha,
        });
        self.put(path, body).await
    }
}
