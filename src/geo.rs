//! Geolocation resolver seam
//!
//! Maps an endpoint address to a country code and flag glyph. The resolver
//! is an external HTTP service; it is called at most once per working
//! endpoint and its failures are handled by the aggregation stage, never
//! silently dropped.

use crate::config::Config;
use crate::subscription::models::CountryInfo;
use crate::Result;
use anyhow::{bail, Context};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

#[async_trait]
pub trait GeoResolver: Send + Sync {
    async fn resolve(&self, address: &str) -> Result<CountryInfo>;
}

#[derive(Debug, Deserialize)]
struct GeoResponse {
    #[serde(rename = "countryCode")]
    country_code: Option<String>,
}

/// Resolver backed by an ip-api style JSON endpoint
pub struct HttpGeoResolver {
    client: Client,
    endpoint: String,
}

impl HttpGeoResolver {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.download_timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint: config.geo_endpoint.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl GeoResolver for HttpGeoResolver {
    async fn resolve(&self, address: &str) -> Result<CountryInfo> {
        let url = format!("{}/{}?fields=countryCode", self.endpoint, address);
        let response: GeoResponse = self
            .client
            .get(&url)
            .send()
            .await
            .context("geolocation request failed")?
            .error_for_status()?
            .json()
            .await
            .context("geolocation response was not valid JSON")?;

        match response.country_code {
            Some(code) if !code.is_empty() => Ok(CountryInfo::new(&code)),
            _ => bail!("geolocation response carried no country code for {address}"),
        }
    }
}
