//! Result aggregation
//!
//! Resolves a country for every working endpoint, groups by country code,
//! ranks each group by latency, and writes the final display names. An
//! endpoint whose country cannot be resolved lands in the unknown bucket;
//! it is never dropped, since its probe already succeeded.

use crate::geo::GeoResolver;
use crate::subscription::models::{CompiledProfile, CountryInfo, ProbeReport};
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Lookups are cheap HTTP calls; a modest fixed bound is enough.
const GEO_CONCURRENCY: usize = 8;

pub struct ResultAggregator {
    resolver: Arc<dyn GeoResolver>,
}

impl ResultAggregator {
    pub fn new(resolver: Arc<dyn GeoResolver>) -> Self {
        Self { resolver }
    }

    /// Compile working probe reports into ranked, named profiles.
    /// Groups are emitted in country-code order; within a group the order is
    /// ascending latency with ranks 1..=n.
    pub async fn compile(&self, reports: Vec<ProbeReport>) -> Vec<CompiledProfile> {
        let located: Vec<(ProbeReport, CountryInfo)> = stream::iter(reports)
            .map(|report| {
                let resolver = Arc::clone(&self.resolver);
                async move {
                    let country = match resolver.resolve(&report.descriptor.address).await {
                        Ok(country) => country,
                        Err(error) => {
                            warn!(
                                endpoint = %report.descriptor,
                                %error,
                                "geolocation failed, using unknown bucket"
                            );
                            CountryInfo::unknown()
                        }
                    };
                    (report, country)
                }
            })
            .buffer_unordered(GEO_CONCURRENCY)
            .collect()
            .await;

        let mut groups: BTreeMap<String, Vec<(ProbeReport, CountryInfo)>> = BTreeMap::new();
        for (report, country) in located {
            groups.entry(country.code.clone()).or_default().push((report, country));
        }

        let mut profiles = Vec::new();
        for (code, mut members) in groups {
            members.sort_by_key(|(report, _)| report.latency_ms.unwrap_or(u64::MAX));
            debug!(country = %code, count = members.len(), "ranked country group");
            for (index, (report, country)) in members.into_iter().enumerate() {
                let rank = index as u32 + 1;
                let mut descriptor = report.descriptor;
                descriptor.name = format!("{} {}-{:02}", country.flag, country.code, rank);
                profiles.push(CompiledProfile {
                    descriptor,
                    country,
                    rank,
                });
            }
        }
        profiles
    }
}
