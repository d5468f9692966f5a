//! Artifact rendering
//!
//! Two artifacts are produced per run: a plain-text list of profile URIs and
//! a sing-box client configuration. The structured document uses explicit
//! serializable types matching the client schema, not free-form maps.

use crate::subscription::models::{CompiledProfile, Protocol};
use crate::Result;
use serde::Serialize;
use std::collections::BTreeMap;

/// Tag of the manual selector outbound
pub const SELECTOR_TAG: &str = "select";
/// Tag of the latency-based auto outbound
pub const URLTEST_TAG: &str = "auto";

/// Plain-text artifact: one reconstructed profile URI per line, in
/// aggregator order.
pub fn plain_artifact(profiles: &[CompiledProfile]) -> String {
    let mut out = profiles
        .iter()
        .map(|p| p.descriptor.to_uri())
        .collect::<Vec<_>>()
        .join("\n");
    out.push('\n');
    out
}

/// Structured artifact: a sing-box configuration with one outbound per
/// profile plus the selector and urltest meta-outbounds, wired as the
/// default egress route.
pub fn singbox_artifact(profiles: &[CompiledProfile], test_url: &str) -> Result<String> {
    let tags: Vec<String> = profiles
        .iter()
        .map(|p| p.descriptor.name.clone())
        .collect();

    let mut outbounds: Vec<Outbound> = profiles.iter().map(Outbound::from_profile).collect();
    outbounds.push(Outbound::selector(&tags));
    outbounds.push(Outbound::urltest(&tags, test_url));

    let document = SingBoxConfig {
        log: LogSection {
            level: "info".to_string(),
            timestamp: true,
        },
        outbounds,
        route: RouteSection {
            auto_detect_interface: true,
            final_outbound: SELECTOR_TAG.to_string(),
        },
    };
    Ok(serde_json::to_string_pretty(&document)?)
}

#[derive(Debug, Serialize)]
struct SingBoxConfig {
    log: LogSection,
    outbounds: Vec<Outbound>,
    route: RouteSection,
}

#[derive(Debug, Serialize)]
struct LogSection {
    level: String,
    timestamp: bool,
}

#[derive(Debug, Serialize)]
struct RouteSection {
    auto_detect_interface: bool,
    #[serde(rename = "final")]
    final_outbound: String,
}

#[derive(Debug, Serialize)]
struct Outbound {
    #[serde(rename = "type")]
    kind: String,
    tag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    server: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    server_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    alter_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    security: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tls: Option<TlsOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    transport: Option<TransportOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    outbounds: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    default: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    interval: Option<String>,
}

#[derive(Debug, Serialize)]
struct TlsOptions {
    enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    server_name: Option<String>,
}

#[derive(Debug, Serialize)]
struct TransportOptions {
    #[serde(rename = "type")]
    kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    service_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    headers: Option<BTreeMap<String, String>>,
}

impl Outbound {
    fn empty(kind: &str, tag: String) -> Self {
        Self {
            kind: kind.to_string(),
            tag,
            server: None,
            server_port: None,
            uuid: None,
            alter_id: None,
            security: None,
            password: None,
            method: None,
            tls: None,
            transport: None,
            outbounds: None,
            default: None,
            url: None,
            interval: None,
        }
    }

    fn from_profile(profile: &CompiledProfile) -> Self {
        let descriptor = &profile.descriptor;
        let kind = match descriptor.protocol {
            Protocol::Vmess => "vmess",
            Protocol::Vless => "vless",
            Protocol::Trojan => "trojan",
            Protocol::Shadowsocks => "shadowsocks",
        };
        let mut outbound = Outbound::empty(kind, descriptor.name.clone());
        outbound.server = Some(descriptor.address.clone());
        outbound.server_port = Some(descriptor.port);

        match descriptor.protocol {
            Protocol::Vmess => {
                outbound.uuid = descriptor.uuid.clone();
                outbound.alter_id = Some(descriptor.alter_id);
                outbound.security = Some("auto".to_string());
            }
            Protocol::Vless => {
                outbound.uuid = descriptor.uuid.clone();
            }
            Protocol::Trojan => {
                outbound.password = descriptor.password.clone();
            }
            Protocol::Shadowsocks => {
                outbound.password = descriptor.password.clone();
                outbound.method = descriptor.method.clone();
            }
        }

        if descriptor.tls {
            outbound.tls = Some(TlsOptions {
                enabled: true,
                server_name: descriptor.sni.clone().or_else(|| descriptor.host.clone()),
            });
        }
        outbound.transport = transport_options(descriptor);
        outbound
    }

    fn selector(tags: &[String]) -> Self {
        let mut members = vec![URLTEST_TAG.to_string()];
        members.extend(tags.iter().cloned());
        let mut outbound = Outbound::empty("selector", SELECTOR_TAG.to_string());
        outbound.outbounds = Some(members);
        outbound.default = Some(URLTEST_TAG.to_string());
        outbound
    }

    fn urltest(tags: &[String], test_url: &str) -> Self {
        let mut outbound = Outbound::empty("urltest", URLTEST_TAG.to_string());
        outbound.outbounds = Some(tags.to_vec());
        outbound.url = Some(test_url.to_string());
        outbound.interval = Some("10m".to_string());
        outbound
    }
}

fn transport_options(descriptor: &crate::subscription::models::Descriptor) -> Option<TransportOptions> {
    match descriptor.network.as_str() {
        "ws" => {
            let headers = descriptor.host.as_ref().map(|host| {
                BTreeMap::from([("Host".to_string(), host.clone())])
            });
            Some(TransportOptions {
                kind: "ws".to_string(),
                path: descriptor.path.clone(),
                service_name: None,
                headers,
            })
        }
        "grpc" => Some(TransportOptions {
            kind: "grpc".to_string(),
            path: None,
            service_name: descriptor.path.clone(),
            headers: None,
        }),
        _ => None,
    }
}
