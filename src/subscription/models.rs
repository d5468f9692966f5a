//! Descriptor and probe data models

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Protocol enumeration for endpoint descriptors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    Vmess,
    Vless,
    Trojan,
    Shadowsocks,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Vmess => write!(f, "vmess"),
            Protocol::Vless => write!(f, "vless"),
            Protocol::Trojan => write!(f, "trojan"),
            Protocol::Shadowsocks => write!(f, "ss"),
        }
    }
}

/// A parsed endpoint descriptor from a subscription line.
///
/// Value type: two descriptors are equal only when every field matches.
/// `name` is the subscription remark; the aggregator overwrites it once with
/// the final display name and nothing mutates a descriptor after that.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Descriptor {
    pub protocol: Protocol,
    pub address: String,
    pub port: u16,
    /// User id for vmess/vless
    pub uuid: Option<String>,
    /// Password for trojan/shadowsocks
    pub password: Option<String>,
    /// Cipher method for shadowsocks
    pub method: Option<String>,
    /// vmess alterId, 0 for everything else
    pub alter_id: u32,
    /// Transport network (tcp, ws, grpc)
    pub network: String,
    pub tls: bool,
    pub sni: Option<String>,
    pub host: Option<String>,
    pub path: Option<String>,
    pub name: String,
}

impl Descriptor {
    /// Reconstruct the canonical subscription URI for this descriptor,
    /// preserving each scheme's encoding rules (vmess carries a base64 JSON
    /// payload, shadowsocks a base64 userinfo, vless/trojan a query string).
    pub fn to_uri(&self) -> String {
        match self.protocol {
            Protocol::Vmess => self.to_vmess_uri(),
            Protocol::Vless => self.to_query_uri("vless", self.uuid.as_deref().unwrap_or("")),
            Protocol::Trojan => self.to_query_uri("trojan", self.password.as_deref().unwrap_or("")),
            Protocol::Shadowsocks => self.to_shadowsocks_uri(),
        }
    }

    fn to_vmess_uri(&self) -> String {
        let payload = serde_json::json!({
            "v": "2",
            "ps": self.name,
            "add": self.address,
            "port": self.port.to_string(),
            "id": self.uuid.clone().unwrap_or_default(),
            "aid": self.alter_id.to_string(),
            "net": self.network,
            "type": "none",
            "host": self.host.clone().unwrap_or_default(),
            "path": self.path.clone().unwrap_or_default(),
            "tls": if self.tls { "tls" } else { "" },
            "sni": self.sni.clone().unwrap_or_default(),
        });
        format!("vmess://{}", STANDARD.encode(payload.to_string()))
    }

    fn to_query_uri(&self, scheme: &str, user: &str) -> String {
        let mut query: Vec<String> = Vec::new();
        if scheme == "vless" {
            query.push("encryption=none".to_string());
        }
        if self.tls {
            query.push("security=tls".to_string());
            if let Some(sni) = &self.sni {
                query.push(format!("sni={}", urlencoding::encode(sni)));
            }
        }
        query.push(format!("type={}", self.network));
        if let Some(host) = &self.host {
            query.push(format!("host={}", urlencoding::encode(host)));
        }
        if let Some(path) = &self.path {
            query.push(format!("path={}", urlencoding::encode(path)));
        }
        format!(
            "{}://{}@{}:{}?{}#{}",
            scheme,
            user,
            self.address,
            self.port,
            query.join("&"),
            urlencoding::encode(&self.name)
        )
    }

    fn to_shadowsocks_uri(&self) -> String {
        let userinfo = format!(
            "{}:{}",
            self.method.as_deref().unwrap_or(""),
            self.password.as_deref().unwrap_or("")
        );
        format!(
            "ss://{}@{}:{}#{}",
            URL_SAFE_NO_PAD.encode(userinfo),
            self.address,
            self.port,
            urlencoding::encode(&self.name)
        )
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.protocol, self.address, self.port)
    }
}

/// Probe verdict for one descriptor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProbeStatus {
    Working,
    Failed(String),
    Timeout,
}

/// Outcome of probing one descriptor, produced exactly once per unique
/// descriptor. `latency_ms` is meaningful only for `Working`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeReport {
    pub descriptor: Descriptor,
    pub status: ProbeStatus,
    pub latency_ms: Option<u64>,
}

impl ProbeReport {
    pub fn working(descriptor: Descriptor, latency_ms: u64) -> Self {
        Self {
            descriptor,
            status: ProbeStatus::Working,
            latency_ms: Some(latency_ms),
        }
    }

    pub fn failed(descriptor: Descriptor, error: String) -> Self {
        Self {
            descriptor,
            status: ProbeStatus::Failed(error),
            latency_ms: None,
        }
    }

    pub fn timeout(descriptor: Descriptor) -> Self {
        Self {
            descriptor,
            status: ProbeStatus::Timeout,
            latency_ms: None,
        }
    }

    pub fn is_working(&self) -> bool {
        matches!(self.status, ProbeStatus::Working)
    }

    /// Failure reason, if any
    pub fn error(&self) -> Option<&str> {
        match &self.status {
            ProbeStatus::Working => None,
            ProbeStatus::Failed(e) => Some(e.as_str()),
            ProbeStatus::Timeout => Some("timeout"),
        }
    }
}

/// Resolved country for a working endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryInfo {
    /// ISO 3166-1 alpha-2 code, or "XX" when resolution failed
    pub code: String,
    /// Flag glyph for display names
    pub flag: String,
}

impl CountryInfo {
    pub fn new(code: &str) -> Self {
        Self {
            code: code.to_ascii_uppercase(),
            flag: flag_for_code(code),
        }
    }

    /// Bucket for endpoints whose country could not be resolved
    pub fn unknown() -> Self {
        Self {
            code: "XX".to_string(),
            flag: "\u{1F3F3}".to_string(),
        }
    }
}

/// Map an ISO alpha-2 code to its regional-indicator flag glyph.
/// Anything outside A-Z falls back to the white flag.
pub fn flag_for_code(code: &str) -> String {
    let code = code.to_ascii_uppercase();
    if code.len() != 2 || !code.bytes().all(|b| b.is_ascii_uppercase()) {
        return "\u{1F3F3}".to_string();
    }
    code.chars()
        .filter_map(|c| char::from_u32(0x1F1E6 + (c as u32 - 'A' as u32)))
        .collect()
}

/// A working endpoint with its country, latency rank, and final display name
/// already written into the descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompiledProfile {
    pub descriptor: Descriptor,
    pub country: CountryInfo,
    /// 1-based, contiguous within the country group
    pub rank: u32,
}
