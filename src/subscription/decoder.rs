//! Subscription text decoding
//!
//! Turns raw subscription text into descriptors, one line at a time.
//! Whole-content base64 is tried first since most published subscriptions
//! wrap their line list that way; plain text is the fallback. Malformed
//! lines are dropped, never propagated.

use crate::subscription::models::{Descriptor, Protocol};
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use once_cell::sync::Lazy;
use serde::Deserialize;
use tracing::debug;
use url::Url;

/// Padding-tolerant engines: third-party feeds are inconsistent about both
/// alphabet and padding.
static B64_STANDARD: Lazy<GeneralPurpose> = Lazy::new(|| {
    GeneralPurpose::new(
        &alphabet::STANDARD,
        GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
    )
});

static B64_URL_SAFE: Lazy<GeneralPurpose> = Lazy::new(|| {
    GeneralPurpose::new(
        &alphabet::URL_SAFE,
        GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
    )
});

/// Decoder for raw subscription payloads
pub struct ProfileDecoder;

impl ProfileDecoder {
    /// Decode a subscription blob into descriptors. `source` is used for
    /// diagnostics only; the function is otherwise pure.
    pub fn decode(raw: &str, source: &str) -> Vec<Descriptor> {
        let text = decode_base64_text(raw).unwrap_or_else(|| raw.to_string());

        text.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter_map(|line| match Self::parse_line(line) {
                Some(descriptor) => Some(descriptor),
                None => {
                    debug!(source, line, "dropped unparseable subscription line");
                    None
                }
            })
            .collect()
    }

    /// Parse one subscription line by URI scheme
    pub fn parse_line(line: &str) -> Option<Descriptor> {
        let (scheme, _) = line.split_once("://")?;
        match scheme {
            "vmess" => parse_vmess(line),
            "vless" => parse_query_scheme(line, Protocol::Vless),
            "trojan" => parse_query_scheme(line, Protocol::Trojan),
            "ss" => parse_shadowsocks(line),
            _ => None,
        }
    }
}

/// Try to interpret an entire blob as base64-wrapped UTF-8 text.
/// Returns None when it is not; the caller falls back to plain text.
pub fn decode_base64_text(raw: &str) -> Option<String> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return None;
    }
    let bytes = decode_base64_forgiving(&compact)?;
    String::from_utf8(bytes).ok()
}

/// Base64 decode accepting either alphabet and any padding
pub fn decode_base64_forgiving(input: &str) -> Option<Vec<u8>> {
    B64_STANDARD
        .decode(input)
        .or_else(|_| B64_URL_SAFE.decode(input))
        .ok()
}

/// vmess links carry a base64 JSON payload; field types are loose in the
/// wild (ports show up as both numbers and strings).
#[derive(Debug, Deserialize)]
struct VmessPayload {
    #[serde(default)]
    ps: String,
    add: String,
    port: serde_json::Value,
    id: String,
    #[serde(default)]
    aid: serde_json::Value,
    #[serde(default)]
    net: String,
    #[serde(default)]
    host: String,
    #[serde(default)]
    path: String,
    #[serde(default)]
    tls: String,
    #[serde(default)]
    sni: String,
}

fn parse_vmess(line: &str) -> Option<Descriptor> {
    let payload = line.strip_prefix("vmess://")?;
    let bytes = decode_base64_forgiving(payload.trim())?;
    let text = String::from_utf8(bytes).ok()?;
    let raw: VmessPayload = serde_json::from_str(&text).ok()?;

    let port = loose_number(&raw.port)?.parse::<u16>().ok()?;
    let alter_id = loose_number(&raw.aid)
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(0);

    Some(Descriptor {
        protocol: Protocol::Vmess,
        address: raw.add,
        port,
        uuid: Some(raw.id),
        password: None,
        method: None,
        alter_id,
        network: default_network(&raw.net),
        tls: raw.tls == "tls",
        sni: non_empty(raw.sni),
        host: non_empty(raw.host),
        path: non_empty(raw.path),
        name: raw.ps,
    })
}

fn parse_query_scheme(line: &str, protocol: Protocol) -> Option<Descriptor> {
    let url = Url::parse(line).ok()?;
    let user = url.username();
    if user.is_empty() {
        return None;
    }
    let address = url.host_str()?.to_string();
    let port = url.port()?;

    let mut security = String::new();
    let mut sni = None;
    let mut network = String::new();
    let mut host = None;
    let mut path = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "security" => security = value.into_owned(),
            "sni" => sni = non_empty(value.into_owned()),
            "type" => network = value.into_owned(),
            "host" => host = non_empty(value.into_owned()),
            "path" => path = non_empty(value.into_owned()),
            _ => {}
        }
    }

    // Trojan endpoints are TLS unless the link says otherwise.
    let tls = match security.as_str() {
        "tls" | "reality" => true,
        "" => protocol == Protocol::Trojan,
        _ => false,
    };

    let name = url
        .fragment()
        .and_then(|f| urlencoding::decode(f).ok())
        .map(|f| f.into_owned())
        .unwrap_or_default();

    let (uuid, password) = match protocol {
        Protocol::Vless => (Some(user.to_string()), None),
        _ => (None, Some(user.to_string())),
    };

    Some(Descriptor {
        protocol,
        address,
        port,
        uuid,
        password,
        method: None,
        alter_id: 0,
        network: default_network(&network),
        tls,
        sni,
        host,
        path,
        name,
    })
}

/// Both SIP002 shapes: `ss://b64(method:pass)@host:port#name` and the older
/// fully-wrapped `ss://b64(method:pass@host:port)#name`.
fn parse_shadowsocks(line: &str) -> Option<Descriptor> {
    let rest = line.strip_prefix("ss://")?;
    let (body, fragment) = match rest.split_once('#') {
        Some((body, fragment)) => (body, fragment),
        None => (rest, ""),
    };
    let name = urlencoding::decode(fragment)
        .map(|f| f.into_owned())
        .unwrap_or_default();

    let (credentials, endpoint) = match body.rsplit_once('@') {
        Some((userinfo, endpoint)) => {
            let decoded = decode_base64_forgiving(userinfo)
                .and_then(|bytes| String::from_utf8(bytes).ok())
                .unwrap_or_else(|| userinfo.to_string());
            (decoded, endpoint.to_string())
        }
        None => {
            let decoded = String::from_utf8(decode_base64_forgiving(body)?).ok()?;
            let (credentials, endpoint) = decoded.rsplit_once('@')?;
            (credentials.to_string(), endpoint.to_string())
        }
    };

    let (method, password) = credentials.split_once(':')?;
    let (address, port) = endpoint.rsplit_once(':')?;
    let port = port.parse::<u16>().ok()?;

    Some(Descriptor {
        protocol: Protocol::Shadowsocks,
        address: address.to_string(),
        port,
        uuid: None,
        password: Some(password.to_string()),
        method: Some(method.to_string()),
        alter_id: 0,
        network: "tcp".to_string(),
        tls: false,
        sni: None,
        host: None,
        path: None,
        name,
    })
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn default_network(value: &str) -> String {
    if value.is_empty() {
        "tcp".to_string()
    } else {
        value.to_string()
    }
}

/// Accept JSON numbers and numeric strings interchangeably
fn loose_number(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
