//! Descriptor deduplication

use crate::subscription::models::Descriptor;
use std::collections::HashSet;

/// Collapses the combined fetch output into a unique set using full-value
/// equality. First-seen order is kept so runs are deterministic; nothing
/// downstream depends on it beyond that.
pub struct Deduplicator;

impl Deduplicator {
    pub fn dedupe(descriptors: Vec<Descriptor>) -> Vec<Descriptor> {
        let mut seen = HashSet::new();
        descriptors
            .into_iter()
            .filter(|descriptor| seen.insert(descriptor.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription::models::Protocol;

    fn descriptor(address: &str, port: u16) -> Descriptor {
        Descriptor {
            protocol: Protocol::Trojan,
            address: address.to_string(),
            port,
            uuid: None,
            password: Some("pw".to_string()),
            method: None,
            alter_id: 0,
            network: "tcp".to_string(),
            tls: true,
            sni: None,
            host: None,
            path: None,
            name: "node".to_string(),
        }
    }

    #[test]
    fn test_duplicates_collapse_to_one() {
        let input = vec![
            descriptor("1.1.1.1", 443),
            descriptor("1.1.1.1", 443),
            descriptor("1.1.1.1", 443),
        ];
        assert_eq!(Deduplicator::dedupe(input).len(), 1);
    }

    #[test]
    fn test_dedupe_is_idempotent() {
        let input = vec![
            descriptor("1.1.1.1", 443),
            descriptor("2.2.2.2", 443),
            descriptor("1.1.1.1", 443),
        ];
        let once = Deduplicator::dedupe(input);
        let twice = Deduplicator::dedupe(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_field_difference_survives() {
        let mut renamed = descriptor("1.1.1.1", 443);
        renamed.name = "other".to_string();
        let unique = Deduplicator::dedupe(vec![descriptor("1.1.1.1", 443), renamed]);
        assert_eq!(unique.len(), 2);
    }

    #[test]
    fn test_cross_source_duplicate() {
        // 3 + 2 descriptors with one exact duplicate across sources
        let source_a = vec![
            descriptor("1.1.1.1", 443),
            descriptor("2.2.2.2", 443),
            descriptor("3.3.3.3", 443),
        ];
        let source_b = vec![descriptor("2.2.2.2", 443), descriptor("4.4.4.4", 443)];
        let combined: Vec<_> = source_a.into_iter().chain(source_b).collect();
        assert_eq!(Deduplicator::dedupe(combined).len(), 4);
    }
}
