//! Parser for Tor network-status consensus documents.

use std::collections::HashMap;

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};

/// Consensus identities are unpadded base64; accept padded input too.
const IDENTITY: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Extracts `fingerprint -> Bandwidth` from a consensus document.
///
/// Each `r` line carries the relay identity in its third field; the next `w`
/// line carries `Bandwidth=<int>`. A `w` line pairs with at most one `r` line,
/// and entries with an undecodable identity or bandwidth are skipped.
pub fn parse_consensus(text: &str) -> HashMap<String, u64> {
    let mut readings = HashMap::new();
    let mut current: Option<String> = None;

    for line in text.lines() {
        if let Some(rest) = line.strip_prefix("r ") {
            current = rest.split_whitespace().nth(1).and_then(identity_to_fingerprint);
        } else if let Some(rest) = line.strip_prefix("w ") {
            if let Some(fingerprint) = current.take() {
                if let Some(bandwidth) = bandwidth_field(rest) {
                    readings.insert(fingerprint, bandwidth);
                }
            }
        }
    }

    readings
}

/// Converts a base64 relay identity into an uppercase hex fingerprint.
pub fn identity_to_fingerprint(identity: &str) -> Option<String> {
    let raw = IDENTITY.decode(identity).ok()?;
    Some(raw.iter().map(|b| format!("{b:02X}")).collect())
}

fn bandwidth_field(fields: &str) -> Option<u64> {
    fields
        .split_whitespace()
        .find_map(|f| f.strip_prefix("Bandwidth="))
        .and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
network-status-version 3
valid-after 2024-01-01 00:00:00
r relayA AAECAwQFBgcICQoLDA0ODxAREhM dGVzdA 2024-01-01 00:00:00 10.0.0.1 9001 0
s Fast Running Stable Valid
w Bandwidth=1200 Measured=1100
r relayB //79/Pv6+fj39vX08/Lx8O/u7e0 dGVzdA 2024-01-01 00:00:00 10.0.0.2 9001 0
s Running Valid
w Bandwidth=30
";

    #[test]
    fn test_parse_sample_consensus() {
        let readings = parse_consensus(SAMPLE);

        assert_eq!(readings.len(), 2);
        assert_eq!(
            readings.get("000102030405060708090A0B0C0D0E0F10111213"),
            Some(&1200)
        );
        assert_eq!(
            readings.get("FFFEFDFCFBFAF9F8F7F6F5F4F3F2F1F0EFEEEDED"),
            Some(&30)
        );
    }

    #[test]
    fn test_w_line_pairs_with_one_r_line() {
        let text = "\
r relayA AAECAwQFBgcICQoLDA0ODxAREhM x
w Bandwidth=5
w Bandwidth=9
";
        let readings = parse_consensus(text);
        assert_eq!(readings.values().copied().collect::<Vec<_>>(), vec![5]);
    }

    #[test]
    fn test_malformed_entries_are_skipped() {
        let text = "\
r relayA !!!notbase64!!! x
w Bandwidth=5
r relayB AAECAwQFBgcICQoLDA0ODxAREhM x
w Bandwidth=lots
r
w Bandwidth=7
";
        assert!(parse_consensus(text).is_empty());
    }

    #[test]
    fn test_padded_identity() {
        assert_eq!(
            identity_to_fingerprint("AAECAwQFBgcICQoLDA0ODxAREhM="),
            identity_to_fingerprint("AAECAwQFBgcICQoLDA0ODxAREhM")
        );
    }

    #[test]
    fn test_empty_document() {
        assert!(parse_consensus("").is_empty());
    }
}
