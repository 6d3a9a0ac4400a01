//! Content hashing used for config fingerprints and derived filenames.

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of `input`.
pub(crate) fn sha256_hex(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Short hex fingerprint for filenames derived from paths or configs.
pub(crate) fn short_hash(input: &str) -> String {
    let mut full = sha256_hex(input);
    full.truncate(16);
    full
}

#[cfg(test)]
mod tests {
    use super::{sha256_hex, short_hash};
    use pretty_assertions::assert_eq;

    #[test]
    fn sha256_hex_is_deterministic() {
        assert_eq!(sha256_hex("berth"), sha256_hex("berth"));
        assert_eq!(sha256_hex("berth").len(), 64);
    }

    #[test]
    fn short_hash_truncates_to_sixteen() {
        let short = short_hash("/tmp/ws/data");
        assert_eq!(short.len(), 16);
        assert_eq!(sha256_hex("/tmp/ws/data").starts_with(&short), true);
    }
}
