//! Integrity string helpers.
//!
//! npm writes `sha512-<base64>` (possibly several, space separated), yarn
//! berry writes a bare hex `checksum`. Both end up in one [`Hashes`] map.

use std::collections::BTreeMap;

/// Checksum algorithm to digest.
pub type Hashes = BTreeMap<String, String>;

const KNOWN_ALGORITHMS: [&str; 5] = ["sha512", "sha256", "sha1", "md5", "checksum"];

/// Parse an integrity string into a hash map.
///
/// A token without `-` is a bare checksum. Unknown algorithms are dropped.
#[must_use]
pub fn parse_integrity(integrity: Option<&str>) -> Hashes {
    let mut hashes = Hashes::new();
    let Some(integrity) = integrity else {
        return hashes;
    };

    for item in integrity.split_whitespace() {
        match item.split_once('-') {
            Some((alg, digest)) if KNOWN_ALGORITHMS.contains(&alg) => {
                hashes.insert(alg.to_string(), digest.to_string());
            }
            Some(_) => {}
            None => {
                hashes.insert("checksum".to_string(), item.to_string());
            }
        }
    }

    hashes
}

/// Format hashes back into an integrity string.
///
/// A bare `checksum` wins over algorithm-tagged digests. Returns `None` for
/// an empty map.
#[must_use]
pub fn format_integrity(hashes: &Hashes) -> Option<String> {
    if let Some(checksum) = hashes.get("checksum") {
        return Some(checksum.clone());
    }
    if hashes.is_empty() {
        return None;
    }

    // Strongest first, matching what npm writes
    let mut out: Vec<String> = Vec::new();
    for alg in ["sha512", "sha256", "sha1", "md5"] {
        if let Some(digest) = hashes.get(alg) {
            out.push(format!("{alg}-{digest}"));
        }
    }
    Some(out.join(" "))
}
