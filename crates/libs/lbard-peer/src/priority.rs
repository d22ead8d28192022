//! Intrinsic transmit priority.
//!
//! Higher is more urgent. Short personal-messaging bundles outrank bulk
//! content, and a bundle addressed to the peer outranks one that isn't.

pub const MESHMS_SERVICE_PREFIX: &str = "MeshMS";

const SMALL_BUNDLE_BONUS: i64 = 1_000_000;
const RECIPIENT_MATCH_BONUS: i64 = 500_000;
const MESHMS_BONUS: i64 = 2_000_000;

/// Larger bundles still matter, but length only ever breaks a tie between
/// two bundles that are otherwise equally urgent — it never overrides the
/// MeshMS/recipient-match bonuses above.
const LENGTH_PENALTY_DIVISOR: i64 = 1024;

pub fn compute_priority(length: u64, recipient_matches: bool, service: &str) -> i64 {
    let mut priority = 0i64;
    if service.starts_with(MESHMS_SERVICE_PREFIX) {
        priority += MESHMS_BONUS;
    }
    if recipient_matches {
        priority += RECIPIENT_MATCH_BONUS;
    }
    if length < 1024 {
        priority += SMALL_BUNDLE_BONUS;
    }
    priority - (length as i64 / LENGTH_PENALTY_DIVISOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meshms_outranks_plain_bulk_content() {
        let meshms = compute_priority(200, false, "MeshMS2");
        let bulk = compute_priority(200, false, "file");
        assert!(meshms > bulk);
    }

    #[test]
    fn recipient_match_adds_priority() {
        let matched = compute_priority(200, true, "file");
        let unmatched = compute_priority(200, false, "file");
        assert!(matched > unmatched);
    }

    #[test]
    fn small_bundle_outranks_large_one_of_same_service() {
        let small = compute_priority(100, false, "file");
        let large = compute_priority(10_000_000, false, "file");
        assert!(small > large);
    }
}
