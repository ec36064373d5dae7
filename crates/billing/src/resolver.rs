//! Membership resolution
//!
//! Pure mapping from a provider-reported subscription status plus the tier
//! the product asked for into the tier the profile should hold. The policy
//! is identical for both providers and is kept as one transition table so
//! the grace-period behavior stays auditable.

use craftpass_shared::MembershipTier;

/// Resolve the target membership tier for a raw provider status.
///
/// - `active` / `trialing`: the requested tier passes through.
/// - `cancelled` / `canceled`: the subscription is cancelled but paid
///   through the current period, so the requested tier is held until an
///   explicit expiry event arrives.
/// - Everything else, including statuses we have never seen, resolves to
///   free.
pub fn resolve(raw_status: &str, requested: MembershipTier) -> MembershipTier {
    match raw_status.trim().to_ascii_lowercase().as_str() {
        "active" | "trialing" => requested,
        // Grace period: the provider reports cancelled while the billed
        // period is still running. Expiry demotes later.
        "cancelled" | "canceled" => requested,
        _ => MembershipTier::Free,
    }
}

/// Classify a product/variant display name or metadata value into a tier.
///
/// Exact matches on "pro"/"free" cover structured metadata values; the
/// substring match covers human-readable names like "Pro Monthly".
pub fn tier_from_classifier(classifier: &str) -> MembershipTier {
    let lowered = classifier.trim().to_ascii_lowercase();
    match lowered.as_str() {
        "pro" => MembershipTier::Pro,
        "free" => MembershipTier::Free,
        _ if lowered.contains("pro") => MembershipTier::Pro,
        _ => MembershipTier::Free,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use craftpass_shared::MembershipTier::{Free, Pro};

    #[test]
    fn active_and_trialing_pass_through() {
        for status in ["active", "trialing", "ACTIVE", " trialing "] {
            assert_eq!(resolve(status, Pro), Pro, "status {status:?}");
            assert_eq!(resolve(status, Free), Free, "status {status:?}");
        }
    }

    #[test]
    fn cancelled_holds_tier_until_expiry() {
        assert_eq!(resolve("cancelled", Pro), Pro);
        assert_eq!(resolve("canceled", Pro), Pro);
        assert_eq!(resolve("cancelled", Free), Free);
    }

    #[test]
    fn lapsed_statuses_resolve_free_for_every_tier() {
        for status in [
            "expired",
            "paused",
            "past_due",
            "unpaid",
            "incomplete",
            "incomplete_expired",
            "unknown-garbage",
            "",
        ] {
            assert_eq!(resolve(status, Pro), Free, "status {status:?}");
            assert_eq!(resolve(status, Free), Free, "status {status:?}");
        }
    }

    #[test]
    fn resolve_is_deterministic() {
        assert_eq!(resolve("active", Pro), resolve("active", Pro));
    }

    #[test]
    fn classifier_exact_metadata_values() {
        assert_eq!(tier_from_classifier("pro"), Pro);
        assert_eq!(tier_from_classifier("free"), Free);
    }

    #[test]
    fn classifier_display_name_substring() {
        assert_eq!(tier_from_classifier("Pro Monthly"), Pro);
        assert_eq!(tier_from_classifier("Craftpass PRO (yearly)"), Pro);
        assert_eq!(tier_from_classifier("Starter"), Free);
        assert_eq!(tier_from_classifier("10 Credits"), Free);
    }
}
