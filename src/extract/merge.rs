//! Merge and deduplicate the outputs of the pattern and AI extractors.
//!
//! First accepted wins: a later near-duplicate is dropped even when it is
//! longer or more detailed. The pattern pass runs first by convention, so
//! its higher-precision facts take precedence over AI rephrasings.

use super::MemoryCandidate;

/// Combine two candidate lists into one deduplicated list. Output order is
/// the primary list followed by surviving secondary items, both in their
/// original order.
pub fn merge(primary: Vec<MemoryCandidate>, secondary: Vec<MemoryCandidate>) -> Vec<MemoryCandidate> {
    let mut accepted: Vec<String> = Vec::new();
    let mut out: Vec<MemoryCandidate> = Vec::new();

    for candidate in primary.into_iter().chain(secondary) {
        let norm = normalize(&candidate.content);
        if norm.is_empty() || is_duplicate(&norm, &accepted) {
            continue;
        }
        accepted.push(norm);
        out.push(candidate);
    }
    out
}

fn normalize(content: &str) -> String {
    content.trim().to_lowercase()
}

/// Exact match or bidirectional substring containment against every
/// already-accepted content string. O(n·m), fine at import-batch scale.
fn is_duplicate(norm: &str, accepted: &[String]) -> bool {
    accepted
        .iter()
        .any(|a| a == norm || a.contains(norm) || norm.contains(a.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MemoryType;

    fn cand(content: &str) -> MemoryCandidate {
        MemoryCandidate::new(content, MemoryType::Fact, 0.8)
    }

    #[test]
    fn exact_case_insensitive_duplicates_collapse() {
        let a = vec![cand("User's name is Alex")];
        let b = vec![cand("user's name is alex")];
        let merged = merge(a, b);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].content, "User's name is Alex");
    }

    #[test]
    fn substring_containment_drops_later_item_both_directions() {
        // later item is longer
        let merged = merge(
            vec![cand("User lives in Berlin")],
            vec![cand("User lives in Berlin near the river")],
        );
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].content, "User lives in Berlin");

        // later item is shorter
        let merged = merge(
            vec![cand("User lives in Berlin near the river")],
            vec![cand("User lives in Berlin")],
        );
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].content, "User lives in Berlin near the river");
    }

    #[test]
    fn order_is_primary_then_accepted_secondary() {
        let merged = merge(
            vec![cand("fact one about cats"), cand("fact two about dogs")],
            vec![cand("fact three about birds"), cand("fact one about cats")],
        );
        let contents: Vec<&str> = merged.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(
            contents,
            vec![
                "fact one about cats",
                "fact two about dogs",
                "fact three about birds"
            ]
        );
    }

    #[test]
    fn unrelated_items_all_survive() {
        let merged = merge(
            vec![cand("User plays the violin")],
            vec![cand("User hates mornings"), cand("User owns a cat")],
        );
        assert_eq!(merged.len(), 3);
    }

    proptest::proptest! {
        /// For any pair of lists, no accepted content is a case-insensitive
        /// duplicate (or substring) of another accepted content.
        #[test]
        fn merged_output_is_containment_free(
            a in proptest::collection::vec("[A-Za-z ]{1,30}", 0..8),
            b in proptest::collection::vec("[A-Za-z ]{1,30}", 0..8),
        ) {
            let primary: Vec<_> = a.iter().map(|s| cand(s)).collect();
            let secondary: Vec<_> = b.iter().map(|s| cand(s)).collect();
            let merged = merge(primary, secondary);
            let norms: Vec<String> = merged.iter().map(|m| normalize(&m.content)).collect();
            for (i, x) in norms.iter().enumerate() {
                for (j, y) in norms.iter().enumerate() {
                    if i != j {
                        proptest::prop_assert!(!x.contains(y.as_str()));
                    }
                }
            }
        }
    }
}
