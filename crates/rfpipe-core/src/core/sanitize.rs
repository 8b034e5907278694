//! Normalization of user-supplied stage arguments.
//!
//! Both fields end up inside the structure-generation command line, so neither
//! function ever passes user text through verbatim: tokens are matched against a
//! strict grammar and rebuilt from their captured parts. Invalid tokens are dropped
//! without error.

use regex::Regex;
use std::sync::LazyLock;

/// Upper bound on the number of residues a single hotspot range may expand to.
pub const MAX_HOTSPOT_SPAN: u64 = 10_000;

static LOOP_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(H1|H2|H3|L1|L2|L3)(:(\d+)(-(\d+))?)?$").expect("static loop pattern")
});

static HOTSPOT_SINGLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z])(\d+)$").expect("static hotspot pattern"));

static HOTSPOT_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z])(\d+)-([A-Za-z])?(\d+)$").expect("static hotspot range pattern")
});

fn strip_whitespace(token: &str) -> String {
    token.chars().filter(|c| !c.is_whitespace()).collect()
}

fn tokens(input: &str) -> impl Iterator<Item = String> + '_ {
    input
        .split(',')
        .map(strip_whitespace)
        .filter(|token| !token.is_empty())
}

/// Parses a design-loop specifier such as `"H3:5-10, L1"`.
///
/// Returns a bracketed, comma-separated list of the valid tokens in input order, or
/// an empty string when no token is valid, which tells the caller to omit the
/// argument entirely.
pub fn design_loops(input: &str) -> String {
    let valid: Vec<String> = tokens(input)
        .filter_map(|token| {
            let caps = LOOP_TOKEN.captures(&token)?;
            let mut rebuilt = caps[1].to_string();
            if let Some(start) = caps.get(3) {
                rebuilt.push(':');
                rebuilt.push_str(start.as_str());
                if let Some(end) = caps.get(5) {
                    rebuilt.push('-');
                    rebuilt.push_str(end.as_str());
                }
            }
            Some(rebuilt)
        })
        .collect();

    if valid.is_empty() {
        String::new()
    } else {
        format!("[{}]", valid.join(","))
    }
}

/// Parses a hotspot specifier such as `"A10-A12, B5"`.
///
/// Single residues keep their index text; ranges expand to every index in the
/// inclusive span regardless of endpoint order. A range whose endpoints name
/// different chains contributes nothing. Chain letters are uppercased. The result
/// is always bracketed, `"[]"` when nothing is valid.
pub fn hotspots(input: &str) -> String {
    let mut expanded: Vec<String> = Vec::new();

    for token in tokens(input) {
        if let Some(caps) = HOTSPOT_RANGE.captures(&token) {
            let chain = caps[1].to_ascii_uppercase();
            let end_chain = caps
                .get(3)
                .map_or_else(|| chain.clone(), |m| m.as_str().to_ascii_uppercase());
            if chain != end_chain {
                continue;
            }
            let (Ok(a), Ok(b)) = (caps[2].parse::<u64>(), caps[4].parse::<u64>()) else {
                continue;
            };
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            if hi - lo >= MAX_HOTSPOT_SPAN {
                continue;
            }
            expanded.extend((lo..=hi).map(|idx| format!("{chain}{idx}")));
        } else if let Some(caps) = HOTSPOT_SINGLE.captures(&token) {
            expanded.push(format!("{}{}", caps[1].to_ascii_uppercase(), &caps[2]));
        }
    }

    format!("[{}]", expanded.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn design_loops_keeps_valid_tokens_in_order() {
        assert_eq!(design_loops("H3:5-10"), "[H3:5-10]");
        assert_eq!(design_loops("L1, H3:7, H2"), "[L1,H3:7,H2]");
    }

    #[test]
    fn design_loops_strips_internal_whitespace() {
        assert_eq!(design_loops(" H 3 : 5 - 10 ,L2"), "[H3:5-10,L2]");
    }

    #[test]
    fn design_loops_returns_empty_string_when_nothing_is_valid() {
        assert_eq!(design_loops(""), "");
        assert_eq!(design_loops("   "), "");
        assert_eq!(design_loops("H4,X1:3"), "");
        assert_eq!(design_loops("H3;rm -rf /"), "");
    }

    #[test]
    fn design_loops_drops_invalid_tokens_from_mixed_input() {
        assert_eq!(design_loops("H1,bogus,L3:2-4,H3:"), "[H1,L3:2-4]");
    }

    #[test]
    fn design_loops_is_case_sensitive() {
        assert_eq!(design_loops("h3"), "");
    }

    #[test]
    fn hotspots_expands_same_chain_range() {
        assert_eq!(hotspots("A10-A12"), "[A10,A11,A12]");
    }

    #[test]
    fn hotspots_accepts_single_residue() {
        assert_eq!(hotspots("A5"), "[A5]");
        assert_eq!(hotspots("b7"), "[B7]");
    }

    #[test]
    fn hotspots_drops_mismatched_chain_range() {
        assert_eq!(hotspots("A10-B12"), "[]");
        assert_eq!(hotspots("A10-B12,C3"), "[C3]");
    }

    #[test]
    fn hotspots_range_chain_match_is_case_insensitive() {
        assert_eq!(hotspots("a1-A2"), "[A1,A2]");
    }

    #[test]
    fn hotspots_range_without_second_chain_uses_first() {
        assert_eq!(hotspots("T3-5"), "[T3,T4,T5]");
    }

    #[test]
    fn hotspots_range_is_order_independent() {
        assert_eq!(hotspots("A12-A10"), "[A10,A11,A12]");
    }

    #[test]
    fn hotspots_returns_empty_list_for_empty_or_invalid_input() {
        assert_eq!(hotspots(""), "[]");
        assert_eq!(hotspots("   "), "[]");
        assert_eq!(hotspots("10A,$(reboot),A-B"), "[]");
    }

    #[test]
    fn hotspots_drops_oversized_ranges() {
        assert_eq!(hotspots("A1-A999999"), "[]");
        assert_eq!(hotspots("A1-A99999999999999999999999"), "[]");
    }

    #[test]
    fn hotspots_combines_tokens_in_order() {
        assert_eq!(hotspots("A1, B2-B3 ,C9"), "[A1,B2,B3,C9]");
    }
}
