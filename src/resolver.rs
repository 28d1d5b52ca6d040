//! Map a reading onto one bucket of a grouped market by parsing bucket titles.
//!
//! Each [`BucketRule`] is an independent predicate + number extractor. Rules are
//! tried in [`BucketRule::ORDERED`] order per bucket with early return on the
//! first success; the first bucket (in catalog order) that matches wins.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::Bucket;

/// "20-30", "20 – 30", "20 to 30"
static RANGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d+)\s*(?:-|–|\bto\b)\s*(\d+)").expect("valid regex"));
static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketRule {
    /// `min <= value <= max`
    Range,
    /// "Under n" / "< n": `value < n`
    UpperBound,
    /// "Over n" / "Above n" / "> n": `value > n`
    LowerBound,
    /// "n°F or below": `value <= n`
    AtOrBelow,
    /// "n°F or higher": `value >= n`
    AtOrAbove,
}

impl BucketRule {
    pub const ORDERED: &'static [BucketRule] = &[
        BucketRule::Range,
        BucketRule::UpperBound,
        BucketRule::LowerBound,
        BucketRule::AtOrBelow,
        BucketRule::AtOrAbove,
    ];

    /// True if this rule recognises the title and the value falls inside it.
    /// A title the rule does not recognise, or one missing the number, is a miss.
    pub fn matches(self, title: &str, value: f64) -> bool {
        match self {
            BucketRule::Range => parse_range(title)
                .map(|(min, max)| value >= min && value <= max)
                .unwrap_or(false),
            BucketRule::UpperBound => {
                let lower = title.to_lowercase();
                (lower.contains("under") || title.contains('<'))
                    && first_number(title).map(|n| value < n).unwrap_or(false)
            }
            BucketRule::LowerBound => {
                let lower = title.to_lowercase();
                (lower.contains("over") || lower.contains("above") || title.contains('>'))
                    && first_number(title).map(|n| value > n).unwrap_or(false)
            }
            BucketRule::AtOrBelow => {
                let lower = title.to_lowercase();
                (lower.contains("or below") || lower.contains("or less") || title.contains('≤'))
                    && first_number(title).map(|n| value <= n).unwrap_or(false)
            }
            BucketRule::AtOrAbove => {
                let lower = title.to_lowercase();
                (lower.contains("or higher") || lower.contains("or more") || title.contains('≥'))
                    && first_number(title).map(|n| value >= n).unwrap_or(false)
            }
        }
    }

    /// First rule (in fixed order) that matches, if any.
    pub fn first_match(title: &str, value: f64) -> Option<BucketRule> {
        Self::ORDERED
            .iter()
            .copied()
            .find(|rule| rule.matches(title, value))
    }
}

fn parse_range(title: &str) -> Option<(f64, f64)> {
    let caps = RANGE.captures(title)?;
    let min = caps.get(1)?.as_str().parse::<i64>().ok()?;
    let max = caps.get(2)?.as_str().parse::<i64>().ok()?;
    Some((min as f64, max as f64))
}

fn first_number(title: &str) -> Option<f64> {
    NUMBER
        .captures(title)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<i64>().ok())
        .map(|n| n as f64)
}

/// Resolve `value` to the first bucket whose title matches. None is a normal outcome.
pub fn resolve(value: f64, buckets: &[Bucket]) -> Option<&Bucket> {
    if value.is_nan() {
        return None;
    }
    buckets.iter().find(|b| {
        let hit = BucketRule::first_match(&b.title, value);
        if let Some(rule) = hit {
            tracing::debug!(title = %b.title, ?rule, value, "bucket matched");
        }
        hit.is_some()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket(id: &str, title: &str) -> Bucket {
        Bucket {
            id: id.to_string(),
            title: title.to_string(),
            instrument_id: Some(format!("tok-{id}")),
        }
    }

    fn catalog() -> Vec<Bucket> {
        vec![
            bucket("0", "20-30"),
            bucket("1", "Under 20"),
            bucket("2", "Over 30"),
        ]
    }

    fn resolved_id(value: f64, buckets: &[Bucket]) -> Option<String> {
        resolve(value, buckets).map(|b| b.id.clone())
    }

    #[test]
    fn resolves_inside_range() {
        assert_eq!(resolved_id(25.0, &catalog()).as_deref(), Some("0"));
    }

    #[test]
    fn resolves_under_and_over() {
        assert_eq!(resolved_id(15.0, &catalog()).as_deref(), Some("1"));
        assert_eq!(resolved_id(35.0, &catalog()).as_deref(), Some("2"));
    }

    #[test]
    fn range_bounds_are_inclusive() {
        assert_eq!(resolved_id(20.0, &catalog()).as_deref(), Some("0"));
        // 30 belongs to the range, never to "Over 30"
        assert_eq!(resolved_id(30.0, &catalog()).as_deref(), Some("0"));
    }

    #[test]
    fn fractional_values_between_integer_ranges() {
        let buckets = vec![bucket("a", "34-35°F"), bucket("b", "36-37°F")];
        assert_eq!(resolved_id(35.0, &buckets).as_deref(), Some("a"));
        assert_eq!(resolved_id(35.5, &buckets), None);
    }

    #[test]
    fn unrecognised_titles_are_skipped() {
        let buckets = vec![bucket("r", "Rainy")];
        assert_eq!(resolved_id(10.0, &buckets), None);
        assert_eq!(resolved_id(-5.0, &buckets), None);
    }

    #[test]
    fn keyword_without_number_is_a_miss() {
        assert!(!BucketRule::UpperBound.matches("Under par", 1.0));
        assert!(!BucketRule::LowerBound.matches("Over the top", 100.0));
    }

    #[test]
    fn range_accepts_to_and_en_dash() {
        assert!(BucketRule::Range.matches("20 to 30", 22.0));
        assert!(BucketRule::Range.matches("20 – 30", 30.0));
        assert!(BucketRule::Range.matches("Between 40-45°F", 41.0));
        assert!(!BucketRule::Range.matches("20 to 30", 31.0));
    }

    #[test]
    fn bound_rules_are_case_insensitive_and_accept_symbols() {
        assert!(BucketRule::UpperBound.matches("UNDER 20", 19.9));
        assert!(BucketRule::UpperBound.matches("< 20", 19.0));
        assert!(!BucketRule::UpperBound.matches("under 20", 20.0));
        assert!(BucketRule::LowerBound.matches("Above 90", 91.0));
        assert!(BucketRule::LowerBound.matches("> 90", 90.5));
        assert!(!BucketRule::LowerBound.matches("over 90", 90.0));
    }

    #[test]
    fn inclusive_tail_buckets() {
        let buckets = vec![
            bucket("lo", "33°F or below"),
            bucket("mid", "34-35°F"),
            bucket("hi", "36°F or higher"),
        ];
        assert_eq!(resolved_id(33.0, &buckets).as_deref(), Some("lo"));
        assert_eq!(resolved_id(20.0, &buckets).as_deref(), Some("lo"));
        assert_eq!(resolved_id(36.0, &buckets).as_deref(), Some("hi"));
        assert_eq!(resolved_id(34.0, &buckets).as_deref(), Some("mid"));
    }

    #[test]
    fn tail_bucket_does_not_shadow_earlier_range() {
        let buckets = vec![bucket("mid", "30-33°F"), bucket("lo", "33°F or below")];
        assert_eq!(resolved_id(33.0, &buckets).as_deref(), Some("mid"));
        assert_eq!(resolved_id(29.0, &buckets).as_deref(), Some("lo"));
        assert!(BucketRule::AtOrBelow.matches("33°F OR LESS", 33.0));
        assert!(BucketRule::AtOrAbove.matches("≥ 36", 36.0));
        assert!(!BucketRule::AtOrAbove.matches("36°F or more", 35.9));
    }

    #[test]
    fn range_is_checked_before_over_in_same_title() {
        // Range matches textually and numerically: Range wins.
        assert_eq!(
            BucketRule::first_match("20-30 or over", 25.0),
            Some(BucketRule::Range)
        );
        // Range fails numerically; the independent "over" check still runs.
        assert_eq!(
            BucketRule::first_match("20-30 or over", 31.0),
            Some(BucketRule::LowerBound)
        );
    }

    #[test]
    fn first_matching_bucket_wins() {
        let buckets = vec![bucket("x", "Over 10"), bucket("y", "20-30")];
        assert_eq!(resolved_id(25.0, &buckets).as_deref(), Some("x"));
    }

    #[test]
    fn nan_never_resolves() {
        assert_eq!(resolved_id(f64::NAN, &catalog()), None);
    }
}
