//! Authenticity sticker ranges and the yield arithmetic built on them.
//!
//! Serials are kept as the decimal strings the operator scanned. Leading zeros
//! are significant, so parsing only happens when a span has to be computed.

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// One contiguous span of scanned sticker serials
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticityRange {
    #[serde(default, deserialize_with = "lenient_string")]
    pub first_authenticity: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub last_authenticity: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub roll_number: String,
}

/// Why a range was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    #[error("authenticity range is empty")]
    Empty,
    #[error("authenticity value '{0}' is not numeric")]
    NonNumeric(String),
    #[error("last authenticity {last} is lower than first {first}")]
    NegativeDifference { first: String, last: String },
    #[error("first and last authenticity are both {0}")]
    ZeroDifference(String),
    #[error("range spans {span} stickers, more than the allowed {ceiling}")]
    ExceedsCeiling { span: u64, ceiling: u64 },
}

/// A range that failed validation, with its position in the input
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RangeIssue {
    pub index: usize,
    pub reason: String,
}

/// Yield total plus the ranges that could not be counted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct YieldReport {
    pub total: u64,
    pub issues: Vec<RangeIssue>,
}

impl AuthenticityRange {
    pub fn new(first: impl Into<String>, last: impl Into<String>, roll: impl Into<String>) -> Self {
        Self {
            first_authenticity: first.into(),
            last_authenticity: last.into(),
            roll_number: roll.into(),
        }
    }

    /// True when neither end of the range was filled in
    pub fn is_blank(&self) -> bool {
        self.first_authenticity.trim().is_empty() && self.last_authenticity.trim().is_empty()
    }

    fn trimmed(&self) -> Self {
        Self {
            first_authenticity: self.first_authenticity.trim().to_string(),
            last_authenticity: self.last_authenticity.trim().to_string(),
            roll_number: self.roll_number.trim().to_string(),
        }
    }

    /// Number of stickers consumed, `last - first`.
    pub fn span(&self) -> Result<u64, RangeError> {
        let first_raw = self.first_authenticity.trim();
        let last_raw = self.last_authenticity.trim();
        if first_raw.is_empty() || last_raw.is_empty() {
            return Err(RangeError::Empty);
        }
        let first = parse_serial(first_raw)?;
        let last = parse_serial(last_raw)?;
        if last < first {
            return Err(RangeError::NegativeDifference {
                first: first_raw.to_string(),
                last: last_raw.to_string(),
            });
        }
        Ok(last - first)
    }
}

fn parse_serial(raw: &str) -> Result<u64, RangeError> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RangeError::NonNumeric(raw.to_string()));
    }
    raw.parse::<u64>()
        .map_err(|_| RangeError::NonNumeric(raw.to_string()))
}

/// Full policy check for one range. Returns the span when valid.
pub fn validate_range(range: &AuthenticityRange, ceiling: u64) -> Result<u64, RangeError> {
    let span = range.span()?;
    if span == 0 {
        return Err(RangeError::ZeroDifference(
            range.first_authenticity.trim().to_string(),
        ));
    }
    if span > ceiling {
        return Err(RangeError::ExceedsCeiling { span, ceiling });
    }
    Ok(span)
}

/// Validates every range of one input. An input with no ranges, or with a
/// half-filled range, is rejected as empty.
pub fn validate_ranges(ranges: &[AuthenticityRange], ceiling: u64) -> Result<u64, RangeError> {
    if ranges.is_empty() {
        return Err(RangeError::Empty);
    }
    ranges
        .iter()
        .try_fold(0u64, |acc, r| Ok(acc.saturating_add(validate_range(r, ceiling)?)))
}

/// Sum of `last - first` over the filled ranges. Ranges that do not parse,
/// or run backwards, contribute nothing.
pub fn compute_yield(ranges: &[AuthenticityRange]) -> u64 {
    ranges
        .iter()
        .filter(|r| {
            !r.first_authenticity.trim().is_empty() && !r.last_authenticity.trim().is_empty()
        })
        .filter_map(|r| r.span().ok())
        .fold(0u64, u64::saturating_add)
}

/// Like [`compute_yield`] but also reports ranges that fail the policy check.
/// Failing ranges still contribute their span when it can be computed.
pub fn compute_yield_checked(ranges: &[AuthenticityRange], ceiling: u64) -> YieldReport {
    let mut report = YieldReport::default();
    for (index, range) in ranges.iter().enumerate() {
        if range.is_blank() {
            continue;
        }
        if let Ok(span) = range.span() {
            report.total = report.total.saturating_add(span);
        }
        if let Err(err) = validate_range(range, ceiling) {
            report.issues.push(RangeIssue {
                index,
                reason: err.to_string(),
            });
        }
    }
    report
}

/// Net good output once rejects are removed and buffered stickers added back.
/// Saturates at the `i64` bounds.
pub fn net_production(gross_yield: u64, reject_count: u64, buffer_count: u64) -> i64 {
    let clamp = |v: u64| i64::try_from(v).unwrap_or(i64::MAX);
    clamp(gross_yield)
        .saturating_sub(clamp(reject_count))
        .saturating_add(clamp(buffer_count))
}

/// Trims every field and drops ranges with both ends blank
pub fn normalize_ranges(ranges: Vec<AuthenticityRange>) -> Vec<AuthenticityRange> {
    ranges
        .iter()
        .map(AuthenticityRange::trimmed)
        .filter(|r| !r.is_blank())
        .collect()
}

/// Accepts strings, numbers or null for serial fields. Numbers lose any
/// leading zeros upstream, so strings are what clients should send.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rstest::rstest;

    fn range(first: &str, last: &str) -> AuthenticityRange {
        AuthenticityRange::new(first, last, "R1")
    }

    #[rstest]
    #[case("1000", "1050", 50)]
    #[case("0001000", "0001050", 50)]
    #[case("5", "7005", 7000)]
    fn valid_ranges_return_span(#[case] first: &str, #[case] last: &str, #[case] span: u64) {
        assert_eq!(validate_range(&range(first, last), 7000), Ok(span));
    }

    #[rstest]
    #[case("100", "100")]
    #[case(" 42 ", "42")]
    fn zero_difference_is_rejected(#[case] first: &str, #[case] last: &str) {
        assert_matches!(
            validate_range(&range(first, last), 7000),
            Err(RangeError::ZeroDifference(_))
        );
    }

    #[test]
    fn backwards_range_is_negative() {
        assert_matches!(
            validate_range(&range("200", "100"), 7000),
            Err(RangeError::NegativeDifference { .. })
        );
    }

    #[test]
    fn span_over_ceiling_is_rejected() {
        assert_eq!(
            validate_range(&range("1", "7002"), 7000),
            Err(RangeError::ExceedsCeiling {
                span: 7001,
                ceiling: 7000
            })
        );
    }

    #[rstest]
    #[case("12a", "20")]
    #[case("-5", "20")]
    #[case("+5", "20")]
    #[case("1.5", "20")]
    fn non_numeric_values_are_rejected(#[case] first: &str, #[case] last: &str) {
        assert_matches!(
            validate_range(&range(first, last), 7000),
            Err(RangeError::NonNumeric(_))
        );
    }

    #[test]
    fn half_filled_range_is_empty() {
        assert_eq!(validate_range(&range("", "10"), 7000), Err(RangeError::Empty));
        assert_eq!(validate_ranges(&[], 7000), Err(RangeError::Empty));
    }

    #[test]
    fn yield_skips_unparseable_ranges() {
        let ranges = vec![
            range("1000", "1050"),
            range("abc", "1050"),
            range("300", "200"),
            range("", ""),
            range("10", "20"),
        ];
        assert_eq!(compute_yield(&ranges), 60);
    }

    #[test]
    fn checked_yield_reports_issue_positions() {
        let ranges = vec![range("1000", "1050"), range("9", "9"), range("x", "2")];
        let report = compute_yield_checked(&ranges, 7000);
        assert_eq!(report.total, 50);
        let positions: Vec<usize> = report.issues.iter().map(|i| i.index).collect();
        assert_eq!(positions, vec![1, 2]);
    }

    #[test]
    fn net_production_subtracts_rejects_and_adds_buffer() {
        assert_eq!(net_production(50, 3, 2), 49);
        assert_eq!(net_production(0, 4, 0), -4);
    }

    #[test]
    fn yield_saturates_instead_of_overflowing() {
        let max = u64::MAX.to_string();
        let ranges = vec![range("0", &max), range("0", &max)];
        assert_eq!(compute_yield(&ranges), u64::MAX);
        let report = compute_yield_checked(&ranges, 7000);
        assert_eq!(report.total, u64::MAX);
        assert_eq!(report.issues.len(), 2);
    }

    #[test]
    fn net_production_clamps_huge_yields() {
        assert_eq!(net_production(u64::MAX, 0, 0), i64::MAX);
        assert_eq!(net_production(10_000_000_000_000_000_000, 0, 5), i64::MAX);
        assert_eq!(net_production(0, u64::MAX, 0), -i64::MAX);
        assert!(net_production(10_000_000_000_000_000_000, 3, 0) > 0);
    }

    #[test]
    fn normalization_trims_and_drops_blank_rows() {
        let cleaned = normalize_ranges(vec![
            AuthenticityRange::new(" 0010 ", "0020 ", " A "),
            AuthenticityRange::new("  ", "", "B"),
        ]);
        assert_eq!(cleaned, vec![AuthenticityRange::new("0010", "0020", "A")]);
    }

    #[test]
    fn numeric_json_values_are_accepted_as_strings() {
        let parsed: AuthenticityRange = serde_json::from_str(
            r#"{"firstAuthenticity": 1000, "lastAuthenticity": "001050", "rollNumber": null}"#,
        )
        .unwrap();
        assert_eq!(parsed.first_authenticity, "1000");
        assert_eq!(parsed.last_authenticity, "001050");
        assert_eq!(parsed.roll_number, "");
    }
}
