use authenticity_tracker::models::{
    compute_yield, compute_yield_checked, net_production, validate_range, AuthenticityRange,
};
use proptest::prelude::*;

fn range_strategy() -> impl Strategy<Value = (u64, u64)> {
    (0u64..1_000_000, 0u64..10_000).prop_map(|(first, span)| (first, first + span))
}

proptest! {
    #[test]
    fn yield_is_sum_of_last_minus_first(spans in prop::collection::vec(range_strategy(), 0..20)) {
        let ranges: Vec<AuthenticityRange> = spans
            .iter()
            .enumerate()
            .map(|(i, (first, last))| AuthenticityRange::new(first.to_string(), last.to_string(), format!("R{}", i)))
            .collect();
        let expected: u64 = spans.iter().map(|(first, last)| last - first).sum();
        prop_assert_eq!(compute_yield(&ranges), expected);
        prop_assert_eq!(compute_yield_checked(&ranges, 7000).total, expected);
    }

    #[test]
    fn zero_padding_does_not_change_span((first, last) in range_strategy(), width in 7usize..12) {
        let padded = AuthenticityRange::new(
            format!("{:0width$}", first, width = width),
            format!("{:0width$}", last, width = width),
            "R1",
        );
        let plain = AuthenticityRange::new(first.to_string(), last.to_string(), "R1");
        prop_assert_eq!(compute_yield(&[padded]), compute_yield(&[plain]));
    }

    #[test]
    fn validation_accepts_exactly_spans_within_ceiling((first, last) in range_strategy(), ceiling in 1u64..10_000) {
        let range = AuthenticityRange::new(first.to_string(), last.to_string(), "R1");
        let span = last - first;
        let accepted = validate_range(&range, ceiling).is_ok();
        prop_assert_eq!(accepted, span > 0 && span <= ceiling);
    }

    #[test]
    fn net_production_matches_signed_arithmetic(
        gross in 0u64..1_000_000,
        rejects in 0u64..1_000_000,
        buffer in 0u64..1_000_000,
    ) {
        let net = net_production(gross, rejects, buffer);
        prop_assert_eq!(net, gross as i64 - rejects as i64 + buffer as i64);
        prop_assert_eq!(net - buffer as i64 + rejects as i64, gross as i64);
    }
}
