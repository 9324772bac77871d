use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::domain::prestation::SuggestedLine;

const CONFIDENCE_BASE_PCT: usize = 45;
const CONFIDENCE_STEP_PCT: usize = 12;
const CONFIDENCE_CAP_PCT: usize = 95;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteTotals {
    pub total_ht: Decimal,
    pub total_vat: Decimal,
    pub total_ttc: Decimal,
}

/// Half-away-from-zero rounding to cents.
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Sums already-rounded line totals; VAT is accumulated unrounded and rounded once.
pub fn aggregate(lines: &[SuggestedLine]) -> QuoteTotals {
    let hundred = Decimal::ONE_HUNDRED;
    let (ht, vat) = lines.iter().fold((Decimal::ZERO, Decimal::ZERO), |(ht, vat), line| {
        (ht + line.total_ht, vat + line.total_ht * line.vat_rate_pct / hundred)
    });

    let total_ht = round2(ht);
    let total_vat = round2(vat);
    QuoteTotals { total_ht, total_vat, total_ttc: total_ht + total_vat }
}

pub fn confidence_pct(match_count: usize) -> u8 {
    if match_count == 0 {
        return 0;
    }

    let score = CONFIDENCE_STEP_PCT
        .saturating_mul(match_count)
        .saturating_add(CONFIDENCE_BASE_PCT)
        .min(CONFIDENCE_CAP_PCT);
    u8::try_from(score).unwrap_or(u8::MAX)
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use crate::domain::prestation::{ItemCategory, SuggestedLine};

    use super::{aggregate, confidence_pct, round2};

    fn line(total_ht: Decimal, vat_rate_pct: Decimal) -> SuggestedLine {
        SuggestedLine {
            name: "Main d'oeuvre".to_owned(),
            category: ItemCategory::Labor,
            unit: "h".to_owned(),
            quantity: Decimal::ONE,
            unit_price_ht: total_ht,
            vat_rate_pct,
            total_ht,
        }
    }

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(round2(Decimal::new(1_005, 3)), Decimal::new(101, 2));
        assert_eq!(round2(Decimal::new(-1_005, 3)), Decimal::new(-101, 2));
        assert_eq!(round2(Decimal::new(1_004, 3)), Decimal::new(100, 2));
    }

    #[test]
    fn total_ht_is_sum_of_rounded_line_totals() {
        let lines = vec![
            line(Decimal::new(1_001, 2), Decimal::new(20, 0)),
            line(Decimal::new(2_002, 2), Decimal::new(10, 0)),
            line(Decimal::new(33, 2), Decimal::new(55, 1)),
        ];
        let expected: Decimal = lines.iter().map(|line| line.total_ht).sum();

        assert_eq!(aggregate(&lines).total_ht, expected);
    }

    #[test]
    fn vat_is_rounded_once_on_the_sum() {
        // 0.05 * 10% = 0.005 per line; rounding per line would give 0.03 over three lines.
        let lines = vec![
            line(Decimal::new(5, 2), Decimal::new(10, 0)),
            line(Decimal::new(5, 2), Decimal::new(10, 0)),
            line(Decimal::new(5, 2), Decimal::new(10, 0)),
        ];

        let totals = aggregate(&lines);
        assert_eq!(totals.total_vat, Decimal::new(2, 2));
        assert_eq!(totals.total_ttc, Decimal::new(17, 2));
    }

    #[test]
    fn empty_lines_aggregate_to_zero() {
        let totals = aggregate(&[]);
        assert_eq!(totals.total_ht, Decimal::ZERO);
        assert_eq!(totals.total_vat, Decimal::ZERO);
        assert_eq!(totals.total_ttc, Decimal::ZERO);
    }

    #[test]
    fn confidence_grows_with_matches_until_capped() {
        assert_eq!(confidence_pct(0), 0);
        assert_eq!(confidence_pct(1), 57);
        assert_eq!(confidence_pct(2), 69);
        assert_eq!(confidence_pct(4), 93);
        assert_eq!(confidence_pct(5), 95);
        assert_eq!(confidence_pct(usize::MAX), 95);

        for count in 0..4 {
            assert!(confidence_pct(count) < confidence_pct(count + 1));
        }
    }
}
