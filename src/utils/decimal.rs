//! Scale-2 confidence arithmetic.
//!
//! Confidences, averages, and quality scores are fixed-point decimals
//! at scale 2 with half-up rounding. Floating point only appears at
//! the persistence boundary (REAL columns).

use rust_decimal::prelude::*;
use rust_decimal::{Decimal, RoundingStrategy};

/// Round to scale 2, half-up, clamped to [0.00, 1.00].
pub fn clamp_confidence(value: Decimal) -> Decimal {
    let rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.clamp(Decimal::ZERO, Decimal::ONE)
}

/// Convert a REAL column value back into a scale-2 decimal.
pub fn from_stored(value: f64) -> Decimal {
    Decimal::from_f64(value)
        .unwrap_or(Decimal::ZERO)
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Convert a confidence to its REAL column representation.
pub fn to_stored(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

/// Scale-2 average of a non-empty slice; `None` when empty.
pub fn average(values: &[Decimal]) -> Option<Decimal> {
    if values.is_empty() {
        return None;
    }
    let sum: Decimal = values.iter().copied().sum();
    let avg = sum / Decimal::from(values.len() as u64);
    Some(avg.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_exact(s).unwrap()
    }

    #[test]
    fn rounds_half_up_at_scale_two() {
        assert_eq!(clamp_confidence(d("0.615")), d("0.62"));
        assert_eq!(clamp_confidence(d("0.614")), d("0.61"));
        assert_eq!(clamp_confidence(d("1.37")), d("1.00"));
        assert_eq!(clamp_confidence(d("-0.2")), d("0.00"));
    }

    #[test]
    fn average_is_scale_two() {
        let values = [d("0.61"), d("0.62")];
        assert_eq!(average(&values), Some(d("0.62")));
        assert_eq!(average(&[]), None);
    }
}
