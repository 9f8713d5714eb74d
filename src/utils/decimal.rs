//! Decimal arithmetic utilities for financial calculations.

use rust_decimal::Decimal;

/// Safe division that returns zero if divisor is zero.
pub fn safe_div(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator == Decimal::ZERO {
        Decimal::ZERO
    } else {
        numerator / denominator
    }
}

/// Calculate weighted average of `(value, weight)` pairs.
pub fn weighted_average(values: &[(Decimal, Decimal)]) -> Decimal {
    let (sum, weight_sum) = values.iter().fold(
        (Decimal::ZERO, Decimal::ZERO),
        |(sum, weight_sum), (val, weight)| (sum + val * weight, weight_sum + weight),
    );

    safe_div(sum, weight_sum)
}

/// Express a ratio in basis points (1 bp = 0.01%).
pub fn to_basis_points(rate: Decimal) -> Decimal {
    rate * Decimal::from(10_000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_safe_div_by_zero() {
        assert_eq!(safe_div(dec!(5), Decimal::ZERO), Decimal::ZERO);
        assert_eq!(safe_div(dec!(5), dec!(2)), dec!(2.5));
    }

    #[test]
    fn test_weighted_average() {
        let values = vec![
            (dec!(100), dec!(2)), // 100 with weight 2
            (dec!(200), dec!(1)), // 200 with weight 1
        ];
        // (100*2 + 200*1) / (2+1) = 400/3 ~ 133.33
        let avg = weighted_average(&values);
        assert!(avg > dec!(133) && avg < dec!(134));
    }

    #[test]
    fn test_weighted_average_empty() {
        assert_eq!(weighted_average(&[]), Decimal::ZERO);
    }

    #[test]
    fn test_basis_points() {
        assert_eq!(to_basis_points(dec!(0.0001)), dec!(1));
        assert_eq!(to_basis_points(dec!(0.02)), dec!(200));
    }
}
