//! Timestamp alignment of two independently sampled price series.

use super::data::{PricePoint, PriceSeries};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Synchronized prices for both venues.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlignedSample {
    pub timestamp: DateTime<Utc>,
    pub price_a: Decimal,
    pub price_b: Decimal,
}

/// Pair every row of `series_a` with the nearest-in-time row of `series_b`.
///
/// Output keeps `series_a`'s timestamps and order. When two `series_b` rows
/// are equally distant the earlier one wins. Empty if either input is empty.
pub fn align_nearest(series_a: &PriceSeries, series_b: &PriceSeries) -> Vec<AlignedSample> {
    let b = series_b.points();
    if b.is_empty() {
        return Vec::new();
    }

    let mut aligned = Vec::with_capacity(series_a.len());
    // Index of the last `b` row at or before the current `a` timestamp
    // (or 0 while every `b` row is still in the future).
    let mut j = 0;

    for row in series_a.points() {
        while j + 1 < b.len() && b[j + 1].timestamp <= row.timestamp {
            j += 1;
        }

        let matched = nearest(row.timestamp, &b[j], b.get(j + 1));
        aligned.push(AlignedSample {
            timestamp: row.timestamp,
            price_a: row.price,
            price_b: matched.price,
        });
    }

    aligned
}

fn nearest<'a>(
    at: DateTime<Utc>,
    before: &'a PricePoint,
    after: Option<&'a PricePoint>,
) -> &'a PricePoint {
    if before.timestamp >= at {
        return before;
    }
    match after {
        Some(next) if next.timestamp - at < at - before.timestamp => next,
        _ => before,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn series(rows: &[(i64, Decimal)]) -> PriceSeries {
        PriceSeries::new(rows.iter().map(|(s, p)| PricePoint::new(t(*s), *p)).collect())
    }

    fn prices_b(aligned: &[AlignedSample]) -> Vec<Decimal> {
        aligned.iter().map(|s| s.price_b).collect()
    }

    #[test]
    fn test_exact_matches() {
        let a = series(&[(0, dec!(1)), (10, dec!(2)), (20, dec!(3))]);
        let b = series(&[(0, dec!(10)), (10, dec!(20)), (20, dec!(30))]);

        let aligned = align_nearest(&a, &b);
        assert_eq!(aligned.len(), 3);
        assert_eq!(prices_b(&aligned), vec![dec!(10), dec!(20), dec!(30)]);
        assert_eq!(aligned[1].timestamp, t(10));
        assert_eq!(aligned[1].price_a, dec!(2));
    }

    #[test]
    fn test_nearest_neighbour_irregular() {
        let a = series(&[(3, dec!(1)), (8, dec!(1)), (14, dec!(1))]);
        let b = series(&[(0, dec!(10)), (10, dec!(20)), (13, dec!(30))]);

        // 3 -> 0; 8 -> 10; 14 -> 13
        assert_eq!(
            prices_b(&align_nearest(&a, &b)),
            vec![dec!(10), dec!(20), dec!(30)]
        );
    }

    #[test]
    fn test_tie_resolves_to_earlier_sample() {
        let a = series(&[(5, dec!(1))]);
        let b = series(&[(0, dec!(10)), (10, dec!(20))]);

        assert_eq!(prices_b(&align_nearest(&a, &b)), vec![dec!(10)]);
    }

    #[test]
    fn test_rows_outside_b_range_use_edges() {
        let a = series(&[(-50, dec!(1)), (500, dec!(1))]);
        let b = series(&[(0, dec!(10)), (10, dec!(20))]);

        assert_eq!(
            prices_b(&align_nearest(&a, &b)),
            vec![dec!(10), dec!(20)]
        );
    }

    #[test]
    fn test_many_a_rows_share_one_b_row() {
        let a = series(&[(0, dec!(1)), (1, dec!(2)), (2, dec!(3)), (3, dec!(4))]);
        let b = series(&[(1, dec!(10))]);

        let aligned = align_nearest(&a, &b);
        assert_eq!(aligned.len(), 4);
        assert!(aligned.iter().all(|s| s.price_b == dec!(10)));
    }

    #[test]
    fn test_unsorted_input_is_sorted_first() {
        let a = series(&[(20, dec!(3)), (0, dec!(1))]);
        let b = series(&[(19, dec!(30)), (1, dec!(10))]);

        let aligned = align_nearest(&a, &b);
        assert_eq!(aligned[0].timestamp, t(0));
        assert_eq!(prices_b(&aligned), vec![dec!(10), dec!(30)]);
    }

    #[test]
    fn test_empty_inputs() {
        let a = series(&[(0, dec!(1))]);
        assert!(align_nearest(&a, &PriceSeries::default()).is_empty());
        assert!(align_nearest(&PriceSeries::default(), &a).is_empty());
    }
}
