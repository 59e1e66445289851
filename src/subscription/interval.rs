use serde::Serialize;

use crate::error::{LedgerError, Result};
use crate::subscription::month_date::MonthDate;

/// Closed query window `[start, end]`, both months inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Period {
    pub start: MonthDate,
    pub end: MonthDate,
}

impl Period {
    pub fn new(start: MonthDate, end: MonthDate) -> Result<Self> {
        if start > end {
            return Err(LedgerError::validation(
                "date_range",
                "period start cannot be after period end",
            ));
        }
        Ok(Self { start, end })
    }

    pub fn months(&self) -> i64 {
        self.end.ordinal() - self.start.ordinal() + 1
    }
}

/// True iff `reference` lies in `[start, end]`, an absent end being unbounded.
pub fn contains(start: MonthDate, end: Option<MonthDate>, reference: MonthDate) -> bool {
    reference >= start && end.is_none_or(|e| reference <= e)
}

/// Number of months shared by `[start, end]` and `period`. An open-ended
/// interval is billed through the period's last month and no further.
pub fn overlap_months(start: MonthDate, end: Option<MonthDate>, period: Period) -> i64 {
    let sub_start = start.ordinal();
    let sub_end = end.map_or(period.end.ordinal(), |e| e.ordinal());
    let period_start = period.start.ordinal();
    let period_end = period.end.ordinal();

    if sub_end < period_start || sub_start > period_end {
        return 0;
    }
    let overlap_start = sub_start.max(period_start);
    let overlap_end = sub_end.min(period_end);
    overlap_end - overlap_start + 1
}

/// `overlap_months * price`, or an overflow error when the product does not
/// fit in `i64`.
pub fn overlap_cost(
    start: MonthDate,
    end: Option<MonthDate>,
    price: i64,
    period: Period,
) -> Result<i64> {
    overlap_months(start, end, period)
        .checked_mul(price)
        .ok_or_else(LedgerError::cost_overflow)
}

/// Whether `[start, end]` shares at least one month with the (possibly
/// half-open) window `[from, to]`.
pub fn intersects(
    start: MonthDate,
    end: Option<MonthDate>,
    from: Option<MonthDate>,
    to: Option<MonthDate>,
) -> bool {
    let starts_in_time = to.is_none_or(|t| start <= t);
    let ends_in_time = match (end, from) {
        (Some(e), Some(f)) => e >= f,
        _ => true,
    };
    starts_in_time && ends_in_time
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn m(s: &str) -> MonthDate {
        MonthDate::parse(s).unwrap()
    }

    fn period(a: &str, b: &str) -> Period {
        Period::new(m(a), m(b)).unwrap()
    }

    #[test]
    fn bounded_subscription_partially_inside_period() {
        let p = period("03-2024", "12-2024");
        assert_eq!(overlap_months(m("01-2024"), Some(m("06-2024")), p), 4);
        assert_eq!(overlap_cost(m("01-2024"), Some(m("06-2024")), 1000, p).unwrap(), 4000);
    }

    #[test]
    fn open_ended_subscription_is_capped_at_period_end() {
        let p = period("06-2024", "08-2024");
        assert_eq!(overlap_months(m("01-2024"), None, p), 3);
        assert_eq!(overlap_cost(m("01-2024"), None, 500, p).unwrap(), 1500);
    }

    #[test]
    fn oversized_product_is_an_overflow_error() {
        let p = period("01-2024", "02-2024");
        let err = overlap_cost(m("01-2024"), None, i64::MAX / 2 + 1, p).unwrap_err();
        assert!(matches!(err, LedgerError::Overflow(_)));
        assert_eq!(overlap_cost(m("01-2024"), None, i64::MAX / 2, p).unwrap(), i64::MAX - 1);
    }

    #[test]
    fn open_ended_subscription_starting_after_period_costs_nothing() {
        let p = period("06-2024", "08-2024");
        assert_eq!(overlap_months(m("09-2024"), None, p), 0);
    }

    #[test]
    fn boundary_months_are_inclusive() {
        let p = period("06-2024", "06-2024");
        assert_eq!(overlap_months(m("06-2024"), Some(m("06-2024")), p), 1);
        assert_eq!(overlap_months(m("01-2024"), Some(m("05-2024")), p), 0);
        assert_eq!(overlap_months(m("07-2024"), Some(m("09-2024")), p), 0);
        assert_eq!(overlap_months(m("11-2023"), Some(m("02-2024")), period("12-2023", "01-2024")), 2);
    }

    #[test]
    fn inverted_period_is_rejected() {
        let err = Period::new(m("05-2024"), m("04-2024")).unwrap_err();
        assert_eq!(err.field(), Some("date_range"));
    }

    #[test]
    fn contains_respects_open_end() {
        assert!(contains(m("01-2024"), None, m("12-2099")));
        assert!(contains(m("01-2024"), Some(m("03-2024")), m("03-2024")));
        assert!(!contains(m("01-2024"), Some(m("03-2024")), m("04-2024")));
        assert!(!contains(m("01-2024"), None, m("12-2023")));
    }

    #[test]
    fn intersects_handles_half_open_windows() {
        assert!(intersects(m("01-2024"), None, None, None));
        assert!(intersects(m("01-2024"), Some(m("03-2024")), Some(m("03-2024")), None));
        assert!(!intersects(m("01-2024"), Some(m("03-2024")), Some(m("04-2024")), None));
        assert!(!intersects(m("05-2024"), None, None, Some(m("04-2024"))));
        assert!(intersects(m("05-2024"), None, Some(m("01-2030")), Some(m("02-2030"))));
    }

    // Ordinals for 2000-01 ..= 2100-12.
    const LO: i64 = 2000 * 12 + 1;
    const HI: i64 = 2100 * 12 + 12;

    fn ord(o: i64) -> MonthDate {
        MonthDate::from_ordinal(o).unwrap()
    }

    proptest! {
        #[test]
        fn disjoint_intervals_do_not_overlap(
            a in LO..HI - 40, len_a in 0i64..20, gap in 1i64..20, len_p in 0i64..20,
        ) {
            let sub_end = a + len_a;
            let p = Period::new(ord(sub_end + gap), ord(sub_end + gap + len_p)).unwrap();
            prop_assert_eq!(overlap_months(ord(a), Some(ord(sub_end)), p), 0);

            let before = Period::new(ord(a - len_p - gap), ord(a - gap)).unwrap();
            prop_assert_eq!(overlap_months(ord(a), None, before), 0);
        }

        #[test]
        fn covering_subscription_bills_every_month(
            ps in LO + 30..HI - 60, len in 0i64..30, lead in 0i64..30, tail in 0i64..30, open in any::<bool>(),
        ) {
            let p = Period::new(ord(ps), ord(ps + len)).unwrap();
            let end = if open { None } else { Some(ord(ps + len + tail)) };
            prop_assert_eq!(overlap_months(ord(ps - lead), end, p), p.months());
        }

        #[test]
        fn overlap_counts_months_the_subscription_is_active(
            s in LO..HI - 50, len in 0i64..40, open in any::<bool>(), ps in LO..HI - 50, plen in 0i64..40,
        ) {
            let start = ord(s);
            let end = if open { None } else { Some(ord(s + len)) };
            let p = Period::new(ord(ps), ord(ps + plen)).unwrap();
            let active = (ps..=ps + plen).filter(|o| contains(start, end, ord(*o))).count() as i64;
            prop_assert_eq!(overlap_months(start, end, p), active);
        }
    }
}
