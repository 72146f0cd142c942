use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike};
use tracing::warn;

use crate::models::{Granularity, Transaction};

/// Start of the bucket containing `time`. Weeks start on Monday 00:00.
pub fn bucket_start(time: NaiveDateTime, granularity: Granularity) -> Option<NaiveDateTime> {
    match granularity {
        Granularity::Hour => time.date().and_hms_opt(time.hour(), 0, 0),
        Granularity::Day => time.date().and_hms_opt(0, 0, 0),
        Granularity::Week => {
            let offset = i64::from(time.weekday().num_days_from_monday());
            time.date()
                .checked_sub_signed(Duration::days(offset))?
                .and_hms_opt(0, 0, 0)
        }
        Granularity::Month => {
            NaiveDate::from_ymd_opt(time.year(), time.month(), 1)?.and_hms_opt(0, 0, 0)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bucketed<'a> {
    pub period: NaiveDateTime,
    pub transaction: &'a Transaction,
}

pub fn assign(transactions: &[Transaction], granularity: Granularity) -> Vec<Bucketed<'_>> {
    let bucketed: Vec<Bucketed<'_>> = transactions
        .iter()
        .filter_map(|transaction| {
            bucket_start(transaction.event_time, granularity).map(|period| Bucketed {
                period,
                transaction,
            })
        })
        .collect();

    let dropped = transactions.len() - bucketed.len();
    if dropped > 0 {
        warn!(dropped, ?granularity, "rows without a period dropped");
    }
    bucketed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn hour_floors_minutes_and_seconds() {
        assert_eq!(
            bucket_start(at(2024, 3, 5, 14, 30, 59), Granularity::Hour),
            Some(at(2024, 3, 5, 14, 0, 0))
        );
    }

    #[test]
    fn day_floors_to_midnight() {
        assert_eq!(
            bucket_start(at(2024, 3, 5, 23, 59, 59), Granularity::Day),
            Some(at(2024, 3, 5, 0, 0, 0))
        );
    }

    #[test]
    fn week_starts_on_monday() {
        // 2024-03-10 is a Sunday, 2024-03-04 the Monday before it.
        assert_eq!(
            bucket_start(at(2024, 3, 10, 18, 0, 0), Granularity::Week),
            Some(at(2024, 3, 4, 0, 0, 0))
        );
        assert_eq!(
            bucket_start(at(2024, 3, 4, 0, 0, 0), Granularity::Week),
            Some(at(2024, 3, 4, 0, 0, 0))
        );
        // Crosses a year boundary.
        assert_eq!(
            bucket_start(at(2025, 1, 1, 9, 0, 0), Granularity::Week),
            Some(at(2024, 12, 30, 0, 0, 0))
        );
    }

    #[test]
    fn month_starts_on_the_first() {
        assert_eq!(
            bucket_start(at(2024, 2, 29, 12, 0, 0), Granularity::Month),
            Some(at(2024, 2, 1, 0, 0, 0))
        );
    }

    #[test]
    fn assign_keeps_every_row() {
        let transactions: Vec<Transaction> = (0..5)
            .map(|i| Transaction {
                row: i,
                event_time: at(2024, 3, 5, i as u32, 10, 0),
                amount: 1.0,
                prediction: 0,
                category: None,
                state: None,
            })
            .collect();
        let bucketed = assign(&transactions, Granularity::Hour);
        assert_eq!(bucketed.len(), transactions.len());
        assert_eq!(bucketed[4].period, at(2024, 3, 5, 4, 0, 0));
    }
}
