use std::collections::BTreeMap;

use chrono::NaiveDateTime;

use crate::models::{Kpis, PeriodRate, Transaction};
use crate::periods::Bucketed;

pub fn kpis(transactions: &[Transaction]) -> Kpis {
    let mut frauds = 0usize;
    let mut total_amount = 0.0;
    let mut fraud_amount = 0.0;

    for transaction in transactions {
        total_amount += transaction.amount;
        if transaction.is_fraud() {
            frauds += 1;
            fraud_amount += transaction.amount;
        }
    }

    Kpis {
        transactions: transactions.len(),
        frauds,
        fraud_rate: fraud_rate(frauds, transactions.len()),
        total_amount,
        fraud_amount,
    }
}

/// Percentage of predicted frauds, 0.0 for an empty set.
pub fn fraud_rate(frauds: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        100.0 * frauds as f64 / total as f64
    }
}

/// One entry per populated period, oldest first.
pub fn fraud_rate_series(bucketed: &[Bucketed<'_>]) -> Vec<PeriodRate> {
    let mut buckets: BTreeMap<NaiveDateTime, (usize, usize)> = BTreeMap::new();

    for entry in bucketed {
        let counts = buckets.entry(entry.period).or_insert((0, 0));
        counts.0 += 1;
        if entry.transaction.is_fraud() {
            counts.1 += 1;
        }
    }

    buckets
        .into_iter()
        .map(|(period, (transactions, frauds))| PeriodRate {
            period,
            transactions,
            frauds,
            fraud_rate: fraud_rate(frauds, transactions),
        })
        .collect()
}
