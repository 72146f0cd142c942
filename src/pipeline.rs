//! One full pass from a decoded snapshot to the view the report renders.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::aggregate;
use crate::breakdown;
use crate::error::SnapshotError;
use crate::models::{DroppedRows, FraudDetail, Granularity, ReportView, Transaction};
use crate::periods;
use crate::snapshot::RawTable;
use crate::states;
use crate::timestamps::{self, TemporalEncoding};
use crate::transactions::{self, InvalidRowPolicy};

pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M";

#[derive(Debug, Clone)]
pub struct RenderRequest<'a> {
    pub source: &'a str,
    pub granularity: Granularity,
    pub policy: InvalidRowPolicy,
    pub generated_at: DateTime<Utc>,
    pub render_id: Uuid,
}

pub fn run(table: &RawTable, request: &RenderRequest<'_>) -> Result<ReportView, SnapshotError> {
    if table.is_empty() {
        warn!(source = request.source, "snapshot has no rows");
    }

    let encoding = TemporalEncoding::resolve(table);
    debug!(?encoding, "temporal encoding resolved");

    let normalized = timestamps::normalize(table, &encoding);
    let extracted = transactions::extract(table, &normalized.stamped, request.policy)?;
    let rows = extracted.transactions;

    let kpis = aggregate::kpis(&rows);

    let bucketed = periods::assign(&rows, request.granularity);
    let series = aggregate::fraud_rate_series(&bucketed);

    let frauds: Vec<&Transaction> = bucketed
        .iter()
        .map(|entry| entry.transaction)
        .filter(|t| t.is_fraud())
        .collect();
    let by_category = breakdown::by_category(&frauds);
    let by_state = breakdown::by_state(&frauds);

    let details: Vec<FraudDetail> = bucketed
        .iter()
        .filter(|entry| entry.transaction.is_fraud())
        .map(|entry| {
            let t = entry.transaction;
            FraudDetail {
                row: t.row,
                event_time: t.event_time,
                period: entry.period,
                amount: t.amount,
                category: t.category.clone(),
                state_full: t.state.as_deref().map(states::resolve_state),
                date: t.event_time.format(DATE_FORMAT).to_string(),
            }
        })
        .collect();

    let dropped = DroppedRows {
        bad_time: normalized.dropped,
        invalid: extracted.invalid,
        no_period: rows.len() - bucketed.len(),
    };

    info!(
        render_id = %request.render_id,
        granularity = request.granularity.label(),
        transactions = kpis.transactions,
        frauds = kpis.frauds,
        periods = series.len(),
        "report view built"
    );

    Ok(ReportView {
        render_id: request.render_id,
        generated_at: request.generated_at,
        source: request.source.to_string(),
        granularity: request.granularity,
        kpis,
        series,
        by_category,
        by_state,
        frauds: details,
        dropped,
        warnings: normalized.warning.into_iter().collect(),
    })
}
