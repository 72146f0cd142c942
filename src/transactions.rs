use clap::ValueEnum;
use tracing::warn;

use crate::error::SnapshotError;
use crate::models::Transaction;
use crate::snapshot::{ColumnData, RawTable};
use crate::timestamps::Stamped;

pub const PREDICTION: &str = "prediction";
pub const AMOUNT_COLUMNS: [&str; 2] = ["amt", "amount"];
pub const CATEGORY: &str = "category";
pub const STATE: &str = "state";

/// What to do with rows whose prediction or amount is unusable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum InvalidRowPolicy {
    #[default]
    Reject,
    Drop,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    pub transactions: Vec<Transaction>,
    pub invalid: usize,
}

pub fn extract(
    table: &RawTable,
    stamped: &[Stamped],
    policy: InvalidRowPolicy,
) -> Result<Extracted, SnapshotError> {
    let prediction = &table
        .column(PREDICTION)
        .ok_or_else(|| SnapshotError::MissingColumn(PREDICTION.to_string()))?
        .data;
    let amount = AMOUNT_COLUMNS
        .iter()
        .find_map(|name| table.column(name))
        .map(|column| &column.data)
        .ok_or_else(|| SnapshotError::MissingColumn(AMOUNT_COLUMNS[0].to_string()))?;
    let category = table.column(CATEGORY).map(|c| &c.data);
    let state = table.column(STATE).map(|c| &c.data);

    let mut transactions = Vec::with_capacity(stamped.len());
    let mut first_invalid: Option<(usize, String)> = None;
    let mut invalid = 0usize;

    for stamp in stamped {
        let row = stamp.row;
        let checked = read_prediction(prediction, row)
            .and_then(|p| read_amount(amount, row).map(|a| (p, a)));

        match checked {
            Ok((prediction, amount)) => transactions.push(Transaction {
                row,
                event_time: stamp.event_time,
                amount,
                prediction,
                category: category.and_then(|data| data.text_at(row)),
                state: state.and_then(|data| data.text_at(row)),
            }),
            Err(reason) => {
                invalid += 1;
                if first_invalid.is_none() {
                    first_invalid = Some((row, reason));
                }
            }
        }
    }

    if let Some((first_row, reason)) = first_invalid {
        match policy {
            InvalidRowPolicy::Reject => {
                return Err(SnapshotError::InvalidRows {
                    count: invalid,
                    first_row,
                    reason,
                })
            }
            InvalidRowPolicy::Drop => {
                warn!(invalid, first_row, %reason, "invalid rows dropped");
            }
        }
    }

    Ok(Extracted {
        transactions,
        invalid,
    })
}

fn read_prediction(data: &ColumnData, row: usize) -> Result<u8, String> {
    match data.float_at(row) {
        Some(value) if value == 0.0 => Ok(0),
        Some(value) if value == 1.0 => Ok(1),
        Some(value) => Err(format!("prediction {value} is not 0 or 1")),
        None => Err("prediction is missing".to_string()),
    }
}

fn read_amount(data: &ColumnData, row: usize) -> Result<f64, String> {
    match data.float_at(row) {
        Some(value) if value.is_finite() && value >= 0.0 => Ok(value),
        Some(value) => Err(format!("amount {value} is not a non-negative number")),
        None => Err("amount is missing".to_string()),
    }
}
