//! Turns whichever temporal encoding the snapshot carries into one
//! `event_time` per row.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use tracing::{info, warn};

use crate::snapshot::{ColumnData, RawTable};

pub const EVENT_TIME: &str = "event_time";
pub const YEAR: &str = "trans_year";
pub const MONTH: &str = "trans_month";
pub const DAY: &str = "trans_day";
pub const HOUR: &str = "trans_hour";
pub const MINUTE: &str = "trans_minute";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochUnit {
    Seconds,
    Millis,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemporalEncoding {
    Epoch { column: String, unit: EpochUnit },
    Native { column: String },
    Components {
        year: String,
        month: String,
        day: String,
        hour: String,
        minute: Option<String>,
    },
    Missing(String),
}

impl TemporalEncoding {
    /// Picks the encoding once for the whole table.
    pub fn resolve(table: &RawTable) -> Self {
        if let Some(column) = table.column(EVENT_TIME) {
            match &column.data {
                ColumnData::Timestamp(_) => {
                    return TemporalEncoding::Native {
                        column: column.name.clone(),
                    }
                }
                data if data.is_numeric() => {
                    return match max_digit_count(data) {
                        Some(10) => TemporalEncoding::Epoch {
                            column: column.name.clone(),
                            unit: EpochUnit::Seconds,
                        },
                        Some(13) => TemporalEncoding::Epoch {
                            column: column.name.clone(),
                            unit: EpochUnit::Millis,
                        },
                        Some(len) => TemporalEncoding::Missing(format!(
                            "`{EVENT_TIME}` values are {len} digits long, expected 10 or 13"
                        )),
                        None => TemporalEncoding::Missing(format!("`{EVENT_TIME}` is empty")),
                    };
                }
                _ => {}
            }
        }

        if [YEAR, MONTH, DAY, HOUR].iter().all(|c| table.has_column(c)) {
            return TemporalEncoding::Components {
                year: YEAR.to_string(),
                month: MONTH.to_string(),
                day: DAY.to_string(),
                hour: HOUR.to_string(),
                minute: table.has_column(MINUTE).then(|| MINUTE.to_string()),
            };
        }

        TemporalEncoding::Missing(format!(
            "no numeric `{EVENT_TIME}` column and no {YEAR}/{MONTH}/{DAY}/{HOUR} columns"
        ))
    }
}

/// Length of the longest integer rendering in a numeric column, sign included.
fn max_digit_count(data: &ColumnData) -> Option<usize> {
    (0..data.len())
        .filter_map(|row| data.int_at(row))
        .map(|value| value.to_string().len())
        .max()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowTime {
    Valid(NaiveDateTime),
    Invalid,
}

impl From<Option<NaiveDateTime>> for RowTime {
    fn from(value: Option<NaiveDateTime>) -> Self {
        value.map_or(RowTime::Invalid, RowTime::Valid)
    }
}

/// A source row that survived normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stamped {
    pub row: usize,
    pub event_time: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub stamped: Vec<Stamped>,
    pub dropped: usize,
    pub warning: Option<String>,
}

pub fn normalize(table: &RawTable, encoding: &TemporalEncoding) -> Normalized {
    let times: Vec<RowTime> = match encoding {
        TemporalEncoding::Epoch { column, unit } => match table.column(column) {
            Some(column) => (0..table.len())
                .map(|row| epoch_time(&column.data, row, *unit).into())
                .collect(),
            None => vec![RowTime::Invalid; table.len()],
        },
        TemporalEncoding::Native { column } => match table.column(column).map(|c| &c.data) {
            Some(ColumnData::Timestamp(values)) => {
                values.iter().map(|value| (*value).into()).collect()
            }
            _ => vec![RowTime::Invalid; table.len()],
        },
        TemporalEncoding::Components {
            year,
            month,
            day,
            hour,
            minute,
        } => {
            let lookup = |name: &str| table.column(name).map(|c| &c.data);
            match (
                lookup(year.as_str()),
                lookup(month.as_str()),
                lookup(day.as_str()),
                lookup(hour.as_str()),
            ) {
                (Some(y), Some(mo), Some(d), Some(h)) => {
                    let minute = minute.as_deref().and_then(lookup);
                    (0..table.len())
                        .map(|row| {
                            let minute = match minute {
                                Some(column) => column.int_at(row),
                                None => Some(0),
                            };
                            component_time(
                                y.int_at(row),
                                mo.int_at(row),
                                d.int_at(row),
                                h.int_at(row),
                                minute,
                            )
                            .into()
                        })
                        .collect()
                }
                _ => vec![RowTime::Invalid; table.len()],
            }
        }
        TemporalEncoding::Missing(_) => vec![RowTime::Invalid; table.len()],
    };

    let warning = match encoding {
        TemporalEncoding::Missing(reason) => {
            warn!(%reason, "temporal columns unusable, every row is dropped");
            Some(format!("Temporal columns unusable: {reason}."))
        }
        _ => None,
    };

    let stamped: Vec<Stamped> = times
        .into_iter()
        .enumerate()
        .filter_map(|(row, time)| match time {
            RowTime::Valid(event_time) => Some(Stamped { row, event_time }),
            RowTime::Invalid => None,
        })
        .collect();
    let dropped = table.len() - stamped.len();

    info!(
        encoding = ?encoding,
        kept = stamped.len(),
        dropped,
        "event times normalized"
    );

    Normalized {
        stamped,
        dropped,
        warning,
    }
}

fn epoch_time(data: &ColumnData, row: usize, unit: EpochUnit) -> Option<NaiveDateTime> {
    let time = match (data, unit) {
        (ColumnData::Int(_), EpochUnit::Seconds) => DateTime::from_timestamp(data.int_at(row)?, 0)?,
        (ColumnData::Int(_), EpochUnit::Millis) => {
            DateTime::from_timestamp_millis(data.int_at(row)?)?
        }
        (_, unit) => {
            let value = data.float_at(row).filter(|v| v.is_finite())?;
            let seconds = match unit {
                EpochUnit::Seconds => value,
                EpochUnit::Millis => value / 1000.0,
            };
            let whole = seconds.floor();
            let nanos = ((seconds - whole) * 1e9).round() as u32;
            DateTime::from_timestamp(whole as i64, nanos.min(999_999_999))?
        }
    };
    Some(time.naive_utc())
}

fn component_time(
    year: Option<i64>,
    month: Option<i64>,
    day: Option<i64>,
    hour: Option<i64>,
    minute: Option<i64>,
) -> Option<NaiveDateTime> {
    let date = NaiveDate::from_ymd_opt(
        i32::try_from(year?).ok()?,
        u32::try_from(month?).ok()?,
        u32::try_from(day?).ok()?,
    )?;
    date.and_hms_opt(u32::try_from(hour?).ok()?, u32::try_from(minute?).ok()?, 0)
}
