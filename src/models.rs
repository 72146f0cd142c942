use chrono::{DateTime, NaiveDateTime, Utc};
use clap::ValueEnum;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Hour,
    Day,
    Week,
    Month,
}

impl Granularity {
    pub fn label(self) -> &'static str {
        match self {
            Granularity::Hour => "hour",
            Granularity::Day => "day",
            Granularity::Week => "week",
            Granularity::Month => "month",
        }
    }
}

/// A scored payment with a usable event time.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub row: usize,
    pub event_time: NaiveDateTime,
    pub amount: f64,
    pub prediction: u8,
    pub category: Option<String>,
    pub state: Option<String>,
}

impl Transaction {
    pub fn is_fraud(&self) -> bool {
        self.prediction == 1
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Kpis {
    pub transactions: usize,
    pub frauds: usize,
    pub fraud_rate: f64,
    pub total_amount: f64,
    pub fraud_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodRate {
    pub period: NaiveDateTime,
    pub transactions: usize,
    pub frauds: usize,
    pub fraud_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelCount {
    pub label: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FraudDetail {
    pub row: usize,
    pub event_time: NaiveDateTime,
    pub period: NaiveDateTime,
    pub amount: f64,
    pub category: Option<String>,
    pub state_full: Option<String>,
    pub date: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DroppedRows {
    pub bad_time: usize,
    pub invalid: usize,
    pub no_period: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportView {
    pub render_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub source: String,
    pub granularity: Granularity,
    pub kpis: Kpis,
    pub series: Vec<PeriodRate>,
    pub by_category: Vec<LabelCount>,
    pub by_state: Vec<LabelCount>,
    pub frauds: Vec<FraudDetail>,
    pub dropped: DroppedRows,
    pub warnings: Vec<String>,
}
