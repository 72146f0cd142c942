use std::io::Write;
use std::path::Path;

use anyhow::Context;

use crate::models::FraudDetail;
use crate::pipeline::DATE_FORMAT;
use crate::snapshot::{Column, RawTable};
use crate::timestamps::EVENT_TIME;

pub const EXPORT_FILE_NAME: &str = "fraudes.csv";

/// Columns appended to every export. Source columns with these names are
/// replaced by the derived values.
const DERIVED_COLUMNS: [&str; 3] = ["period", "state_full", "date"];

/// Writes every predicted-fraud row with its source columns plus the derived
/// `period`, `state_full` and `date` columns.
pub fn write_frauds<W: Write>(
    writer: W,
    table: &RawTable,
    frauds: &[FraudDetail],
) -> anyhow::Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    let source: Vec<&Column> = table
        .columns()
        .iter()
        .filter(|c| !DERIVED_COLUMNS.contains(&c.name.as_str()))
        .collect();

    let mut header: Vec<&str> = source.iter().map(|c| c.name.as_str()).collect();
    header.extend(DERIVED_COLUMNS);
    csv.write_record(&header)?;

    for detail in frauds {
        let mut record: Vec<String> = source
            .iter()
            .map(|column| {
                if column.name == EVENT_TIME {
                    detail.event_time.format("%Y-%m-%d %H:%M:%S").to_string()
                } else {
                    column.data.text_at(detail.row).unwrap_or_default()
                }
            })
            .collect();
        record.push(detail.period.format(DATE_FORMAT).to_string());
        record.push(detail.state_full.clone().unwrap_or_default());
        record.push(detail.date.clone());
        csv.write_record(&record)?;
    }

    csv.flush()?;
    Ok(())
}

pub fn export_to_dir(dir: &Path, table: &RawTable, frauds: &[FraudDetail]) -> anyhow::Result<()> {
    let path = dir.join(EXPORT_FILE_NAME);
    let file = std::fs::File::create(&path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    write_frauds(file, table, frauds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::ColumnData;
    use chrono::NaiveDate;

    #[test]
    fn exports_source_columns_and_derived_ones() {
        let table = RawTable::new(vec![
            Column::new(
                "event_time",
                ColumnData::Int(vec![Some(1_709_649_000), Some(1_709_650_000)]),
            ),
            Column::new("prediction", ColumnData::Int(vec![Some(0), Some(1)])),
            Column::new("amt", ColumnData::Float(vec![Some(3.5), Some(42.25)])),
            Column::new(
                "merchant",
                ColumnData::Text(vec![Some("a, b".to_string()), Some("fraud_Kub".to_string())]),
            ),
        ])
        .unwrap();
        let event_time = NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(14, 46, 40)
            .unwrap();
        let frauds = vec![FraudDetail {
            row: 1,
            event_time,
            period: NaiveDate::from_ymd_opt(2024, 3, 5)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            amount: 42.25,
            category: None,
            state_full: Some("California".to_string()),
            date: "2024-03-05 14:46".to_string(),
        }];

        let mut out = Vec::new();
        write_frauds(&mut out, &table, &frauds).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(
            lines[0],
            "event_time,prediction,amt,merchant,period,state_full,date"
        );
        assert_eq!(
            lines[1],
            "2024-03-05 14:46:40,1,42.25,fraud_Kub,2024-03-05 00:00,California,2024-03-05 14:46"
        );
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn empty_fraud_set_writes_header_only() {
        let table = RawTable::new(vec![Column::new(
            "prediction",
            ColumnData::Int(vec![Some(0)]),
        )])
        .unwrap();
        let mut out = Vec::new();
        write_frauds(&mut out, &table, &[]).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "prediction,period,state_full,date\n"
        );
    }

    #[test]
    fn source_columns_named_like_derived_ones_are_replaced() {
        let table = RawTable::new(vec![
            Column::new("prediction", ColumnData::Int(vec![Some(1)])),
            Column::new("date", ColumnData::Text(vec![Some("stale".to_string())])),
            Column::new("state_full", ColumnData::Text(vec![Some("CA".to_string())])),
        ])
        .unwrap();
        let moment = NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(9, 15, 0)
            .unwrap();
        let frauds = vec![FraudDetail {
            row: 0,
            event_time: moment,
            period: moment,
            amount: 10.0,
            category: None,
            state_full: Some("California".to_string()),
            date: "2024-03-05 09:15".to_string(),
        }];

        let mut out = Vec::new();
        write_frauds(&mut out, &table, &frauds).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert_eq!(
            text,
            "prediction,period,state_full,date\n1,2024-03-05 09:15,California,2024-03-05 09:15\n"
        );
    }
}
