use std::f64::consts::PI;
use std::fmt::Write;

use crate::models::{Kpis, LabelCount, PeriodRate, ReportView};
use crate::pipeline::DATE_FORMAT;

const CHART_WIDTH: f64 = 880.0;
const LINE_HEIGHT: f64 = 320.0;
const PIE_RADIUS: f64 = 130.0;
const BAR_ROW_HEIGHT: f64 = 22.0;
const MARGIN: f64 = 48.0;

const PALETTE: [&str; 10] = [
    "#4e79a7", "#f28e2b", "#e15759", "#76b7b2", "#59a14f", "#edc948", "#b07aa1", "#ff9da7",
    "#9c755f", "#bab0ac",
];

pub fn build_report(view: &ReportView) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "<!DOCTYPE html>");
    let _ = writeln!(output, "<html lang=\"en\">");
    let _ = writeln!(output, "<head>");
    let _ = writeln!(output, "<meta charset=\"UTF-8\">");
    let _ = writeln!(output, "<title>Fraud Detection Report</title>");
    let _ = writeln!(output, "<style>{}</style>", inline_css());
    let _ = writeln!(output, "</head>");
    let _ = writeln!(output, "<body>");
    let _ = writeln!(output, "<h1>Fraud Detection Report</h1>");
    let _ = writeln!(
        output,
        "<p class=\"meta\">Scored transactions from {} (generated {})</p>",
        html_escape(&view.source),
        view.generated_at.format("%Y-%m-%d %H:%M UTC")
    );

    for warning in &view.warnings {
        let _ = writeln!(output, "<p class=\"warning\">{}</p>", html_escape(warning));
    }

    output.push_str(&render_kpis(&view.kpis));

    let _ = writeln!(
        output,
        "<h2>Fraud rate per {}</h2>",
        view.granularity.label()
    );
    output.push_str(&render_line_chart(&view.series));

    let _ = writeln!(output, "<div class=\"split\">");
    let _ = writeln!(output, "<section><h2>Frauds by category</h2>");
    output.push_str(&render_pie_chart(&view.by_category));
    let _ = writeln!(output, "</section>");
    let _ = writeln!(output, "<section><h2>Frauds by state</h2>");
    output.push_str(&render_bar_chart(&view.by_state));
    let _ = writeln!(output, "</section>");
    let _ = writeln!(output, "</div>");

    let _ = writeln!(output, "<h2>Detected frauds</h2>");
    output.push_str(&render_fraud_table(view));

    let _ = writeln!(
        output,
        "<footer>render {} &middot; dropped rows: {} bad time, {} invalid, {} without period</footer>",
        view.render_id, view.dropped.bad_time, view.dropped.invalid, view.dropped.no_period
    );
    let _ = writeln!(output, "</body>");
    let _ = writeln!(output, "</html>");

    output
}

/// Plain-text KPI block for the terminal.
pub fn build_summary(view: &ReportView) -> String {
    let mut output = String::new();
    let kpis = &view.kpis;

    let _ = writeln!(output, "Fraud report for {}", view.source);
    let _ = writeln!(output, "- transactions:      {}", kpis.transactions);
    let _ = writeln!(output, "- frauds:            {}", kpis.frauds);
    let _ = writeln!(output, "- fraud rate:        {:.2}%", kpis.fraud_rate);
    let _ = writeln!(output, "- amount analyzed:   {:.0}", kpis.total_amount);
    let _ = writeln!(output, "- amount defrauded:  {:.0}", kpis.fraud_amount);

    for warning in &view.warnings {
        let _ = writeln!(output, "warning: {warning}");
    }

    output
}

pub fn build_series_listing(series: &[PeriodRate]) -> String {
    let mut output = String::new();
    if series.is_empty() {
        let _ = writeln!(output, "No periods to show.");
    }
    for point in series {
        let _ = writeln!(
            output,
            "{}  {:>6.2}%  ({} of {})",
            point.period.format(DATE_FORMAT),
            point.fraud_rate,
            point.frauds,
            point.transactions
        );
    }
    output
}

fn render_kpis(kpis: &Kpis) -> String {
    let tiles = [
        ("Transactions", group_thousands(kpis.transactions as f64)),
        ("Frauds", group_thousands(kpis.frauds as f64)),
        ("Fraud rate", format!("{:.2}%", kpis.fraud_rate)),
        ("Amount analyzed", group_thousands(kpis.total_amount)),
        ("Amount defrauded", group_thousands(kpis.fraud_amount)),
    ];

    let mut output = String::from("<div class=\"kpis\">\n");
    for (title, value) in tiles {
        let _ = writeln!(
            output,
            "<div class=\"metric-card\"><div class=\"metric-title\">{title}</div><div class=\"metric-value\">{value}</div></div>"
        );
    }
    output.push_str("</div>\n");
    output
}

fn render_line_chart(series: &[PeriodRate]) -> String {
    if series.is_empty() {
        return "<p class=\"empty\">No dated transactions.</p>\n".to_string();
    }

    let first = series[0].period.and_utc().timestamp() as f64;
    let last = series[series.len() - 1].period.and_utc().timestamp() as f64;
    let span = (last - first).max(1.0);
    let max_rate = series
        .iter()
        .map(|p| p.fraud_rate)
        .fold(0.0_f64, f64::max)
        .max(1.0);
    let plot_w = CHART_WIDTH - 2.0 * MARGIN;
    let plot_h = LINE_HEIGHT - 2.0 * MARGIN;

    let points: Vec<(f64, f64, &PeriodRate)> = series
        .iter()
        .map(|p| {
            let x = if series.len() == 1 {
                MARGIN + plot_w / 2.0
            } else {
                MARGIN + (p.period.and_utc().timestamp() as f64 - first) / span * plot_w
            };
            let y = MARGIN + plot_h - p.fraud_rate / max_rate * plot_h;
            (x, y, p)
        })
        .collect();

    let mut output = String::new();
    let _ = writeln!(
        output,
        "<svg class=\"chart\" viewBox=\"0 0 {CHART_WIDTH} {LINE_HEIGHT}\" role=\"img\">"
    );
    let _ = writeln!(
        output,
        "<line x1=\"{MARGIN}\" y1=\"{y}\" x2=\"{x}\" y2=\"{y}\" class=\"axis\"/>",
        x = CHART_WIDTH - MARGIN,
        y = MARGIN + plot_h
    );
    let _ = writeln!(
        output,
        "<text x=\"4\" y=\"{MARGIN}\" class=\"tick\">{max_rate:.1}%</text>"
    );
    let path: Vec<String> = points
        .iter()
        .map(|(x, y, _)| format!("{x:.1},{y:.1}"))
        .collect();
    let _ = writeln!(
        output,
        "<polyline points=\"{}\" class=\"line\"/>",
        path.join(" ")
    );
    for (x, y, point) in &points {
        let _ = writeln!(
            output,
            "<circle cx=\"{x:.1}\" cy=\"{y:.1}\" r=\"3\"><title>{}: {:.2}%</title></circle>",
            point.period.format(DATE_FORMAT),
            point.fraud_rate
        );
    }
    let _ = writeln!(
        output,
        "<text x=\"{MARGIN}\" y=\"{y}\" class=\"tick\">{}</text>",
        series[0].period.format(DATE_FORMAT),
        y = LINE_HEIGHT - 12.0
    );
    let _ = writeln!(
        output,
        "<text x=\"{x}\" y=\"{y}\" class=\"tick\" text-anchor=\"end\">{}</text>",
        series[series.len() - 1].period.format(DATE_FORMAT),
        x = CHART_WIDTH - MARGIN,
        y = LINE_HEIGHT - 12.0
    );
    let _ = writeln!(output, "</svg>");
    output
}

fn render_pie_chart(counts: &[LabelCount]) -> String {
    let total: usize = counts.iter().map(|c| c.count).sum();
    if total == 0 {
        return "<p class=\"empty\">No categorized frauds.</p>\n".to_string();
    }

    let size = 2.0 * (PIE_RADIUS + 10.0);
    let center = size / 2.0;
    let mut output = String::new();
    let _ = writeln!(
        output,
        "<svg class=\"chart pie\" viewBox=\"0 0 {size} {size}\" role=\"img\">"
    );

    let mut angle = -PI / 2.0;
    for (idx, entry) in counts.iter().enumerate() {
        let share = entry.count as f64 / total as f64;
        let color = PALETTE[idx % PALETTE.len()];
        let tooltip = format!("{}: {:.1}%", html_escape(&entry.label), share * 100.0);

        if counts.len() == 1 {
            let _ = writeln!(
                output,
                "<circle cx=\"{center}\" cy=\"{center}\" r=\"{PIE_RADIUS}\" fill=\"{color}\"><title>{tooltip}</title></circle>"
            );
            break;
        }

        let sweep = share * 2.0 * PI;
        let (x1, y1) = polar(center, angle);
        let (x2, y2) = polar(center, angle + sweep);
        let large_arc = u8::from(sweep > PI);
        let _ = writeln!(
            output,
            "<path d=\"M{center},{center} L{x1:.2},{y1:.2} A{PIE_RADIUS},{PIE_RADIUS} 0 {large_arc} 1 {x2:.2},{y2:.2} Z\" fill=\"{color}\"><title>{tooltip}</title></path>"
        );
        angle += sweep;
    }
    let _ = writeln!(output, "</svg>");

    let _ = writeln!(output, "<ul class=\"legend\">");
    for (idx, entry) in counts.iter().enumerate() {
        let _ = writeln!(
            output,
            "<li><span style=\"background:{}\"></span>{} ({:.1}%)</li>",
            PALETTE[idx % PALETTE.len()],
            html_escape(&entry.label),
            entry.count as f64 / total as f64 * 100.0
        );
    }
    let _ = writeln!(output, "</ul>");
    output
}

fn polar(center: f64, angle: f64) -> (f64, f64) {
    (
        center + PIE_RADIUS * angle.cos(),
        center + PIE_RADIUS * angle.sin(),
    )
}

fn render_bar_chart(counts: &[LabelCount]) -> String {
    let Some(max) = counts.iter().map(|c| c.count).max() else {
        return "<p class=\"empty\">No frauds with a state.</p>\n".to_string();
    };

    let label_w = 140.0;
    let bar_w = CHART_WIDTH / 2.0 - label_w - 40.0;
    let height = counts.len() as f64 * BAR_ROW_HEIGHT + 10.0;
    let mut output = String::new();
    let _ = writeln!(
        output,
        "<svg class=\"chart\" viewBox=\"0 0 {w} {height}\" role=\"img\">",
        w = CHART_WIDTH / 2.0
    );
    for (idx, entry) in counts.iter().enumerate() {
        let y = idx as f64 * BAR_ROW_HEIGHT + 5.0;
        let width = (entry.count as f64 / max.max(1) as f64 * bar_w).max(1.0);
        let label = html_escape(&entry.label);
        let _ = writeln!(
            output,
            "<text x=\"{lx}\" y=\"{ty}\" class=\"tick\" text-anchor=\"end\">{label}</text>",
            lx = label_w - 6.0,
            ty = y + BAR_ROW_HEIGHT * 0.65
        );
        let _ = writeln!(
            output,
            "<rect x=\"{label_w}\" y=\"{y}\" width=\"{width:.1}\" height=\"{h}\" class=\"bar\"><title>{label}: {count}</title></rect>",
            h = BAR_ROW_HEIGHT - 4.0,
            count = entry.count
        );
        let _ = writeln!(
            output,
            "<text x=\"{vx:.1}\" y=\"{ty}\" class=\"tick\">{count}</text>",
            vx = label_w + width + 4.0,
            ty = y + BAR_ROW_HEIGHT * 0.65,
            count = entry.count
        );
    }
    let _ = writeln!(output, "</svg>");
    output
}

fn render_fraud_table(view: &ReportView) -> String {
    if view.frauds.is_empty() {
        return "<p class=\"empty\">No transaction was flagged as fraud.</p>\n".to_string();
    }

    let mut output = String::new();
    let _ = writeln!(output, "<table>");
    let _ = writeln!(
        output,
        "<thead><tr><th>Row</th><th>Date</th><th>Period</th><th>Amount</th><th>Category</th><th>State</th></tr></thead>"
    );
    let _ = writeln!(output, "<tbody>");
    for detail in &view.frauds {
        let _ = writeln!(
            output,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{:.2}</td><td>{}</td><td>{}</td></tr>",
            detail.row,
            html_escape(&detail.date),
            detail.period.format(DATE_FORMAT),
            detail.amount,
            html_escape(detail.category.as_deref().unwrap_or("")),
            html_escape(detail.state_full.as_deref().unwrap_or(""))
        );
    }
    let _ = writeln!(output, "</tbody>");
    let _ = writeln!(output, "</table>");
    output
}

/// `1234567.8` -> `1,234,568`
fn group_thousands(value: f64) -> String {
    let rounded = format!("{:.0}", value.abs());
    let mut grouped = String::new();
    for (idx, ch) in rounded.chars().enumerate() {
        if idx > 0 && (rounded.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if value < 0.0 && rounded != "0" {
        grouped.insert(0, '-');
    }
    grouped
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn inline_css() -> &'static str {
    r#"
body { font-family: 'Segoe UI', sans-serif; margin: 24px auto; max-width: 1100px; color: #111; }
.meta { color: #666; }
.warning { background: #fff4e5; border-left: 4px solid #f28e2b; padding: 8px 12px; }
.kpis { display: grid; grid-template-columns: repeat(5, 1fr); gap: 12px; }
.metric-card { padding: 15px; border-radius: 12px; background-color: #f5f7fa; text-align: center; box-shadow: 0 2px 5px rgba(0,0,0,0.1); }
.metric-title { font-size: 14px; color: #666; }
.metric-value { font-size: 24px; font-weight: bold; }
.metric-card:last-child .metric-value { color: red; }
.split { display: grid; grid-template-columns: 1fr 1fr; gap: 24px; }
.chart { width: 100%; height: auto; }
.pie { max-width: 320px; }
.axis { stroke: #999; }
.line { fill: none; stroke: #4e79a7; stroke-width: 2; }
circle { fill: #4e79a7; }
.bar { fill: red; }
.tick { font-size: 11px; fill: #555; }
.legend { list-style: none; padding: 0; font-size: 13px; }
.legend span { display: inline-block; width: 10px; height: 10px; margin-right: 6px; }
table { border-collapse: collapse; width: 100%; font-size: 13px; }
th, td { border-bottom: 1px solid #ddd; padding: 4px 8px; text-align: left; }
.empty { color: #888; font-style: italic; }
footer { margin-top: 32px; font-size: 12px; color: gray; }
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DroppedRows, FraudDetail, Granularity};
    use chrono::{DateTime, NaiveDate};
    use uuid::Uuid;

    fn view() -> ReportView {
        let period = NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        ReportView {
            render_id: Uuid::nil(),
            generated_at: DateTime::from_timestamp(1_710_000_000, 0).unwrap(),
            source: "s3://bucket/reports/full/scored_payments.parquet".to_string(),
            granularity: Granularity::Day,
            kpis: Kpis {
                transactions: 12_345,
                frauds: 2,
                fraud_rate: 100.0 * 2.0 / 12_345.0,
                total_amount: 1_234_567.8,
                fraud_amount: 320.0,
            },
            series: vec![PeriodRate {
                period,
                transactions: 12_345,
                frauds: 2,
                fraud_rate: 100.0 * 2.0 / 12_345.0,
            }],
            by_category: vec![
                LabelCount {
                    label: "shopping_net".to_string(),
                    count: 1,
                },
                LabelCount {
                    label: "<script>".to_string(),
                    count: 1,
                },
            ],
            by_state: vec![LabelCount {
                label: "California".to_string(),
                count: 2,
            }],
            frauds: vec![FraudDetail {
                row: 7,
                event_time: period,
                period,
                amount: 160.0,
                category: Some("shopping_net".to_string()),
                state_full: Some("California".to_string()),
                date: "2024-03-05 00:00".to_string(),
            }],
            dropped: DroppedRows::default(),
            warnings: vec![],
        }
    }

    #[test]
    fn report_contains_every_section() {
        let html = build_report(&view());
        assert!(html.contains("Fraud rate per day"));
        assert!(html.contains("Frauds by category"));
        assert!(html.contains("Frauds by state"));
        assert!(html.contains("Detected frauds"));
        assert!(html.contains("12,345"));
        assert!(html.contains("1,234,568"));
        assert!(html.contains("California"));
        assert!(html.contains("<polyline"));
    }

    #[test]
    fn labels_are_escaped() {
        let html = build_report(&view());
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn warnings_are_shown() {
        let mut view = view();
        view.warnings.push("Temporal columns unusable.".to_string());
        assert!(build_report(&view).contains("class=\"warning\""));
        assert!(build_summary(&view).contains("warning: Temporal columns unusable."));
    }

    #[test]
    fn empty_views_render_placeholders() {
        let mut view = view();
        view.series.clear();
        view.by_category.clear();
        view.by_state.clear();
        view.frauds.clear();
        let html = build_report(&view);
        assert!(html.contains("No dated transactions."));
        assert!(html.contains("No categorized frauds."));
        assert!(html.contains("No frauds with a state."));
        assert!(html.contains("No transaction was flagged as fraud."));
    }

    #[test]
    fn thousands_are_grouped() {
        assert_eq!(group_thousands(0.0), "0");
        assert_eq!(group_thousands(999.0), "999");
        assert_eq!(group_thousands(1000.0), "1,000");
        assert_eq!(group_thousands(1_234_567.8), "1,234,568");
    }

    #[test]
    fn summary_lists_kpis() {
        let summary = build_summary(&view());
        assert!(summary.contains("transactions:      12345"));
        assert!(summary.contains("fraud rate:        0.02%"));
    }
}
