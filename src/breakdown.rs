use std::collections::HashMap;

use crate::models::{LabelCount, Transaction};
use crate::states;

/// Counts per label, highest count first and ties by label.
fn count_labels<I>(labels: I) -> Vec<LabelCount>
where
    I: IntoIterator<Item = String>,
{
    let mut map: HashMap<String, usize> = HashMap::new();
    for label in labels {
        *map.entry(label).or_insert(0) += 1;
    }

    let mut counts: Vec<LabelCount> = map
        .into_iter()
        .map(|(label, count)| LabelCount { label, count })
        .collect();
    counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
    counts
}

pub fn by_category(frauds: &[&Transaction]) -> Vec<LabelCount> {
    count_labels(frauds.iter().filter_map(|t| t.category.clone()))
}

pub fn by_state(frauds: &[&Transaction]) -> Vec<LabelCount> {
    count_labels(
        frauds
            .iter()
            .filter_map(|t| t.state.as_deref().map(states::resolve_state)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn fraud(category: Option<&str>, state: Option<&str>) -> Transaction {
        Transaction {
            row: 0,
            event_time: NaiveDate::from_ymd_opt(2024, 3, 5)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
            amount: 1.0,
            prediction: 1,
            category: category.map(str::to_string),
            state: state.map(str::to_string),
        }
    }

    #[test]
    fn categories_are_counted() {
        let rows = [
            fraud(Some("grocery_pos"), None),
            fraud(Some("shopping_net"), None),
            fraud(Some("grocery_pos"), None),
            fraud(None, None),
        ];
        let refs: Vec<&Transaction> = rows.iter().collect();
        assert_eq!(
            by_category(&refs),
            vec![
                LabelCount {
                    label: "grocery_pos".to_string(),
                    count: 2
                },
                LabelCount {
                    label: "shopping_net".to_string(),
                    count: 1
                },
            ]
        );
    }

    #[test]
    fn states_resolve_and_sort_descending() {
        let rows = [
            fraud(None, Some("ZZ")),
            fraud(None, Some("CA")),
            fraud(None, Some("TX")),
            fraud(None, Some("CA")),
        ];
        let refs: Vec<&Transaction> = rows.iter().collect();
        let states = by_state(&refs);
        assert_eq!(states[0].label, "California");
        assert_eq!(states[0].count, 2);
        assert_eq!(states[1].label, "Texas");
        assert_eq!(states[2].label, "ZZ");
    }

    #[test]
    fn repeated_runs_are_identical() {
        let rows: Vec<Transaction> = ["a", "b", "c", "d"]
            .iter()
            .map(|c| fraud(Some(*c), Some("NV")))
            .collect();
        let refs: Vec<&Transaction> = rows.iter().collect();
        assert_eq!(by_category(&refs), by_category(&refs));
    }
}
