use serde_json::{Map, Value};

use super::filter_order::FilterOrder;
use super::types::FilterData;

/// In-process evaluation of a [`FilterData`] against document field maps.
pub struct FilterWhere;

impl FilterWhere {
    /// Every condition must equal the field value. Numbers compare by value, so
    /// `1` matches `1.0`.
    pub fn matches(filter: &FilterData, fields: &Map<String, Value>) -> bool {
        filter.where_clause.iter().all(|(field, expected)| {
            match (fields.get(field), expected) {
                (Some(Value::Number(a)), Value::Number(b)) => a.as_f64() == b.as_f64(),
                (Some(actual), expected) => actual == expected,
                (None, Value::Null) => true,
                (None, _) => false,
            }
        })
    }

    pub fn sort(filter: &FilterData, rows: &mut [Map<String, Value>]) {
        if filter.order.is_empty() {
            return;
        }
        rows.sort_by(|a, b| {
            for info in &filter.order {
                let ord = FilterOrder::compare_directed(a.get(&info.field), b.get(&info.field), info.sort);
                if ord.is_ne() {
                    return ord;
                }
            }
            std::cmp::Ordering::Equal
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn equality_matching() {
        let filter = FilterData::new().where_eq("employee", "E1").where_eq("is_active", 1);
        assert!(FilterWhere::matches(&filter, &row(json!({"employee": "E1", "is_active": 1.0}))));
        assert!(!FilterWhere::matches(&filter, &row(json!({"employee": "E2", "is_active": 1}))));
        assert!(!FilterWhere::matches(&filter, &row(json!({"employee": "E1"}))));
    }

    #[test]
    fn sorts_descending() {
        let filter = FilterData::new().order_by("posting_date desc").unwrap();
        let mut rows = vec![
            row(json!({"posting_date": "2024-01-03"})),
            row(json!({"posting_date": "2024-03-01"})),
            row(json!({"posting_date": "2024-02-10"})),
        ];
        FilterWhere::sort(&filter, &mut rows);
        let dates: Vec<_> = rows.iter().map(|r| r["posting_date"].as_str().unwrap()).collect();
        assert_eq!(dates, vec!["2024-03-01", "2024-02-10", "2024-01-03"]);
    }

    #[test]
    fn rows_without_the_field_come_last() {
        for order in ["posting_date asc", "posting_date desc"] {
            let filter = FilterData::new().order_by(order).unwrap();
            let mut rows = vec![
                row(json!({"name": "a"})),
                row(json!({"name": "b", "posting_date": "2024-01-03"})),
                row(json!({"name": "c", "posting_date": null})),
                row(json!({"name": "d", "posting_date": "2024-03-01"})),
            ];
            FilterWhere::sort(&filter, &mut rows);
            let names: Vec<_> = rows.iter().map(|r| r["name"].as_str().unwrap()).collect();
            assert_eq!(&names[2..], &["a", "c"], "{}", order);
        }
    }
}
