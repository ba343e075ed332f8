use std::cmp::Ordering;

use serde_json::Value;

use super::error::FilterError;
use super::types::{validate_field_name, FilterOrderInfo, SortDirection};

fn is_missing(v: Option<&Value>) -> bool {
    matches!(v, None | Some(Value::Null))
}

pub struct FilterOrder;

impl FilterOrder {
    pub fn parse(s: &str) -> Result<Vec<FilterOrderInfo>, FilterError> {
        // split on commas, then each token into field and direction
        let mut out = Vec::new();
        for part in s.split(',') {
            let trimmed = part.trim();
            if trimmed.is_empty() {
                continue;
            }
            let mut it = trimmed.split_whitespace();
            if let Some(field) = it.next() {
                validate_field_name(field)?;
                let sort = match it.next() {
                    None => SortDirection::Asc,
                    Some(dir) if dir.eq_ignore_ascii_case("asc") => SortDirection::Asc,
                    Some(dir) if dir.eq_ignore_ascii_case("desc") => SortDirection::Desc,
                    Some(dir) => return Err(FilterError::InvalidDirection(dir.to_string())),
                };
                out.push(FilterOrderInfo { field: field.to_string(), sort });
            }
        }
        Ok(out)
    }

    /// Compare two field values in jsonb order: null, then strings, numbers,
    /// booleans, arrays and objects, each within its own kind.
    pub fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
        fn rank(v: Option<&Value>) -> u8 {
            match v {
                None | Some(Value::Null) => 0,
                Some(Value::String(_)) => 1,
                Some(Value::Number(_)) => 2,
                Some(Value::Bool(_)) => 3,
                Some(Value::Array(_)) => 4,
                Some(Value::Object(_)) => 5,
            }
        }

        match (a, b) {
            (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
            (Some(Value::Number(x)), Some(Value::Number(y))) => {
                let x = x.as_f64().unwrap_or(0.0);
                let y = y.as_f64().unwrap_or(0.0);
                x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            }
            (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
            _ => rank(a).cmp(&rank(b)),
        }
    }

    /// One sort key. Missing and null values go last in both directions, as
    /// `NULLS LAST` does in the Postgres store.
    pub fn compare_directed(a: Option<&Value>, b: Option<&Value>, sort: SortDirection) -> Ordering {
        match (is_missing(a), is_missing(b)) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => match sort {
                SortDirection::Asc => Self::compare(a, b),
                SortDirection::Desc => Self::compare(a, b).reverse(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_multiple_columns() {
        let order = FilterOrder::parse("posting_date desc, name").unwrap();
        assert_eq!(order.len(), 2);
        assert_eq!(order[0].field, "posting_date");
        assert_eq!(order[0].sort, SortDirection::Desc);
        assert_eq!(order[1].sort, SortDirection::Asc);
    }

    #[test]
    fn rejects_unknown_direction() {
        assert_eq!(
            FilterOrder::parse("name sideways"),
            Err(FilterError::InvalidDirection("sideways".to_string()))
        );
    }

    #[test]
    fn compares_mixed_values() {
        assert_eq!(FilterOrder::compare(Some(&json!(2)), Some(&json!(10))), Ordering::Less);
        assert_eq!(
            FilterOrder::compare(Some(&json!("2024-02-01")), Some(&json!("2024-01-31"))),
            Ordering::Greater
        );
        assert_eq!(FilterOrder::compare(None, Some(&json!("a"))), Ordering::Less);
        assert_eq!(FilterOrder::compare(Some(&json!("z")), Some(&json!(1))), Ordering::Less);
    }

    #[test]
    fn missing_values_sort_last_both_ways() {
        for sort in [SortDirection::Asc, SortDirection::Desc] {
            assert_eq!(FilterOrder::compare_directed(None, Some(&json!("a")), sort), Ordering::Greater);
            assert_eq!(FilterOrder::compare_directed(Some(&json!(1)), Some(&Value::Null), sort), Ordering::Less);
            assert_eq!(FilterOrder::compare_directed(None, Some(&Value::Null), sort), Ordering::Equal);
        }
        assert_eq!(
            FilterOrder::compare_directed(Some(&json!(1)), Some(&json!(2)), SortDirection::Desc),
            Ordering::Greater
        );
    }
}
