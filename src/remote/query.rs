//! Field-equality query predicates
//!
//! A [`Query`] renders to the workspace query syntax
//! (`name EQ 'x';parent EQ {null};list_root EQ {id EQ '1'}`) and can also be
//! evaluated directly against a record, which is how the in-memory workspace
//! filters.

use serde_json::Value;
use std::fmt;

use super::{value_text, RemoteRecord};

/// Right-hand side of an equality predicate
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    Text(String),
    Null,
    /// The field holds a reference matching the inner query
    Nested(Box<Query>),
}

/// A conjunction of field-equality predicates
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Eq { field: String, value: QueryValue },
    And(Vec<Query>),
}

impl Query {
    /// `field EQ 'value'`
    pub fn eq(field: &str, value: impl Into<String>) -> Self {
        Query::Eq {
            field: field.to_string(),
            value: QueryValue::Text(value.into()),
        }
    }

    /// `field EQ {null}`
    pub fn is_null(field: &str) -> Self {
        Query::Eq {
            field: field.to_string(),
            value: QueryValue::Null,
        }
    }

    /// `field EQ {inner}`
    pub fn nested(field: &str, inner: Query) -> Self {
        Query::Eq {
            field: field.to_string(),
            value: QueryValue::Nested(Box::new(inner)),
        }
    }

    pub fn and(self, other: Query) -> Self {
        match self {
            Query::And(mut parts) => {
                parts.push(other);
                Query::And(parts)
            }
            first => Query::And(vec![first, other]),
        }
    }

    /// Evaluate the predicate against a record
    pub fn matches(&self, record: &RemoteRecord) -> bool {
        match self {
            Query::And(parts) => parts.iter().all(|q| q.matches(record)),
            Query::Eq { field, value } => {
                let actual = record.get(field);
                match value {
                    QueryValue::Null => matches!(actual, None | Some(Value::Null)),
                    QueryValue::Text(expected) => {
                        actual.and_then(value_text).as_deref() == Some(expected.as_str())
                    }
                    QueryValue::Nested(inner) => match actual {
                        Some(Value::Object(map)) => {
                            inner.matches(&RemoteRecord::new(map.clone()))
                        }
                        _ => false,
                    },
                }
            }
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::And(parts) => {
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        f.write_str(";")?;
                    }
                    write!(f, "{}", part)?;
                }
                Ok(())
            }
            Query::Eq { field, value } => match value {
                QueryValue::Text(s) => write!(f, "{} EQ '{}'", field, escape_literal(s)),
                QueryValue::Null => write!(f, "{} EQ {{null}}", field),
                QueryValue::Nested(inner) => write!(f, "{} EQ {{{}}}", field, inner),
            },
        }
    }
}

/// Quote and backslash characters must be escaped inside query literals
fn escape_literal(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_simple() {
        assert_eq!(Query::eq("name", "Login").to_string(), "name EQ 'Login'");
        assert_eq!(Query::is_null("parent").to_string(), "parent EQ {null}");
    }

    #[test]
    fn test_render_nested_and() {
        let q = Query::nested("list_root", Query::eq("id", "1001")).and(Query::eq("name", "High"));
        assert_eq!(q.to_string(), "list_root EQ {id EQ '1001'};name EQ 'High'");
    }

    #[test]
    fn test_render_escapes_quotes() {
        assert_eq!(Query::eq("name", "O'Brien").to_string(), "name EQ 'O\\'Brien'");
    }

    #[test]
    fn test_matches() {
        let record = RemoteRecord::from_json(json!({
            "id": "12",
            "name": "High",
            "parent": null,
            "list_root": {"id": "1001", "type": "list_node"}
        }));

        assert!(Query::eq("name", "High").matches(&record));
        assert!(!Query::eq("name", "Low").matches(&record));
        assert!(Query::is_null("parent").matches(&record));
        assert!(Query::is_null("missing").matches(&record));
        assert!(!Query::is_null("name").matches(&record));
        assert!(Query::nested("list_root", Query::eq("id", "1001"))
            .and(Query::eq("name", "High"))
            .matches(&record));
        assert!(!Query::nested("list_root", Query::eq("id", "9")).matches(&record));
        assert!(!Query::nested("name", Query::eq("id", "9")).matches(&record));
    }
}
