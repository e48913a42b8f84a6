//! Filter and ordering rendering for SQLite
//!
//! Identifiers come from a validated [`TreeConfig`] and are always quoted;
//! values are always bound as positional parameters.

use crate::config::TreeConfig;
use crate::models::{Direction, Filter, OrderBy, SortField};
use libsql::Value;

/// Quote an identifier for SQLite
pub fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier)
}

/// Escape GLOB metacharacters so `prefix` matches literally
///
/// GLOB is used instead of LIKE because LIKE folds ASCII case.
pub fn glob_prefix(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for ch in prefix.chars() {
        match ch {
            '*' => pattern.push_str("[*]"),
            '?' => pattern.push_str("[?]"),
            '[' => pattern.push_str("[[]"),
            other => pattern.push(other),
        }
    }
    pattern.push('*');
    pattern
}

/// Renders queries against one configured table
pub struct SqlRenderer<'a> {
    config: &'a TreeConfig,
}

impl<'a> SqlRenderer<'a> {
    pub fn new(config: &'a TreeConfig) -> Self {
        Self { config }
    }

    pub fn table(&self) -> String {
        quote(&self.config.table)
    }

    pub fn key(&self) -> String {
        quote(&self.config.key_column)
    }

    pub fn parent(&self) -> String {
        quote(&self.config.parent_column)
    }

    pub fn path(&self) -> String {
        quote(&self.config.path_column)
    }

    pub fn depth(&self) -> String {
        quote(&self.config.depth_column)
    }

    pub fn order(&self) -> String {
        quote(&self.config.order_column)
    }

    /// Column list in row-decoding order
    pub fn select_columns(&self) -> String {
        format!(
            "{}, name, {}, {}, {}, {}, properties, created_at, modified_at",
            self.key(),
            self.parent(),
            self.path(),
            self.depth(),
            self.order()
        )
    }

    /// Render a predicate, appending its parameters to `params`
    pub fn where_clause(&self, filter: &Filter, params: &mut Vec<Value>) -> String {
        match filter {
            Filter::All => "1=1".to_string(),
            Filter::KeyEq(key) => {
                params.push(Value::Text(key.clone()));
                format!("{} = ?", self.key())
            }
            Filter::KeyNe(key) => {
                params.push(Value::Text(key.clone()));
                format!("{} <> ?", self.key())
            }
            Filter::KeyIn(keys) if keys.is_empty() => "0=1".to_string(),
            Filter::KeyIn(keys) => format!("{} IN ({})", self.key(), self.bind_keys(keys, params)),
            Filter::KeyNotIn(keys) if keys.is_empty() => "1=1".to_string(),
            Filter::KeyNotIn(keys) => {
                format!("{} NOT IN ({})", self.key(), self.bind_keys(keys, params))
            }
            Filter::ParentIs(None) => format!("{} IS NULL", self.parent()),
            Filter::ParentIs(Some(parent)) => {
                params.push(Value::Text(parent.clone()));
                format!("{} = ?", self.parent())
            }
            Filter::PathPrefix(prefix) => {
                params.push(Value::Text(glob_prefix(prefix)));
                format!("{} GLOB ?", self.path())
            }
            Filter::DepthBetween(min, max) => {
                params.push(Value::Integer(i64::from(*min)));
                params.push(Value::Integer(i64::from(*max)));
                format!("{} BETWEEN ? AND ?", self.depth())
            }
            Filter::OrderAtLeast(order) => self.compare_order(">=", *order, params),
            Filter::OrderBelow(order) => self.compare_order("<", *order, params),
            Filter::OrderAbove(order) => self.compare_order(">", *order, params),
            Filter::And(parts) if parts.is_empty() => "1=1".to_string(),
            Filter::And(parts) => self.join(parts, " AND ", params),
            Filter::Or(parts) if parts.is_empty() => "0=1".to_string(),
            Filter::Or(parts) => self.join(parts, " OR ", params),
        }
    }

    /// `ORDER BY` clause with the deterministic tie-breakers
    pub fn order_clause(&self, order_by: &OrderBy) -> String {
        let direction = match order_by.direction {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        };

        let mut columns = match order_by.field {
            SortField::Order => Vec::new(),
            SortField::Depth => vec![self.depth()],
            SortField::Path => vec![self.path()],
            SortField::Key => vec![self.key()],
        };
        columns.extend([self.order(), "name".to_string(), self.key()]);

        let terms: Vec<String> = columns
            .into_iter()
            .map(|column| format!("{} {}", column, direction))
            .collect();
        format!("ORDER BY {}", terms.join(", "))
    }

    fn bind_keys(&self, keys: &[String], params: &mut Vec<Value>) -> String {
        params.extend(keys.iter().cloned().map(Value::Text));
        vec!["?"; keys.len()].join(", ")
    }

    fn compare_order(&self, op: &str, order: i64, params: &mut Vec<Value>) -> String {
        params.push(Value::Integer(order));
        format!("{} {} ?", self.order(), op)
    }

    fn join(&self, parts: &[Filter], separator: &str, params: &mut Vec<Value>) -> String {
        let rendered: Vec<String> = parts
            .iter()
            .map(|part| self.where_clause(part, params))
            .collect();
        format!("({})", rendered.join(separator))
    }
}
