/// Configuration for the tree storage layout
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// SQLite identifiers are spliced into statements, so only plain names are accepted
fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("identifier pattern is valid")
    })
}

/// Table and column names used by `SqliteStore`
///
/// Every field has a default, so partial JSON such as
/// `{"table": "folders", "order_column": "position"}` is a valid configuration.
/// Whether sibling ordering is maintained is not configured here: it is the
/// ordering mode type parameter of [`crate::services::TreeService`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// Table holding the tree records
    pub table: String,

    /// Primary key column
    pub key_column: String,

    /// Parent reference column (NULL for roots)
    pub parent_column: String,

    /// Materialized path column
    pub path_column: String,

    /// Cached depth column
    pub depth_column: String,

    /// Sibling order column
    pub order_column: String,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            table: "nodes".to_string(),
            key_column: "id".to_string(),
            parent_column: "parent_id".to_string(),
            path_column: "path".to_string(),
            depth_column: "depth".to_string(),
            order_column: "ordering".to_string(),
        }
    }
}

/// Columns every table carries besides the configurable ones
const FIXED_COLUMNS: [&str; 4] = ["name", "properties", "created_at", "modified_at"];

impl TreeConfig {
    /// Builder-style table override
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Builder-style order column override
    pub fn with_order_column(mut self, column: impl Into<String>) -> Self {
        self.order_column = column.into();
        self
    }

    /// Parse a configuration from JSON and validate it
    pub fn from_json(json: &str) -> Result<Self, String> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| format!("invalid tree config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Configurable column names in declaration order
    pub fn columns(&self) -> [&str; 5] {
        [
            &self.key_column,
            &self.parent_column,
            &self.path_column,
            &self.depth_column,
            &self.order_column,
        ]
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !identifier_pattern().is_match(&self.table) {
            return Err(format!("table '{}' is not a valid identifier", self.table));
        }

        let columns = self.columns();
        for column in columns {
            if !identifier_pattern().is_match(column) {
                return Err(format!("column '{}' is not a valid identifier", column));
            }

            if FIXED_COLUMNS
                .iter()
                .any(|fixed| fixed.eq_ignore_ascii_case(column))
            {
                return Err(format!("column '{}' is reserved", column));
            }
        }

        for (i, column) in columns.iter().enumerate() {
            if columns[i + 1..]
                .iter()
                .any(|other| other.eq_ignore_ascii_case(column))
            {
                return Err(format!("column '{}' is configured twice", column));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = TreeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.parent_column, "parent_id");
        assert_eq!(config.order_column, "ordering");
    }

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let config = TreeConfig::from_json(r#"{"table": "folders", "order_column": "position"}"#)
            .unwrap();
        assert_eq!(config.table, "folders");
        assert_eq!(config.order_column, "position");
        assert_eq!(config.path_column, "path");
    }

    #[test]
    fn test_rejects_injection_and_duplicates() {
        let config = TreeConfig::default().with_table("nodes; DROP TABLE x");
        assert!(config.validate().is_err());

        let config = TreeConfig::default().with_order_column("depth");
        assert!(config.validate().unwrap_err().contains("twice"));

        let config = TreeConfig::default().with_order_column("name");
        assert!(config.validate().unwrap_err().contains("reserved"));
    }
}
