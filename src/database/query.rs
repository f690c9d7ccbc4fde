//! Query parameters and result rows.

use crate::constants::{DATABASE_NAME_PLACEHOLDER, DATABASE_NAME_SQL_TYPE};
use crate::database::types::SqlValue;
use crate::error::ProbeError;
use tiberius::QueryStream;
use tracing::debug;

/// A named parameter bound through the driver, never spliced into SQL text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryParam {
    /// Name including the `@` prefix.
    pub name: String,
    /// SQL type used to declare the parameter.
    pub sql_type: String,
    /// Value; `None` binds NULL.
    pub value: Option<String>,
}

impl QueryParam {
    /// The `@DatabaseName` parameter.
    pub fn database_name(value: Option<&str>) -> Self {
        Self {
            name: DATABASE_NAME_PLACEHOLDER.to_string(),
            sql_type: DATABASE_NAME_SQL_TYPE.to_string(),
            value: value.map(String::from),
        }
    }
}

/// Parameters a query needs, based on the placeholders it mentions.
pub fn params_for(query: &str, database: Option<&str>) -> Vec<QueryParam> {
    if query.contains(DATABASE_NAME_PLACEHOLDER) {
        vec![QueryParam::database_name(database)]
    } else {
        Vec::new()
    }
}

/// Prefix `query` with declarations that copy positional driver parameters
/// (`@P1`, `@P2`, ...) into the named variables the query refers to.
pub fn declare_named_params(query: &str, params: &[QueryParam]) -> String {
    if params.is_empty() {
        return query.to_string();
    }

    let mut statement = String::new();
    for (idx, param) in params.iter().enumerate() {
        statement.push_str(&format!(
            "DECLARE {} {} = @P{};\n",
            param.name,
            param.sql_type,
            idx + 1
        ));
    }
    statement.push_str(query);
    statement
}

/// Bracket-quote a database name for `USE`.
pub fn quote_database_name(name: &str) -> Result<String, ProbeError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ProbeError::config("Database name cannot be empty"));
    }
    Ok(format!("[{}]", trimmed.replace(']', "]]")))
}

/// One row of a result set, fields in column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultRow {
    fields: Vec<(String, SqlValue)>,
}

impl ResultRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field.
    pub fn push(&mut self, name: impl Into<String>, value: SqlValue) {
        self.fields.push((name.into(), value));
    }

    /// Builder-style `push`.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.push(name, value.into());
        self
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn name(&self, idx: usize) -> Option<&str> {
        self.fields.get(idx).map(|(name, _)| name.as_str())
    }

    pub fn value(&self, idx: usize) -> Option<&SqlValue> {
        self.fields.get(idx).map(|(_, value)| value)
    }

    /// First field with the given name, compared case-insensitively.
    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        self.fields
            .iter()
            .find(|(field, _)| field.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }
}

/// Drain a query stream into rows, across all result sets.
pub async fn collect_rows(mut stream: QueryStream<'_>) -> Result<Vec<ResultRow>, ProbeError> {
    use futures_util::stream::TryStreamExt;

    let mut columns: Vec<String> = Vec::new();
    let mut rows = Vec::new();

    while let Some(item) = stream.try_next().await? {
        match item {
            tiberius::QueryItem::Metadata(meta) => {
                columns = meta
                    .columns()
                    .iter()
                    .map(|col| col.name().to_string())
                    .collect();
            }
            tiberius::QueryItem::Row(row) => {
                let mut result_row = ResultRow::new();
                for (idx, name) in columns.iter().enumerate() {
                    result_row.push(name.clone(), SqlValue::from_row(&row, idx));
                }
                rows.push(result_row);
            }
        }
    }

    debug!("Query returned {} rows", rows.len());
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_for_placeholder() {
        let params = params_for("SELECT 1 WHERE name = @DatabaseName", Some("master"));
        assert_eq!(params, vec![QueryParam::database_name(Some("master"))]);
        assert!(params_for("SELECT 1", Some("master")).is_empty());
    }

    #[test]
    fn test_declare_named_params() {
        let params = vec![QueryParam::database_name(Some("x'; DROP TABLE t;--"))];
        let statement = declare_named_params("SELECT @DatabaseName", &params);
        assert_eq!(
            statement,
            "DECLARE @DatabaseName nvarchar(128) = @P1;\nSELECT @DatabaseName"
        );
        assert!(!statement.contains("DROP"));
    }

    #[test]
    fn test_declare_without_params_is_identity() {
        assert_eq!(declare_named_params("SELECT 1", &[]), "SELECT 1");
    }

    #[test]
    fn test_quote_database_name() {
        assert_eq!(quote_database_name("master").unwrap(), "[master]");
        assert_eq!(quote_database_name("odd]name").unwrap(), "[odd]]name]");
        assert_eq!(quote_database_name("with.dot").unwrap(), "[with.dot]");
        assert!(quote_database_name(" ").is_err());
    }

    #[test]
    fn test_result_row_access() {
        let row = ResultRow::new()
            .with("Server", "S1")
            .with("Database", "master");

        assert_eq!(row.field_count(), 2);
        assert_eq!(row.name(1), Some("Database"));
        assert_eq!(row.value(0), Some(&SqlValue::from("S1")));
        assert_eq!(row.get("database"), Some(&SqlValue::from("master")));
        assert!(row.get("missing").is_none());
        assert!(row.value(2).is_none());
    }
}
