use crate::error::CoreError;
use crate::value::SqlValue;
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::ser::{Serialize, SerializeMap, Serializer};

static NULL_CELL: SqlValue = SqlValue::Null;

/// One result row: column names paired with values, in select-list order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    cells: Vec<(String, SqlValue)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, column: impl Into<String>, value: impl Into<SqlValue>) {
        self.cells.push((column.into(), value.into()));
    }

    /// Builder-style `push`, handy for fixtures.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.push(column, value);
        self
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.cells
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(name, _)| name.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &SqlValue> {
        self.cells.iter().map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    fn require(&self, column: &str) -> Result<&SqlValue, CoreError> {
        self.get(column)
            .ok_or_else(|| CoreError::MissingColumn(column.to_string()))
    }

    fn mismatch(column: &str, expected: &'static str, found: &SqlValue) -> CoreError {
        CoreError::UnexpectedType {
            column: column.to_string(),
            expected,
            found: found.type_name(),
        }
    }

    /// Reads an integer column. `NULL` is reported as a type mismatch.
    pub fn i64(&self, column: &str) -> Result<i64, CoreError> {
        let value = self.require(column)?;
        value
            .as_i64()
            .ok_or_else(|| Self::mismatch(column, "integer", value))
    }

    /// Reads a numeric column as a decimal, treating `NULL` as zero (aggregates over
    /// empty sets come back as `NULL`).
    pub fn decimal_or_zero(&self, column: &str) -> Result<Decimal, CoreError> {
        let value = self.require(column)?;
        if value.is_null() {
            return Ok(Decimal::ZERO);
        }
        value
            .as_decimal()
            .ok_or_else(|| Self::mismatch(column, "decimal", value))
    }

    /// Reads an unsigned id or counter column.
    pub fn u64(&self, column: &str) -> Result<u64, CoreError> {
        let value = self.require(column)?;
        value
            .as_i64()
            .and_then(|i| u64::try_from(i).ok())
            .or_else(|| value.as_decimal().and_then(|d| d.to_u64()))
            .ok_or_else(|| Self::mismatch(column, "unsigned integer", value))
    }

    pub fn f64_or_zero(&self, column: &str) -> Result<f64, CoreError> {
        let value = self.require(column)?;
        if value.is_null() {
            return Ok(0.0);
        }
        value
            .as_f64()
            .ok_or_else(|| Self::mismatch(column, "number", value))
    }

    pub fn datetime(&self, column: &str) -> Result<NaiveDateTime, CoreError> {
        match self.require(column)? {
            SqlValue::DateTime(dt) => Ok(*dt),
            other => Err(Self::mismatch(column, "datetime", other)),
        }
    }

    /// Reads a nullable text column.
    pub fn optional_text(&self, column: &str) -> Result<Option<&str>, CoreError> {
        match self.require(column)? {
            SqlValue::Null => Ok(None),
            SqlValue::Text(s) => Ok(Some(s)),
            other => Err(Self::mismatch(column, "text", other)),
        }
    }

    pub fn text(&self, column: &str) -> Result<&str, CoreError> {
        let value = self.require(column)?;
        value
            .as_str()
            .ok_or_else(|| Self::mismatch(column, "text", value))
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (name, value) in &self.cells {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// The tabular output of a read-only reporting function.
#[derive(Debug, Clone, PartialEq, Default, serde::Serialize)]
pub struct ReportResult {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl ReportResult {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }

    /// All values of one column, top to bottom. Rows lacking the column yield `Null`.
    pub fn column<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a SqlValue> + 'a {
        self.rows
            .iter()
            .map(move |row| row.get(name).unwrap_or(&NULL_CELL))
    }

    /// Compares two results ignoring row order.
    ///
    /// Engines are free to order tied rows differently between runs, so repeated runs of
    /// a report are compared as multisets of rows.
    pub fn same_rows_unordered(&self, other: &ReportResult) -> bool {
        if self.columns != other.columns || self.rows.len() != other.rows.len() {
            return false;
        }
        let fingerprint = |result: &ReportResult| {
            let mut keys: Vec<String> = result
                .rows
                .iter()
                .map(|row| {
                    row.values()
                        .map(|v| format!("{}:{}", v.type_name(), v))
                        .collect::<Vec<_>>()
                        .join("\u{1f}")
                })
                .collect();
            keys.sort();
            keys
        };
        fingerprint(self) == fingerprint(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn donor(name: &str, total: Decimal) -> Row {
        Row::new().with("username", name).with("total_donated", total)
    }

    #[test]
    fn typed_accessors_report_missing_and_mismatched_columns() {
        let row = Row::new().with("total", 12_i64).with("label", "Tech");
        assert_eq!(row.i64("total").unwrap(), 12);
        assert_eq!(row.text("label").unwrap(), "Tech");
        assert_eq!(
            row.i64("missing").unwrap_err(),
            CoreError::MissingColumn("missing".into())
        );
        assert!(matches!(
            row.i64("label").unwrap_err(),
            CoreError::UnexpectedType { expected: "integer", found: "text", .. }
        ));
    }

    #[test]
    fn ids_and_nullable_text() {
        let row = Row::new()
            .with("log_id", 41_u64)
            .with("user_session", SqlValue::Null)
            .with("page_name", "index");
        assert_eq!(row.u64("log_id").unwrap(), 41);
        assert_eq!(row.optional_text("user_session").unwrap(), None);
        assert_eq!(row.optional_text("page_name").unwrap(), Some("index"));
        assert!(row.datetime("page_name").is_err());
    }

    #[test]
    fn null_aggregates_read_as_zero() {
        let row = Row::new().with("avg_donation", SqlValue::Null);
        assert_eq!(row.decimal_or_zero("avg_donation").unwrap(), Decimal::ZERO);
    }

    #[test]
    fn rows_serialize_as_ordered_objects() {
        let row = Row::new().with("b", 1_i64).with("a", "x");
        assert_eq!(serde_json::to_string(&row).unwrap(), r#"{"b":1,"a":"x"}"#);
    }

    #[test]
    fn unordered_comparison_ignores_tie_order() {
        let columns = vec!["username".to_string(), "total_donated".to_string()];
        let first = ReportResult::new(
            columns.clone(),
            vec![donor("a", dec!(500)), donor("b", dec!(300)), donor("c", dec!(300))],
        );
        let second = ReportResult::new(
            columns.clone(),
            vec![donor("a", dec!(500)), donor("c", dec!(300)), donor("b", dec!(300))],
        );
        let different = ReportResult::new(
            columns,
            vec![donor("a", dec!(500)), donor("c", dec!(300)), donor("d", dec!(300))],
        );
        assert!(first.same_rows_unordered(&second));
        assert!(!first.same_rows_unordered(&different));
    }

    #[test]
    fn column_iterates_top_to_bottom() {
        let result = ReportResult::new(
            vec!["username".into(), "total_donated".into()],
            vec![donor("a", dec!(5)), donor("b", dec!(3))],
        );
        let names: Vec<_> = result.column("username").map(|v| v.to_string()).collect();
        assert_eq!(names, ["a", "b"]);
    }
}
