//! Named-placeholder statements.
//!
//! Templates are written with `:name` placeholders and compiled into MySQL's positional
//! `?` form. Values always travel as bound parameters; the template text is never
//! interpolated.

use crate::error::QueryError;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use core_types::{QueryKind, Row, SqlValue};
use rust_decimal::Decimal;
use sqlx::mysql::{MySql, MySqlArguments, MySqlRow};
use sqlx::query::Query;
use sqlx::{Column, Row as _, TypeInfo};

/// Parameter values keyed by placeholder name, in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    values: Vec<(String, SqlValue)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a value, replacing any earlier value of the same name.
    pub fn bind(mut self, name: &str, value: impl Into<SqlValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: impl Into<SqlValue>) {
        let name = name.trim_start_matches(':');
        let value = value.into();
        match self.values.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = value,
            None => self.values.push((name.to_string(), value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A statement template together with its parameters and logging metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    template: String,
    params: Params,
    kind: Option<QueryKind>,
    caller: Option<String>,
}

/// A template rewritten to positional markers, with values in marker order.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledStatement {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

impl Statement {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            params: Params::new(),
            kind: None,
            caller: None,
        }
    }

    pub fn bind(mut self, name: &str, value: impl Into<SqlValue>) -> Self {
        self.params.insert(name, value);
        self
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    /// Overrides the inferred statement type recorded in the query log.
    pub fn tagged(mut self, kind: QueryKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Overrides the caller label of the executing context for this statement.
    pub fn caller(mut self, caller: impl Into<String>) -> Self {
        self.caller = Some(caller.into());
        self
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn caller_label(&self) -> Option<&str> {
        self.caller.as_deref()
    }

    /// The explicit type tag, or the type inferred from the template's first keyword.
    pub fn query_kind(&self) -> QueryKind {
        self.kind
            .clone()
            .unwrap_or_else(|| QueryKind::infer(&self.template))
    }

    pub fn returns_rows(&self) -> bool {
        returns_rows(&self.template)
    }

    /// Resolves every placeholder against the parameters.
    ///
    /// Fails with a binding error when a placeholder has no value, a value has no
    /// placeholder, or the template contains a raw `?`.
    pub fn compile(&self) -> Result<CompiledStatement, QueryError> {
        let (sql, names) = compile_template(&self.template)
            .map_err(|detail| QueryError::binding(&self.template, detail))?;

        let mut values = Vec::with_capacity(names.len());
        for name in &names {
            let value = self.params.get(name).ok_or_else(|| {
                QueryError::binding(&self.template, format!("no value bound for :{name}"))
            })?;
            values.push(value.clone());
        }

        if let Some(unused) = self.params.names().find(|p| !names.iter().any(|n| n == p)) {
            return Err(QueryError::binding(
                &self.template,
                format!("parameter :{unused} does not appear in the statement"),
            ));
        }

        Ok(CompiledStatement { sql, values })
    }
}

impl CompiledStatement {
    /// Builds the driver query with every value bound in order.
    pub(crate) fn to_query(&self) -> Query<'_, MySql, MySqlArguments> {
        self.values
            .iter()
            .fold(sqlx::query(&self.sql), |query, value| bind_value(query, value))
    }
}

fn bind_value<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    value: &SqlValue,
) -> Query<'q, MySql, MySqlArguments> {
    match value {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Bool(b) => query.bind(*b),
        SqlValue::Int(i) => query.bind(*i),
        SqlValue::Float(f) => query.bind(*f),
        SqlValue::Decimal(d) => query.bind(*d),
        SqlValue::Text(s) => query.bind(s.clone()),
        SqlValue::Date(d) => query.bind(*d),
        SqlValue::DateTime(dt) => query.bind(*dt),
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Returns the index just past the closing quote of the literal opening at `start`.
fn skip_quoted(bytes: &[u8], start: usize, quote: u8) -> Result<usize, String> {
    let mut i = start + 1;
    while i < bytes.len() {
        let b = bytes[i];
        if b == b'\\' && quote != b'`' {
            i += 2;
            continue;
        }
        if b == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return Ok(i + 1);
        }
        i += 1;
    }
    Err(format!("unterminated quoted text starting at offset {start}"))
}

// MySQL needs whitespace or a control character after the two dashes: `x--1` is `x - -1`.
fn starts_line_comment(bytes: &[u8], i: usize) -> bool {
    bytes.get(i + 1) == Some(&b'-')
        && bytes
            .get(i + 2)
            .is_some_and(|b| b.is_ascii_whitespace() || b.is_ascii_control())
}

fn skip_line(bytes: &[u8], start: usize) -> usize {
    bytes[start..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(bytes.len(), |offset| start + offset + 1)
}

fn skip_block_comment(bytes: &[u8], start: usize) -> Result<usize, String> {
    bytes[start + 2..]
        .windows(2)
        .position(|w| w == b"*/")
        .map(|offset| start + 2 + offset + 2)
        .ok_or_else(|| format!("unterminated comment starting at offset {start}"))
}

/// Rewrites `:name` placeholders to `?` and returns the names in marker order.
///
/// Quoted strings, quoted identifiers and comments are copied verbatim.
pub fn compile_template(template: &str) -> Result<(String, Vec<String>), String> {
    let bytes = template.as_bytes();
    let mut sql = String::with_capacity(template.len());
    let mut names = Vec::new();
    let mut copied = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            quote @ (b'\'' | b'"' | b'`') => i = skip_quoted(bytes, i, quote)?,
            b'-' if starts_line_comment(bytes, i) => i = skip_line(bytes, i),
            b'#' => i = skip_line(bytes, i),
            b'/' if bytes.get(i + 1) == Some(&b'*') => i = skip_block_comment(bytes, i)?,
            b'?' => {
                return Err(format!(
                    "positional placeholder at offset {i}; use a named :placeholder"
                ));
            }
            b':' if bytes.get(i + 1).is_some_and(|&b| is_ident_start(b)) => {
                let start = i + 1;
                let mut end = start + 1;
                while end < bytes.len() && is_ident_continue(bytes[end]) {
                    end += 1;
                }
                sql.push_str(&template[copied..i]);
                sql.push('?');
                names.push(template[start..end].to_string());
                copied = end;
                i = end;
            }
            _ => i += 1,
        }
    }
    sql.push_str(&template[copied..]);
    Ok((sql, names))
}

const ROW_RETURNING: &[&str] = &[
    "SELECT", "WITH", "SHOW", "CALL", "DESCRIBE", "DESC", "EXPLAIN", "VALUES", "TABLE",
];

/// Whether the statement produces a result set rather than an affected-row count.
pub fn returns_rows(sql: &str) -> bool {
    let trimmed = sql.trim_start();
    if trimmed.starts_with('(') {
        return true;
    }
    let keyword = trimmed
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or_default();
    ROW_RETURNING
        .iter()
        .any(|k| k.eq_ignore_ascii_case(keyword))
}

/// How a result column is decoded, derived from the driver's type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellKind {
    Null,
    Bool,
    Signed,
    Unsigned,
    Float,
    Double,
    Decimal,
    Date,
    DateTime,
    Time,
    Bytes,
    Text,
}

impl CellKind {
    pub fn from_type_name(name: &str) -> Self {
        match name {
            "NULL" => CellKind::Null,
            "BOOLEAN" => CellKind::Bool,
            "FLOAT" => CellKind::Float,
            "DOUBLE" => CellKind::Double,
            "DECIMAL" => CellKind::Decimal,
            "DATE" => CellKind::Date,
            "DATETIME" | "TIMESTAMP" => CellKind::DateTime,
            "TIME" => CellKind::Time,
            "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT"
            | "GEOMETRY" => CellKind::Bytes,
            "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => CellKind::Signed,
            n if n.ends_with(" UNSIGNED") => CellKind::Unsigned,
            _ => CellKind::Text,
        }
    }
}

fn decode_cell(row: &MySqlRow, index: usize, kind: CellKind) -> Result<SqlValue, sqlx::Error> {
    let value = match kind {
        CellKind::Null => SqlValue::Null,
        CellKind::Bool => row.try_get::<Option<bool>, _>(index)?.into(),
        CellKind::Signed => row.try_get::<Option<i64>, _>(index)?.into(),
        CellKind::Unsigned => row.try_get::<Option<u64>, _>(index)?.into(),
        CellKind::Float => row
            .try_get::<Option<f32>, _>(index)?
            .map(f64::from)
            .into(),
        CellKind::Double => row.try_get::<Option<f64>, _>(index)?.into(),
        CellKind::Decimal => row.try_get::<Option<Decimal>, _>(index)?.into(),
        CellKind::Date => row.try_get::<Option<NaiveDate>, _>(index)?.into(),
        CellKind::DateTime => row.try_get::<Option<NaiveDateTime>, _>(index)?.into(),
        CellKind::Time => row
            .try_get::<Option<NaiveTime>, _>(index)?
            .map(|t| t.to_string())
            .into(),
        CellKind::Bytes => row
            .try_get::<Option<Vec<u8>>, _>(index)?
            .map(|b| String::from_utf8_lossy(&b).into_owned())
            .into(),
        CellKind::Text => row.try_get::<Option<String>, _>(index)?.into(),
    };
    Ok(value)
}

/// Converts a driver row into an ordered [`Row`].
pub(crate) fn decode_row(row: &MySqlRow) -> Result<Row, sqlx::Error> {
    let mut out = Row::new();
    for column in row.columns() {
        let kind = CellKind::from_type_name(column.type_info().name());
        out.push(column.name(), decode_cell(row, column.ordinal(), kind)?);
    }
    Ok(out)
}

/// Column names of a result set, taken from its first row.
pub(crate) fn column_names(row: &MySqlRow) -> Vec<String> {
    row.columns().iter().map(|c| c.name().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueryErrorKind;

    #[test]
    fn placeholders_become_positional_markers() {
        let (sql, names) =
            compile_template("SELECT * FROM Campaigns WHERE status = :status LIMIT :limit OFFSET :offset")
                .unwrap();
        assert_eq!(sql, "SELECT * FROM Campaigns WHERE status = ? LIMIT ? OFFSET ?");
        assert_eq!(names, ["status", "limit", "offset"]);
    }

    #[test]
    fn quoted_text_and_comments_are_left_alone() {
        let template = "SELECT ':not_a_param', \"it''s :x\", `odd:col` -- :comment\n\
                        FROM t /* :block */ WHERE a = :a # :trailing";
        let (sql, names) = compile_template(template).unwrap();
        assert_eq!(names, ["a"]);
        assert!(sql.contains("':not_a_param'"));
        assert!(sql.contains("WHERE a = ? #"));
    }

    #[test]
    fn double_dash_without_a_space_is_subtraction() {
        let (sql, names) = compile_template("UPDATE t SET x = x--:delta WHERE id = :id").unwrap();
        assert_eq!(names, ["delta", "id"]);
        assert_eq!(sql, "UPDATE t SET x = x--? WHERE id = ?");

        let (_, names) = compile_template("SELECT :a --\t:b\nFROM t").unwrap();
        assert_eq!(names, ["a"]);
    }

    #[test]
    fn escaped_quotes_do_not_end_a_literal() {
        let (_, names) = compile_template(r"SELECT 'it\'s :x', :y").unwrap();
        assert_eq!(names, ["y"]);
    }

    #[test]
    fn raw_question_mark_is_rejected() {
        assert!(compile_template("SELECT * FROM Users WHERE user_id = ?").is_err());
        // ...but is fine inside a literal.
        assert!(compile_template("SELECT 'why?' AS q").is_ok());
    }

    #[test]
    fn assignment_operator_is_not_a_placeholder() {
        let (sql, names) = compile_template("SET @total := 0").unwrap();
        assert!(names.is_empty());
        assert_eq!(sql, "SET @total := 0");
    }

    #[test]
    fn repeated_names_bind_the_same_value_twice() {
        let compiled = Statement::new(
            "SELECT * FROM Donations WHERE (:campaign_id IS NULL OR campaign_id = :campaign_id)",
        )
        .bind("campaign_id", 7_i64)
        .compile()
        .unwrap();
        assert_eq!(compiled.values, [SqlValue::Int(7), SqlValue::Int(7)]);
    }

    #[test]
    fn missing_and_unused_parameters_are_binding_errors() {
        let missing = Statement::new("SELECT * FROM Users LIMIT :limit")
            .compile()
            .unwrap_err();
        assert_eq!(missing.kind(), &QueryErrorKind::Binding);
        assert!(missing.diagnostic().contains(":limit"));

        let unused = Statement::new("SELECT 1")
            .bind("limit", 5_i64)
            .compile()
            .unwrap_err();
        assert_eq!(unused.kind(), &QueryErrorKind::Binding);
    }

    #[test]
    fn hostile_input_only_travels_as_a_value() {
        let hostile = "' OR '1'='1";
        let compiled = Statement::new("SELECT * FROM Users WHERE username = :name")
            .bind("name", hostile)
            .compile()
            .unwrap();
        assert!(!compiled.sql.contains(hostile));
        assert_eq!(compiled.values, [SqlValue::Text(hostile.to_string())]);
    }

    #[test]
    fn kind_is_inferred_unless_tagged() {
        let stmt = Statement::new("  insert into Categories (category_name) VALUES (:n)");
        assert_eq!(stmt.query_kind(), QueryKind::Insert);
        let stmt = Statement::new("WITH x AS (SELECT 1) SELECT * FROM x").tagged(QueryKind::Select);
        assert_eq!(stmt.query_kind(), QueryKind::Select);
    }

    #[test]
    fn row_returning_statements_are_detected() {
        assert!(returns_rows("select 1"));
        assert!(returns_rows("WITH a AS (SELECT 1) SELECT * FROM a"));
        assert!(returns_rows("(SELECT 1) UNION ALL (SELECT 2)"));
        assert!(returns_rows("SHOW TABLES"));
        assert!(!returns_rows("UPDATE Users SET is_active = 0"));
        assert!(!returns_rows("DELETE FROM Query_Log"));
    }

    #[test]
    fn cell_kinds_follow_driver_type_names() {
        assert_eq!(CellKind::from_type_name("BIGINT"), CellKind::Signed);
        assert_eq!(CellKind::from_type_name("BIGINT UNSIGNED"), CellKind::Unsigned);
        assert_eq!(CellKind::from_type_name("DECIMAL"), CellKind::Decimal);
        assert_eq!(CellKind::from_type_name("TIMESTAMP"), CellKind::DateTime);
        assert_eq!(CellKind::from_type_name("ENUM"), CellKind::Text);
        assert_eq!(CellKind::from_type_name("VARCHAR"), CellKind::Text);
        assert_eq!(CellKind::from_type_name("BOOLEAN"), CellKind::Bool);
    }

    #[test]
    fn params_replace_by_name() {
        let params = Params::new().bind("limit", 5_i64).bind(":limit", 10_i64);
        assert_eq!(params.len(), 1);
        assert_eq!(params.get("limit"), Some(&SqlValue::Int(10)));
    }
}
