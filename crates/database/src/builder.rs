//! Incremental statement construction for optional filters and partial updates.
//!
//! Builders only ever append fixed SQL fragments chosen by the code; every user-supplied
//! value is recorded as a bound parameter.

use crate::error::DbError;
use crate::statement::{Params, Statement};
use core_types::{QueryKind, SqlValue};

/// Escapes LIKE wildcards so the term matches literally.
pub fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// A `SELECT` with optional `WHERE` conditions, ordering and pagination.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    base: String,
    conditions: Vec<&'static str>,
    params: Params,
    order_by: Option<&'static str>,
    page: Option<(u32, u32)>,
    kind: Option<QueryKind>,
}

impl QueryBuilder {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            conditions: Vec::new(),
            params: Params::new(),
            order_by: None,
            page: None,
            kind: None,
        }
    }

    /// Adds a condition whose `:placeholder` is `name`.
    pub fn filter(mut self, condition: &'static str, name: &str, value: impl Into<SqlValue>) -> Self {
        self.conditions.push(condition);
        self.params.insert(name, value);
        self
    }

    /// Adds the condition only when a value is present.
    pub fn filter_opt<T: Into<SqlValue>>(
        self,
        condition: &'static str,
        name: &str,
        value: Option<T>,
    ) -> Self {
        match value {
            Some(value) => self.filter(condition, name, value),
            None => self,
        }
    }

    /// Adds a condition that carries no parameter.
    pub fn condition(mut self, condition: &'static str) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Binds an extra parameter used by a condition that references it more than once.
    pub fn param(mut self, name: &str, value: impl Into<SqlValue>) -> Self {
        self.params.insert(name, value);
        self
    }

    pub fn order_by(mut self, order: &'static str) -> Self {
        self.order_by = Some(order);
        self
    }

    pub fn paginate(mut self, limit: u32, offset: u32) -> Self {
        self.page = Some((limit, offset));
        self
    }

    pub fn tagged(mut self, kind: QueryKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn build(self) -> Statement {
        let mut sql = self.base;
        if !self.conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.conditions.join(" AND "));
        }
        if let Some(order) = self.order_by {
            sql.push_str(" ORDER BY ");
            sql.push_str(order);
        }

        let mut params = self.params;
        if let Some((limit, offset)) = self.page {
            sql.push_str(" LIMIT :limit OFFSET :offset");
            params.insert("limit", limit);
            params.insert("offset", offset);
        }

        let stmt = Statement::new(sql).with_params(params);
        match self.kind {
            Some(kind) => stmt.tagged(kind),
            None => stmt,
        }
    }
}

/// An `UPDATE` limited to a fixed set of columns.
#[derive(Debug, Clone)]
pub struct UpdateBuilder {
    table: &'static str,
    allowed: &'static [&'static str],
    columns: Vec<&'static str>,
    params: Params,
}

impl UpdateBuilder {
    pub fn new(table: &'static str, allowed: &'static [&'static str]) -> Self {
        Self {
            table,
            allowed,
            columns: Vec::new(),
            params: Params::new(),
        }
    }

    /// Sets a column. Columns outside the allowed list are rejected.
    pub fn set(mut self, column: &str, value: impl Into<SqlValue>) -> Result<Self, DbError> {
        let column = self
            .allowed
            .iter()
            .copied()
            .find(|allowed| *allowed == column)
            .ok_or_else(|| DbError::invalid(column, "column cannot be updated"))?;
        if !self.columns.contains(&column) {
            self.columns.push(column);
        }
        self.params.insert(column, value);
        Ok(self)
    }

    /// Sets a column only when a value is present.
    pub fn set_opt<T: Into<SqlValue>>(self, column: &str, value: Option<T>) -> Result<Self, DbError> {
        match value {
            Some(value) => self.set(column, value),
            None => Ok(self),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Finishes the statement, keyed on `key_column = :key_column`.
    ///
    /// An update with nothing to set is rejected.
    pub fn build(self, key_column: &'static str, key: impl Into<SqlValue>) -> Result<Statement, DbError> {
        if self.columns.is_empty() {
            return Err(DbError::invalid(key_column, "no updatable fields were supplied"));
        }
        if self.columns.contains(&key_column) {
            return Err(DbError::invalid(key_column, "key column cannot be updated"));
        }

        let assignments = self
            .columns
            .iter()
            .map(|column| format!("{column} = :{column}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE {} SET {assignments} WHERE {key_column} = :{key_column}",
            self.table
        );

        let mut params = self.params;
        params.insert(key_column, key);
        Ok(Statement::new(sql).with_params(params))
    }
}
