//! The static catalog of report definitions and their parameter schemas.

use crate::error::DbError;
use crate::statement::{Params, Statement};
use chrono::NaiveDate;
use core_types::{QueryKind, SqlValue};

/// The type and bounds of one report parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Int { min: i64, max: i64 },
    Text { max_len: usize },
    Date,
}

/// What happens when a parameter is not supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamDefault {
    Required,
    Null,
    Int(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub default: ParamDefault,
}

impl ParamSpec {
    /// A bounded integer with a default, e.g. a row limit.
    pub const fn int(name: &'static str, min: i64, max: i64, default: i64) -> Self {
        Self {
            name,
            kind: ParamKind::Int { min, max },
            default: ParamDefault::Int(default),
        }
    }

    /// A bounded integer that is `NULL` when absent, e.g. an optional id filter.
    pub const fn optional_int(name: &'static str, min: i64, max: i64) -> Self {
        Self {
            name,
            kind: ParamKind::Int { min, max },
            default: ParamDefault::Null,
        }
    }

    /// Free text that is `NULL` when absent.
    pub const fn optional_text(name: &'static str, max_len: usize) -> Self {
        Self {
            name,
            kind: ParamKind::Text { max_len },
            default: ParamDefault::Null,
        }
    }

    /// A `YYYY-MM-DD` date that is `NULL` when absent.
    pub const fn optional_date(name: &'static str) -> Self {
        Self {
            name,
            kind: ParamKind::Date,
            default: ParamDefault::Null,
        }
    }

    fn parse(&self, raw: &str) -> Result<SqlValue, DbError> {
        let raw = raw.trim();
        match self.kind {
            ParamKind::Int { .. } => raw
                .parse::<i64>()
                .map(SqlValue::Int)
                .map_err(|_| DbError::invalid(self.name, format!("'{raw}' is not an integer"))),
            ParamKind::Text { .. } => Ok(SqlValue::Text(raw.to_string())),
            ParamKind::Date => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map(SqlValue::Date)
                .map_err(|_| DbError::invalid(self.name, format!("'{raw}' is not a YYYY-MM-DD date"))),
        }
    }

    fn check(&self, value: &SqlValue) -> Result<(), DbError> {
        match (self.kind, value) {
            (_, SqlValue::Null) if self.default == ParamDefault::Null => Ok(()),
            (ParamKind::Int { min, max }, value) => match value.as_i64() {
                Some(v) if (min..=max).contains(&v) => Ok(()),
                Some(v) => Err(DbError::invalid(
                    self.name,
                    format!("{v} is outside the range {min}..={max}"),
                )),
                None => Err(DbError::invalid(self.name, "expected an integer")),
            },
            (ParamKind::Text { max_len }, SqlValue::Text(s)) => {
                if s.is_empty() {
                    Err(DbError::invalid(self.name, "must not be empty"))
                } else if s.chars().count() > max_len {
                    Err(DbError::invalid(
                        self.name,
                        format!("longer than {max_len} characters"),
                    ))
                } else {
                    Ok(())
                }
            }
            (ParamKind::Date, SqlValue::Date(_)) => Ok(()),
            (ParamKind::Text { .. }, _) => Err(DbError::invalid(self.name, "expected text")),
            (ParamKind::Date, _) => Err(DbError::invalid(self.name, "expected a date")),
        }
    }

    fn default_value(&self) -> Option<SqlValue> {
        match self.default {
            ParamDefault::Required => None,
            ParamDefault::Null => Some(SqlValue::Null),
            ParamDefault::Int(v) => Some(SqlValue::Int(v)),
        }
    }
}

/// A named, parameterized, read-only report.
#[derive(Debug, Clone, Copy)]
pub struct ReportDefinition {
    pub name: &'static str,
    pub title: &'static str,
    /// Recorded as the caller label of every execution.
    pub caller: &'static str,
    pub params: &'static [ParamSpec],
    pub sql: &'static str,
}

impl ReportDefinition {
    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Validates typed parameters against the schema and fills in defaults.
    pub fn validate(&self, supplied: Params) -> Result<Params, DbError> {
        if let Some(unknown) = supplied.names().find(|name| self.param(name).is_none()) {
            return Err(DbError::invalid(
                unknown,
                format!("not a parameter of report '{}'", self.name),
            ));
        }

        let mut params = Params::new();
        for spec in self.params {
            let value = match supplied.get(spec.name) {
                Some(value) => value.clone(),
                None => spec
                    .default_value()
                    .ok_or_else(|| DbError::invalid(spec.name, "is required"))?,
            };
            spec.check(&value)?;
            params.insert(spec.name, value);
        }
        Ok(params)
    }

    /// Parses raw string parameters (query string, command line) and validates them.
    ///
    /// Blank values count as absent, so `?campaign_id=` falls back to the default.
    pub fn parse<'a, I>(&self, raw: I) -> Result<Params, DbError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut supplied = Params::new();
        for (name, value) in raw {
            let spec = self.param(name).ok_or_else(|| {
                DbError::invalid(name, format!("not a parameter of report '{}'", self.name))
            })?;
            if value.trim().is_empty() {
                continue;
            }
            supplied.insert(name, spec.parse(value)?);
        }
        self.validate(supplied)
    }

    /// The executable statement for already-validated parameters.
    pub fn statement(&self, params: Params) -> Statement {
        Statement::new(self.sql)
            .with_params(params)
            .tagged(QueryKind::Select)
            .caller(self.caller)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RUNNING_TOTALS: ReportDefinition = ReportDefinition {
        name: "running",
        title: "Running totals",
        caller: "donations",
        params: &[
            ParamSpec::optional_int("campaign_id", 1, i64::MAX),
            ParamSpec::int("limit", 1, 500, 50),
        ],
        sql: "SELECT * FROM Donations \
              WHERE (:campaign_id IS NULL OR campaign_id = :campaign_id) LIMIT :limit",
    };

    #[test]
    fn defaults_fill_missing_parameters() {
        let params = RUNNING_TOTALS.parse([]).unwrap();
        assert_eq!(params.get("campaign_id"), Some(&SqlValue::Null));
        assert_eq!(params.get("limit"), Some(&SqlValue::Int(50)));
        assert!(RUNNING_TOTALS.statement(params).compile().is_ok());
    }

    #[test]
    fn raw_values_are_parsed_and_range_checked() {
        let params = RUNNING_TOTALS
            .parse([("campaign_id", "7"), ("limit", " 10 ")])
            .unwrap();
        assert_eq!(params.get("campaign_id"), Some(&SqlValue::Int(7)));
        assert_eq!(params.get("limit"), Some(&SqlValue::Int(10)));

        assert!(RUNNING_TOTALS.parse([("limit", "0")]).is_err());
        assert!(RUNNING_TOTALS.parse([("limit", "9999")]).is_err());
        assert!(RUNNING_TOTALS.parse([("limit", "ten")]).is_err());
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let params = RUNNING_TOTALS.parse([("campaign_id", "")]).unwrap();
        assert_eq!(params.get("campaign_id"), Some(&SqlValue::Null));
    }

    #[test]
    fn unknown_parameters_are_rejected() {
        let err = RUNNING_TOTALS
            .parse([("limit", "5"), ("order", "amount; DROP TABLE Users")])
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidParameter { name, .. } if name == "order"));
    }

    #[test]
    fn statements_carry_the_report_caller_and_select_tag() {
        let params = RUNNING_TOTALS.parse([]).unwrap();
        let stmt = RUNNING_TOTALS.statement(params);
        assert_eq!(stmt.caller_label(), Some("donations"));
        assert_eq!(stmt.query_kind(), QueryKind::Select);
    }

    #[test]
    fn dates_and_text_are_validated() {
        let spec = ParamSpec {
            name: "since",
            kind: ParamKind::Date,
            default: ParamDefault::Required,
        };
        assert!(spec.parse("2024-02-30").is_err());
        assert_eq!(
            spec.parse("2024-02-29").unwrap(),
            SqlValue::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap())
        );

        let text = ParamSpec {
            name: "term",
            kind: ParamKind::Text { max_len: 3 },
            default: ParamDefault::Required,
        };
        assert!(text.check(&SqlValue::from("abcd")).is_err());
        assert!(text.check(&SqlValue::from("abc")).is_ok());
    }
}
