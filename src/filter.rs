//! Filter grammar for the control sheet's `filter` column.
//!
//! A filter is a comma separated list of clauses, each written as
//! `variable::operator::value`. The operator may be left out (or left empty)
//! and defaults to `eq`. All whitespace is removed before the string is split,
//! and there is no escaping, so variables and values cannot contain `,` or `::`.
//!
//! Every clause must hold for a data row to be kept (logical AND only).

use crate::error::FilterError;
use crate::sheet::DataRow;
use serde::Serialize;

/// Comparison applied by a single filter clause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Operator {
    /// `eq` - the row value must equal the clause value
    #[serde(rename = "eq")]
    Equals,

    /// `neq` - the row value must differ from the clause value
    #[serde(rename = "neq")]
    NotEquals,
}

impl Operator {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "" | "eq" => Some(Operator::Equals),
            "neq" => Some(Operator::NotEquals),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Equals => "eq",
            Operator::NotEquals => "neq",
        }
    }
}

/// One `variable::operator::value` clause.
///
/// `value` is `None` when the clause stops after the variable or operator.
/// Such a clause only matches rows that have no such column at all (for `eq`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterClause {
    pub variable: String,
    pub operator: Operator,
    pub value: Option<String>,
}

impl FilterClause {
    pub fn new(variable: &str, operator: Operator, value: Option<&str>) -> Self {
        Self {
            variable: variable.to_string(),
            operator,
            value: value.map(str::to_string),
        }
    }

    pub fn matches(&self, row: &DataRow) -> bool {
        predicate(
            row.get(&self.variable).map(String::as_str),
            self.value.as_deref(),
            self.operator,
        )
    }
}

/// Ordered clauses that must all hold
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Filter(pub Vec<FilterClause>);

impl Filter {
    pub fn clauses(&self) -> &[FilterClause] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn matches(&self, row: &DataRow) -> bool {
        self.0.iter().all(|clause| clause.matches(row))
    }
}

/// Parses a filter string into its clauses.
///
/// Empty clauses (for example a trailing comma) are skipped.
///
/// # Examples
/// ```
/// use sheetviz::filter::{parse_filter, Operator};
///
/// let filter = parse_filter("a::eq::1, b::neq::2").unwrap();
/// assert_eq!(filter.clauses().len(), 2);
/// assert_eq!(filter.clauses()[1].operator, Operator::NotEquals);
/// ```
pub fn parse_filter(input: &str) -> Result<Filter, FilterError> {
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();

    let mut clauses = Vec::new();
    for clause in compact.split(',').filter(|c| !c.is_empty()) {
        let parts: Vec<&str> = clause.split("::").collect();
        if parts.len() > 3 {
            return Err(FilterError::TooManyParts(clause.to_string()));
        }

        let variable = parts[0];
        if variable.is_empty() {
            return Err(FilterError::MissingVariable(clause.to_string()));
        }

        let token = parts.get(1).copied().unwrap_or("");
        let operator =
            Operator::from_token(token).ok_or_else(|| FilterError::UnknownOperator {
                clause: clause.to_string(),
                operator: token.to_string(),
            })?;

        clauses.push(FilterClause::new(variable, operator, parts.get(2).copied()));
    }

    Ok(Filter(clauses))
}

/// Compares a row's value with a clause value.
pub fn predicate(row_value: Option<&str>, target: Option<&str>, operator: Operator) -> bool {
    match operator {
        Operator::Equals => row_value == target,
        Operator::NotEquals => row_value != target,
    }
}

/// Keeps the rows for which every clause holds. No filter keeps everything.
pub fn filter_rows(rows: &[DataRow], filter: Option<&Filter>) -> Vec<DataRow> {
    match filter {
        None => rows.to_vec(),
        Some(filter) => rows.iter().filter(|row| filter.matches(row)).cloned().collect(),
    }
}
