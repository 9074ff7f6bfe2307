//! Rule rows, matchers and table metadata.

use crate::value::{Record, Value};
use std::collections::BTreeMap;

use super::config::Boundary;

static WILDCARD: Matcher = Matcher::Wildcard;

/// Condition a rule row places on one input column.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Matcher {
    /// The input must equal the value.
    Exact(Value),

    /// The input must be numeric and fall between the bounds.
    ///
    /// Either bound may be infinite to express an open-ended range.
    Interval { lo: f64, hi: f64 },

    /// Any value matches, including an absent one.
    Wildcard,
}

impl Matcher {
    pub fn exact(value: impl Into<Value>) -> Self {
        Matcher::Exact(value.into())
    }

    pub fn interval(lo: f64, hi: f64) -> Self {
        Matcher::Interval { lo, hi }
    }

    /// Whether the matcher accepts every value.
    ///
    /// An interval spanning `(-inf, +inf)` counts as a wildcard.
    pub fn is_wildcard(&self) -> bool {
        match self {
            Matcher::Wildcard => true,
            Matcher::Interval { lo, hi } => *lo == f64::NEG_INFINITY && *hi == f64::INFINITY,
            Matcher::Exact(_) => false,
        }
    }

    /// Tests a record value against this matcher.
    pub fn matches(&self, value: Option<&Value>, boundary: Boundary) -> bool {
        match self {
            Matcher::Wildcard => true,
            Matcher::Exact(expected) => value.is_some_and(|v| !v.is_null() && v == expected),
            Matcher::Interval { lo, hi } => value
                .and_then(Value::as_f64)
                .is_some_and(|x| boundary.contains(*lo, *hi, x)),
        }
    }

    /// Whether some value could satisfy both matchers.
    pub(crate) fn intersects(&self, other: &Matcher, boundary: Boundary) -> bool {
        match (self, other) {
            (Matcher::Wildcard, _) | (_, Matcher::Wildcard) => true,
            (Matcher::Exact(a), Matcher::Exact(b)) => a == b,
            (Matcher::Exact(v), Matcher::Interval { lo, hi })
            | (Matcher::Interval { lo, hi }, Matcher::Exact(v)) => v
                .as_f64()
                .is_some_and(|x| boundary.contains(*lo, *hi, x)),
            (Matcher::Interval { lo: a0, hi: a1 }, Matcher::Interval { lo: b0, hi: b1 }) => {
                boundary.overlaps((*a0, *a1), (*b0, *b1))
            }
        }
    }
}

/// One rule of a lookup table: matchers on inputs and the outputs they yield.
///
/// A row that does not mention one of its table's input columns treats
/// that column as a wildcard.
///
/// # Examples
///
/// ```
/// use u_rating::table::RuleRow;
///
/// let row = RuleRow::new()
///     .interval("age", 16.0, 20.0)
///     .exact("gender", "M")
///     .output("factor", 1.85);
/// assert_eq!(row.matchers().len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RuleRow {
    matchers: Vec<(String, Matcher)>,
    outputs: Record,
}

impl RuleRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the matcher for a column, replacing any earlier one.
    pub fn matcher(mut self, column: impl Into<String>, matcher: Matcher) -> Self {
        let column = column.into();
        match self.matchers.iter_mut().find(|(c, _)| *c == column) {
            Some(slot) => slot.1 = matcher,
            None => self.matchers.push((column, matcher)),
        }
        self
    }

    pub fn exact(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.matcher(column, Matcher::exact(value))
    }

    pub fn interval(self, column: impl Into<String>, lo: f64, hi: f64) -> Self {
        self.matcher(column, Matcher::interval(lo, hi))
    }

    pub fn wildcard(self, column: impl Into<String>) -> Self {
        self.matcher(column, Matcher::Wildcard)
    }

    pub fn output(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.outputs.insert(column, value);
        self
    }

    pub fn matchers(&self) -> &[(String, Matcher)] {
        &self.matchers
    }

    pub fn outputs(&self) -> &Record {
        &self.outputs
    }

    /// The matcher for `column`; absent columns behave as wildcards.
    pub fn matcher_for(&self, column: &str) -> &Matcher {
        self.matchers
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, m)| m)
            .unwrap_or(&WILDCARD)
    }

    /// Whether any of `inputs` is unconstrained by this row.
    pub fn has_wildcard(&self, inputs: &[String]) -> bool {
        inputs.iter().any(|c| self.matcher_for(c).is_wildcard())
    }

    pub(crate) fn set_outputs(&mut self, outputs: Record) {
        self.outputs = outputs;
    }
}

/// Descriptive information attached to a rating table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TableMetadata {
    /// User-defined version label.
    pub version: Option<String>,
    /// Date the table takes effect.
    pub effective_date: Option<String>,
    /// SERFF filing number.
    pub serff_filing_number: Option<String>,
    pub state_tracking_number: Option<String>,
    pub company_tracking_number: Option<String>,
    /// Free-form annotations.
    pub additional_info: BTreeMap<String, String>,
}

impl TableMetadata {
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_effective_date(mut self, date: impl Into<String>) -> Self {
        self.effective_date = Some(date.into());
        self
    }

    pub fn with_serff_filing_number(mut self, number: impl Into<String>) -> Self {
        self.serff_filing_number = Some(number.into());
        self
    }

    pub fn with_state_tracking_number(mut self, number: impl Into<String>) -> Self {
        self.state_tracking_number = Some(number.into());
        self
    }

    pub fn with_company_tracking_number(mut self, number: impl Into<String>) -> Self {
        self.company_tracking_number = Some(number.into());
        self
    }

    pub fn with_info(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.additional_info.insert(key.into(), value.into());
        self
    }
}
