//! Rule tables.
//!
//! A [`LookupTable`] maps an input record to the outputs of the single rule
//! row that matches it. Rows combine exact, interval and wildcard
//! [`Matcher`]s; overlapping definitions are rejected when the table is
//! built, so evaluation is a pure function of the record.
//!
//! An [`InterpolatedTable`] is derived from a single-input numeric lookup
//! table and evaluates by linear interpolation between its breakpoints.
//!
//! # Key Types
//!
//! - [`RuleRow`]: Matchers on input columns plus output values
//! - [`TableConfig`]: Interval [`Boundary`] policy and row [`Precedence`]
//! - [`TableMetadata`]: Version, effective date and filing references

mod config;
mod interpolated;
mod lookup;
mod types;

pub use config::{Boundary, Precedence, TableConfig};
pub use interpolated::InterpolatedTable;
pub use lookup::LookupTable;
pub use types::{Matcher, RuleRow, TableMetadata};
