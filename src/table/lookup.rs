//! Lookup table matching engine.

use super::config::{Precedence, TableConfig};
use super::types::{Matcher, RuleRow, TableMetadata};
use crate::error::{RatingError, Result};
use crate::value::{Record, Value};
use std::collections::HashMap;

static NULL: Value = Value::Null;

/// An ordered set of rule rows evaluated against records.
///
/// Declared `inputs` are the union of matcher columns across rows and
/// `outputs` the union of output columns, both in first-appearance order.
/// Rows that leave an output unset yield `Null` for it.
///
/// Construction rejects tables where two wildcard-free rows could match
/// the same record, so evaluation never has to choose between candidates
/// beyond the configured [`Precedence`].
///
/// # Examples
///
/// ```
/// use u_rating::table::{LookupTable, RuleRow};
/// use u_rating::value::{Record, Value};
///
/// let table = LookupTable::new(
///     "credit_tier_placement",
///     vec![
///         RuleRow::new().interval("credit_score", 0.0, 699.0).output("credit_tier", "C"),
///         RuleRow::new().interval("credit_score", 700.0, 999.0).output("credit_tier", "A"),
///     ],
/// )
/// .unwrap();
///
/// let out = table.evaluate(&Record::from_pairs([("credit_score", 795)])).unwrap();
/// assert_eq!(out.get("credit_tier"), Some(&Value::from("A")));
/// ```
#[derive(Debug, Clone)]
pub struct LookupTable {
    name: String,
    rows: Vec<RuleRow>,
    inputs: Vec<String>,
    outputs: Vec<String>,
    /// Row indices in the order they are tried.
    order: Vec<usize>,
    config: TableConfig,
    metadata: TableMetadata,
}

impl LookupTable {
    /// Builds a table with the default [`TableConfig`].
    pub fn new(name: impl Into<String>, rows: Vec<RuleRow>) -> Result<Self> {
        Self::with_config(name, rows, TableConfig::default())
    }

    /// Builds a table with an explicit configuration.
    pub fn with_config(
        name: impl Into<String>,
        mut rows: Vec<RuleRow>,
        config: TableConfig,
    ) -> Result<Self> {
        let name = name.into();

        let mut inputs: Vec<String> = Vec::new();
        let mut outputs: Vec<String> = Vec::new();
        for row in &rows {
            for (column, _) in row.matchers() {
                if !inputs.contains(column) {
                    inputs.push(column.clone());
                }
            }
            for column in row.outputs().names() {
                if !outputs.iter().any(|o| o == column) {
                    outputs.push(column.to_string());
                }
            }
        }

        for (i, row) in rows.iter().enumerate() {
            for (column, matcher) in row.matchers() {
                if let Matcher::Interval { lo, hi } = matcher {
                    if lo.is_nan() || hi.is_nan() || lo > hi {
                        return Err(RatingError::InvalidTable {
                            table: name,
                            reason: format!(
                                "row {i} has an empty interval [{lo}, {hi}] on '{column}'"
                            ),
                        });
                    }
                }
            }
        }

        // normalize outputs to the table's column order
        for row in &mut rows {
            let normalized: Record = outputs
                .iter()
                .map(|o| (o.clone(), row.outputs().get(o).cloned().unwrap_or_default()))
                .collect();
            row.set_outputs(normalized);
        }

        let order = match config.precedence {
            Precedence::FirstDeclared => (0..rows.len()).collect(),
            Precedence::SpecificFirst => {
                let (specific, general): (Vec<usize>, Vec<usize>) =
                    (0..rows.len()).partition(|&i| !rows[i].has_wildcard(&inputs));
                specific.into_iter().chain(general).collect()
            }
        };

        let table = Self {
            name,
            rows,
            inputs,
            outputs,
            order,
            config,
            metadata: TableMetadata::default(),
        };
        table.check_unambiguous()?;
        Ok(table)
    }

    /// Attaches descriptive metadata.
    pub fn with_metadata(mut self, metadata: TableMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    pub fn rows(&self) -> &[RuleRow] {
        &self.rows
    }

    pub fn config(&self) -> TableConfig {
        self.config
    }

    pub fn metadata(&self) -> &TableMetadata {
        &self.metadata
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the outputs of the winning row for `record`.
    ///
    /// Fails with [`RatingError::NoMatch`] when no row matches.
    pub fn evaluate(&self, record: &Record) -> Result<Record> {
        match self.match_index(|column| record.get(column)) {
            Some(i) => Ok(self.rows[i].outputs().clone()),
            None => Err(RatingError::NoMatch {
                table: self.name.clone(),
                record: self.inputs_of(record),
                step: None,
                key: None,
            }),
        }
    }

    /// Index of the winning row, reading input values through `value_of`.
    pub fn match_index<'v>(&self, value_of: impl Fn(&str) -> Option<&'v Value>) -> Option<usize> {
        let values: Vec<Option<&Value>> = self.inputs.iter().map(|c| value_of(c)).collect();
        self.order.iter().copied().find(|&i| {
            let row = &self.rows[i];
            self.inputs
                .iter()
                .zip(&values)
                .all(|(column, value)| {
                    row.matcher_for(column).matches(*value, self.config.boundary)
                })
        })
    }

    /// Outputs of row `index`.
    pub fn row_outputs(&self, index: usize) -> &Record {
        self.rows[index].outputs()
    }

    fn inputs_of(&self, record: &Record) -> Record {
        self.inputs
            .iter()
            .map(|c| (c.clone(), record.get(c).cloned().unwrap_or_default()))
            .collect()
    }

    /// Rejects pairs of wildcard-free rows that can match a common record.
    ///
    /// Rows are bucketed by the columns every such row matches exactly;
    /// only rows in the same bucket can collide.
    fn check_unambiguous(&self) -> Result<()> {
        let specific: Vec<usize> = (0..self.rows.len())
            .filter(|&i| !self.rows[i].has_wildcard(&self.inputs))
            .collect();

        let exact_columns: Vec<&String> = self
            .inputs
            .iter()
            .filter(|c| {
                specific
                    .iter()
                    .all(|&i| matches!(self.rows[i].matcher_for(c), Matcher::Exact(_)))
            })
            .collect();

        let mut buckets: HashMap<Vec<&Value>, Vec<usize>> = HashMap::new();
        for &i in &specific {
            let bucket: Vec<&Value> = exact_columns
                .iter()
                .map(|c| match self.rows[i].matcher_for(c) {
                    Matcher::Exact(v) => v,
                    _ => &NULL,
                })
                .collect();
            buckets.entry(bucket).or_default().push(i);
        }

        let mut collisions: Vec<(usize, usize)> = Vec::new();
        for members in buckets.values() {
            for (a, &i) in members.iter().enumerate() {
                for &j in &members[a + 1..] {
                    let overlap = self.inputs.iter().all(|c| {
                        self.rows[i]
                            .matcher_for(c)
                            .intersects(self.rows[j].matcher_for(c), self.config.boundary)
                    });
                    if overlap {
                        collisions.push((i.min(j), i.max(j)));
                    }
                }
            }
        }

        match collisions.into_iter().min() {
            Some((first, second)) => Err(RatingError::AmbiguousTable {
                table: self.name.clone(),
                first,
                second,
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::config::Boundary;
    use proptest::prelude::*;

    fn age_table() -> LookupTable {
        LookupTable::new(
            "driver_age_factor",
            vec![
                RuleRow::new().interval("age", 16.0, 20.0).output("factor", 1.8),
                RuleRow::new().interval("age", 20.0, 25.0).output("factor", 1.3),
                RuleRow::new().interval("age", 26.0, 120.0).output("factor", 1.0),
            ],
        )
        .unwrap()
    }

    fn rec(age: i64) -> Record {
        Record::from_pairs([("age", age)])
    }

    #[test]
    fn test_inputs_and_outputs() {
        let table = LookupTable::new(
            "t",
            vec![
                RuleRow::new().exact("tier", "A").output("BI", 1.0),
                RuleRow::new().exact("tier", "B").exact("prior", "Y").output("PD", 2.0),
            ],
        )
        .unwrap();
        assert_eq!(table.inputs(), &["tier".to_string(), "prior".to_string()]);
        assert_eq!(table.outputs(), &["BI".to_string(), "PD".to_string()]);
        // missing outputs are normalized to null
        assert_eq!(table.row_outputs(0).get("PD"), Some(&Value::Null));
    }

    #[test]
    fn test_interval_match() {
        let table = age_table();
        let out = table.evaluate(&rec(18)).unwrap();
        assert_eq!(out.get("factor"), Some(&Value::Float(1.8)));
        let out = table.evaluate(&rec(40)).unwrap();
        assert_eq!(out.get("factor"), Some(&Value::Float(1.0)));
    }

    #[test]
    fn test_shared_edge_first_declared_wins() {
        let table = age_table();
        let out = table.evaluate(&rec(20)).unwrap();
        assert_eq!(out.get("factor"), Some(&Value::Float(1.8)));
    }

    #[test]
    fn test_adjacent_intervals_do_not_share_value() {
        let table = LookupTable::new(
            "t",
            vec![
                RuleRow::new().interval("x", 0.0, 10.0).output("y", 1),
                RuleRow::new().interval("x", 10.000001, 20.0).output("y", 2),
            ],
        )
        .unwrap();
        let y = |x: f64| table.evaluate(&Record::from_pairs([("x", x)])).unwrap().get("y").cloned();
        assert_eq!(y(10.0), Some(Value::Int(1)));
        assert_eq!(y(10.5), Some(Value::Int(2)));
    }

    #[test]
    fn test_no_match() {
        let table = age_table();
        let err = table.evaluate(&rec(10)).unwrap_err();
        match err {
            RatingError::NoMatch { table, record, .. } => {
                assert_eq!(table, "driver_age_factor");
                assert_eq!(record.get("age"), Some(&Value::Int(10)));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(table.evaluate(&Record::new()).is_err());
    }

    #[test]
    fn test_overlap_rejected() {
        let err = LookupTable::new(
            "bad",
            vec![
                RuleRow::new().interval("age", 16.0, 21.0).output("f", 1.0),
                RuleRow::new().interval("age", 20.0, 25.0).output("f", 2.0),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, RatingError::AmbiguousTable { first: 0, second: 1, .. }));
    }

    #[test]
    fn test_duplicate_exact_rows_rejected() {
        let err = LookupTable::new(
            "dup",
            vec![
                RuleRow::new().exact("tier", "A").exact("prior", "Y").output("f", 1.0),
                RuleRow::new().exact("tier", "B").exact("prior", "Y").output("f", 1.5),
                RuleRow::new().exact("tier", "A").exact("prior", "Y").output("f", 2.0),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, RatingError::AmbiguousTable { first: 0, second: 2, .. }));
    }

    #[test]
    fn test_overlap_on_one_column_only_is_fine() {
        let table = LookupTable::new(
            "t",
            vec![
                RuleRow::new().exact("tier", "A").interval("age", 16.0, 30.0).output("f", 1.0),
                RuleRow::new().exact("tier", "B").interval("age", 16.0, 30.0).output("f", 2.0),
            ],
        );
        assert!(table.is_ok());
    }

    #[test]
    fn test_strict_boundary_rejects_shared_edge() {
        let rows = vec![
            RuleRow::new().interval("age", 16.0, 20.0).output("f", 1.0),
            RuleRow::new().interval("age", 20.0, 25.0).output("f", 2.0),
        ];
        let err = LookupTable::with_config("t", rows, TableConfig::strict()).unwrap_err();
        assert!(matches!(err, RatingError::AmbiguousTable { .. }));
    }

    #[test]
    fn test_half_open_boundary() {
        let rows = vec![
            RuleRow::new().interval("age", 16.0, 20.0).output("f", 1.0),
            RuleRow::new().interval("age", 20.0, 25.0).output("f", 2.0),
        ];
        let config = TableConfig::default().with_boundary(Boundary::LowerInclusive);
        let table = LookupTable::with_config("t", rows, config).unwrap();
        assert_eq!(table.evaluate(&rec(20)).unwrap().get("f"), Some(&Value::Float(2.0)));
        assert!(table.evaluate(&rec(25)).is_err());
    }

    #[test]
    fn test_empty_interval_rejected() {
        let err = LookupTable::new("t", vec![RuleRow::new().interval("x", 5.0, 1.0).output("y", 1)])
            .unwrap_err();
        assert!(matches!(err, RatingError::InvalidTable { .. }));
    }

    // ---- Wildcards ----

    fn tier_table(precedence: Precedence) -> LookupTable {
        LookupTable::with_config(
            "tier_factor",
            vec![
                RuleRow::new().wildcard("tier").output("f", 9.0),
                RuleRow::new().exact("tier", "A").output("f", 1.0),
                RuleRow::new().exact("tier", "B").output("f", 2.0),
            ],
            TableConfig::default().with_precedence(precedence),
        )
        .unwrap()
    }

    #[test]
    fn test_wildcard_first_declared() {
        let table = tier_table(Precedence::FirstDeclared);
        let out = table.evaluate(&Record::from_pairs([("tier", "A")])).unwrap();
        assert_eq!(out.get("f"), Some(&Value::Float(9.0)));
        // absent columns still match a wildcard
        assert!(table.evaluate(&Record::new()).is_ok());
    }

    #[test]
    fn test_wildcard_specific_first() {
        let table = tier_table(Precedence::SpecificFirst);
        let a = table.evaluate(&Record::from_pairs([("tier", "A")])).unwrap();
        assert_eq!(a.get("f"), Some(&Value::Float(1.0)));
        let z = table.evaluate(&Record::from_pairs([("tier", "Z")])).unwrap();
        assert_eq!(z.get("f"), Some(&Value::Float(9.0)));
    }

    #[test]
    fn test_zero_input_table() {
        let table = LookupTable::new(
            "base_rates",
            vec![RuleRow::new().output("BI", 300.0).output("PD", 200.0)],
        )
        .unwrap();
        assert!(table.inputs().is_empty());
        let out = table.evaluate(&Record::new()).unwrap();
        assert_eq!(out.get("PD"), Some(&Value::Float(200.0)));
    }

    #[test]
    fn test_metadata_attached() {
        let table = age_table().with_metadata(TableMetadata::default().with_version("3"));
        assert_eq!(table.metadata().version.as_deref(), Some("3"));
    }

    proptest! {
        #[test]
        fn prop_evaluate_is_pure_and_unique(ages in proptest::collection::vec(0i64..150, 1..40)) {
            let table = age_table();
            for age in ages {
                let first = table.evaluate(&rec(age)).ok();
                let second = table.evaluate(&rec(age)).ok();
                prop_assert_eq!(&first, &second);

                let candidates = table
                    .rows()
                    .iter()
                    .filter(|r| {
                        r.matcher_for("age").matches(Some(&Value::Int(age)), Boundary::Inclusive)
                    })
                    .count();
                // only the shared edge at 20 may have two candidates
                prop_assert!(candidates <= 1 || age == 20);
                prop_assert_eq!(first.is_some(), candidates > 0);
            }
        }
    }
}
