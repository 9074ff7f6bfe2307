//! Piecewise-linear interpolation over a single numeric input.

use super::lookup::LookupTable;
use super::types::{Matcher, TableMetadata};
use crate::error::{RatingError, Result};
use crate::value::{Record, Value};

/// A numeric table evaluated by linear interpolation between breakpoints.
///
/// Inputs below the first breakpoint clip to the first row and inputs above
/// the last clip to the last row; there is no extrapolation.
///
/// # Examples
///
/// ```
/// use u_rating::table::{InterpolatedTable, LookupTable, RuleRow};
///
/// let table = LookupTable::new(
///     "amount_of_insurance_factor",
///     vec![
///         RuleRow::new().exact("coverage_amount", 80_000).output("aoi_factor", 0.56),
///         RuleRow::new().exact("coverage_amount", 95_000).output("aoi_factor", 0.63),
///     ],
/// )
/// .unwrap();
///
/// let interpolated = InterpolatedTable::from_table(&table).unwrap();
/// let out = interpolated.evaluate(87_500.0);
/// let factor = out.get("aoi_factor").and_then(|v| v.as_f64()).unwrap();
/// assert!((factor - 0.595).abs() < 1e-12);
/// ```
#[derive(Debug, Clone)]
pub struct InterpolatedTable {
    name: String,
    inputs: Vec<String>,
    outputs: Vec<String>,
    breakpoints: Vec<f64>,
    /// `values[o][i]` is output `o` at breakpoint `i`.
    values: Vec<Vec<f64>>,
    metadata: TableMetadata,
}

impl InterpolatedTable {
    /// Derives an interpolated table from a single-input lookup table.
    ///
    /// Each row contributes one breakpoint: its exact numeric key, or for
    /// interval rows the lower bound (the upper bound when the lower one is
    /// open). Rows sharing a breakpoint must agree on their outputs.
    pub fn from_table(table: &LookupTable) -> Result<Self> {
        let invalid = |reason: String| RatingError::InvalidInterpolationSource {
            table: table.name().to_string(),
            reason,
        };

        let [input] = table.inputs() else {
            return Err(invalid(format!(
                "expected exactly one input column, found {}",
                table.inputs().len()
            )));
        };

        let mut points: Vec<(f64, Vec<f64>)> = Vec::with_capacity(table.len());
        for (i, row) in table.rows().iter().enumerate() {
            let x = match row.matcher_for(input) {
                Matcher::Exact(v) => v
                    .as_f64()
                    .ok_or_else(|| invalid(format!("row {i} key {v} is not numeric")))?,
                Matcher::Interval { lo, .. } if lo.is_finite() => *lo,
                Matcher::Interval { hi, .. } if hi.is_finite() => *hi,
                _ => return Err(invalid(format!("row {i} has a wildcard key"))),
            };
            let ys = table
                .outputs()
                .iter()
                .map(|o| {
                    row.outputs()
                        .get(o)
                        .and_then(Value::as_f64)
                        .ok_or_else(|| invalid(format!("row {i} output '{o}' is not numeric")))
                })
                .collect::<Result<Vec<f64>>>()?;
            points.push((x, ys));
        }

        Self::from_points(table.name(), input.clone(), table.outputs().to_vec(), points)
            .map(|t| t.with_metadata(table.metadata().clone()))
    }

    /// Builds a table from `(breakpoint, values)` pairs in any order.
    pub fn from_points(
        name: impl Into<String>,
        input: impl Into<String>,
        outputs: Vec<String>,
        mut points: Vec<(f64, Vec<f64>)>,
    ) -> Result<Self> {
        let name = name.into();
        let invalid = |reason: String| RatingError::InvalidInterpolationSource {
            table: name.clone(),
            reason,
        };

        if points.is_empty() {
            return Err(invalid("no breakpoints".into()));
        }
        for (x, ys) in &points {
            if !x.is_finite() {
                return Err(invalid(format!("breakpoint {x} is not finite")));
            }
            if ys.len() != outputs.len() {
                return Err(invalid(format!(
                    "breakpoint {x} has {} values for {} outputs",
                    ys.len(),
                    outputs.len()
                )));
            }
        }

        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        points.dedup_by(|next, prev| next.0 == prev.0 && next.1 == prev.1);
        if let Some(w) = points.windows(2).find(|w| w[0].0 == w[1].0) {
            return Err(invalid(format!(
                "breakpoint {} is listed with different outputs",
                w[0].0
            )));
        }

        let breakpoints: Vec<f64> = points.iter().map(|(x, _)| *x).collect();
        let values: Vec<Vec<f64>> = (0..outputs.len())
            .map(|o| points.iter().map(|(_, ys)| ys[o]).collect())
            .collect();

        Ok(Self {
            name,
            inputs: vec![input.into()],
            outputs,
            breakpoints,
            values,
            metadata: TableMetadata::default(),
        })
    }

    /// Attaches descriptive metadata.
    pub fn with_metadata(mut self, metadata: TableMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The single input column, as a one-element slice.
    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    pub fn breakpoints(&self) -> &[f64] {
        &self.breakpoints
    }

    pub fn metadata(&self) -> &TableMetadata {
        &self.metadata
    }

    /// Interpolated outputs at `x`.
    ///
    /// A NaN input propagates to NaN outputs.
    pub fn evaluate(&self, x: f64) -> Record {
        self.outputs
            .iter()
            .zip(&self.values)
            .map(|(name, ys)| (name.clone(), Value::Float(self.interpolate(ys, x))))
            .collect()
    }

    /// Evaluates the input column of `record`.
    ///
    /// Fails with [`RatingError::NoMatch`] when the input is absent or not
    /// numeric.
    pub fn evaluate_record(&self, record: &Record) -> Result<Record> {
        match record.get(&self.inputs[0]).and_then(Value::as_f64) {
            Some(x) => Ok(self.evaluate(x)),
            None => Err(RatingError::NoMatch {
                table: self.name.clone(),
                record: Record::from_pairs([(
                    self.inputs[0].clone(),
                    record.get(&self.inputs[0]).cloned().unwrap_or_default(),
                )]),
                step: None,
                key: None,
            }),
        }
    }

    fn interpolate(&self, ys: &[f64], x: f64) -> f64 {
        let bps = &self.breakpoints;
        let last = bps.len() - 1;
        if x.is_nan() {
            return f64::NAN;
        }
        if x <= bps[0] {
            return ys[0];
        }
        if x >= bps[last] {
            return ys[last];
        }
        let i = bps.partition_point(|b| *b <= x) - 1;
        let t = (x - bps[i]) / (bps[i + 1] - bps[i]);
        ys[i] + (ys[i + 1] - ys[i]) * t
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::RuleRow;
    use proptest::prelude::*;

    fn aoi() -> InterpolatedTable {
        let table = LookupTable::new(
            "aoi",
            vec![
                RuleRow::new().exact("amount", 95_000).output("factor", 0.63),
                RuleRow::new().exact("amount", 80_000).output("factor", 0.56),
            ],
        )
        .unwrap();
        InterpolatedTable::from_table(&table).unwrap()
    }

    fn factor(t: &InterpolatedTable, x: f64) -> f64 {
        t.evaluate(x).get("factor").and_then(Value::as_f64).unwrap()
    }

    #[test]
    fn test_sorted_breakpoints() {
        assert_eq!(aoi().breakpoints(), &[80_000.0, 95_000.0]);
    }

    #[test]
    fn test_midpoint() {
        assert!((factor(&aoi(), 87_500.0) - 0.595).abs() < 1e-12);
    }

    #[test]
    fn test_clip_low_and_high() {
        let t = aoi();
        assert!((factor(&t, 0.0) - 0.56).abs() < 1e-12);
        assert!((factor(&t, 1_000_000.0) - 0.63).abs() < 1e-12);
        assert!((factor(&t, 80_000.0) - 0.56).abs() < 1e-12);
    }

    #[test]
    fn test_nan_propagates() {
        assert!(factor(&aoi(), f64::NAN).is_nan());
    }

    #[test]
    fn test_interval_rows_use_lower_bound() {
        let table = LookupTable::new(
            "t",
            vec![
                RuleRow::new().interval("x", 0.0, 9.0).output("y", 1.0),
                RuleRow::new().interval("x", 10.0, 19.0).output("y", 3.0),
            ],
        )
        .unwrap();
        let t = InterpolatedTable::from_table(&table).unwrap();
        assert_eq!(t.breakpoints(), &[0.0, 10.0]);
        let y = t.evaluate(5.0).get("y").and_then(Value::as_f64).unwrap();
        assert!((y - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_multiple_inputs() {
        let table = LookupTable::new(
            "t",
            vec![RuleRow::new().exact("a", 1).exact("b", 2).output("y", 1.0)],
        )
        .unwrap();
        let err = InterpolatedTable::from_table(&table).unwrap_err();
        assert!(matches!(err, RatingError::InvalidInterpolationSource { .. }));
    }

    #[test]
    fn test_rejects_non_numeric_key() {
        let table = LookupTable::new(
            "t",
            vec![RuleRow::new().exact("a", "low").output("y", 1.0)],
        )
        .unwrap();
        assert!(InterpolatedTable::from_table(&table).is_err());
    }

    #[test]
    fn test_rejects_non_numeric_output() {
        let table = LookupTable::new(
            "t",
            vec![RuleRow::new().exact("a", 1).output("y", "high")],
        )
        .unwrap();
        assert!(InterpolatedTable::from_table(&table).is_err());
    }

    #[test]
    fn test_rejects_conflicting_duplicate_breakpoints() {
        let err = InterpolatedTable::from_points(
            "t",
            "x",
            vec!["y".into()],
            vec![(1.0, vec![1.0]), (1.0, vec![2.0])],
        )
        .unwrap_err();
        assert!(err.to_string().contains("different outputs"));
        let ok = InterpolatedTable::from_points(
            "t",
            "x",
            vec!["y".into()],
            vec![(1.0, vec![1.0]), (1.0, vec![1.0])],
        );
        assert_eq!(ok.unwrap().breakpoints().len(), 1);
    }

    #[test]
    fn test_evaluate_record() {
        let t = aoi();
        let out = t.evaluate_record(&Record::from_pairs([("amount", 87_500)])).unwrap();
        assert!(out.get("factor").is_some());
        assert!(t.evaluate_record(&Record::from_pairs([("amount", "n/a")])).is_err());
    }

    proptest! {
        #[test]
        fn prop_monotone_between_breakpoints(
            a in 80_000.0f64..95_000.0,
            b in 80_000.0f64..95_000.0,
        ) {
            let t = aoi();
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(factor(&t, lo) <= factor(&t, hi) + 1e-15);
        }

        #[test]
        fn prop_output_within_range(x in -1e7f64..1e7) {
            let y = factor(&aoi(), x);
            prop_assert!((0.56 - 1e-12..=0.63 + 1e-12).contains(&y));
        }
    }
}
