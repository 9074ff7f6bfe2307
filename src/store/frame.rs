//! Key-aligned columnar frames.

use crate::error::{RatingError, Result};
use crate::value::{Key, Record, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Aggregation applied when rolling a column up to an ancestor level.
///
/// Numeric aggregates skip nulls and non-numeric values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Aggregate {
    Max,
    Min,
    /// Sum of numeric values; `0.0` for a group without any.
    Sum,
    Mean,
    /// Number of non-null values.
    Count,
    /// First value of the group in row order.
    First,
}

impl Aggregate {
    fn apply(self, values: &[&Value]) -> Value {
        let numbers = || values.iter().filter_map(|v| v.as_f64());
        match self {
            Aggregate::Max => numbers().reduce(f64::max).into(),
            Aggregate::Min => numbers().reduce(f64::min).into(),
            Aggregate::Sum => Value::Float(numbers().sum()),
            Aggregate::Mean => {
                let (sum, n) = numbers().fold((0.0, 0usize), |(s, n), x| (s + x, n + 1));
                if n == 0 {
                    Value::Null
                } else {
                    Value::Float(sum / n as f64)
                }
            }
            Aggregate::Count => Value::Int(values.iter().filter(|v| !v.is_null()).count() as i64),
            Aggregate::First => values.first().map(|v| (*v).clone()).unwrap_or_default(),
        }
    }
}

/// Columns of values aligned to the keys of one entity level.
///
/// Every frame row is identified by a [`Key`] whose components are named by
/// `key_names`. A frame with no key columns (depth 0) holds level-independent
/// values and broadcasts to every level when joined.
///
/// # Examples
///
/// ```
/// use u_rating::store::Frame;
/// use u_rating::value::{Key, Value};
///
/// let frame = Frame::from_keys(
///     "driver",
///     vec!["policy_id".into(), "driver_id".into()],
///     vec![Key::new(vec![1.into(), 1.into()]), Key::new(vec![1.into(), 2.into()])],
/// )
/// .unwrap()
/// .with_column("age", vec![Value::from(17), Value::from(45)])
/// .unwrap();
///
/// let young = frame.map_rows("young", |row| {
///     row.get("age").and_then(Value::as_i64).map(|a| a < 25)
/// });
/// assert_eq!(young.column("young").unwrap(), &[Value::Bool(true), Value::Bool(false)]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    level: Option<String>,
    key_names: Arc<Vec<String>>,
    keys: Arc<Vec<Key>>,
    names: Vec<String>,
    columns: Vec<Vec<Value>>,
}

impl Frame {
    /// Creates a frame without columns over the given keys.
    pub fn from_keys(
        level: impl Into<String>,
        key_names: Vec<String>,
        keys: Vec<Key>,
    ) -> Result<Self> {
        let level = level.into();
        if let Some(bad) = keys.iter().find(|k| k.len() != key_names.len()) {
            return Err(RatingError::InvalidFrame(format!(
                "key {bad} of level '{level}' does not have {} components",
                key_names.len()
            )));
        }
        Ok(Self {
            level: Some(level),
            key_names: Arc::new(key_names),
            keys: Arc::new(keys),
            names: Vec::new(),
            columns: Vec::new(),
        })
    }

    /// A single-row frame without key columns.
    pub fn scalar() -> Self {
        Self {
            level: None,
            key_names: Arc::new(Vec::new()),
            keys: Arc::new(vec![Key::empty()]),
            names: Vec::new(),
            columns: Vec::new(),
        }
    }

    /// A single-row frame holding one constant column.
    pub fn constant(name: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut frame = Self::scalar();
        frame.names.push(name.into());
        frame.columns.push(vec![value.into()]);
        frame
    }

    /// A frame with the given columns and no rows.
    ///
    /// Used as an inert stand-in during input inference.
    pub(crate) fn placeholder<S: AsRef<str>>(names: &[S]) -> Self {
        Self {
            level: None,
            key_names: Arc::new(Vec::new()),
            keys: Arc::new(Vec::new()),
            names: names.iter().map(|n| n.as_ref().to_string()).collect(),
            columns: vec![Vec::new(); names.len()],
        }
    }

    /// Same keys, no columns.
    pub(crate) fn with_same_keys(&self) -> Self {
        Self {
            level: self.level.clone(),
            key_names: Arc::clone(&self.key_names),
            keys: Arc::clone(&self.keys),
            names: Vec::new(),
            columns: Vec::new(),
        }
    }

    /// Adds a column, replacing any existing column of the same name.
    pub fn with_column(mut self, name: impl Into<String>, values: Vec<Value>) -> Result<Self> {
        let name = name.into();
        if values.len() != self.keys.len() {
            return Err(RatingError::InvalidFrame(format!(
                "column '{name}' has {} values for {} rows",
                values.len(),
                self.keys.len()
            )));
        }
        self.put(name, values);
        Ok(self)
    }

    fn put(&mut self, name: String, values: Vec<Value>) {
        match self.names.iter().position(|n| *n == name) {
            Some(i) => self.columns[i] = values,
            None => {
                self.names.push(name);
                self.columns.push(values);
            }
        }
    }

    /// Name of the level the rows belong to; `None` at depth 0.
    pub fn level(&self) -> Option<&str> {
        self.level.as_deref()
    }

    pub fn key_names(&self) -> &[String] {
        &self.key_names
    }

    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    pub(crate) fn shared_keys(&self) -> &Arc<Vec<Key>> {
        &self.keys
    }

    /// Number of key columns.
    pub fn depth(&self) -> usize {
        self.key_names.len()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn column(&self, name: &str) -> Option<&[Value]> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.columns[i].as_slice())
    }

    /// Like [`Frame::column`], failing with [`RatingError::UnknownAttribute`].
    pub fn try_column(&self, name: &str) -> Result<&[Value]> {
        self.column(name).ok_or_else(|| RatingError::UnknownAttribute {
            name: name.to_string(),
        })
    }

    /// The single value of a one-row frame.
    pub fn value(&self, name: &str) -> Option<&Value> {
        match self.column(name)? {
            [v] => Some(v),
            _ => None,
        }
    }

    pub fn row(&self, index: usize) -> RowRef<'_> {
        RowRef { frame: self, index }
    }

    pub fn rows(&self) -> impl Iterator<Item = RowRef<'_>> {
        (0..self.len()).map(move |index| self.row(index))
    }

    /// Row `index` as a record of all columns.
    pub fn record(&self, index: usize) -> Record {
        self.names
            .iter()
            .zip(&self.columns)
            .map(|(n, col)| (n.clone(), col[index].clone()))
            .collect()
    }

    /// Renames a column.
    pub fn rename(mut self, from: &str, to: impl Into<String>) -> Result<Self> {
        let to = to.into();
        let i = self
            .names
            .iter()
            .position(|n| n == from)
            .ok_or_else(|| RatingError::UnknownAttribute {
                name: from.to_string(),
            })?;
        if let Some(j) = self.names.iter().position(|n| *n == to) {
            if j != i {
                self.names.remove(j);
                self.columns.remove(j);
            }
        }
        let i = self.names.iter().position(|n| n == from).unwrap_or(i);
        self.names[i] = to;
        Ok(self)
    }

    /// Keeps only the named columns, in the given order.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Self> {
        let mut out = self.with_same_keys();
        for name in names {
            let name = name.as_ref();
            out.put(name.to_string(), self.try_column(name)?.to_vec());
        }
        Ok(out)
    }

    /// Keeps the rows for which `predicate` holds.
    pub fn filter(&self, predicate: impl Fn(RowRef<'_>) -> bool) -> Self {
        let kept: Vec<usize> = (0..self.len()).filter(|&i| predicate(self.row(i))).collect();
        Self {
            level: self.level.clone(),
            key_names: Arc::clone(&self.key_names),
            keys: Arc::new(kept.iter().map(|&i| self.keys[i].clone()).collect()),
            names: self.names.clone(),
            columns: self
                .columns
                .iter()
                .map(|col| kept.iter().map(|&i| col[i].clone()).collect())
                .collect(),
        }
    }

    /// Re-keys this frame onto the rows of `target`.
    ///
    /// Rows of `target` missing here get `Null` in every column; the result
    /// shares `target`'s keys. A row whose key `target` does not have fails
    /// with [`RatingError::InvalidFrame`].
    pub fn align_to(&self, target: &Frame) -> Result<Frame> {
        if self.level != target.level || self.key_names != target.key_names {
            return Err(RatingError::InvalidFrame(format!(
                "cannot align a frame of level '{}' to level '{}'",
                self.level.as_deref().unwrap_or("<scalar>"),
                target.level.as_deref().unwrap_or("<scalar>")
            )));
        }

        let mut out = target.with_same_keys();
        if Arc::ptr_eq(&self.keys, &target.keys) || self.keys == target.keys {
            out.names = self.names.clone();
            out.columns = self.columns.clone();
            return Ok(out);
        }

        let index: HashMap<&Key, usize> =
            target.keys.iter().enumerate().map(|(i, k)| (k, i)).collect();
        let mut rows = vec![None; target.len()];
        for (i, key) in self.keys.iter().enumerate() {
            match index.get(key) {
                Some(&t) if rows[t].is_none() => rows[t] = Some(i),
                Some(_) => {
                    return Err(RatingError::InvalidFrame(format!("row {key} appears twice")))
                }
                None => {
                    return Err(RatingError::InvalidFrame(format!(
                        "row {key} is not a row of level '{}'",
                        target.level.as_deref().unwrap_or("<scalar>")
                    )))
                }
            }
        }
        for (name, column) in self.names.iter().zip(&self.columns) {
            let values = rows
                .iter()
                .map(|r| r.map_or(Value::Null, |i| column[i].clone()))
                .collect();
            out.put(name.clone(), values);
        }
        Ok(out)
    }

    /// Computes one value per row into a new single-column frame.
    pub fn map_rows<V: Into<Value>>(
        &self,
        output: impl Into<String>,
        f: impl Fn(RowRef<'_>) -> V,
    ) -> Self {
        let values = self.rows().map(|row| f(row).into()).collect();
        let mut out = self.with_same_keys();
        out.put(output.into(), values);
        out
    }

    /// Like [`Frame::map_rows`] for computations that can fail.
    pub fn try_map_rows<V: Into<Value>, E>(
        &self,
        output: impl Into<String>,
        f: impl Fn(RowRef<'_>) -> std::result::Result<V, E>,
    ) -> std::result::Result<Self, E> {
        let values = self
            .rows()
            .map(|row| f(row).map(Into::into))
            .collect::<std::result::Result<Vec<Value>, E>>()?;
        let mut out = self.with_same_keys();
        out.put(output.into(), values);
        Ok(out)
    }

    /// Columns of `other` appended to this frame.
    ///
    /// Both frames must have the same keys in the same order.
    pub fn merge(mut self, other: &Frame) -> Result<Self> {
        if !Arc::ptr_eq(&self.keys, &other.keys) && self.keys != other.keys {
            return Err(RatingError::InvalidFrame(
                "cannot merge frames with different keys".into(),
            ));
        }
        for (name, col) in other.names.iter().zip(&other.columns) {
            self.put(name.clone(), col.clone());
        }
        Ok(self)
    }

    /// Aggregates `column` per row of `ancestor`.
    ///
    /// `ancestor` must be keyed by a prefix of this frame's key columns (a
    /// level frame such as `ctx.table("policy")`). Ancestor rows without
    /// any child row aggregate an empty group.
    pub fn rollup(&self, column: &str, aggregate: Aggregate, ancestor: &Frame) -> Result<Frame> {
        let depth = ancestor.depth();
        if depth > self.depth() || ancestor.key_names() != &self.key_names[..depth] {
            return Err(RatingError::IncompatibleLevels {
                first: self.level().unwrap_or("<scalar>").to_string(),
                second: ancestor.level().unwrap_or("<scalar>").to_string(),
            });
        }
        let values = self.try_column(column)?;

        let mut groups: HashMap<&[Value], Vec<&Value>> = HashMap::new();
        for (key, value) in self.keys.iter().zip(values) {
            groups.entry(key.prefix(depth)).or_default().push(value);
        }

        let rolled = ancestor
            .keys()
            .iter()
            .map(|k| aggregate.apply(groups.get(&k[..]).map_or(&[][..], Vec::as_slice)))
            .collect();
        let mut out = ancestor.with_same_keys();
        out.put(column.to_string(), rolled);
        Ok(out)
    }
}

/// Borrowed view of one frame row.
#[derive(Debug, Clone, Copy)]
pub struct RowRef<'a> {
    frame: &'a Frame,
    index: usize,
}

impl<'a> RowRef<'a> {
    pub fn get(&self, name: &str) -> Option<&'a Value> {
        self.frame.column(name).map(|col| &col[self.index])
    }

    /// Numeric value of `name`, if present and numeric.
    pub fn f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_f64)
    }

    pub fn key(&self) -> &'a Key {
        &self.frame.keys[self.index]
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drivers() -> Frame {
        let keys = vec![
            Key::new(vec![1.into(), 1.into()]),
            Key::new(vec![1.into(), 2.into()]),
            Key::new(vec![2.into(), 1.into()]),
        ];
        Frame::from_keys("driver", vec!["policy_id".into(), "driver_id".into()], keys)
            .unwrap()
            .with_column("age", vec![17.into(), 45.into(), 30.into()])
            .unwrap()
            .with_column("points", vec![2.into(), Value::Null, 1.into()])
            .unwrap()
    }

    fn policies() -> Frame {
        Frame::from_keys(
            "policy",
            vec!["policy_id".into()],
            vec![Key::new(vec![1.into()]), Key::new(vec![2.into()]), Key::new(vec![3.into()])],
        )
        .unwrap()
    }

    #[test]
    fn test_column_length_checked() {
        let err = drivers().with_column("x", vec![1.into()]).unwrap_err();
        assert!(matches!(err, RatingError::InvalidFrame(_)));
    }

    #[test]
    fn test_key_length_checked() {
        let err = Frame::from_keys("p", vec!["a".into()], vec![Key::empty()]).unwrap_err();
        assert!(matches!(err, RatingError::InvalidFrame(_)));
    }

    #[test]
    fn test_scalar_and_constant() {
        let c = Frame::constant("base", 100.0);
        assert_eq!(c.depth(), 0);
        assert_eq!(c.len(), 1);
        assert_eq!(c.value("base"), Some(&Value::Float(100.0)));
        assert!(c.level().is_none());
    }

    #[test]
    fn test_select_and_rename() {
        let f = drivers().select(&["points"]).unwrap();
        assert_eq!(f.names(), &["points".to_string()]);
        assert!(drivers().select(&["nope"]).is_err());

        let f = drivers().rename("age", "driver_age").unwrap();
        assert!(f.contains("driver_age"));
        assert!(!f.contains("age"));
        let f = drivers().rename("age", "points").unwrap();
        assert_eq!(f.names(), &["points".to_string()]);
        assert_eq!(f.column("points").unwrap()[0], Value::Int(17));
    }

    #[test]
    fn test_filter_keeps_keys_aligned() {
        let adults = drivers().filter(|r| r.f64("age").is_some_and(|a| a >= 18.0));
        assert_eq!(adults.len(), 2);
        assert_eq!(adults.row(0).key(), &Key::new(vec![1.into(), 2.into()]));
        assert_eq!(adults.column("age").unwrap(), &[Value::Int(45), Value::Int(30)]);
    }

    #[test]
    fn test_align_to_fills_missing_rows() {
        let all = drivers();
        let adults = all.filter(|r| r.f64("age").is_some_and(|a| a >= 18.0));
        let aligned = adults.align_to(&all).unwrap();
        assert_eq!(aligned.len(), 3);
        assert_eq!(aligned.keys(), all.keys());
        assert_eq!(
            aligned.column("age").unwrap(),
            &[Value::Null, Value::Int(45), Value::Int(30)]
        );
        assert!(Arc::ptr_eq(aligned.shared_keys(), all.shared_keys()));
    }

    #[test]
    fn test_align_to_rejects_foreign_rows() {
        let one = Frame::from_keys(
            "driver",
            vec!["policy_id".into(), "driver_id".into()],
            vec![Key::new(vec![9.into(), 9.into()])],
        )
        .unwrap();
        assert!(matches!(one.align_to(&drivers()), Err(RatingError::InvalidFrame(_))));
        assert!(drivers().align_to(&policies()).is_err());
    }

    #[test]
    fn test_try_map_rows_propagates_error() {
        let res: std::result::Result<Frame, String> = drivers().try_map_rows("x", |r| {
            r.f64("points").ok_or_else(|| format!("row {} has no points", r.index()))
        });
        assert_eq!(res.unwrap_err(), "row 1 has no points");
    }

    #[test]
    fn test_merge_requires_same_keys() {
        let d = drivers();
        let extra = d.map_rows("double", |r| r.f64("age").map(|a| a * 2.0));
        let merged = d.clone().merge(&extra).unwrap();
        assert!(merged.contains("double"));
        assert!(d.merge(&policies()).is_err());
    }

    #[test]
    fn test_rollup_to_ancestor() {
        let d = drivers();
        let p = policies();
        let max_age = d.rollup("age", Aggregate::Max, &p).unwrap();
        assert_eq!(max_age.level(), Some("policy"));
        assert_eq!(
            max_age.column("age").unwrap(),
            &[Value::Float(45.0), Value::Float(30.0), Value::Null]
        );
        let count = d.rollup("points", Aggregate::Count, &p).unwrap();
        assert_eq!(count.column("points").unwrap(), &[Value::Int(1), Value::Int(1), Value::Int(0)]);
        let sum = d.rollup("age", Aggregate::Sum, &p).unwrap();
        assert_eq!(sum.column("age").unwrap()[2], Value::Float(0.0));
        let mean = d.rollup("age", Aggregate::Mean, &p).unwrap();
        assert_eq!(mean.column("age").unwrap()[0], Value::Float(31.0));
        let first = d.rollup("age", Aggregate::First, &p).unwrap();
        assert_eq!(first.column("age").unwrap()[0], Value::Int(17));
    }

    #[test]
    fn test_rollup_rejects_non_ancestor() {
        let other = Frame::from_keys("vehicle", vec!["vin".into()], vec![]).unwrap();
        let err = drivers().rollup("age", Aggregate::Max, &other).unwrap_err();
        assert!(matches!(err, RatingError::IncompatibleLevels { .. }));
    }

    #[test]
    fn test_rollup_to_scalar() {
        let total = drivers().rollup("age", Aggregate::Sum, &Frame::scalar()).unwrap();
        assert_eq!(total.value("age"), Some(&Value::Float(92.0)));
    }
}
