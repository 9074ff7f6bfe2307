//! Input inference for function steps.
//!
//! A function step is called once against a [`RecordingContext`], which
//! answers every read with an empty stand-in frame and logs the name that
//! was read. The logged names become the step's inputs.

use super::step::{Context, Step, StepKind};
use crate::error::{RatingError, Result};
use crate::store::Frame;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};

/// A [`Context`] that records what is read and returns no data.
///
/// Stand-in frames have zero rows and one column per requested name, so
/// row-wise frame operations succeed without ever seeing a value.
///
/// # Examples
///
/// ```
/// use u_rating::plan::{Context, RecordingContext};
///
/// let ctx = RecordingContext::new();
/// let frame = ctx.get_many(&["age", "points"]).unwrap();
/// assert!(frame.is_empty());
/// assert_eq!(ctx.accessed(), vec!["age".to_string(), "points".to_string()]);
/// ```
#[derive(Debug, Default)]
pub struct RecordingContext {
    log: RefCell<Vec<String>>,
}

impl RecordingContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Distinct names read so far, in first-access order.
    pub fn accessed(&self) -> Vec<String> {
        self.log.borrow().clone()
    }

    fn record(&self, name: &str) {
        let mut log = self.log.borrow_mut();
        if !log.iter().any(|n| n == name) {
            log.push(name.to_string());
        }
    }
}

impl Context for RecordingContext {
    fn get(&self, name: &str) -> Result<Frame> {
        self.record(name);
        Ok(Frame::placeholder(&[name]))
    }

    fn get_many(&self, names: &[&str]) -> Result<Frame> {
        for name in names {
            self.record(name);
        }
        Ok(Frame::placeholder(names))
    }

    fn table(&self, level: &str) -> Result<Frame> {
        self.record(level);
        Ok(Frame::placeholder::<&str>(&[]))
    }
}

/// Inputs and outputs of a step.
pub(crate) fn infer_signature(name: &str, step: &Step) -> Result<(Vec<String>, Vec<String>)> {
    let f = match step.kind() {
        StepKind::Table(t) => return Ok((t.inputs().to_vec(), t.outputs().to_vec())),
        StepKind::Interpolated(t) => return Ok((t.inputs().to_vec(), t.outputs().to_vec())),
        StepKind::Function(f) => f,
    };

    let ctx = RecordingContext::new();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| f(&ctx)));
    let inputs = ctx.accessed();

    let outputs = match (step.declared_outputs(), outcome) {
        (Some(declared), outcome) => {
            if !matches!(outcome, Ok(Ok(_))) {
                tracing::trace!(step = name, "probe failed; using declared outputs");
            }
            declared.to_vec()
        }
        (None, Ok(Ok(frame))) => frame.names().to_vec(),
        (None, Ok(Err(e))) => {
            return Err(RatingError::ProbeFailed {
                step: name.to_string(),
                reason: e.to_string(),
            })
        }
        (None, Err(_)) => {
            return Err(RatingError::ProbeFailed {
                step: name.to_string(),
                reason: "function panicked on stand-in data".into(),
            })
        }
    };

    if outputs.is_empty() {
        return Err(RatingError::ProbeFailed {
            step: name.to_string(),
            reason: "no outputs declared or returned".into(),
        });
    }
    let duplicate = outputs
        .iter()
        .enumerate()
        .find_map(|(i, o)| outputs[..i].contains(o).then_some(o));
    if let Some(dup) = duplicate {
        return Err(RatingError::ProbeFailed {
            step: name.to_string(),
            reason: format!("output '{dup}' is listed twice"),
        });
    }

    tracing::trace!(step = name, ?inputs, ?outputs, "inferred step signature");
    Ok((inputs, outputs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{LookupTable, RuleRow};

    #[test]
    fn test_table_signature() {
        let table = LookupTable::new(
            "tier",
            vec![RuleRow::new().exact("credit_tier", "A").exact("prior", "Y").output("BI", 1.0)],
        )
        .unwrap();
        let (inputs, outputs) = infer_signature("tier", &Step::table(table)).unwrap();
        assert_eq!(inputs, vec!["credit_tier", "prior"]);
        assert_eq!(outputs, vec!["BI"]);
    }

    #[test]
    fn test_function_inputs_recorded_in_order() {
        let step = Step::function(|ctx: &dyn Context| {
            let base = ctx.get("base_rate")?;
            let drivers = ctx.get_many(&["age", "base_rate", "points"])?;
            let _ = ctx.table("policy")?;
            Ok(drivers.map_rows("premium", |r| {
                let rate = base.value("base_rate").and_then(|v| v.as_f64());
                r.f64("age").unwrap_or(1.0) * rate.unwrap_or(1.0)
            }))
        });
        let (inputs, outputs) = infer_signature("premium", &step).unwrap();
        assert_eq!(inputs, vec!["base_rate", "age", "points", "policy"]);
        assert_eq!(outputs, vec!["premium"]);
    }

    #[test]
    fn test_declared_outputs_survive_failing_probe() {
        let step = Step::function(|ctx: &dyn Context| {
            let f = ctx.get("x")?;
            // indexing a stand-in frame fails
            let first = f.try_column("x")?.first().cloned().ok_or("empty input")?;
            Ok(Frame::constant("y", first))
        })
        .with_outputs(["y"]);
        let (inputs, outputs) = infer_signature("s", &step).unwrap();
        assert_eq!(inputs, vec!["x"]);
        assert_eq!(outputs, vec!["y"]);
    }

    #[test]
    fn test_failing_probe_without_outputs() {
        let step = Step::function(|ctx: &dyn Context| {
            ctx.get("x")?;
            Err("boom".into())
        });
        let err = infer_signature("s", &step).unwrap_err();
        assert!(matches!(err, RatingError::ProbeFailed { ref reason, .. } if reason == "boom"));
    }

    #[test]
    fn test_panicking_probe_without_outputs() {
        let step = Step::function(|ctx: &dyn Context| {
            let f = ctx.get("x")?;
            let v = f.column("x").map(|c| c[0].clone());
            Ok(Frame::constant("y", v.unwrap_or_default()))
        });
        let err = infer_signature("s", &step).unwrap_err();
        assert!(matches!(err, RatingError::ProbeFailed { .. }));
    }

    #[test]
    fn test_duplicate_declared_outputs() {
        let step = Step::function(|_: &dyn Context| Ok(Frame::scalar())).with_outputs(["a", "a"]);
        assert!(infer_signature("s", &step).is_err());
    }
}
