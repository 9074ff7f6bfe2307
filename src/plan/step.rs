//! Steps and the read contract they evaluate against.

use crate::error::{BoxError, Result};
use crate::store::Frame;
use crate::table::{InterpolatedTable, LookupTable};
use std::fmt;
use std::sync::Arc;

/// Read access to entity attributes and earlier step outputs.
///
/// Implemented by the live [`Session`](super::Session), by the per-step view
/// handed to running steps, and by [`RecordingContext`](super::RecordingContext)
/// during input inference.
pub trait Context {
    /// One column, aligned to the level it lives on.
    fn get(&self, name: &str) -> Result<Frame>;

    /// Several columns broadcast-joined to the deepest of their levels.
    fn get_many(&self, names: &[&str]) -> Result<Frame>;

    /// Every attribute of an entity level.
    fn table(&self, level: &str) -> Result<Frame>;
}

/// Signature of a custom step function.
pub type StepFn = dyn Fn(&dyn Context) -> std::result::Result<Frame, BoxError> + Send + Sync;

/// What a step evaluates.
#[derive(Clone)]
pub enum StepKind {
    /// Row-by-row lookup of the table's inputs.
    Table(Arc<LookupTable>),

    /// Row-by-row interpolation of the table's single input.
    Interpolated(Arc<InterpolatedTable>),

    /// A custom function reading through a [`Context`].
    Function(Arc<StepFn>),
}

/// A computation unit registered in a [`RatingPlan`](super::RatingPlan).
///
/// Table steps take their inputs and outputs from the table. Function steps
/// have their inputs inferred by a trial call against a recording context;
/// their outputs are either declared with [`Step::with_outputs`] or taken
/// from the columns of the frame returned by that trial call.
///
/// # Examples
///
/// ```
/// use u_rating::plan::{Context, Step};
///
/// let step = Step::function(|ctx: &dyn Context| {
///     let drivers = ctx.get_many(&["age", "points"])?;
///     Ok(drivers.map_rows("risk", |row| {
///         let age = row.f64("age").unwrap_or(0.0);
///         let points = row.f64("points").unwrap_or(0.0);
///         if age < 25.0 { 1.5 + points * 0.1 } else { 1.0 + points * 0.1 }
///     }))
/// });
/// assert!(step.declared_outputs().is_none());
/// ```
#[derive(Clone)]
pub struct Step {
    kind: StepKind,
    outputs: Option<Vec<String>>,
}

impl Step {
    pub fn table(table: LookupTable) -> Self {
        Self {
            kind: StepKind::Table(Arc::new(table)),
            outputs: None,
        }
    }

    pub fn interpolated(table: InterpolatedTable) -> Self {
        Self {
            kind: StepKind::Interpolated(Arc::new(table)),
            outputs: None,
        }
    }

    /// Wraps a custom computation.
    ///
    /// The function is called once on registration against zero-row
    /// stand-in frames to learn what it reads. A panic in that call is
    /// caught, but the process panic hook still runs first and prints the
    /// message to stderr. Functions that cannot handle empty input should
    /// return an error instead of panicking, and declare their outputs
    /// with [`Step::with_outputs`].
    pub fn function<F>(f: F) -> Self
    where
        F: Fn(&dyn Context) -> std::result::Result<Frame, BoxError> + Send + Sync + 'static,
    {
        Self {
            kind: StepKind::Function(Arc::new(f)),
            outputs: None,
        }
    }

    /// Declares the outputs of a function step.
    ///
    /// Ignored for table steps, whose outputs are the table's.
    pub fn with_outputs<S: Into<String>>(mut self, outputs: impl IntoIterator<Item = S>) -> Self {
        self.outputs = Some(outputs.into_iter().map(Into::into).collect());
        self
    }

    pub fn kind(&self) -> &StepKind {
        &self.kind
    }

    pub fn declared_outputs(&self) -> Option<&[String]> {
        self.outputs.as_deref()
    }

    /// Name of the backing table, if any.
    pub fn table_name(&self) -> Option<&str> {
        match &self.kind {
            StepKind::Table(t) => Some(t.name()),
            StepKind::Interpolated(t) => Some(t.name()),
            StepKind::Function(_) => None,
        }
    }
}

impl From<LookupTable> for Step {
    fn from(table: LookupTable) -> Self {
        Step::table(table)
    }
}

impl From<InterpolatedTable> for Step {
    fn from(table: InterpolatedTable) -> Self {
        Step::interpolated(table)
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            StepKind::Table(t) => format!("Table({})", t.name()),
            StepKind::Interpolated(t) => format!("Interpolated({})", t.name()),
            StepKind::Function(_) => "Function".to_string(),
        };
        f.debug_struct("Step")
            .field("kind", &kind)
            .field("outputs", &self.outputs)
            .finish()
    }
}

/// A step together with its name and resolved signature.
#[derive(Debug, Clone)]
pub struct RegisteredStep {
    pub(crate) name: String,
    pub(crate) step: Step,
    pub(crate) inputs: Vec<String>,
    pub(crate) outputs: Vec<String>,
}

impl RegisteredStep {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn step(&self) -> &Step {
        &self.step
    }

    /// Names the step reads, in first-access order.
    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }
}
