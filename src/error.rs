//! Error taxonomy for table construction, plan building and evaluation.
//!
//! Structural errors (malformed tables, malformed graphs, malformed levels)
//! are raised eagerly at construction or build time. Data-dependent errors
//! (no matching row, dangling foreign key) are raised while a specific step
//! evaluates a specific record and abort the whole batch.

use crate::value::{Key, Record};

/// Boxed error returned by custom step functions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Convenience alias used throughout the crate.
pub type Result<T, E = RatingError> = std::result::Result<T, E>;

/// All failures produced by u-rating.
#[derive(Debug, thiserror::Error)]
pub enum RatingError {
    /// Two rows of a lookup table can match the same record.
    #[error("table '{table}' is ambiguous: rows {first} and {second} overlap")]
    AmbiguousTable {
        table: String,
        first: usize,
        second: usize,
    },

    /// A lookup table definition is malformed.
    #[error("table '{table}' is invalid: {reason}")]
    InvalidTable { table: String, reason: String },

    /// A lookup table cannot be turned into an interpolated table.
    #[error("table '{table}' cannot be interpolated: {reason}")]
    InvalidInterpolationSource { table: String, reason: String },

    /// The dependency graph contains a cycle.
    #[error("dependency cycle among steps: {}", .members.join(" -> "))]
    Cycle { members: Vec<String> },

    /// A step input is neither an entity attribute nor any step's output.
    #[error("step '{step}' requires '{input}', which no step or entity level provides")]
    UnresolvedInput { step: String, input: String },

    /// A step input names a column produced by several steps.
    #[error(
        "step '{step}' reads '{input}', which is produced by {}; qualify it as 'step.{input}'",
        .producers.join(", ")
    )]
    AmbiguousInput {
        step: String,
        input: String,
        producers: Vec<String>,
    },

    /// A session lookup names a column produced by several steps.
    #[error("'{name}' is produced by {}; qualify it as 'step.{name}'", .producers.join(", "))]
    AmbiguousName { name: String, producers: Vec<String> },

    /// No rule row matched a record.
    #[error(
        "no row of table '{table}' matches {record}{}",
        describe_origin(.step.as_deref(), .key.as_ref())
    )]
    NoMatch {
        table: String,
        record: Record,
        step: Option<String>,
        key: Option<Key>,
    },

    /// A child row references an ancestor row that does not exist.
    #[error("level '{level}' has no row for key {key}")]
    JoinKey { level: String, key: Key },

    /// Requested attributes live on levels outside a common ancestor chain.
    #[error("levels '{first}' and '{second}' are not on a common ancestor chain")]
    IncompatibleLevels { first: String, second: String },

    /// A custom step function failed.
    #[error("step '{step}' failed: {source}")]
    StepExecution {
        step: String,
        #[source]
        source: BoxError,
    },

    /// A step read a name it did not declare as an input.
    #[error("step '{step}' read undeclared input '{name}'")]
    UndeclaredInput { step: String, name: String },

    /// A step result lacks one of its declared outputs.
    #[error("step '{step}' did not produce declared output '{output}'")]
    MissingOutput { step: String, output: String },

    /// Input inference could not determine a function step's outputs.
    #[error("input probe of step '{step}' failed: {reason}")]
    ProbeFailed { step: String, reason: String },

    /// The name is not an attribute of any level.
    #[error("unknown attribute '{name}'")]
    UnknownAttribute { name: String },

    /// The name is not a level of the store.
    #[error("unknown level '{name}'")]
    UnknownLevel { name: String },

    /// An entity level is malformed or does not fit the hierarchy.
    #[error("invalid level '{level}': {reason}")]
    InvalidLevel { level: String, reason: String },

    /// A key occurs twice within one level.
    #[error("level '{level}' contains duplicate key {key}")]
    DuplicateKey { level: String, key: Key },

    /// An attribute name is owned by more than one level.
    #[error("attribute '{name}' is defined on both '{first}' and '{second}'")]
    DuplicateAttribute {
        name: String,
        first: String,
        second: String,
    },

    /// A frame operation received inconsistent shapes or names.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// A configuration struct failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The worker pool for parallel evaluation could not be created.
    #[error("worker pool unavailable: {0}")]
    WorkerPool(String),

    /// Evaluation was cancelled through the cancellation flag.
    #[error("rating cancelled before step '{step}'")]
    Cancelled { step: String },
}

fn describe_origin(step: Option<&str>, key: Option<&Key>) -> String {
    match (step, key) {
        (Some(step), Some(key)) => format!(" (step '{step}', key {key})"),
        (Some(step), None) => format!(" (step '{step}')"),
        (None, Some(key)) => format!(" (key {key})"),
        (None, None) => String::new(),
    }
}

impl RatingError {
    /// Whether the error describes malformed structure rather than data.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            RatingError::AmbiguousTable { .. }
                | RatingError::InvalidTable { .. }
                | RatingError::InvalidInterpolationSource { .. }
                | RatingError::Cycle { .. }
                | RatingError::UnresolvedInput { .. }
                | RatingError::AmbiguousInput { .. }
                | RatingError::InvalidLevel { .. }
                | RatingError::DuplicateKey { .. }
                | RatingError::DuplicateAttribute { .. }
                | RatingError::ProbeFailed { .. }
                | RatingError::InvalidConfig(_)
        )
    }

    /// Name of the step the error is attributed to, if any.
    pub fn step(&self) -> Option<&str> {
        match self {
            RatingError::UnresolvedInput { step, .. }
            | RatingError::AmbiguousInput { step, .. }
            | RatingError::StepExecution { step, .. }
            | RatingError::UndeclaredInput { step, .. }
            | RatingError::MissingOutput { step, .. }
            | RatingError::ProbeFailed { step, .. }
            | RatingError::Cancelled { step } => Some(step),
            RatingError::NoMatch { step, .. } => step.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn test_no_match_message_names_step_and_key() {
        let err = RatingError::NoMatch {
            table: "age_factor".into(),
            record: Record::from_pairs([("age", Value::from(99))]),
            step: Some("age_factor".into()),
            key: Some(Key::new(vec![Value::from(7), Value::from(2)])),
        };
        let msg = err.to_string();
        assert!(msg.contains("age_factor"));
        assert!(msg.contains("age: 99"));
        assert!(msg.contains("(7, 2)"));
        assert_eq!(err.step(), Some("age_factor"));
        assert!(!err.is_structural());
    }

    #[test]
    fn test_cycle_message_lists_members() {
        let err = RatingError::Cycle {
            members: vec!["a".into(), "b".into()],
        };
        assert_eq!(err.to_string(), "dependency cycle among steps: a -> b");
        assert!(err.is_structural());
    }

    #[test]
    fn test_step_execution_keeps_source() {
        let source: BoxError = "division by zero".into();
        let err = RatingError::StepExecution {
            step: "ratio".into(),
            source,
        };
        assert!(std::error::Error::source(&err).is_some());
        assert_eq!(err.to_string(), "step 'ratio' failed: division by zero");
    }
}
