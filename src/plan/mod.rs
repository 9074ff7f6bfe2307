//! Rating plans and their execution.
//!
//! A [`RatingPlan`] is a registry of named [`Step`]s. Table steps take their
//! inputs and outputs from the table; function steps have their inputs
//! inferred by a trial call against a [`RecordingContext`]. The plan derives
//! a [`DependencyGraph`] whose topological waves drive evaluation.
//!
//! Rating a batch binds an [`EntityStore`](crate::store::EntityStore) to a
//! [`Session`] and evaluates wave by wave, sequentially or with the steps of
//! a wave running on a worker pool that lives for the duration of the call.
//! Step outputs are merged into the session only at the end of each wave.
//!
//! # Key Types
//!
//! - [`Step`]: A table, interpolated table or function
//! - [`Context`]: The read contract steps evaluate against
//! - [`RatingPlan`]: Registry, graph cache and `rate` entry points
//! - [`RateConfig`]: Parallelism, worker limit, [`NoMatchPolicy`]
//! - [`Session`]: Results of one run, queryable by name

mod config;
mod graph;
mod probe;
mod registry;
mod runner;
mod session;
mod step;

pub use config::{NoMatchPolicy, RateConfig};
pub use graph::{Binding, DependencyGraph};
pub use probe::RecordingContext;
pub use registry::RatingPlan;
pub use session::Session;
pub use step::{Context, RegisteredStep, Step, StepFn, StepKind};
