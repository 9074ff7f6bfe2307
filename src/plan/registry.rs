//! The step registry.

use super::config::RateConfig;
use super::graph::DependencyGraph;
use super::probe::infer_signature;
use super::runner::WaveRunner;
use super::session::Session;
use super::step::{RegisteredStep, Step};
use crate::error::{RatingError, Result};
use crate::store::EntityStore;
use std::collections::BTreeSet;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, OnceLock};

/// A named registry of steps and the dependency graph derived from it.
///
/// The graph is built on first use and cached until the registry changes.
/// Plans are cheap to clone; steps are shared.
///
/// # Examples
///
/// ```
/// use u_rating::plan::RatingPlan;
/// use u_rating::store::{EntityLevel, EntityStore};
/// use u_rating::table::{LookupTable, RuleRow};
/// use u_rating::value::Value;
///
/// let placement = LookupTable::new(
///     "credit_tier_placement",
///     vec![
///         RuleRow::new().interval("credit_score", 0.0, 699.0).output("credit_tier", "B"),
///         RuleRow::new().interval("credit_score", 700.0, 999.0).output("credit_tier", "A"),
///     ],
/// )
/// .unwrap();
/// let factor = LookupTable::new(
///     "credit_tier_factor",
///     vec![
///         RuleRow::new().exact("credit_tier", "A").output("credit_factor", 0.9),
///         RuleRow::new().exact("credit_tier", "B").output("credit_factor", 1.2),
///     ],
/// )
/// .unwrap();
///
/// let mut plan = RatingPlan::new("auto");
/// plan.register_step("credit_tier_factor", factor).unwrap();
/// plan.register_step("credit_tier_placement", placement).unwrap();
/// assert_eq!(plan.build_graph().unwrap(), vec!["credit_tier_placement", "credit_tier_factor"]);
///
/// let store = EntityStore::new()
///     .with_level(
///         EntityLevel::builder("policy")
///             .key("policy_id", [1, 2])
///             .attribute("credit_score", [720, 640])
///             .build()
///             .unwrap(),
///     )
///     .unwrap();
///
/// let session = plan.rate(store, false).unwrap();
/// let factors = session.get("credit_factor").unwrap();
/// assert_eq!(factors.column("credit_factor").unwrap(), &[Value::Float(0.9), Value::Float(1.2)]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct RatingPlan {
    name: String,
    steps: Vec<RegisteredStep>,
    schema: Option<BTreeSet<String>>,
    graph: OnceLock<Arc<DependencyGraph>>,
}

impl RatingPlan {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// A copy of this plan under another name.
    ///
    /// Registering a step on the copy replaces the inherited step of the
    /// same name without touching this plan.
    pub fn derive(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    /// Declares the attribute and level names batches will provide.
    ///
    /// With a schema, [`RatingPlan::build_graph`] rejects inputs that are
    /// neither in it nor produced by a step. Without one, that check happens
    /// against the store at the start of every run.
    pub fn with_schema<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.schema = Some(names.into_iter().map(Into::into).collect());
        self.graph = OnceLock::new();
        self
    }

    /// Adds a step, or replaces the step of the same name in place.
    ///
    /// Function steps are probed here to infer their inputs. A probe that
    /// panics is reported as [`RatingError::ProbeFailed`] unless outputs
    /// were declared, and its panic message reaches stderr through the
    /// panic hook.
    pub fn register_step(&mut self, name: impl Into<String>, step: impl Into<Step>) -> Result<()> {
        let name = name.into();
        if name.is_empty() || name.contains('.') {
            return Err(RatingError::InvalidConfig(format!(
                "step name '{name}' must be non-empty and must not contain '.'"
            )));
        }
        let step = step.into();
        let (inputs, outputs) = infer_signature(&name, &step)?;
        let entry = RegisteredStep {
            name,
            step,
            inputs,
            outputs,
        };

        match self.steps.iter_mut().find(|s| s.name == entry.name) {
            Some(slot) => {
                tracing::debug!(plan = %self.name, step = %entry.name, "replacing step");
                *slot = entry;
            }
            None => {
                tracing::debug!(plan = %self.name, step = %entry.name, "registering step");
                self.steps.push(entry);
            }
        }
        self.graph = OnceLock::new();
        Ok(())
    }

    /// Chainable form of [`RatingPlan::register_step`].
    pub fn with_step(mut self, name: impl Into<String>, step: impl Into<Step>) -> Result<Self> {
        self.register_step(name, step)?;
        Ok(self)
    }

    /// Removes a step, returning it.
    pub fn remove_step(&mut self, name: &str) -> Option<Step> {
        let index = self.steps.iter().position(|s| s.name == name)?;
        self.graph = OnceLock::new();
        Some(self.steps.remove(index).step)
    }

    pub fn step(&self, name: &str) -> Option<&RegisteredStep> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Registered steps in registration order.
    pub fn steps(&self) -> &[RegisteredStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The dependency graph, built on first use.
    pub fn graph(&self) -> Result<Arc<DependencyGraph>> {
        if let Some(graph) = self.graph.get() {
            return Ok(Arc::clone(graph));
        }
        let graph = Arc::new(DependencyGraph::build(&self.steps, self.schema.as_ref())?);
        Ok(Arc::clone(self.graph.get_or_init(|| graph)))
    }

    /// The static evaluation order.
    pub fn build_graph(&self) -> Result<Vec<String>> {
        Ok(self.graph()?.order().into_iter().map(str::to_string).collect())
    }

    /// Evaluates every step against `store`.
    pub fn rate(&self, store: impl Into<Arc<EntityStore>>, parallel: bool) -> Result<Session> {
        self.rate_with(store, &RateConfig::default().with_parallel(parallel))
    }

    /// Evaluates with an explicit configuration.
    pub fn rate_with(
        &self,
        store: impl Into<Arc<EntityStore>>,
        config: &RateConfig,
    ) -> Result<Session> {
        self.rate_with_cancel(store, config, None)
    }

    /// Evaluates with an optional cancellation flag.
    ///
    /// The flag is checked before each step starts; once set, the run ends
    /// with [`RatingError::Cancelled`].
    pub fn rate_with_cancel(
        &self,
        store: impl Into<Arc<EntityStore>>,
        config: &RateConfig,
        cancel: Option<Arc<AtomicBool>>,
    ) -> Result<Session> {
        let runner = WaveRunner {
            plan: &self.name,
            steps: &self.steps,
            graph: self.graph()?,
        };
        runner.run(store.into(), config, cancel)
    }
}
