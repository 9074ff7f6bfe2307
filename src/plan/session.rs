//! Evaluation results bound to one batch.

use super::graph::{Binding, DependencyGraph};
use super::step::Context;
use crate::error::{RatingError, Result};
use crate::store::join::JoinSource;
use crate::store::{EntityStore, Frame};
use std::collections::HashMap;
use std::sync::Arc;

/// Outputs of one rating run together with the batch they were computed on.
///
/// Names are resolved the way step inputs are: `step.column`, then a column
/// produced by exactly one step, then a step with a single output, then an
/// entity attribute. Values spanning levels are broadcast-joined.
#[derive(Debug, Clone)]
pub struct Session {
    store: Arc<EntityStore>,
    graph: Arc<DependencyGraph>,
    results: HashMap<String, Frame>,
}

impl Session {
    pub(crate) fn new(store: Arc<EntityStore>, graph: Arc<DependencyGraph>) -> Self {
        Self {
            store,
            graph,
            results: HashMap::new(),
        }
    }

    /// Only the scheduler writes, between waves.
    pub(crate) fn insert(&mut self, step: &str, frame: Frame) {
        self.results.insert(step.to_string(), frame);
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Output frame of `step`.
    pub fn step_result(&self, step: &str) -> Option<&Frame> {
        self.results.get(step)
    }

    /// Steps evaluated so far, in evaluation order.
    pub fn evaluated(&self) -> Vec<&str> {
        self.graph
            .order()
            .into_iter()
            .filter(|s| self.results.contains_key(*s))
            .collect()
    }

    /// One named value, aligned to its own level.
    pub fn get(&self, name: &str) -> Result<Frame> {
        self.get_many(&[name])
    }

    /// Several values joined to the deepest of their levels.
    pub fn get_many(&self, names: &[&str]) -> Result<Frame> {
        let sources = names
            .iter()
            .map(|name| self.resolve(name))
            .collect::<Result<Vec<_>>>()?;
        self.store.join(&sources)
    }

    /// All attributes of a level.
    pub fn table(&self, level: &str) -> Result<Frame> {
        self.store.get_table(level)
    }

    fn resolve<'a>(&'a self, name: &'a str) -> Result<JoinSource<'a>> {
        let unknown = || RatingError::UnknownAttribute {
            name: name.to_string(),
        };

        if let Some((step, column)) = name.split_once('.') {
            if let Some(frame) = self.results.get(step) {
                return if frame.contains(column) {
                    Ok(JoinSource { name, frame, column })
                } else {
                    Err(unknown())
                };
            }
        }

        let producers: Vec<&str> = self
            .graph
            .steps()
            .iter()
            .filter(|s| self.results.get(s.as_str()).is_some_and(|f| f.contains(name)))
            .map(String::as_str)
            .collect();
        match producers.as_slice() {
            [step] => {
                return Ok(JoinSource {
                    name,
                    frame: &self.results[*step],
                    column: name,
                })
            }
            [] => {}
            many => {
                return Err(RatingError::AmbiguousName {
                    name: name.to_string(),
                    producers: many.iter().map(|s| s.to_string()).collect(),
                })
            }
        }

        if let Some(frame) = self.results.get(name) {
            if let [column] = frame.names() {
                return Ok(JoinSource { name, frame, column });
            }
        }

        let level = self.store.owner(name).ok_or_else(unknown)?;
        Ok(JoinSource {
            name,
            frame: level.frame(),
            column: name,
        })
    }
}

impl Context for Session {
    fn get(&self, name: &str) -> Result<Frame> {
        Session::get(self, name)
    }

    fn get_many(&self, names: &[&str]) -> Result<Frame> {
        Session::get_many(self, names)
    }

    fn table(&self, level: &str) -> Result<Frame> {
        Session::table(self, level)
    }
}

/// The view a running step reads through.
///
/// Reads are limited to the step's inputs and follow the bindings fixed
/// when the graph was built.
pub(crate) struct StepContext<'a> {
    session: &'a Session,
    step: &'a str,
    bindings: &'a [(String, Binding)],
}

impl<'a> StepContext<'a> {
    pub(crate) fn new(
        session: &'a Session,
        step: &'a str,
        bindings: &'a [(String, Binding)],
    ) -> Self {
        Self {
            session,
            step,
            bindings,
        }
    }

    fn binding(&self, name: &str) -> Result<&'a Binding> {
        self.bindings
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, b)| b)
            .ok_or_else(|| RatingError::UndeclaredInput {
                step: self.step.to_string(),
                name: name.to_string(),
            })
    }

    fn source<'n>(&self, name: &'n str) -> Result<JoinSource<'n>>
    where
        'a: 'n,
    {
        match self.binding(name)? {
            Binding::Step { step, column } => {
                let frame = self
                    .session
                    .results
                    .get(step)
                    .ok_or_else(|| RatingError::UnknownAttribute {
                        name: name.to_string(),
                    })?;
                Ok(JoinSource { name, frame, column })
            }
            Binding::External => {
                let level = self.session.store.owner(name).ok_or_else(|| {
                    RatingError::UnknownAttribute {
                        name: name.to_string(),
                    }
                })?;
                Ok(JoinSource {
                    name,
                    frame: level.frame(),
                    column: name,
                })
            }
        }
    }
}

impl Context for StepContext<'_> {
    fn get(&self, name: &str) -> Result<Frame> {
        self.get_many(&[name])
    }

    fn get_many(&self, names: &[&str]) -> Result<Frame> {
        let sources = names
            .iter()
            .map(|name| self.source(name))
            .collect::<Result<Vec<_>>>()?;
        self.session.store.join(&sources)
    }

    fn table(&self, level: &str) -> Result<Frame> {
        self.binding(level)?;
        self.session.store.get_table(level)
    }
}
