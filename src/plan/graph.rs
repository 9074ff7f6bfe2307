//! Dependency graph and topological waves.

use super::step::RegisteredStep;
use crate::error::{RatingError, Result};
use crate::store::EntityStore;
use std::collections::BTreeSet;

/// Where a step input is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    /// Column `column` of step `step`'s output.
    Step { step: String, column: String },

    /// An entity attribute or level of the store.
    External,
}

/// Steps, the edges between them and their evaluation waves.
///
/// An input binds to a producing step when it is
///
/// 1. qualified as `step.column` with `column` among `step`'s outputs,
/// 2. an output of exactly one other step, or
/// 3. the name of another step that has exactly one output.
///
/// Anything else is read from the entity store. Wave 0 holds the steps
/// without producers; wave `k` the steps whose producers all lie in waves
/// before `k`. Within a wave steps keep their registration order.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    names: Vec<String>,
    outputs: Vec<Vec<String>>,
    bindings: Vec<Vec<(String, Binding)>>,
    predecessors: Vec<BTreeSet<usize>>,
    waves: Vec<Vec<usize>>,
}

impl DependencyGraph {
    /// Builds the graph, failing on ambiguous bindings and cycles.
    ///
    /// With `schema`, external inputs must be among its names.
    pub(crate) fn build(
        steps: &[RegisteredStep],
        schema: Option<&BTreeSet<String>>,
    ) -> Result<Self> {
        let names: Vec<String> = steps.iter().map(|s| s.name.clone()).collect();
        let index_of = |name: &str| names.iter().position(|n| n == name);

        let mut bindings = Vec::with_capacity(steps.len());
        let mut predecessors = vec![BTreeSet::new(); steps.len()];
        for (i, step) in steps.iter().enumerate() {
            let mut bound = Vec::with_capacity(step.inputs.len());
            for input in &step.inputs {
                let binding = Self::bind(steps, i, input, &index_of)?;
                if let Binding::Step { step: producer, .. } = &binding {
                    if let Some(p) = index_of(producer) {
                        predecessors[i].insert(p);
                    }
                } else if let Some(schema) = schema {
                    if !schema.contains(input) {
                        return Err(RatingError::UnresolvedInput {
                            step: step.name.clone(),
                            input: input.clone(),
                        });
                    }
                }
                bound.push((input.clone(), binding));
            }
            bindings.push(bound);
        }

        let waves = Self::layer(&names, &predecessors)?;
        tracing::debug!(steps = names.len(), waves = waves.len(), "built dependency graph");

        Ok(Self {
            outputs: steps.iter().map(|s| s.outputs.clone()).collect(),
            names,
            bindings,
            predecessors,
            waves,
        })
    }

    fn bind(
        steps: &[RegisteredStep],
        consumer: usize,
        input: &str,
        index_of: &impl Fn(&str) -> Option<usize>,
    ) -> Result<Binding> {
        let this = &steps[consumer];

        if let Some((qualifier, column)) = input.split_once('.') {
            if let Some(p) = index_of(qualifier) {
                return if steps[p].outputs.iter().any(|o| o == column) {
                    Ok(Binding::Step {
                        step: qualifier.to_string(),
                        column: column.to_string(),
                    })
                } else {
                    Err(RatingError::UnresolvedInput {
                        step: this.name.clone(),
                        input: input.to_string(),
                    })
                };
            }
        }

        let producers: Vec<&RegisteredStep> = steps
            .iter()
            .enumerate()
            .filter(|&(j, s)| j != consumer && s.outputs.iter().any(|o| o == input))
            .map(|(_, s)| s)
            .collect();
        match producers.as_slice() {
            [only] => {
                return Ok(Binding::Step {
                    step: only.name.clone(),
                    column: input.to_string(),
                })
            }
            [] => {}
            many => {
                return Err(RatingError::AmbiguousInput {
                    step: this.name.clone(),
                    input: input.to_string(),
                    producers: many.iter().map(|s| s.name.clone()).collect(),
                })
            }
        }

        if let Some(p) = index_of(input).filter(|&p| p != consumer) {
            if let [only] = steps[p].outputs.as_slice() {
                return Ok(Binding::Step {
                    step: input.to_string(),
                    column: only.clone(),
                });
            }
        }

        Ok(Binding::External)
    }

    /// Kahn layering; on failure reports one cycle.
    fn layer(names: &[String], predecessors: &[BTreeSet<usize>]) -> Result<Vec<Vec<usize>>> {
        let n = names.len();
        let mut placed = vec![false; n];
        let mut remaining = n;
        let mut waves = Vec::new();

        while remaining > 0 {
            let wave: Vec<usize> = (0..n)
                .filter(|&i| !placed[i] && predecessors[i].iter().all(|&p| placed[p]))
                .collect();
            if wave.is_empty() {
                return Err(RatingError::Cycle {
                    members: Self::find_cycle(names, predecessors, &placed),
                });
            }
            for &i in &wave {
                placed[i] = true;
            }
            remaining -= wave.len();
            waves.push(wave);
        }
        Ok(waves)
    }

    /// Every unplaced node has an unplaced predecessor, so walking
    /// predecessors from any of them must revisit a node. The cycle is
    /// rotated to start at its earliest registered step.
    fn find_cycle(
        names: &[String],
        predecessors: &[BTreeSet<usize>],
        placed: &[bool],
    ) -> Vec<String> {
        let Some(start) = placed.iter().position(|p| !p) else {
            return Vec::new();
        };
        let mut path = vec![start];
        let mut current = start;
        loop {
            let Some(next) = predecessors[current].iter().copied().find(|&p| !placed[p]) else {
                return vec![names[current].clone()];
            };
            if let Some(pos) = path.iter().position(|&v| v == next) {
                let mut cycle: Vec<usize> = path[pos..].iter().rev().copied().collect();
                let min = cycle.iter().enumerate().min_by_key(|&(_, v)| *v).map_or(0, |(i, _)| i);
                cycle.rotate_left(min);
                return cycle.into_iter().map(|i| names[i].clone()).collect();
            }
            path.push(next);
            current = next;
        }
    }

    /// Step names in evaluation order.
    pub fn order(&self) -> Vec<&str> {
        self.waves
            .iter()
            .flatten()
            .map(|&i| self.names[i].as_str())
            .collect()
    }

    /// Step names grouped by wave.
    pub fn waves(&self) -> Vec<Vec<&str>> {
        self.waves
            .iter()
            .map(|w| w.iter().map(|&i| self.names[i].as_str()).collect())
            .collect()
    }

    pub(crate) fn wave_indices(&self) -> &[Vec<usize>] {
        &self.waves
    }

    /// Step names in registration order.
    pub fn steps(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub(crate) fn index_of(&self, step: &str) -> Option<usize> {
        self.names.iter().position(|n| n == step)
    }

    /// Steps whose outputs `step` reads.
    pub fn predecessors(&self, step: &str) -> Vec<&str> {
        self.index_of(step)
            .map(|i| {
                self.predecessors[i]
                    .iter()
                    .map(|&p| self.names[p].as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn outputs(&self, step: &str) -> Option<&[String]> {
        self.index_of(step).map(|i| self.outputs[i].as_slice())
    }

    /// Input bindings of `step`, in input order.
    pub fn bindings(&self, step: &str) -> Option<&[(String, Binding)]> {
        self.index_of(step).map(|i| self.bindings[i].as_slice())
    }

    pub(crate) fn bindings_at(&self, index: usize) -> &[(String, Binding)] {
        &self.bindings[index]
    }

    /// Names read from the store, in first-use order.
    pub fn external_inputs(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for (name, binding) in self.bindings.iter().flatten() {
            if *binding == Binding::External && !seen.contains(&name.as_str()) {
                seen.push(name.as_str());
            }
        }
        seen
    }

    /// Checks that every external input is an attribute or level of `store`.
    pub fn check_inputs(&self, store: &EntityStore) -> Result<()> {
        for (i, bound) in self.bindings.iter().enumerate() {
            for (name, binding) in bound {
                let external = *binding == Binding::External;
                if external && !store.has_attribute(name) && !store.has_level(name) {
                    return Err(RatingError::UnresolvedInput {
                        step: self.names[i].clone(),
                        input: name.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}
