//! Wave-synchronous execution.

use super::config::{NoMatchPolicy, RateConfig};
use super::graph::DependencyGraph;
use super::session::{Session, StepContext};
use super::step::{Context, RegisteredStep, StepKind};
use crate::error::{BoxError, RatingError, Result};
use crate::store::{EntityStore, Frame};
use crate::table::{InterpolatedTable, LookupTable};
use crate::value::{Record, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
#[cfg(feature = "parallel")]
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Instant;

/// Executes a plan's steps wave by wave.
///
/// Every step of a wave reads the session as left by the previous waves;
/// results are merged only after the whole wave finished. The first
/// failure in registration order within its wave aborts the run, in both
/// modes.
pub(crate) struct WaveRunner<'p> {
    pub(crate) plan: &'p str,
    pub(crate) steps: &'p [RegisteredStep],
    pub(crate) graph: Arc<DependencyGraph>,
}

impl WaveRunner<'_> {
    pub(crate) fn run(
        &self,
        store: Arc<EntityStore>,
        config: &RateConfig,
        cancel: Option<Arc<AtomicBool>>,
    ) -> Result<Session> {
        config.validate().map_err(RatingError::InvalidConfig)?;
        self.graph.check_inputs(&store)?;

        let started = Instant::now();
        let mut session = Session::new(store, Arc::clone(&self.graph));
        let pool = if config.parallel { self.pool(config)? } else { None };

        for (w, wave) in self.graph.wave_indices().iter().enumerate() {
            tracing::debug!(
                plan = self.plan,
                wave = w,
                steps = ?wave.iter().map(|&i| self.steps[i].name()).collect::<Vec<_>>(),
                "evaluating wave"
            );

            let frames = match &pool {
                Some(pool) => self.run_parallel(pool, wave, &session, config, cancel.as_deref())?,
                None => self.run_sequential(wave, &session, config, cancel.as_deref())?,
            };

            // barrier: nothing of this wave is visible before all of it is done
            for (i, frame) in frames {
                tracing::trace!(step = self.steps[i].name(), rows = frame.len(), "step finished");
                session.insert(self.steps[i].name(), frame);
            }
        }

        tracing::info!(
            plan = self.plan,
            waves = self.graph.wave_indices().len(),
            steps = self.steps.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "rating complete"
        );
        Ok(session)
    }

    #[cfg(feature = "parallel")]
    fn pool(&self, config: &RateConfig) -> Result<Option<rayon::ThreadPool>> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(config.worker_count())
            .thread_name(|i| format!("u-rating-{i}"))
            .build()
            .map(Some)
            .map_err(|e| RatingError::WorkerPool(e.to_string()))
    }

    #[cfg(not(feature = "parallel"))]
    fn pool(&self, _config: &RateConfig) -> Result<Option<()>> {
        tracing::warn!(
            plan = self.plan,
            "parallel evaluation requested without the `parallel` feature; running sequentially"
        );
        Ok(None)
    }

    fn run_sequential(
        &self,
        wave: &[usize],
        session: &Session,
        config: &RateConfig,
        cancel: Option<&AtomicBool>,
    ) -> Result<Vec<(usize, Frame)>> {
        wave.iter()
            .map(|&i| {
                check_cancel(cancel, self.steps[i].name())?;
                self.evaluate(i, session, config).map(|f| (i, f))
            })
            .collect()
    }

    #[cfg(feature = "parallel")]
    fn run_parallel(
        &self,
        pool: &rayon::ThreadPool,
        wave: &[usize],
        session: &Session,
        config: &RateConfig,
        cancel: Option<&AtomicBool>,
    ) -> Result<Vec<(usize, Frame)>> {
        use rayon::prelude::*;

        // wave position of the earliest failure; only later steps are skipped
        let failed_at = AtomicUsize::new(usize::MAX);
        let outcomes: Vec<Option<Result<Frame>>> = pool.install(|| {
            wave.par_iter()
                .enumerate()
                .map(|(pos, &i)| {
                    if failed_at.load(Ordering::Relaxed) < pos {
                        return None;
                    }
                    let outcome = check_cancel(cancel, self.steps[i].name())
                        .and_then(|()| self.evaluate(i, session, config));
                    if outcome.is_err() {
                        failed_at.fetch_min(pos, Ordering::Relaxed);
                    }
                    Some(outcome)
                })
                .collect()
        });

        let mut frames = Vec::with_capacity(wave.len());
        let mut first_error = None;
        for (&i, outcome) in wave.iter().zip(outcomes) {
            match outcome {
                Some(Ok(frame)) => frames.push((i, frame)),
                Some(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                None => {}
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(frames),
        }
    }

    #[cfg(not(feature = "parallel"))]
    fn run_parallel(
        &self,
        _pool: &(),
        wave: &[usize],
        session: &Session,
        config: &RateConfig,
        cancel: Option<&AtomicBool>,
    ) -> Result<Vec<(usize, Frame)>> {
        self.run_sequential(wave, session, config, cancel)
    }

    fn evaluate(&self, index: usize, session: &Session, config: &RateConfig) -> Result<Frame> {
        let entry = &self.steps[index];
        let name = entry.name();
        let ctx = StepContext::new(session, name, self.graph.bindings_at(index));
        let result = match entry.step().kind() {
            StepKind::Table(table) => evaluate_table(name, table, &ctx, config.on_no_match),
            StepKind::Interpolated(table) => {
                evaluate_interpolated(name, table, &ctx, config.on_no_match)
            }
            StepKind::Function(f) => f(&ctx)
                .map_err(from_boxed)
                .and_then(|frame| conform(entry, frame, session.store())),
        };
        result.map_err(|e| attribute(name, e))
    }
}

fn check_cancel(cancel: Option<&AtomicBool>, step: &str) -> Result<()> {
    match cancel {
        Some(flag) if flag.load(Ordering::Relaxed) => Err(RatingError::Cancelled {
            step: step.to_string(),
        }),
        _ => Ok(()),
    }
}

fn from_boxed(err: BoxError) -> RatingError {
    match err.downcast::<RatingError>() {
        Ok(rating) => *rating,
        Err(other) => RatingError::StepExecution {
            step: String::new(),
            source: other,
        },
    }
}

/// Ties an error to the step it came from.
fn attribute(step: &str, err: RatingError) -> RatingError {
    match err {
        RatingError::StepExecution { step: s, source } if s.is_empty() => {
            RatingError::StepExecution {
                step: step.to_string(),
                source,
            }
        }
        RatingError::NoMatch {
            table,
            record,
            step: None,
            key,
        } => RatingError::NoMatch {
            table,
            record,
            step: Some(step.to_string()),
            key,
        },
        e if e.step().is_some() => e,
        e => RatingError::StepExecution {
            step: step.to_string(),
            source: Box::new(e),
        },
    }
}

/// Checks a function step's frame against its declared outputs and the store.
fn conform(entry: &RegisteredStep, frame: Frame, store: &EntityStore) -> Result<Frame> {
    for output in entry.outputs() {
        if !frame.contains(output) {
            return Err(RatingError::MissingOutput {
                step: entry.name().to_string(),
                output: output.clone(),
            });
        }
    }

    let not_aligned = || {
        RatingError::InvalidFrame(format!(
            "result of step '{}' is not aligned to a level of the store",
            entry.name()
        ))
    };
    // a level-bound result covers every row of its level, null where absent
    let frame = match frame.level() {
        None if frame.depth() == 0 && frame.len() == 1 => frame,
        Some(name) => {
            let level = store.level(name).ok_or_else(not_aligned)?;
            if level.key_names() != frame.key_names() {
                return Err(not_aligned());
            }
            let aligned = frame.align_to(level.frame())?;
            if aligned.len() > frame.len() {
                tracing::debug!(
                    step = entry.name(),
                    level = name,
                    missing = aligned.len() - frame.len(),
                    "null-filled rows the step did not return"
                );
            }
            aligned
        }
        None => return Err(not_aligned()),
    };

    if frame.names() == entry.outputs() {
        Ok(frame)
    } else {
        frame.select(entry.outputs())
    }
}

fn evaluate_table(
    step: &str,
    table: &LookupTable,
    ctx: &StepContext<'_>,
    policy: NoMatchPolicy,
) -> Result<Frame> {
    let inputs: Vec<&str> = table.inputs().iter().map(String::as_str).collect();
    let data = ctx.get_many(&inputs)?;
    let columns: Vec<&[Value]> = inputs
        .iter()
        .map(|c| data.try_column(c))
        .collect::<Result<_>>()?;

    // identical input tuples are matched once
    let mut memo: HashMap<Vec<&Value>, Option<usize>> = HashMap::new();
    let mut matched = Vec::with_capacity(data.len());
    for row in 0..data.len() {
        let tuple: Vec<&Value> = columns.iter().map(|col| &col[row]).collect();
        let hit = *memo.entry(tuple).or_insert_with(|| {
            table.match_index(|c| {
                inputs
                    .iter()
                    .position(|i| *i == c)
                    .map(|p| &columns[p][row])
            })
        });
        match (hit, policy) {
            (Some(i), _) => matched.push(Some(i)),
            (None, NoMatchPolicy::Null) => matched.push(None),
            (None, NoMatchPolicy::Fail) => {
                return Err(RatingError::NoMatch {
                    table: table.name().to_string(),
                    record: inputs
                        .iter()
                        .zip(&columns)
                        .map(|(c, col)| (c.to_string(), col[row].clone()))
                        .collect::<Record>(),
                    step: Some(step.to_string()),
                    key: Some(data.keys()[row].clone()),
                })
            }
        }
    }

    let misses = matched.iter().filter(|m| m.is_none()).count();
    if misses > 0 {
        tracing::warn!(step, table = table.name(), misses, "null-filled unmatched records");
    }

    let mut out = data.with_same_keys();
    for output in table.outputs() {
        let values = matched
            .iter()
            .map(|m| match m {
                Some(i) => table.row_outputs(*i).get(output).cloned().unwrap_or_default(),
                None => Value::Null,
            })
            .collect();
        out = out.with_column(output.clone(), values)?;
    }
    Ok(out)
}

fn evaluate_interpolated(
    step: &str,
    table: &InterpolatedTable,
    ctx: &StepContext<'_>,
    policy: NoMatchPolicy,
) -> Result<Frame> {
    let input = &table.inputs()[0];
    let data = ctx.get(input)?;
    let column = data.try_column(input)?;

    let mut records = Vec::with_capacity(data.len());
    for (row, value) in column.iter().enumerate() {
        match (value.as_f64(), policy) {
            (Some(x), _) => records.push(Some(table.evaluate(x))),
            (None, NoMatchPolicy::Null) => records.push(None),
            (None, NoMatchPolicy::Fail) => {
                return Err(RatingError::NoMatch {
                    table: table.name().to_string(),
                    record: Record::from_pairs([(input.clone(), value.clone())]),
                    step: Some(step.to_string()),
                    key: Some(data.keys()[row].clone()),
                })
            }
        }
    }

    let mut out = data.with_same_keys();
    for output in table.outputs() {
        let values = records
            .iter()
            .map(|r| {
                r.as_ref()
                    .and_then(|r| r.get(output).cloned())
                    .unwrap_or_default()
            })
            .collect();
        out = out.with_column(output.clone(), values)?;
    }
    Ok(out)
}
