//! Rating run configuration.
//!
//! [`RateConfig`] controls how a [`RatingPlan`](super::RatingPlan) evaluates
//! a batch: sequentially or wave-parallel, how many workers, and what to do
//! with records no table row matches.

/// What a table step does with a record that matches no row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NoMatchPolicy {
    /// Abort the run with [`RatingError::NoMatch`](crate::error::RatingError::NoMatch).
    #[default]
    Fail,

    /// Emit `Null` for every output of the record and log a warning.
    Null,
}

/// Configuration for one rating run.
///
/// # Defaults
///
/// ```
/// use u_rating::plan::{NoMatchPolicy, RateConfig};
///
/// let config = RateConfig::default();
/// assert!(!config.parallel);
/// assert_eq!(config.on_no_match, NoMatchPolicy::Fail);
/// ```
///
/// # Builder Pattern
///
/// ```
/// use u_rating::plan::{NoMatchPolicy, RateConfig};
///
/// let config = RateConfig::parallel()
///     .with_max_workers(4)
///     .with_no_match(NoMatchPolicy::Null);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RateConfig {
    /// Whether steps of one wave run concurrently.
    pub parallel: bool,

    /// Upper bound on worker threads in parallel mode.
    ///
    /// `None` uses the available parallelism of the machine. Larger values
    /// are clamped to it.
    pub max_workers: Option<usize>,

    /// Handling of records without a matching row.
    pub on_no_match: NoMatchPolicy,
}

impl RateConfig {
    /// One step at a time, in deterministic order.
    pub fn sequential() -> Self {
        Self::default()
    }

    /// Wave-parallel with one worker per available core.
    pub fn parallel() -> Self {
        Self {
            parallel: true,
            ..Self::default()
        }
    }

    /// Enables or disables parallel evaluation.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Sets the worker limit.
    pub fn with_max_workers(mut self, n: usize) -> Self {
        self.max_workers = Some(n);
        self
    }

    /// Sets the no-match policy.
    pub fn with_no_match(mut self, policy: NoMatchPolicy) -> Self {
        self.on_no_match = policy;
        self
    }

    /// Number of workers a parallel run uses, never more than the machine
    /// can run at once.
    pub(crate) fn worker_count(&self) -> usize {
        let available = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        self.max_workers.map_or(available, |n| n.min(available))
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_workers == Some(0) {
            return Err("max_workers must be at least 1".into());
        }
        Ok(())
    }
}
