//! Rule-table rating engine.
//!
//! Evaluates a pipeline of named computation steps against a batch of
//! entity records organised in a nested hierarchy (policy → driver →
//! vehicle, ...):
//!
//! - **Tables** ([`table`]): exact / interval / wildcard lookup tables that
//!   reject ambiguous rule sets at construction, plus piecewise-linear
//!   interpolated tables derived from them.
//! - **Plans** ([`plan`]): a registry of table and function steps whose
//!   inputs are inferred by a recording trial call, ordered into
//!   dependency waves and evaluated sequentially or wave-parallel.
//! - **Store** ([`store`]): per-level keyed tables with attribute lookup
//!   and one-to-many broadcast joins along the ancestor chain.
//!
//! # Quick Start
//!
//! ```
//! use u_rating::plan::{Context, RatingPlan, Step};
//! use u_rating::store::{EntityLevel, EntityStore};
//! use u_rating::table::{LookupTable, RuleRow};
//!
//! let age_factor = LookupTable::new(
//!     "driver_age_factor",
//!     vec![
//!         RuleRow::new().interval("age", 16.0, 24.0).output("age_factor", 1.6),
//!         RuleRow::new().interval("age", 25.0, 120.0).output("age_factor", 1.0),
//!     ],
//! )
//! .unwrap();
//!
//! let plan = RatingPlan::new("auto")
//!     .with_step("driver_age_factor", age_factor)
//!     .unwrap()
//!     .with_step(
//!         "driver_premium",
//!         Step::function(|ctx: &dyn Context| {
//!             let rows = ctx.get_many(&["base_premium", "age_factor"])?;
//!             Ok(rows.map_rows("driver_premium", |r| {
//!                 r.f64("base_premium").unwrap_or(0.0) * r.f64("age_factor").unwrap_or(1.0)
//!             }))
//!         }),
//!     )
//!     .unwrap();
//!
//! let store = EntityStore::new()
//!     .with_level(
//!         EntityLevel::builder("policy")
//!             .key("policy_id", [1])
//!             .attribute("base_premium", [500.0])
//!             .build()
//!             .unwrap(),
//!     )
//!     .unwrap()
//!     .with_level(
//!         EntityLevel::builder("driver")
//!             .parent("policy")
//!             .key("policy_id", [1, 1])
//!             .key("driver_id", [1, 2])
//!             .attribute("age", [19, 40])
//!             .build()
//!             .unwrap(),
//!     )
//!     .unwrap();
//!
//! let session = plan.rate(store, true).unwrap();
//! let premiums = session.get("driver_premium").unwrap();
//! assert_eq!(premiums.len(), 2);
//! ```
//!
//! # Features
//!
//! - `parallel` (default): wave-parallel evaluation on a rayon pool.
//! - `serde`: `Serialize` / `Deserialize` for values, rule rows and configs.

pub mod error;
pub mod plan;
pub mod store;
pub mod table;
pub mod value;

pub use error::{RatingError, Result};
