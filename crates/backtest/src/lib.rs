//! # ssq-backtest
//!
//! Walk-forward evaluation over a draw history: per-index training on the
//! strictly earlier draws, pool selection, hit metrics, the JSON report and
//! the next-issue forecast. The `ssq-backtest` binary wires these together.

pub mod forecast;
pub mod metrics;
pub mod report;
pub mod selector;
pub mod walk_forward;

pub use forecast::Forecast;
pub use metrics::{HitSummary, MetricsAggregator};
pub use report::{BacktestReport, StepRecord, WindowComparison};
pub use selector::{PoolSelector, Selection};
pub use walk_forward::{step_seed, SeedStream, WalkForward};
