//! Water-quality analytics engine
//!
//! Pure scoring plus the aggregators that read from a [`SampleStore`] and
//! write computed snapshots back to it:
//!
//! - `scoring`: banded 0-100 quality score
//! - `trend`: periodic bucketing with a least squares fit and forecast
//! - `statistics`: per-station snapshot with recent-versus-older labels
//! - `overview`: one system-wide rollup per day
//! - `comparison`: append-only multi-station comparison reports
//!
//! Every operation takes `now` explicitly so time windows are reproducible.
//!
//! [`SampleStore`]: crate::store::SampleStore

pub mod comparison;
pub mod overview;
pub mod scoring;
pub mod statistics;
pub mod trend;

pub use comparison::compare_stations;
pub use overview::recompute_system_overview;
pub use scoring::quality_score;
pub use statistics::{recompute_station_statistics, RecomputeSummary};
pub use trend::analyze_trend;
