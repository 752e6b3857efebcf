//! Station statistics snapshots
//!
//! Recomputes the per-station summary: window counts, all-time averages,
//! quality score and the recent-versus-older direction labels.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info};

use super::scoring::quality_score;
use crate::error::AppResult;
use crate::models::{Parameter, Sample, Station, StationId, StationStatistics, TrendDirection};
use crate::store::{AggregateFn, SampleStore, StationFilter, TimeRange, Upsert};

/// Size of each of the two recency windows compared by the direction labels
pub const RECENCY_WINDOW: usize = 10;

/// Relative change (percent) below which a parameter is labelled stable
pub const STABLE_CHANGE_PERCENT: f64 = 5.0;

/// Outcome of a recomputation run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecomputeSummary {
    pub created: usize,
    pub updated: usize,
    /// Stations without samples; their snapshot is left absent
    pub skipped: usize,
}

impl RecomputeSummary {
    pub fn processed(&self) -> usize {
        self.created + self.updated
    }
}

/// Recompute the statistics snapshot of one station, or of every station
/// when `station_id` is `None`.
pub fn recompute_station_statistics<S: SampleStore + ?Sized>(
    store: &mut S,
    station_id: Option<StationId>,
    now: DateTime<Utc>,
) -> AppResult<RecomputeSummary> {
    let stations = match station_id {
        Some(id) => vec![store.get_station(id)?],
        None => store.list_stations(&StationFilter::default())?,
    };

    info!(stations = stations.len(), "Recomputing station statistics");

    let mut summary = RecomputeSummary::default();
    for station in &stations {
        match compute_station_statistics(store, station, now)? {
            Some(stats) => match store.upsert_station_statistics(station.id, stats)? {
                Upsert::Created => summary.created += 1,
                Upsert::Updated => summary.updated += 1,
            },
            None => {
                if store.remove_station_statistics(station.id)? {
                    debug!(station_id = station.id, "Station has no samples, stale snapshot removed");
                } else {
                    debug!(station_id = station.id, "Station has no samples, skipping");
                }
                summary.skipped += 1;
            }
        }
    }

    info!(
        processed = summary.processed(),
        created = summary.created,
        updated = summary.updated,
        skipped = summary.skipped,
        "Station statistics recomputed"
    );
    Ok(summary)
}

/// Build the snapshot for one station; `None` if it has no samples
pub fn compute_station_statistics<S: SampleStore + ?Sized>(
    store: &S,
    station: &Station,
    now: DateTime<Utc>,
) -> AppResult<Option<StationStatistics>> {
    let count = |range: Option<&TimeRange>| -> AppResult<u64> {
        let n = store.aggregate(Some(station.id), &Parameter::Ph, AggregateFn::Count, range)?;
        Ok(n.unwrap_or(0.0) as u64)
    };
    let average = |parameter: &Parameter| {
        store.aggregate(Some(station.id), parameter, AggregateFn::Avg, None)
    };

    let total_samples = count(None)?;
    if total_samples == 0 {
        return Ok(None);
    }

    let samples_last_30_days = count(Some(&TimeRange::since(now - Duration::days(30))))?;
    let samples_last_90_days = count(Some(&TimeRange::since(now - Duration::days(90))))?;

    let avg_ph = average(&Parameter::Ph)?;
    let avg_turbidity = average(&Parameter::Turbidity)?;
    let avg_dissolved_oxygen = average(&Parameter::DissolvedOxygen)?;
    let avg_temperature = average(&Parameter::Temperature)?;

    let samples = store.list_samples(station.id, None)?;
    let newest_first: Vec<&Sample> = samples.iter().rev().collect();

    Ok(Some(StationStatistics {
        station_id: station.id,
        total_samples,
        samples_last_30_days,
        samples_last_90_days,
        avg_ph,
        avg_turbidity,
        avg_dissolved_oxygen,
        avg_temperature,
        quality_score: quality_score(avg_ph, avg_turbidity, avg_dissolved_oxygen, avg_temperature),
        ph_trend: recency_direction(&newest_first, &Parameter::Ph),
        turbidity_trend: recency_direction(&newest_first, &Parameter::Turbidity),
        oxygen_trend: recency_direction(&newest_first, &Parameter::DissolvedOxygen),
        last_sample_date: samples.last().map(|s| s.timestamp),
        last_calculated: now,
    }))
}

/// Compare the mean of the newest window of samples against the window
/// before it. `newest_first` must be ordered by descending timestamp.
pub fn recency_direction(newest_first: &[&Sample], parameter: &Parameter) -> TrendDirection {
    if newest_first.len() < 2 * RECENCY_WINDOW {
        return TrendDirection::Stable;
    }

    let window_mean = |window: &[&Sample]| -> Option<f64> {
        let values: Vec<f64> = window.iter().filter_map(|s| s.value(parameter)).collect();
        (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
    };

    let recent = window_mean(&newest_first[..RECENCY_WINDOW]);
    let older = window_mean(&newest_first[RECENCY_WINDOW..2 * RECENCY_WINDOW]);

    match (recent, older) {
        (Some(recent), Some(older)) if older != 0.0 => {
            let change_percent = (recent - older) / older * 100.0;
            if change_percent.abs() < STABLE_CHANGE_PERCENT {
                TrendDirection::Stable
            } else if change_percent > 0.0 {
                TrendDirection::Increasing
            } else {
                TrendDirection::Decreasing
            }
        }
        _ => TrendDirection::Stable,
    }
}
