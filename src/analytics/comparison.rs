//! Comparative analysis across stations
//!
//! Every comparison is appended to the audit trail, even when an identical
//! station set has been compared before.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::info;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{
    ComparedStation, ComparedStatistics, ComparisonData, ComparisonReport, ComparisonSummary,
    Parameter, ParameterAggregate, StationId,
};
use crate::store::{AggregateFn, SampleStore};
use crate::validation::validate_comparison_ids;

pub const ANALYSIS_TYPE: &str = "station_comparison";

/// Compare stations across `parameters` (the four core measurements when
/// `None`) and record the report.
pub fn compare_stations<S: SampleStore + ?Sized>(
    store: &mut S,
    station_ids: &[StationId],
    parameters: Option<&[Parameter]>,
    now: DateTime<Utc>,
) -> AppResult<ComparisonReport> {
    let station_ids = validate_comparison_ids(station_ids)?;
    let core = Parameter::CORE;
    let parameters = parameters.unwrap_or(&core);

    let stations = station_ids
        .iter()
        .map(|id| store.get_station(*id))
        .collect::<AppResult<Vec<_>>>()?;

    let mut compared = Vec::with_capacity(stations.len());
    let mut sample_counts = Vec::with_capacity(stations.len());
    for station in &stations {
        let statistics = store.station_statistics(station.id)?;
        compared.push(ComparedStation {
            id: station.id,
            name: station.name.clone(),
            station_type: station.station_type.clone(),
            status: station.status,
            location: station.location,
            statistics: statistics.as_ref().map(ComparedStatistics::from),
        });

        let total = store
            .aggregate(Some(station.id), &Parameter::Ph, AggregateFn::Count, None)?
            .unwrap_or(0.0) as u64;
        sample_counts.push(total);
    }

    let mut by_parameter = BTreeMap::new();
    for parameter in parameters {
        let mut rows = Vec::new();
        for (station, total) in stations.iter().zip(&sample_counts) {
            if *total == 0 {
                continue;
            }
            let agg = |func| store.aggregate(Some(station.id), parameter, func, None);
            rows.push(ParameterAggregate {
                station_id: station.id,
                station_name: station.name.clone(),
                average: agg(AggregateFn::Avg)?,
                min: agg(AggregateFn::Min)?,
                max: agg(AggregateFn::Max)?,
                count: agg(AggregateFn::Count)?.unwrap_or(0.0) as u64,
            });
        }
        by_parameter.insert(parameter.to_string(), rows);
    }

    let with_stats: Vec<&ComparedStatistics> =
        compared.iter().filter_map(|s| s.statistics.as_ref()).collect();
    let summary = ComparisonSummary {
        total_stations: compared.len(),
        total_samples: with_stats.iter().map(|s| s.total_samples).sum(),
        avg_quality_score: if with_stats.is_empty() {
            0.0
        } else {
            with_stats
                .iter()
                .map(|s| f64::from(s.quality_score))
                .sum::<f64>()
                / with_stats.len() as f64
        },
    };

    let report = ComparisonReport {
        id: Uuid::new_v4(),
        analysis_type: ANALYSIS_TYPE.to_string(),
        description: format!("Comparison of {} stations", compared.len()),
        comparison_data: ComparisonData {
            stations: compared,
            parameters: by_parameter,
            summary,
        },
        created_at: now,
    };

    store.insert_comparison(report.clone())?;

    info!(
        report_id = %report.id,
        stations = report.comparison_data.summary.total_stations,
        parameters = parameters.len(),
        "Station comparison recorded"
    );
    Ok(report)
}
