//! Dashboard and report assembly
//!
//! Both recompute the snapshots they read so callers always see current
//! figures.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

use crate::analytics::scoring::ISSUE_THRESHOLD;
use crate::analytics::{compare_stations, recompute_station_statistics, recompute_system_overview};
use crate::error::{AppError, AppResult};
use crate::models::{
    AlertId, AlertSeverity, AlertType, ComparisonReport, Parameter, Station, StationId,
    StationStatistics, SystemOverview,
};
use crate::store::{AggregateFn, AlertFilter, SampleStore, StationFilter, TimeRange};

pub const TOP_STATIONS: usize = 5;
pub const RECENT_ALERTS: usize = 10;
pub const DAILY_SAMPLE_DAYS: usize = 30;
/// Stations compared by default when a comparison report names none
pub const DEFAULT_COMPARISON_SIZE: usize = 3;

/// Station activity bands by cached sample count: (label, min, max inclusive)
const ACTIVITY_BANDS: [(&str, u64, Option<u64>); 4] = [
    ("High Activity (>1000 samples)", 1000, None),
    ("Medium Activity (100-999 samples)", 100, Some(999)),
    ("Low Activity (10-99 samples)", 10, Some(99)),
    ("Inactive (<10 samples)", 0, Some(9)),
];

#[derive(Debug, Clone, Serialize)]
pub struct RankedStation {
    pub station_id: StationId,
    pub name: String,
    pub station_type: String,
    pub quality_score: u8,
    pub total_samples: u64,
}

impl RankedStation {
    fn new(station: &Station, stats: &StationStatistics) -> Self {
        Self {
            station_id: station.id,
            name: station.name.clone(),
            station_type: station.station_type.clone(),
            quality_score: stats.quality_score,
            total_samples: stats.total_samples,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecentAlert {
    pub id: AlertId,
    pub station_id: StationId,
    pub station_name: String,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub message: String,
    pub triggered_at: DateTime<Utc>,
    pub resolved: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub count: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ParameterAverages {
    pub ph: Option<f64>,
    pub turbidity: Option<f64>,
    pub dissolved_oxygen: Option<f64>,
    pub temperature: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityBand {
    pub name: String,
    pub station_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub system_overview: SystemOverview,
    pub top_stations: Vec<RankedStation>,
    pub problematic_stations: Vec<RankedStation>,
    pub recent_alerts: Vec<RecentAlert>,
    pub daily_samples: Vec<DailyCount>,
    pub parameter_averages: ParameterAverages,
    pub activity: Vec<ActivityBand>,
    pub last_updated: DateTime<Utc>,
}

/// Recompute every snapshot, then assemble the dashboard view
pub fn dashboard<S: SampleStore + ?Sized>(store: &mut S, now: DateTime<Utc>) -> AppResult<Dashboard> {
    recompute_station_statistics(store, None, now)?;
    let (system_overview, _) = recompute_system_overview(store, now)?;

    let stations: BTreeMap<StationId, Station> = store
        .list_stations(&StationFilter::default())?
        .into_iter()
        .map(|s| (s.id, s))
        .collect();

    let mut ranked: Vec<RankedStation> = store
        .all_station_statistics()?
        .iter()
        .filter_map(|stats| {
            stations
                .get(&stats.station_id)
                .map(|station| RankedStation::new(station, stats))
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.quality_score
            .cmp(&a.quality_score)
            .then(a.station_id.cmp(&b.station_id))
    });
    let top_stations: Vec<RankedStation> = ranked.iter().take(TOP_STATIONS).cloned().collect();

    let mut problematic_stations: Vec<RankedStation> = ranked
        .into_iter()
        .filter(|s| s.quality_score < ISSUE_THRESHOLD)
        .collect();
    problematic_stations.sort_by(|a, b| {
        a.quality_score
            .cmp(&b.quality_score)
            .then(a.station_id.cmp(&b.station_id))
    });
    problematic_stations.truncate(TOP_STATIONS);

    let mut alerts = store.list_alerts(&AlertFilter::default())?;
    alerts.sort_by(|a, b| b.triggered_at.cmp(&a.triggered_at).then(b.id.cmp(&a.id)));
    let recent_alerts = alerts
        .into_iter()
        .take(RECENT_ALERTS)
        .map(|alert| RecentAlert {
            station_name: stations
                .get(&alert.station_id)
                .map(|s| s.name.clone())
                .unwrap_or_default(),
            id: alert.id,
            station_id: alert.station_id,
            alert_type: alert.alert_type,
            severity: alert.severity,
            message: alert.message,
            triggered_at: alert.triggered_at,
            resolved: alert.resolved,
        })
        .collect();

    let mut per_day: BTreeMap<NaiveDate, u64> = BTreeMap::new();
    for sample in store.samples_in_range(&TimeRange::default())? {
        *per_day.entry(sample.timestamp.date_naive()).or_default() += 1;
    }
    let skip = per_day.len().saturating_sub(DAILY_SAMPLE_DAYS);
    let daily_samples = per_day
        .into_iter()
        .skip(skip)
        .map(|(date, count)| DailyCount { date, count })
        .collect();

    let avg = |parameter: Parameter| store.aggregate(None, &parameter, AggregateFn::Avg, None);
    let parameter_averages = ParameterAverages {
        ph: avg(Parameter::Ph)?,
        turbidity: avg(Parameter::Turbidity)?,
        dissolved_oxygen: avg(Parameter::DissolvedOxygen)?,
        temperature: avg(Parameter::Temperature)?,
    };

    let activity = activity_bands(stations.values());

    info!(
        stations = stations.len(),
        top = top_stations.len(),
        problematic = problematic_stations.len(),
        "Dashboard assembled"
    );

    Ok(Dashboard {
        system_overview,
        top_stations,
        problematic_stations,
        recent_alerts,
        daily_samples,
        parameter_averages,
        activity,
        last_updated: now,
    })
}

fn activity_bands<'a>(stations: impl Iterator<Item = &'a Station> + Clone) -> Vec<ActivityBand> {
    ACTIVITY_BANDS
        .iter()
        .filter_map(|(name, min, max)| {
            let station_count = stations
                .clone()
                .filter(|s| {
                    s.number_of_samples >= *min && max.map_or(true, |m| s.number_of_samples <= m)
                })
                .count();
            (station_count > 0).then(|| ActivityBand {
                name: name.to_string(),
                station_count,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    #[default]
    SystemOverview,
    StationComparison,
    QualityAssessment,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportFilters {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub station_ids: Vec<StationId>,
    /// Inclusive
    pub start_date: Option<NaiveDate>,
    /// Inclusive
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportRequest {
    #[serde(default)]
    pub report_type: ReportType,
    #[serde(default)]
    pub filters: ReportFilters,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterRange {
    pub min: Option<f64>,
    pub avg: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QualityBands {
    pub excellent: u64,
    pub good: u64,
    pub poor: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "report_type", rename_all = "snake_case")]
pub enum Report {
    SystemOverview {
        generated_at: DateTime<Utc>,
        system_overview: SystemOverview,
        /// quality score -> number of stations
        quality_distribution: BTreeMap<u8, usize>,
        parameter_statistics: BTreeMap<String, ParameterRange>,
        total_stations: usize,
        total_samples: u64,
        total_alerts: usize,
    },
    StationComparison {
        generated_at: DateTime<Utc>,
        stations_compared: Vec<StationId>,
        comparison: ComparisonReport,
    },
    QualityAssessment {
        generated_at: DateTime<Utc>,
        filters: ReportFilters,
        quality_assessment: BTreeMap<String, QualityBands>,
        total_samples: usize,
    },
}

/// Build the requested report
pub fn generate_report<S: SampleStore + ?Sized>(
    store: &mut S,
    request: ReportRequest,
    now: DateTime<Utc>,
) -> AppResult<Report> {
    info!(report_type = ?request.report_type, "Generating report");

    match request.report_type {
        ReportType::SystemOverview => system_overview_report(store, now),
        ReportType::StationComparison => {
            station_comparison_report(store, request.filters.station_ids, now)
        }
        ReportType::QualityAssessment => quality_assessment_report(store, request.filters, now),
    }
}

fn system_overview_report<S: SampleStore + ?Sized>(
    store: &mut S,
    now: DateTime<Utc>,
) -> AppResult<Report> {
    recompute_station_statistics(store, None, now)?;
    let (system_overview, _) = recompute_system_overview(store, now)?;

    let mut quality_distribution = BTreeMap::new();
    for stats in store.all_station_statistics()? {
        *quality_distribution.entry(stats.quality_score).or_default() += 1;
    }

    let mut parameter_statistics = BTreeMap::new();
    for parameter in Parameter::CORE {
        let agg = |func| store.aggregate(None, &parameter, func, None);
        let range = ParameterRange {
            min: agg(AggregateFn::Min)?,
            avg: agg(AggregateFn::Avg)?,
            max: agg(AggregateFn::Max)?,
        };
        parameter_statistics.insert(parameter.to_string(), range);
    }

    Ok(Report::SystemOverview {
        generated_at: now,
        total_stations: store.list_stations(&StationFilter::default())?.len(),
        total_samples: store
            .aggregate(None, &Parameter::Ph, AggregateFn::Count, None)?
            .unwrap_or(0.0) as u64,
        total_alerts: store.list_alerts(&AlertFilter::default())?.len(),
        system_overview,
        quality_distribution,
        parameter_statistics,
    })
}

fn station_comparison_report<S: SampleStore + ?Sized>(
    store: &mut S,
    station_ids: Vec<StationId>,
    now: DateTime<Utc>,
) -> AppResult<Report> {
    let station_ids = if station_ids.is_empty() {
        let mut stations = store.list_stations(&StationFilter::default())?;
        stations.sort_by(|a, b| {
            b.number_of_samples
                .cmp(&a.number_of_samples)
                .then(a.id.cmp(&b.id))
        });
        stations
            .iter()
            .take(DEFAULT_COMPARISON_SIZE)
            .map(|s| s.id)
            .collect()
    } else {
        station_ids
    };

    let comparison = compare_stations(store, &station_ids, None, now)?;

    Ok(Report::StationComparison {
        generated_at: now,
        stations_compared: comparison
            .comparison_data
            .stations
            .iter()
            .map(|s| s.id)
            .collect(),
        comparison,
    })
}

fn quality_assessment_report<S: SampleStore + ?Sized>(
    store: &S,
    filters: ReportFilters,
    now: DateTime<Utc>,
) -> AppResult<Report> {
    let range = date_range(filters.start_date, filters.end_date)?;
    let samples = store.samples_in_range(&range)?;

    let mut ph = QualityBands::default();
    let mut turbidity = QualityBands::default();
    let mut dissolved_oxygen = QualityBands::default();

    for sample in &samples {
        let band = if (6.5..=8.5).contains(&sample.ph) {
            &mut ph.excellent
        } else if (6.0..=9.0).contains(&sample.ph) {
            &mut ph.good
        } else {
            &mut ph.poor
        };
        *band += 1;

        let band = match sample.turbidity {
            t if t <= 5.0 => &mut turbidity.excellent,
            t if t <= 10.0 => &mut turbidity.good,
            _ => &mut turbidity.poor,
        };
        *band += 1;

        let band = match sample.dissolved_oxygen {
            d if d >= 6.0 => &mut dissolved_oxygen.excellent,
            d if d >= 4.0 => &mut dissolved_oxygen.good,
            _ => &mut dissolved_oxygen.poor,
        };
        *band += 1;
    }

    let quality_assessment = BTreeMap::from([
        (Parameter::Ph.to_string(), ph),
        (Parameter::Turbidity.to_string(), turbidity),
        (Parameter::DissolvedOxygen.to_string(), dissolved_oxygen),
    ]);

    Ok(Report::QualityAssessment {
        generated_at: now,
        filters,
        quality_assessment,
        total_samples: samples.len(),
    })
}

/// Inclusive calendar date bounds as a half-open time range
fn date_range(start: Option<NaiveDate>, end: Option<NaiveDate>) -> AppResult<TimeRange> {
    if let (Some(start), Some(end)) = (start, end) {
        if start > end {
            return Err(AppError::InvalidInput(
                "start_date must not be after end_date".to_string(),
            ));
        }
    }

    Ok(TimeRange {
        start: start.and_then(|d| TimeRange::day(d).start),
        end: end.and_then(|d| TimeRange::day(d).end),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewAlert;
    use crate::store::tests::{sample_input, station_input};
    use crate::store::InMemoryStore;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 30, 12, 0, 0).unwrap()
    }

    fn seeded() -> (InMemoryStore, Vec<StationId>) {
        let mut store = InMemoryStore::new();
        let good = store.insert_station(station_input("Good", "river")).unwrap();
        let poor = store.insert_station(station_input("Poor", "dam")).unwrap();
        let busy = store.insert_station(station_input("Busy", "river")).unwrap();
        store.insert_station(station_input("Empty", "borehole")).unwrap();

        store
            .insert_sample(good.id, sample_input(now() - Duration::days(1), 7.2, 2.0, 8.0, 18.0))
            .unwrap();
        // Scores 100 - 30 - 30 - 30 - 15 = 0
        store
            .insert_sample(poor.id, sample_input(now() - Duration::days(2), 4.0, 40.0, 1.0, 35.0))
            .unwrap();
        for hours in 1..=12 {
            store
                .insert_sample(
                    busy.id,
                    sample_input(now() - Duration::hours(hours), 6.2, 7.0, 5.0, 18.0),
                )
                .unwrap();
        }

        (store, vec![good.id, poor.id, busy.id])
    }

    #[test]
    fn test_dashboard() {
        let (mut store, ids) = seeded();
        store
            .insert_alert(
                NewAlert {
                    station_id: ids[1],
                    sample_id: None,
                    alert_type: AlertType::WaterQuality,
                    severity: AlertSeverity::Critical,
                    message: "critical".into(),
                },
                now(),
            )
            .unwrap();

        let dashboard = dashboard(&mut store, now()).unwrap();

        assert_eq!(dashboard.system_overview.total_stations, 4);
        assert_eq!(dashboard.top_stations.len(), 3);
        assert_eq!(dashboard.top_stations[0].station_id, ids[0]);
        assert_eq!(dashboard.top_stations[0].quality_score, 100);

        let problematic: Vec<StationId> = dashboard
            .problematic_stations
            .iter()
            .map(|s| s.station_id)
            .collect();
        // Busy: pH tier 2 (-10), turbidity tier 2 (-10), DO tier 2 (-10) = 70, not below threshold
        assert_eq!(problematic, vec![ids[1]]);

        assert_eq!(dashboard.recent_alerts.len(), 1);
        assert_eq!(dashboard.recent_alerts[0].station_name, "Poor");

        let total: u64 = dashboard.daily_samples.iter().map(|d| d.count).sum();
        assert_eq!(total, 14);
        assert!(dashboard.daily_samples.windows(2).all(|w| w[0].date < w[1].date));

        assert_eq!(
            dashboard.activity,
            vec![
                ActivityBand {
                    name: "Low Activity (10-99 samples)".into(),
                    station_count: 1
                },
                ActivityBand {
                    name: "Inactive (<10 samples)".into(),
                    station_count: 3
                },
            ]
        );
        assert!(dashboard.parameter_averages.ph.is_some());
    }

    #[test]
    fn test_dashboard_keeps_most_recent_days() {
        let mut store = InMemoryStore::new();
        let station = store.insert_station(station_input("A", "river")).unwrap();
        for days in 0..40 {
            store
                .insert_sample(station.id, sample_input(now() - Duration::days(days), 7.0, 2.0, 8.0, 18.0))
                .unwrap();
        }

        let dashboard = dashboard(&mut store, now()).unwrap();
        assert_eq!(dashboard.daily_samples.len(), DAILY_SAMPLE_DAYS);
        assert_eq!(
            dashboard.daily_samples.last().map(|d| d.date),
            Some(now().date_naive())
        );
    }

    #[test]
    fn test_system_overview_report() {
        let (mut store, _) = seeded();
        let report = generate_report(&mut store, ReportRequest::default(), now()).unwrap();

        let Report::SystemOverview {
            quality_distribution,
            parameter_statistics,
            total_stations,
            total_samples,
            ..
        } = report
        else {
            panic!("expected system overview report");
        };

        assert_eq!(total_stations, 4);
        assert_eq!(total_samples, 14);
        assert_eq!(quality_distribution.values().sum::<usize>(), 3);
        assert_eq!(quality_distribution.get(&0), Some(&1));
        assert_eq!(parameter_statistics["ph"].min, Some(4.0));
        assert_eq!(parameter_statistics["turbidity"].max, Some(40.0));
    }

    #[test]
    fn test_comparison_report_defaults_to_busiest_stations() {
        let (mut store, ids) = seeded();
        let request = ReportRequest {
            report_type: ReportType::StationComparison,
            filters: ReportFilters::default(),
        };

        let Report::StationComparison {
            stations_compared, ..
        } = generate_report(&mut store, request, now()).unwrap()
        else {
            panic!("expected station comparison report");
        };

        assert_eq!(stations_compared, vec![ids[2], ids[0], ids[1]]);
        assert_eq!(store.list_comparisons().unwrap().len(), 1);
    }

    #[test]
    fn test_comparison_report_needs_two_stations() {
        let mut store = InMemoryStore::new();
        store.insert_station(station_input("Only", "river")).unwrap();
        let request = ReportRequest {
            report_type: ReportType::StationComparison,
            filters: ReportFilters::default(),
        };

        assert!(matches!(
            generate_report(&mut store, request, now()),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_quality_assessment_bands() {
        let (mut store, _) = seeded();
        let request = ReportRequest {
            report_type: ReportType::QualityAssessment,
            filters: ReportFilters {
                start_date: Some(now().date_naive() - Duration::days(1)),
                end_date: Some(now().date_naive()),
                ..ReportFilters::default()
            },
        };

        let Report::QualityAssessment {
            quality_assessment,
            total_samples,
            ..
        } = generate_report(&mut store, request, now()).unwrap()
        else {
            panic!("expected quality assessment report");
        };

        // Good station plus the twelve busy samples; Poor falls outside the range
        assert_eq!(total_samples, 13);
        assert_eq!(
            quality_assessment["ph"],
            QualityBands {
                excellent: 1,
                good: 12,
                poor: 0
            }
        );
        assert_eq!(
            quality_assessment["turbidity"],
            QualityBands {
                excellent: 1,
                good: 12,
                poor: 0
            }
        );
        assert_eq!(
            quality_assessment["dissolved_oxygen"],
            QualityBands {
                excellent: 1,
                good: 12,
                poor: 0
            }
        );
    }

    #[test]
    fn test_inverted_date_range_rejected() {
        let today = now().date_naive();
        assert!(date_range(Some(today), Some(today - Duration::days(1))).is_err());
        assert_eq!(date_range(None, None).unwrap(), TimeRange::default());
    }
}
