//! Daily system overview
//!
//! Rolls store-wide counts and the per-station snapshots into one overview
//! per calendar day (UTC).

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use super::scoring::ISSUE_THRESHOLD;
use crate::error::AppResult;
use crate::models::{AlertSeverity, Parameter, StationStatus, SystemOverview};
use crate::store::{distinct_station_types, AggregateFn, SampleStore, StationFilter, TimeRange, Upsert};

/// Stations with a sample inside this window count towards data completeness
pub const COMPLETENESS_WINDOW_DAYS: i64 = 7;

/// Recompute and upsert the overview for the day containing `now`
pub fn recompute_system_overview<S: SampleStore + ?Sized>(
    store: &mut S,
    now: DateTime<Utc>,
) -> AppResult<(SystemOverview, Upsert)> {
    let overview = compute_system_overview(store, now)?;
    let outcome = store.upsert_system_overview(overview.date, overview.clone())?;

    info!(
        date = %overview.date,
        total_stations = overview.total_stations,
        avg_quality_score = overview.avg_quality_score,
        data_completeness = overview.data_completeness,
        outcome = ?outcome,
        "System overview recomputed"
    );
    Ok((overview, outcome))
}

pub fn compute_system_overview<S: SampleStore + ?Sized>(
    store: &S,
    now: DateTime<Utc>,
) -> AppResult<SystemOverview> {
    let today = now.date_naive();
    let today_range = TimeRange::day(today);
    let recent_range = TimeRange::since(now - Duration::days(COMPLETENESS_WINDOW_DAYS));

    let count = |station_id, range: Option<&TimeRange>| -> AppResult<u64> {
        let n = store.aggregate(station_id, &Parameter::Ph, AggregateFn::Count, range)?;
        Ok(n.unwrap_or(0.0) as u64)
    };

    let stations = store.list_stations(&StationFilter::default())?;
    let total_stations = stations.len() as u64;
    let active_stations = stations
        .iter()
        .filter(|s| s.status == StationStatus::Active)
        .count() as u64;

    let mut stations_updated_today = 0;
    let mut stations_with_recent_data = 0;
    for station in &stations {
        if count(Some(station.id), Some(&today_range))? > 0 {
            stations_updated_today += 1;
        }
        if count(Some(station.id), Some(&recent_range))? > 0 {
            stations_with_recent_data += 1;
        }
    }

    let snapshots = store.all_station_statistics()?;
    let avg_quality_score = if snapshots.is_empty() {
        0.0
    } else {
        snapshots.iter().map(|s| f64::from(s.quality_score)).sum::<f64>() / snapshots.len() as f64
    };
    let stations_with_issues = snapshots
        .iter()
        .filter(|s| s.quality_score < ISSUE_THRESHOLD)
        .count() as u64;

    let data_completeness = if total_stations > 0 {
        stations_with_recent_data as f64 / total_stations as f64 * 100.0
    } else {
        0.0
    };

    Ok(SystemOverview {
        date: today,
        total_stations,
        active_stations,
        total_samples: count(None, None)?,
        samples_today: count(None, Some(&today_range))?,
        avg_quality_score,
        stations_with_issues,
        critical_alerts: store.count_alerts(AlertSeverity::Critical, false)?,
        regions_covered: distinct_station_types(&stations) as u64,
        stations_updated_today,
        data_completeness,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::statistics::recompute_station_statistics;
    use crate::models::{AlertType, NewAlert};
    use crate::store::tests::{sample_input, station_input};
    use crate::store::InMemoryStore;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 30, 15, 0, 0).unwrap()
    }

    #[test]
    fn test_empty_store() {
        let mut store = InMemoryStore::new();
        let (overview, outcome) = recompute_system_overview(&mut store, now()).unwrap();

        assert_eq!(outcome, Upsert::Created);
        assert_eq!(overview.total_stations, 0);
        assert_eq!(overview.data_completeness, 0.0);
        assert_eq!(overview.avg_quality_score, 0.0);
    }

    #[test]
    fn test_overview_counts() {
        let mut store = InMemoryStore::new();
        let good = store.insert_station(station_input("Good", "river")).unwrap();
        let poor = store.insert_station(station_input("Poor", "dam")).unwrap();
        let mut idle = store.insert_station(station_input("Idle", "river")).unwrap();
        idle.status = StationStatus::Inactive;
        store.update_station(idle.clone()).unwrap();

        // Today
        store
            .insert_sample(good.id, sample_input(now() - Duration::hours(2), 7.0, 2.0, 8.0, 20.0))
            .unwrap();
        // Three days ago, scores 100 - 30 - 30 - 30 - 15 = 0
        store
            .insert_sample(poor.id, sample_input(now() - Duration::days(3), 4.0, 40.0, 1.0, 35.0))
            .unwrap();
        // Outside the completeness window
        store
            .insert_sample(idle.id, sample_input(now() - Duration::days(20), 7.0, 2.0, 8.0, 20.0))
            .unwrap();

        store
            .insert_alert(
                NewAlert {
                    station_id: poor.id,
                    sample_id: None,
                    alert_type: AlertType::WaterQuality,
                    severity: AlertSeverity::Critical,
                    message: "critical".into(),
                },
                now(),
            )
            .unwrap();

        recompute_station_statistics(&mut store, None, now()).unwrap();
        let (overview, _) = recompute_system_overview(&mut store, now()).unwrap();

        assert_eq!(overview.date, now().date_naive());
        assert_eq!(overview.total_stations, 3);
        assert_eq!(overview.active_stations, 2);
        assert_eq!(overview.total_samples, 3);
        assert_eq!(overview.samples_today, 1);
        assert_eq!(overview.stations_updated_today, 1);
        assert_eq!(overview.stations_with_issues, 1);
        assert_eq!(overview.critical_alerts, 1);
        assert_eq!(overview.regions_covered, 2);
        assert!((overview.avg_quality_score - 200.0 / 3.0).abs() < 1e-9);
        assert!((overview.data_completeness - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_one_overview_per_day() {
        let mut store = InMemoryStore::new();
        store.insert_station(station_input("A", "river")).unwrap();

        let (_, first) = recompute_system_overview(&mut store, now()).unwrap();
        let (_, second) = recompute_system_overview(&mut store, now() + Duration::hours(1)).unwrap();
        let (_, next_day) = recompute_system_overview(&mut store, now() + Duration::days(1)).unwrap();

        assert_eq!(first, Upsert::Created);
        assert_eq!(second, Upsert::Updated);
        assert_eq!(next_day, Upsert::Created);
    }
}
