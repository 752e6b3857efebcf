//! Station maintenance jobs

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{AppError, AppResult};
use crate::models::StationStatus;
use crate::store::{SampleStore, StationFilter};

/// Stations with a sample inside this window are considered active
pub const ACTIVE_WINDOW_DAYS: i64 = 7;

#[derive(Debug, Clone, Default, Serialize)]
pub struct MetadataRefresh {
    pub updated: usize,
    pub activated: usize,
    pub deactivated: usize,
}

/// Refresh measurement dates, sample-count caches and lifecycle status of
/// every station with samples. Closed stations keep their status.
pub fn refresh_station_metadata<S: SampleStore + ?Sized>(
    store: &mut S,
    now: DateTime<Utc>,
) -> AppResult<MetadataRefresh> {
    let mut refresh = MetadataRefresh::default();

    for mut station in store.list_stations(&StationFilter::default())? {
        let samples = store.list_samples(station.id, None)?;
        let (Some(first), Some(last)) = (samples.first(), samples.last()) else {
            debug!(station_id = station.id, "Station has no samples, skipping metadata refresh");
            continue;
        };

        let before = station.clone();
        station.measurement_start_date = Some(first.timestamp.date_naive());
        station.measurement_end_date = Some(last.timestamp.date_naive());
        station.number_of_samples = samples.len() as u64;

        if station.status != StationStatus::Closed {
            station.status = if now - last.timestamp <= Duration::days(ACTIVE_WINDOW_DAYS) {
                StationStatus::Active
            } else {
                StationStatus::Inactive
            };
        }

        if station == before {
            continue;
        }

        match (before.status, station.status) {
            (old, StationStatus::Active) if old != StationStatus::Active => refresh.activated += 1,
            (StationStatus::Active, new) if new != StationStatus::Active => refresh.deactivated += 1,
            _ => {}
        }
        store.update_station(station)?;
        refresh.updated += 1;
    }

    info!(
        updated = refresh.updated,
        activated = refresh.activated,
        deactivated = refresh.deactivated,
        "Station metadata refreshed"
    );
    Ok(refresh)
}

/// Delete samples older than `retention_days` before `now`
pub fn purge_old_samples<S: SampleStore + ?Sized>(
    store: &mut S,
    now: DateTime<Utc>,
    retention_days: i64,
) -> AppResult<usize> {
    if retention_days <= 0 {
        return Err(AppError::InvalidInput(
            "Retention period must be at least one day".to_string(),
        ));
    }

    let cutoff = Duration::try_days(retention_days)
        .and_then(|retention| now.checked_sub_signed(retention))
        .ok_or_else(|| {
            AppError::InvalidInput(format!("Retention of {} days is out of range", retention_days))
        })?;
    let removed = store.delete_samples_before(cutoff)?;

    info!(cutoff = %cutoff, removed, "Old samples purged");
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::{sample_input, station_input};
    use crate::store::InMemoryStore;
    use chrono::{NaiveDate, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 30, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_status_follows_recency() {
        let mut store = InMemoryStore::new();
        let fresh = store.insert_station(station_input("Fresh", "river")).unwrap();
        let stale = store.insert_station(station_input("Stale", "river")).unwrap();
        let mut closed = store.insert_station(station_input("Closed", "dam")).unwrap();
        closed.status = StationStatus::Closed;
        store.update_station(closed.clone()).unwrap();
        let mut revived = store.insert_station(station_input("Revived", "dam")).unwrap();
        revived.status = StationStatus::Inactive;
        store.update_station(revived.clone()).unwrap();

        let recent = sample_input(now() - Duration::days(1), 7.0, 2.0, 8.0, 18.0);
        let old = sample_input(now() - Duration::days(30), 7.0, 2.0, 8.0, 18.0);
        store.insert_sample(fresh.id, old.clone()).unwrap();
        store.insert_sample(fresh.id, recent.clone()).unwrap();
        store.insert_sample(stale.id, old).unwrap();
        store.insert_sample(closed.id, recent.clone()).unwrap();
        store.insert_sample(revived.id, recent).unwrap();

        let refresh = refresh_station_metadata(&mut store, now()).unwrap();
        assert_eq!(refresh.activated, 1);
        assert_eq!(refresh.deactivated, 1);

        let fresh = store.get_station(fresh.id).unwrap();
        assert_eq!(fresh.status, StationStatus::Active);
        assert_eq!(fresh.number_of_samples, 2);
        assert_eq!(fresh.measurement_start_date, NaiveDate::from_ymd_opt(2024, 5, 31));
        assert_eq!(fresh.measurement_end_date, NaiveDate::from_ymd_opt(2024, 6, 29));

        assert_eq!(store.get_station(stale.id).unwrap().status, StationStatus::Inactive);
        assert_eq!(store.get_station(closed.id).unwrap().status, StationStatus::Closed);
        assert_eq!(store.get_station(revived.id).unwrap().status, StationStatus::Active);
    }

    #[test]
    fn test_refresh_is_idempotent() {
        let mut store = InMemoryStore::new();
        let station = store.insert_station(station_input("A", "river")).unwrap();
        store
            .insert_sample(station.id, sample_input(now() - Duration::days(2), 7.0, 2.0, 8.0, 18.0))
            .unwrap();

        assert_eq!(refresh_station_metadata(&mut store, now()).unwrap().updated, 1);
        assert_eq!(refresh_station_metadata(&mut store, now()).unwrap().updated, 0);
    }

    #[test]
    fn test_purge_old_samples() {
        let mut store = InMemoryStore::new();
        let station = store.insert_station(station_input("A", "river")).unwrap();
        for days in [1, 40, 400] {
            store
                .insert_sample(station.id, sample_input(now() - Duration::days(days), 7.0, 2.0, 8.0, 18.0))
                .unwrap();
        }

        assert_eq!(purge_old_samples(&mut store, now(), 365).unwrap(), 1);
        assert_eq!(store.get_station(station.id).unwrap().number_of_samples, 2);
        assert!(purge_old_samples(&mut store, now(), 0).is_err());
        assert!(matches!(
            purge_old_samples(&mut store, now(), 9_000_000_000_000),
            Err(AppError::InvalidInput(_))
        ));
        assert_eq!(store.get_station(station.id).unwrap().number_of_samples, 2);
    }
}
