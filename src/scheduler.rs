//! Background job loop
//!
//! Runs the periodic maintenance and analytics jobs on a fixed tick:
//! alert generation, station metadata refresh, station statistics and the
//! daily system overview. The retention purge runs at most once a week.
//! A failing job is logged and the remaining jobs still run.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::time::interval;
use tracing::{error, info};

use crate::alerts::{generate_alerts, AlertRun};
use crate::analytics::{recompute_station_statistics, recompute_system_overview, RecomputeSummary};
use crate::config::{RetentionSettings, SchedulerSettings};
use crate::error::AppResult;
use crate::maintenance::{purge_old_samples, refresh_station_metadata, MetadataRefresh};
use crate::store::{SampleStore, SharedStore};

/// Lookback window of the scheduled alert scan
pub const ALERT_LOOKBACK_HOURS: i64 = 24;

pub const PURGE_INTERVAL_DAYS: i64 = 7;

/// Outcome of one scheduler cycle; `None` marks a failed job
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleReport {
    pub alerts: Option<AlertRun>,
    pub metadata: Option<MetadataRefresh>,
    pub statistics: Option<RecomputeSummary>,
    pub overview_updated: bool,
    /// Samples removed, when the purge ran this cycle
    pub purged: Option<usize>,
    pub failures: usize,
}

pub struct Scheduler {
    tick: std::time::Duration,
    retention_days: i64,
    last_purge: Option<DateTime<Utc>>,
}

impl Scheduler {
    pub fn new(settings: &SchedulerSettings, retention: &RetentionSettings) -> Self {
        info!(
            tick_secs = settings.tick_secs,
            retention_days = retention.days,
            "Initializing job scheduler"
        );

        Self {
            // A zero period would make the interval panic
            tick: std::time::Duration::from_secs(settings.tick_secs.max(1)),
            retention_days: retention.days,
            last_purge: None,
        }
    }

    /// Run the job loop forever
    pub async fn run(mut self, store: SharedStore) {
        info!("Starting scheduled job loop");

        let mut tick_interval = interval(self.tick);
        let mut tick_count: u64 = 0;

        loop {
            tick_interval.tick().await;
            tick_count += 1;

            let report = {
                let mut store = store.write().await;
                self.run_cycle(&mut *store, Utc::now())
            };

            info!(
                tick = tick_count,
                failures = report.failures,
                purged = ?report.purged,
                "Scheduled cycle finished"
            );
        }
    }

    /// Run every job once against `store`
    pub fn run_cycle<S: SampleStore + ?Sized>(
        &mut self,
        store: &mut S,
        now: DateTime<Utc>,
    ) -> CycleReport {
        let mut report = CycleReport::default();

        report.alerts = job(
            "generate_alerts",
            generate_alerts(store, now, Duration::hours(ALERT_LOOKBACK_HOURS), false),
            &mut report.failures,
        );
        report.metadata = job(
            "refresh_station_metadata",
            refresh_station_metadata(store, now),
            &mut report.failures,
        );
        report.statistics = job(
            "recompute_station_statistics",
            recompute_station_statistics(store, None, now),
            &mut report.failures,
        );
        report.overview_updated = job(
            "recompute_system_overview",
            recompute_system_overview(store, now),
            &mut report.failures,
        )
        .is_some();

        let purge_due = self
            .last_purge
            .map_or(true, |last| now - last >= Duration::days(PURGE_INTERVAL_DAYS));
        if purge_due {
            report.purged = job(
                "purge_old_samples",
                purge_old_samples(store, now, self.retention_days),
                &mut report.failures,
            );
            self.last_purge = Some(now);
        }

        report
    }
}

fn job<T>(name: &str, result: AppResult<T>, failures: &mut usize) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            error!(job = name, error = %e, "Scheduled job failed");
            *failures += 1;
            None
        }
    }
}
