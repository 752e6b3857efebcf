//! Alert generation
//!
//! Scans recent samples for out-of-range parameters and active stations for
//! data gaps, raising at most one open alert per sample or per gap.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};
use crate::models::{AlertSeverity, AlertType, NewAlert, StationStatus};
use crate::store::{AlertFilter, SampleStore, StationFilter, TimeRange};

/// Active stations silent for longer than this get a data-gap alert
pub const DATA_GAP_DAYS: i64 = 7;

/// Longest accepted scan window
pub const MAX_LOOKBACK_DAYS: i64 = 5 * 366;

/// Outcome of an alert generation run
#[derive(Debug, Clone, Default, Serialize)]
pub struct AlertRun {
    pub samples_checked: usize,
    pub created: usize,
    /// Messages of alerts that were (or, in a dry run, would have been) raised
    pub messages: Vec<String>,
    pub dry_run: bool,
}

/// Generate water-quality alerts for samples newer than `now - lookback`,
/// then data-gap alerts for active stations.
pub fn generate_alerts<S: SampleStore + ?Sized>(
    store: &mut S,
    now: DateTime<Utc>,
    lookback: Duration,
    dry_run: bool,
) -> AppResult<AlertRun> {
    if lookback <= Duration::zero() || lookback > Duration::days(MAX_LOOKBACK_DAYS) {
        return Err(AppError::InvalidInput(format!(
            "Lookback must be positive and at most {} days",
            MAX_LOOKBACK_DAYS
        )));
    }
    let since = now
        .checked_sub_signed(lookback)
        .ok_or_else(|| AppError::InvalidInput("Lookback is out of range".to_string()))?;

    let mut run = AlertRun {
        dry_run,
        ..AlertRun::default()
    };

    let open_alerts = store.list_alerts(&AlertFilter {
        station_id: None,
        resolved: Some(false),
    })?;

    let recent = store.samples_in_range(&TimeRange::since(since))?;
    run.samples_checked = recent.len();

    for sample in &recent {
        let issues = sample.quality_issues();
        if issues.is_empty() {
            continue;
        }

        let already_open = open_alerts.iter().any(|a| {
            a.alert_type == AlertType::WaterQuality && a.sample_id == Some(sample.id)
        });
        if already_open {
            continue;
        }

        let alert = NewAlert {
            station_id: sample.station_id,
            sample_id: Some(sample.id),
            alert_type: AlertType::WaterQuality,
            severity: AlertSeverity::from_issue_count(issues.len()),
            message: format!("Water quality issues detected: {}", issues.join("; ")),
        };
        raise(store, alert, now, &mut run)?;
    }

    let active = store.list_stations(&StationFilter {
        status: Some(StationStatus::Active),
        station_type: None,
    })?;

    for station in &active {
        let Some(last) = store.list_samples(station.id, None)?.last().map(|s| s.timestamp) else {
            continue;
        };

        let silence = now - last;
        if silence <= Duration::days(DATA_GAP_DAYS) {
            continue;
        }

        let already_open = open_alerts
            .iter()
            .any(|a| a.alert_type == AlertType::DataGap && a.station_id == station.id);
        if already_open {
            continue;
        }

        let alert = NewAlert {
            station_id: station.id,
            sample_id: None,
            alert_type: AlertType::DataGap,
            severity: AlertSeverity::Medium,
            message: format!("No data received for {} days", silence.num_days()),
        };
        raise(store, alert, now, &mut run)?;
    }

    info!(
        samples_checked = run.samples_checked,
        created = run.created,
        dry_run,
        "Alert generation completed"
    );
    Ok(run)
}

fn raise<S: SampleStore + ?Sized>(
    store: &mut S,
    alert: NewAlert,
    now: DateTime<Utc>,
    run: &mut AlertRun,
) -> AppResult<()> {
    if run.dry_run {
        debug!(station_id = alert.station_id, message = %alert.message, "Would create alert");
    } else {
        if alert.severity == AlertSeverity::Critical {
            warn!(station_id = alert.station_id, message = %alert.message, "Critical water quality alert");
        }
        store.insert_alert(alert.clone(), now)?;
        run.created += 1;
    }
    run.messages.push(alert.message);
    Ok(())
}
