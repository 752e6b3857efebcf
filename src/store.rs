//! Sample store
//!
//! The `SampleStore` trait is the persistence seam the analytics engine reads
//! from and writes snapshots back to. `InMemoryStore` is the implementation the
//! service runs on; it keeps each station's samples ordered by timestamp.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    Alert, AlertId, AlertSeverity, ComparisonReport, NewAlert, Parameter, Sample, SampleInput,
    Station, StationId, StationInput, StationStatistics, StationStatus, SystemOverview, TrendKey,
    TrendRecord,
};

/// Aggregate function over a parameter column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateFn {
    Avg,
    Min,
    Max,
    Count,
}

/// Half-open time window `[start, end)`; a missing bound is unbounded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn since(start: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: None,
        }
    }

    /// The UTC calendar day containing `date`
    pub fn day(date: NaiveDate) -> Self {
        let start = date.and_hms_opt(0, 0, 0).map(|d| d.and_utc());
        let end = date
            .succ_opt()
            .and_then(|next| next.and_hms_opt(0, 0, 0))
            .map(|d| d.and_utc());
        Self { start, end }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start.map_or(true, |s| ts >= s) && self.end.map_or(true, |e| ts < e)
    }
}

/// Station listing filter
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StationFilter {
    pub status: Option<StationStatus>,
    pub station_type: Option<String>,
}

impl StationFilter {
    pub fn matches(&self, station: &Station) -> bool {
        self.status.map_or(true, |s| station.status == s)
            && self
                .station_type
                .as_ref()
                .map_or(true, |t| &station.station_type == t)
    }
}

/// Alert listing filter
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlertFilter {
    pub station_id: Option<StationId>,
    pub resolved: Option<bool>,
}

/// Outcome of a keyed upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Upsert {
    Created,
    Updated,
}

/// Persistence operations consumed by the analytics engine and the HTTP layer
pub trait SampleStore {
    fn insert_station(&mut self, input: StationInput) -> AppResult<Station>;
    fn get_station(&self, id: StationId) -> AppResult<Station>;
    fn list_stations(&self, filter: &StationFilter) -> AppResult<Vec<Station>>;
    fn update_station(&mut self, station: Station) -> AppResult<()>;
    /// Removes the station with its samples, alerts, statistics and trends
    fn delete_station(&mut self, id: StationId) -> AppResult<()>;

    fn insert_sample(&mut self, station_id: StationId, input: SampleInput) -> AppResult<Sample>;
    /// Samples of one station ordered by ascending timestamp
    fn list_samples(
        &self,
        station_id: StationId,
        since: Option<DateTime<Utc>>,
    ) -> AppResult<Vec<Sample>>;
    /// Samples of every station inside `range`, ordered by timestamp
    fn samples_in_range(&self, range: &TimeRange) -> AppResult<Vec<Sample>>;
    /// `Count` always yields a value; the other functions yield `None` when
    /// no values exist.
    fn aggregate(
        &self,
        station_id: Option<StationId>,
        parameter: &Parameter,
        func: AggregateFn,
        range: Option<&TimeRange>,
    ) -> AppResult<Option<f64>>;
    fn delete_samples_before(&mut self, cutoff: DateTime<Utc>) -> AppResult<usize>;

    fn insert_alert(&mut self, alert: NewAlert, now: DateTime<Utc>) -> AppResult<Alert>;
    fn list_alerts(&self, filter: &AlertFilter) -> AppResult<Vec<Alert>>;
    fn resolve_alert(&mut self, id: AlertId, now: DateTime<Utc>) -> AppResult<Alert>;
    fn count_alerts(&self, severity: AlertSeverity, resolved: bool) -> AppResult<u64>;

    fn upsert_station_statistics(
        &mut self,
        station_id: StationId,
        stats: StationStatistics,
    ) -> AppResult<Upsert>;
    fn station_statistics(&self, station_id: StationId) -> AppResult<Option<StationStatistics>>;
    /// Returns whether a snapshot existed
    fn remove_station_statistics(&mut self, station_id: StationId) -> AppResult<bool>;
    fn all_station_statistics(&self) -> AppResult<Vec<StationStatistics>>;

    fn upsert_system_overview(
        &mut self,
        date: NaiveDate,
        overview: SystemOverview,
    ) -> AppResult<Upsert>;
    fn system_overview(&self, date: NaiveDate) -> AppResult<Option<SystemOverview>>;

    fn upsert_trend(&mut self, key: TrendKey, record: TrendRecord) -> AppResult<Upsert>;
    fn trends_for_station(&self, station_id: StationId) -> AppResult<Vec<TrendRecord>>;

    fn insert_comparison(&mut self, report: ComparisonReport) -> AppResult<()>;
    fn list_comparisons(&self) -> AppResult<Vec<ComparisonReport>>;
}

/// In-process store backing the service
#[derive(Debug)]
pub struct InMemoryStore {
    stations: BTreeMap<StationId, Station>,
    /// Per-station samples, kept sorted by timestamp
    samples: BTreeMap<StationId, Vec<Sample>>,
    alerts: BTreeMap<AlertId, Alert>,
    statistics: BTreeMap<StationId, StationStatistics>,
    overviews: BTreeMap<NaiveDate, SystemOverview>,
    trends: BTreeMap<TrendKey, TrendRecord>,
    comparisons: Vec<ComparisonReport>,
    next_station_id: StationId,
    next_alert_id: AlertId,
    start_time: DateTime<Utc>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        info!("Initializing in-memory sample store");
        Self {
            stations: BTreeMap::new(),
            samples: BTreeMap::new(),
            alerts: BTreeMap::new(),
            statistics: BTreeMap::new(),
            overviews: BTreeMap::new(),
            trends: BTreeMap::new(),
            comparisons: Vec::new(),
            next_station_id: 1,
            next_alert_id: 1,
            start_time: Utc::now(),
        }
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        (Utc::now() - self.start_time).num_seconds().max(0) as u64
    }

    pub fn station_count(&self) -> usize {
        self.stations.len()
    }

    /// Timestamp of the newest sample across all stations
    pub fn last_sample_time(&self) -> Option<DateTime<Utc>> {
        self.samples
            .values()
            .filter_map(|samples| samples.last().map(|s| s.timestamp))
            .max()
    }

    fn require_station(&self, id: StationId) -> AppResult<&Station> {
        self.stations
            .get(&id)
            .ok_or_else(|| AppError::NotFound(format!("Station {} not found", id)))
    }

    fn values<'a>(
        &'a self,
        station_id: Option<StationId>,
        parameter: &'a Parameter,
        range: Option<&'a TimeRange>,
    ) -> impl Iterator<Item = f64> + 'a {
        self.samples
            .iter()
            .filter(move |(id, _)| station_id.map_or(true, |wanted| **id == wanted))
            .flat_map(|(_, samples)| samples.iter())
            .filter(move |s| range.map_or(true, |r| r.contains(s.timestamp)))
            .filter_map(move |s| s.value(parameter))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Store handle shared by the HTTP workers and the scheduler
pub type SharedStore = Arc<RwLock<InMemoryStore>>;

impl SampleStore for InMemoryStore {
    fn insert_station(&mut self, input: StationInput) -> AppResult<Station> {
        let id = self.next_station_id;
        self.next_station_id += 1;

        let station = Station {
            id,
            name: input.name,
            location: input.location,
            description: input.description,
            station_type: input.station_type,
            status: input.status,
            measurement_start_date: None,
            measurement_end_date: None,
            number_of_samples: 0,
            created_at: Utc::now(),
        };

        info!(station_id = id, name = %station.name, "Station registered");
        self.stations.insert(id, station.clone());
        Ok(station)
    }

    fn get_station(&self, id: StationId) -> AppResult<Station> {
        self.require_station(id).cloned()
    }

    fn list_stations(&self, filter: &StationFilter) -> AppResult<Vec<Station>> {
        Ok(self
            .stations
            .values()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect())
    }

    fn update_station(&mut self, station: Station) -> AppResult<()> {
        let slot = self
            .stations
            .get_mut(&station.id)
            .ok_or_else(|| AppError::NotFound(format!("Station {} not found", station.id)))?;
        *slot = station;
        Ok(())
    }

    fn delete_station(&mut self, id: StationId) -> AppResult<()> {
        self.require_station(id)?;
        self.stations.remove(&id);
        let samples = self.samples.remove(&id).map_or(0, |s| s.len());
        self.alerts.retain(|_, a| a.station_id != id);
        self.statistics.remove(&id);
        self.trends.retain(|key, _| key.station_id != id);

        info!(station_id = id, samples, "Station deleted with dependent records");
        Ok(())
    }

    fn insert_sample(&mut self, station_id: StationId, input: SampleInput) -> AppResult<Sample> {
        self.require_station(station_id)?;

        let sample = Sample {
            id: Uuid::new_v4(),
            station_id,
            timestamp: input.timestamp.unwrap_or_else(Utc::now),
            ph: input.ph,
            turbidity: input.turbidity,
            dissolved_oxygen: input.dissolved_oxygen,
            temperature: input.temperature,
            other_data: input.other_data,
        };

        let series = self.samples.entry(station_id).or_default();
        // Equal timestamps keep arrival order
        let pos = series.partition_point(|s| s.timestamp <= sample.timestamp);
        series.insert(pos, sample.clone());
        let count = series.len() as u64;

        if let Some(station) = self.stations.get_mut(&station_id) {
            station.number_of_samples = count;
        }

        debug!(
            station_id,
            sample_id = %sample.id,
            total = count,
            "Adding sample to store"
        );

        Ok(sample)
    }

    fn list_samples(
        &self,
        station_id: StationId,
        since: Option<DateTime<Utc>>,
    ) -> AppResult<Vec<Sample>> {
        self.require_station(station_id)?;
        Ok(self
            .samples
            .get(&station_id)
            .map(|series| {
                series
                    .iter()
                    .filter(|s| since.map_or(true, |cutoff| s.timestamp >= cutoff))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn samples_in_range(&self, range: &TimeRange) -> AppResult<Vec<Sample>> {
        let mut samples: Vec<Sample> = self
            .samples
            .values()
            .flat_map(|series| series.iter())
            .filter(|s| range.contains(s.timestamp))
            .cloned()
            .collect();
        samples.sort_by_key(|s| s.timestamp);
        Ok(samples)
    }

    fn aggregate(
        &self,
        station_id: Option<StationId>,
        parameter: &Parameter,
        func: AggregateFn,
        range: Option<&TimeRange>,
    ) -> AppResult<Option<f64>> {
        if let Some(id) = station_id {
            self.require_station(id)?;
        }

        let values = self.values(station_id, parameter, range);
        let result = match func {
            AggregateFn::Count => Some(values.count() as f64),
            AggregateFn::Min => values.reduce(f64::min),
            AggregateFn::Max => values.reduce(f64::max),
            AggregateFn::Avg => {
                let (sum, n) = values.fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
                (n > 0).then(|| sum / n as f64)
            }
        };
        Ok(result)
    }

    fn delete_samples_before(&mut self, cutoff: DateTime<Utc>) -> AppResult<usize> {
        let mut removed = 0;
        for (station_id, series) in self.samples.iter_mut() {
            let before = series.len();
            series.retain(|s| s.timestamp >= cutoff);
            removed += before - series.len();

            if let Some(station) = self.stations.get_mut(station_id) {
                station.number_of_samples = series.len() as u64;
            }
        }
        Ok(removed)
    }

    fn insert_alert(&mut self, alert: NewAlert, now: DateTime<Utc>) -> AppResult<Alert> {
        self.require_station(alert.station_id)?;

        let id = self.next_alert_id;
        self.next_alert_id += 1;

        let alert = Alert {
            id,
            station_id: alert.station_id,
            sample_id: alert.sample_id,
            alert_type: alert.alert_type,
            severity: alert.severity,
            message: alert.message,
            triggered_at: now,
            resolved: false,
            resolved_at: None,
        };
        self.alerts.insert(id, alert.clone());
        Ok(alert)
    }

    fn list_alerts(&self, filter: &AlertFilter) -> AppResult<Vec<Alert>> {
        Ok(self
            .alerts
            .values()
            .filter(|a| filter.station_id.map_or(true, |id| a.station_id == id))
            .filter(|a| filter.resolved.map_or(true, |r| a.resolved == r))
            .cloned()
            .collect())
    }

    fn resolve_alert(&mut self, id: AlertId, now: DateTime<Utc>) -> AppResult<Alert> {
        let alert = self
            .alerts
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Alert {} not found", id)))?;
        if !alert.resolved {
            alert.resolved = true;
            alert.resolved_at = Some(now);
        }
        Ok(alert.clone())
    }

    fn count_alerts(&self, severity: AlertSeverity, resolved: bool) -> AppResult<u64> {
        Ok(self
            .alerts
            .values()
            .filter(|a| a.severity == severity && a.resolved == resolved)
            .count() as u64)
    }

    fn upsert_station_statistics(
        &mut self,
        station_id: StationId,
        stats: StationStatistics,
    ) -> AppResult<Upsert> {
        self.require_station(station_id)?;
        Ok(match self.statistics.insert(station_id, stats) {
            Some(_) => Upsert::Updated,
            None => Upsert::Created,
        })
    }

    fn station_statistics(&self, station_id: StationId) -> AppResult<Option<StationStatistics>> {
        Ok(self.statistics.get(&station_id).cloned())
    }

    fn remove_station_statistics(&mut self, station_id: StationId) -> AppResult<bool> {
        Ok(self.statistics.remove(&station_id).is_some())
    }

    fn all_station_statistics(&self) -> AppResult<Vec<StationStatistics>> {
        Ok(self.statistics.values().cloned().collect())
    }

    fn upsert_system_overview(
        &mut self,
        date: NaiveDate,
        overview: SystemOverview,
    ) -> AppResult<Upsert> {
        Ok(match self.overviews.insert(date, overview) {
            Some(_) => Upsert::Updated,
            None => Upsert::Created,
        })
    }

    fn system_overview(&self, date: NaiveDate) -> AppResult<Option<SystemOverview>> {
        Ok(self.overviews.get(&date).cloned())
    }

    fn upsert_trend(&mut self, key: TrendKey, record: TrendRecord) -> AppResult<Upsert> {
        self.require_station(key.station_id)?;
        Ok(match self.trends.insert(key, record) {
            Some(_) => Upsert::Updated,
            None => Upsert::Created,
        })
    }

    fn trends_for_station(&self, station_id: StationId) -> AppResult<Vec<TrendRecord>> {
        Ok(self
            .trends
            .iter()
            .filter(|(key, _)| key.station_id == station_id)
            .map(|(_, record)| record.clone())
            .collect())
    }

    fn insert_comparison(&mut self, report: ComparisonReport) -> AppResult<()> {
        self.comparisons.push(report);
        Ok(())
    }

    fn list_comparisons(&self) -> AppResult<Vec<ComparisonReport>> {
        Ok(self.comparisons.clone())
    }
}

/// Number of distinct station type values, blank included
pub fn distinct_station_types(stations: &[Station]) -> usize {
    stations
        .iter()
        .map(|s| s.station_type.as_str())
        .collect::<HashSet<_>>()
        .len()
}
