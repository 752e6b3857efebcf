//! Data models for stations, samples, alerts and computed snapshots
//!
//! Defines the core data structures used throughout the application.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

pub type StationId = u64;
pub type AlertId = u64;

// ---------------------------------------------------------------------------
// Stations
// ---------------------------------------------------------------------------

/// Lifecycle status of a monitoring station
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StationStatus {
    Active,
    Inactive,
    Closed,
    #[default]
    Unknown,
}

impl fmt::Display for StationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StationStatus::Active => write!(f, "active"),
            StationStatus::Inactive => write!(f, "inactive"),
            StationStatus::Closed => write!(f, "closed"),
            StationStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// WGS84 point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
pub struct GeoPoint {
    #[validate(range(min = -90.0, max = 90.0, message = "Latitude must be between -90 and 90"))]
    pub lat: f64,
    #[validate(range(min = -180.0, max = 180.0, message = "Longitude must be between -180 and 180"))]
    pub lng: f64,
}

/// A fixed monitoring location producing a time series of samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub id: StationId,
    pub name: String,
    pub location: GeoPoint,
    pub description: String,
    /// Free-form category (river, dam, borehole, ...)
    pub station_type: String,
    pub status: StationStatus,
    pub measurement_start_date: Option<NaiveDate>,
    pub measurement_end_date: Option<NaiveDate>,
    /// Cached sample count, refreshed on ingestion and by maintenance jobs
    pub number_of_samples: u64,
    pub created_at: DateTime<Utc>,
}

/// Input DTO for station registration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StationInput {
    #[validate(length(min = 1, max = 100, message = "Station name must be 1-100 characters"))]
    pub name: String,

    #[validate(nested)]
    pub location: GeoPoint,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    #[validate(length(max = 100))]
    pub station_type: String,

    #[serde(default)]
    pub status: StationStatus,
}

// ---------------------------------------------------------------------------
// Samples
// ---------------------------------------------------------------------------

/// Auxiliary measurement value; import sources disagree on whether these are
/// numbers or text, so both are kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AuxValue {
    Number(f64),
    Text(String),
}

impl AuxValue {
    /// Numeric view of the value, parsing text when it holds a finite number
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AuxValue::Number(n) => Some(*n),
            AuxValue::Text(s) => s.trim().parse().ok(),
        }
        .filter(|v: &f64| v.is_finite())
    }
}

/// Open map of optional measurements (conductivity, dissolved solids, notes, ...)
pub type AuxData = BTreeMap<String, AuxValue>;

/// One timestamped measurement set from a station
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub id: Uuid,
    pub station_id: StationId,
    pub timestamp: DateTime<Utc>,
    /// pH (unitless, 0-14)
    pub ph: f64,
    /// Turbidity in NTU
    pub turbidity: f64,
    /// Dissolved oxygen in mg/L
    pub dissolved_oxygen: f64,
    /// Water temperature in °C
    pub temperature: f64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub other_data: AuxData,
}

impl Sample {
    /// Value of a parameter for this sample, if recorded
    pub fn value(&self, parameter: &Parameter) -> Option<f64> {
        match parameter {
            Parameter::Ph => Some(self.ph),
            Parameter::Turbidity => Some(self.turbidity),
            Parameter::DissolvedOxygen => Some(self.dissolved_oxygen),
            Parameter::Temperature => Some(self.temperature),
            Parameter::Auxiliary(key) => self.other_data.get(key).and_then(AuxValue::as_f64),
        }
    }

    /// Check the sample against the acceptable ranges for aquatic life
    pub fn quality_indicators(&self) -> QualityIndicators {
        QualityIndicators {
            ph_out_of_range: self.ph < 6.5 || self.ph > 8.5,
            high_turbidity: self.turbidity > 5.0,
            low_dissolved_oxygen: self.dissolved_oxygen < 6.0,
            temperature_out_of_range: self.temperature < 10.0 || self.temperature > 25.0,
        }
    }

    /// Human-readable descriptions of every out-of-range parameter
    pub fn quality_issues(&self) -> Vec<String> {
        let flags = self.quality_indicators();
        let mut issues = Vec::new();
        if flags.ph_out_of_range {
            issues.push(format!("pH ({}) outside normal range (6.5-8.5)", self.ph));
        }
        if flags.high_turbidity {
            issues.push(format!(
                "High turbidity ({} NTU) - water is cloudy",
                self.turbidity
            ));
        }
        if flags.low_dissolved_oxygen {
            issues.push(format!(
                "Low dissolved oxygen ({} mg/L) - poor for aquatic life",
                self.dissolved_oxygen
            ));
        }
        if flags.temperature_out_of_range {
            issues.push(format!(
                "Temperature ({}°C) outside optimal range (10-25°C)",
                self.temperature
            ));
        }
        issues
    }
}

/// Out-of-range flags for a single sample
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityIndicators {
    pub ph_out_of_range: bool,
    pub high_turbidity: bool,
    pub low_dissolved_oxygen: bool,
    pub temperature_out_of_range: bool,
}

impl QualityIndicators {
    /// Count the number of raised flags
    pub fn active_count(&self) -> u8 {
        [
            self.ph_out_of_range,
            self.high_turbidity,
            self.low_dissolved_oxygen,
            self.temperature_out_of_range,
        ]
        .iter()
        .filter(|flag| **flag)
        .count() as u8
    }
}

/// Input DTO for sample ingestion
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SampleInput {
    #[validate(range(min = 0.0, max = 14.0, message = "pH must be between 0 and 14"))]
    pub ph: f64,

    #[validate(range(min = 0.0, message = "Turbidity cannot be negative"))]
    pub turbidity: f64,

    #[validate(range(min = 0.0, message = "Dissolved oxygen cannot be negative"))]
    pub dissolved_oxygen: f64,

    #[validate(range(min = -5.0, max = 50.0, message = "Temperature must be between -5 and 50°C"))]
    pub temperature: f64,

    /// Optional client-provided timestamp (defaults to server time)
    pub timestamp: Option<DateTime<Utc>>,

    #[serde(default)]
    pub other_data: AuxData,
}

// ---------------------------------------------------------------------------
// Parameters and periods
// ---------------------------------------------------------------------------

/// A measurable column: one of the four core measurements or a key of the
/// auxiliary map.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Parameter {
    Ph,
    Turbidity,
    DissolvedOxygen,
    Temperature,
    Auxiliary(String),
}

impl Parameter {
    pub const CORE: [Parameter; 4] = [
        Parameter::Ph,
        Parameter::Turbidity,
        Parameter::DissolvedOxygen,
        Parameter::Temperature,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Parameter::Ph => "ph",
            Parameter::Turbidity => "turbidity",
            Parameter::DissolvedOxygen => "dissolved_oxygen",
            Parameter::Temperature => "temperature",
            Parameter::Auxiliary(key) => key,
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Parameter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim();
        match key.to_lowercase().as_str() {
            "ph" => Ok(Parameter::Ph),
            "turbidity" => Ok(Parameter::Turbidity),
            "dissolved_oxygen" | "oxygen" | "do" => Ok(Parameter::DissolvedOxygen),
            "temperature" | "temp" => Ok(Parameter::Temperature),
            "" => Err("Parameter name cannot be empty".to_string()),
            _ => Ok(Parameter::Auxiliary(key.to_string())),
        }
    }
}

impl TryFrom<String> for Parameter {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Parameter> for String {
    fn from(parameter: Parameter) -> Self {
        parameter.as_str().to_string()
    }
}

/// Bucket width used by trend analysis
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Daily,
    Weekly,
    #[default]
    Monthly,
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Period::Daily => write!(f, "daily"),
            Period::Weekly => write!(f, "weekly"),
            Period::Monthly => write!(f, "monthly"),
        }
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "daily" => Ok(Period::Daily),
            "weekly" => Ok(Period::Weekly),
            "monthly" => Ok(Period::Monthly),
            other => Err(format!(
                "Invalid period: {}. Valid periods: daily, weekly, monthly",
                other
            )),
        }
    }
}

/// Generic direction label shared by both trend algorithms
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    #[default]
    Stable,
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrendDirection::Increasing => write!(f, "increasing"),
            TrendDirection::Decreasing => write!(f, "decreasing"),
            TrendDirection::Stable => write!(f, "stable"),
        }
    }
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    WaterQuality,
    Equipment,
    Maintenance,
    DataGap,
    ThresholdExceeded,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl AlertSeverity {
    /// Severity for a sample with `issue_count` out-of-range parameters
    pub fn from_issue_count(issue_count: usize) -> Self {
        match issue_count {
            n if n >= 3 => AlertSeverity::Critical,
            2 => AlertSeverity::High,
            _ => AlertSeverity::Low,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub station_id: StationId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_id: Option<Uuid>,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub message: String,
    pub triggered_at: DateTime<Utc>,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Alert to be persisted; the store assigns id and trigger time
#[derive(Debug, Clone)]
pub struct NewAlert {
    pub station_id: StationId,
    pub sample_id: Option<Uuid>,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Computed snapshots
// ---------------------------------------------------------------------------

/// Replaceable per-station summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationStatistics {
    pub station_id: StationId,
    pub total_samples: u64,
    pub samples_last_30_days: u64,
    pub samples_last_90_days: u64,
    pub avg_ph: Option<f64>,
    pub avg_turbidity: Option<f64>,
    pub avg_dissolved_oxygen: Option<f64>,
    pub avg_temperature: Option<f64>,
    /// 0-100 heuristic health indicator
    pub quality_score: u8,
    // Named after parameters but holding generic increasing/decreasing/stable
    // labels; kept as-is for API compatibility.
    pub ph_trend: TrendDirection,
    pub turbidity_trend: TrendDirection,
    pub oxygen_trend: TrendDirection,
    pub last_sample_date: Option<DateTime<Utc>>,
    pub last_calculated: DateTime<Utc>,
}

/// System-wide rollup, one per calendar date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemOverview {
    pub date: NaiveDate,
    pub total_stations: u64,
    pub active_stations: u64,
    pub total_samples: u64,
    pub samples_today: u64,
    pub avg_quality_score: f64,
    pub stations_with_issues: u64,
    pub critical_alerts: u64,
    /// Distinct station types, used as a stand-in for regions
    pub regions_covered: u64,
    pub stations_updated_today: u64,
    /// Percentage of stations with a sample in the last 7 days
    pub data_completeness: f64,
}

/// Unique key of a trend record
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrendKey {
    pub station_id: StationId,
    pub parameter: Parameter,
    pub period: Period,
}

/// Ordinary least squares fit of bucket average against bucket index
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    pub r_value: f64,
    pub r_squared: f64,
    pub p_value: f64,
}

impl LinearFit {
    pub fn predict(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

/// Bucketed series used for a trend fit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendSeries {
    /// Bucket labels in chronological order (e.g. `2024-03`, `2024-W10`)
    pub buckets: Vec<String>,
    pub time_points: Vec<usize>,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    /// 1-based period numbers following the observed series
    pub periods: Vec<usize>,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendRecord {
    pub station_id: StationId,
    pub parameter: Parameter,
    pub period: Period,
    pub series: TrendSeries,
    pub fit: LinearFit,
    pub direction: TrendDirection,
    /// |r| of the fit
    pub trend_strength: f64,
    pub forecast: Forecast,
    pub data_points: usize,
    pub analyzed_at: DateTime<Utc>,
}

impl TrendRecord {
    pub fn key(&self) -> TrendKey {
        TrendKey {
            station_id: self.station_id,
            parameter: self.parameter.clone(),
            period: self.period,
        }
    }
}

/// Snapshot of a station as it appeared in a comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparedStation {
    pub id: StationId,
    pub name: String,
    pub station_type: String,
    pub status: StationStatus,
    pub location: GeoPoint,
    pub statistics: Option<ComparedStatistics>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparedStatistics {
    pub total_samples: u64,
    pub quality_score: u8,
    pub avg_ph: Option<f64>,
    pub avg_turbidity: Option<f64>,
    pub avg_dissolved_oxygen: Option<f64>,
    pub avg_temperature: Option<f64>,
}

impl From<&StationStatistics> for ComparedStatistics {
    fn from(stats: &StationStatistics) -> Self {
        Self {
            total_samples: stats.total_samples,
            quality_score: stats.quality_score,
            avg_ph: stats.avg_ph,
            avg_turbidity: stats.avg_turbidity,
            avg_dissolved_oxygen: stats.avg_dissolved_oxygen,
            avg_temperature: stats.avg_temperature,
        }
    }
}

/// Per-station aggregate of one parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterAggregate {
    pub station_id: StationId,
    pub station_name: String,
    pub average: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonSummary {
    pub total_stations: usize,
    pub total_samples: u64,
    pub avg_quality_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonData {
    pub stations: Vec<ComparedStation>,
    pub parameters: BTreeMap<String, Vec<ParameterAggregate>>,
    pub summary: ComparisonSummary,
}

/// Append-only record of a station comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub id: Uuid,
    pub analysis_type: String,
    pub comparison_data: ComparisonData,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthCheck {
    pub status: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub stations: usize,
    pub last_sample: Option<DateTime<Utc>>,
}
