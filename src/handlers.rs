//! HTTP request handlers
//!
//! Implements the REST API for stations, samples, alerts and analytics.

use actix_web::{web, HttpRequest, HttpResponse, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::alerts::{generate_alerts, MAX_LOOKBACK_DAYS};
use crate::analytics::{
    analyze_trend, compare_stations, recompute_station_statistics, recompute_system_overview,
    RecomputeSummary,
};
use crate::error::{AppError, AppResult};
use crate::models::{
    Alert, AlertId, HealthCheck, Parameter, Period, Sample, SampleInput, Station, StationId,
    StationInput, StationStatistics, SystemOverview, TrendRecord,
};
use crate::reports::{dashboard, generate_report, ReportRequest};
use crate::store::{AlertFilter, SampleStore, SharedStore, StationFilter};
use crate::validation::{validate_pagination, validate_sample_input, validate_station_input};

/// Samples returned with the station analytics view
const RECENT_SAMPLES: usize = 50;
const HISTORY_DAYS: i64 = 90;

/// Configure all application routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _req| AppError::BadRequest(err.to_string()).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|err, _req| AppError::BadRequest(err.to_string()).into()),
    )
    .service(
        web::scope("/api")
            // Health check
            .route("/health", web::get().to(health_check))
            // Stations and samples
            .route("/stations", web::get().to(list_stations))
            .route("/stations", web::post().to(create_station))
            .route("/stations/{id}", web::get().to(get_station))
            .route("/stations/{id}", web::delete().to(delete_station))
            .route("/stations/{id}/samples", web::get().to(list_samples))
            .route("/stations/{id}/samples", web::post().to(ingest_sample))
            // Alerts
            .route("/alerts", web::get().to(list_alerts))
            .route("/alerts/generate", web::post().to(run_alert_generation))
            .route("/alerts/{id}/resolve", web::post().to(resolve_alert))
            // Analytics
            .route("/analytics/dashboard", web::get().to(get_dashboard))
            .route("/analytics/stations/{id}", web::get().to(get_station_analytics))
            .route("/analytics/recompute", web::post().to(recompute))
            .route("/analytics/trends", web::post().to(analyze_trends))
            .route("/analytics/comparison", web::post().to(compare))
            .route("/analytics/comparisons", web::get().to(list_comparisons))
            .route("/analytics/reports", web::post().to(create_report)),
    );
}

/// Health check endpoint
///
/// GET /api/health
pub async fn health_check(state: web::Data<SharedStore>) -> Result<HttpResponse, AppError> {
    let store = state.read().await;

    let health = HealthCheck {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        uptime_seconds: store.uptime_seconds(),
        stations: store.station_count(),
        last_sample: store.last_sample_time(),
    };

    Ok(HttpResponse::Ok().json(health))
}

// ---------------------------------------------------------------------------
// Stations and samples
// ---------------------------------------------------------------------------

/// GET /api/stations?status=active&station_type=river
pub async fn list_stations(
    state: web::Data<SharedStore>,
    query: web::Query<StationFilter>,
) -> Result<HttpResponse, AppError> {
    let store = state.read().await;
    let stations = store.list_stations(&query)?;
    Ok(HttpResponse::Ok().json(stations))
}

/// POST /api/stations
pub async fn create_station(
    state: web::Data<SharedStore>,
    body: web::Json<StationInput>,
) -> Result<HttpResponse, AppError> {
    validate_station_input(&body)?;

    let station = state.write().await.insert_station(body.into_inner())?;
    info!(station_id = station.id, name = %station.name, "Station registered");

    Ok(HttpResponse::Created().json(station))
}

/// GET /api/stations/{id}
pub async fn get_station(
    state: web::Data<SharedStore>,
    path: web::Path<StationId>,
) -> Result<HttpResponse, AppError> {
    let station = state.read().await.get_station(path.into_inner())?;
    Ok(HttpResponse::Ok().json(station))
}

/// DELETE /api/stations/{id}
///
/// Removes the station together with its samples, alerts and snapshots.
pub async fn delete_station(
    state: web::Data<SharedStore>,
    path: web::Path<StationId>,
) -> Result<HttpResponse, AppError> {
    state.write().await.delete_station(path.into_inner())?;
    Ok(HttpResponse::NoContent().finish())
}

/// Query parameters for sample history
#[derive(Debug, Deserialize)]
pub struct SampleQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub since: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
struct PaginatedResponse<T> {
    data: Vec<T>,
    page: u32,
    limit: u32,
    total: u32,
    total_pages: u32,
}

/// Get sample history, newest first
///
/// GET /api/stations/{id}/samples?page=1&limit=100&since=2024-01-01T00:00:00Z
pub async fn list_samples(
    state: web::Data<SharedStore>,
    path: web::Path<StationId>,
    query: web::Query<SampleQuery>,
) -> Result<HttpResponse, AppError> {
    let (page, limit) = validate_pagination(query.page, query.limit)?;

    let mut samples = state.read().await.list_samples(path.into_inner(), query.since)?;
    samples.reverse();

    // Apply pagination
    let total = samples.len();
    let start = (page as usize - 1).saturating_mul(limit as usize);
    let end = start.saturating_add(limit as usize).min(total);

    let paginated: Vec<Sample> = if start < total {
        samples.drain(start..end).collect()
    } else {
        Vec::new()
    };

    Ok(HttpResponse::Ok().json(PaginatedResponse {
        data: paginated,
        page,
        limit,
        total: total as u32,
        total_pages: ((total as f64) / (limit as f64)).ceil() as u32,
    }))
}

#[derive(Serialize)]
struct IngestResponse {
    success: bool,
    sample_id: String,
    correlation_id: String,
}

/// Ingest a sample for a station
///
/// POST /api/stations/{id}/samples
pub async fn ingest_sample(
    state: web::Data<SharedStore>,
    path: web::Path<StationId>,
    body: web::Json<SampleInput>,
    req: HttpRequest,
) -> Result<HttpResponse, AppError> {
    let correlation_id = extract_correlation_id(&req);
    let station_id = path.into_inner();

    info!(
        correlation_id = %correlation_id,
        station_id,
        "Received sample ingestion request"
    );

    validate_sample_input(&body)?;

    let sample = state
        .write()
        .await
        .insert_sample(station_id, body.into_inner())?;

    let flags = sample.quality_indicators();
    if flags.active_count() > 0 {
        warn!(
            correlation_id = %correlation_id,
            station_id,
            active_flags = flags.active_count(),
            ph_out_of_range = flags.ph_out_of_range,
            high_turbidity = flags.high_turbidity,
            low_dissolved_oxygen = flags.low_dissolved_oxygen,
            temperature_out_of_range = flags.temperature_out_of_range,
            "Ingested sample is outside normal ranges"
        );
    }

    info!(
        correlation_id = %correlation_id,
        sample_id = %sample.id,
        "Sample ingested successfully"
    );

    Ok(HttpResponse::Created().json(IngestResponse {
        success: true,
        sample_id: sample.id.to_string(),
        correlation_id,
    }))
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

/// GET /api/alerts?station_id=1&resolved=false
pub async fn list_alerts(
    state: web::Data<SharedStore>,
    query: web::Query<AlertFilter>,
) -> Result<HttpResponse, AppError> {
    let mut alerts = state.read().await.list_alerts(&query)?;
    alerts.sort_by(|a, b| b.triggered_at.cmp(&a.triggered_at).then(b.id.cmp(&a.id)));
    Ok(HttpResponse::Ok().json(alerts))
}

/// POST /api/alerts/{id}/resolve
pub async fn resolve_alert(
    state: web::Data<SharedStore>,
    path: web::Path<AlertId>,
) -> Result<HttpResponse, AppError> {
    let alert = state
        .write()
        .await
        .resolve_alert(path.into_inner(), Utc::now())?;
    info!(alert_id = alert.id, "Alert resolved");
    Ok(HttpResponse::Ok().json(alert))
}

#[derive(Debug, Deserialize)]
pub struct GenerateAlertsRequest {
    #[serde(default = "default_lookback_hours")]
    pub lookback_hours: i64,
    #[serde(default)]
    pub dry_run: bool,
}

fn default_lookback_hours() -> i64 {
    24
}

/// POST /api/alerts/generate
pub async fn run_alert_generation(
    state: web::Data<SharedStore>,
    body: web::Json<GenerateAlertsRequest>,
) -> Result<HttpResponse, AppError> {
    if body.lookback_hours <= 0 || body.lookback_hours > MAX_LOOKBACK_DAYS * 24 {
        return Err(AppError::BadRequest(format!(
            "lookback_hours must be between 1 and {}",
            MAX_LOOKBACK_DAYS * 24
        )));
    }
    let lookback = Duration::try_hours(body.lookback_hours)
        .ok_or_else(|| AppError::BadRequest("lookback_hours is out of range".to_string()))?;

    let mut store = state.write().await;
    let run = generate_alerts(&mut *store, Utc::now(), lookback, body.dry_run)?;

    Ok(HttpResponse::Ok().json(run))
}

// ---------------------------------------------------------------------------
// Analytics
// ---------------------------------------------------------------------------

/// GET /api/analytics/dashboard
pub async fn get_dashboard(state: web::Data<SharedStore>) -> Result<HttpResponse, AppError> {
    let mut store = state.write().await;
    let dashboard = dashboard(&mut *store, Utc::now())?;
    Ok(HttpResponse::Ok().json(dashboard))
}

#[derive(Serialize)]
struct StationAnalytics {
    station: Station,
    statistics: Option<StationStatistics>,
    trend_analyses: Vec<TrendRecord>,
    recent_samples: Vec<Sample>,
    parameter_history: Vec<Sample>,
    alerts: Vec<Alert>,
}

/// Recompute one station's snapshot and return it with recent activity
///
/// GET /api/analytics/stations/{id}
pub async fn get_station_analytics(
    state: web::Data<SharedStore>,
    path: web::Path<StationId>,
) -> Result<HttpResponse, AppError> {
    let station_id = path.into_inner();
    let now = Utc::now();
    let mut store = state.write().await;

    recompute_station_statistics(&mut *store, Some(station_id), now)?;

    let samples = store.list_samples(station_id, None)?;
    let history_start = now - Duration::days(HISTORY_DAYS);
    let parameter_history = samples
        .iter()
        .filter(|s| s.timestamp >= history_start)
        .cloned()
        .collect();
    let recent_samples = samples.iter().rev().take(RECENT_SAMPLES).cloned().collect();

    let mut alerts = store.list_alerts(&AlertFilter {
        station_id: Some(station_id),
        resolved: None,
    })?;
    alerts.sort_by(|a, b| b.triggered_at.cmp(&a.triggered_at));

    let analytics = StationAnalytics {
        station: store.get_station(station_id)?,
        statistics: store.station_statistics(station_id)?,
        trend_analyses: store.trends_for_station(station_id)?,
        recent_samples,
        parameter_history,
        alerts,
    };

    Ok(HttpResponse::Ok().json(analytics))
}

#[derive(Debug, Default, Deserialize)]
pub struct RecomputeRequest {
    pub station_id: Option<StationId>,
}

#[derive(Serialize)]
struct RecomputeResponse {
    statistics: RecomputeSummary,
    system_overview: SystemOverview,
}

/// POST /api/analytics/recompute
pub async fn recompute(
    state: web::Data<SharedStore>,
    body: Option<web::Json<RecomputeRequest>>,
) -> Result<HttpResponse, AppError> {
    let station_id = body.and_then(|b| b.into_inner().station_id);
    let now = Utc::now();
    let mut store = state.write().await;

    let statistics = recompute_station_statistics(&mut *store, station_id, now)?;
    let (system_overview, _) = recompute_system_overview(&mut *store, now)?;

    Ok(HttpResponse::Ok().json(RecomputeResponse {
        statistics,
        system_overview,
    }))
}

#[derive(Debug, Deserialize)]
pub struct TrendRequest {
    pub station_id: Option<StationId>,
    pub parameter: Option<String>,
    pub period: Option<String>,
}

/// Fit a trend for one station parameter
///
/// POST /api/analytics/trends
pub async fn analyze_trends(
    state: web::Data<SharedStore>,
    body: web::Json<TrendRequest>,
) -> Result<HttpResponse, AppError> {
    let request = body.into_inner();
    let station_id = request
        .station_id
        .ok_or_else(|| AppError::BadRequest("station_id is required".to_string()))?;
    let parameter: Parameter = parse_or_default(request.parameter, Parameter::Ph)?;
    let period: Period = parse_or_default(request.period, Period::Monthly)?;

    let mut store = state.write().await;
    let record = analyze_trend(&mut *store, station_id, &parameter, period, Utc::now())?
        .ok_or_else(|| {
            AppError::InsufficientData("Insufficient data for trend analysis".to_string())
        })?;

    Ok(HttpResponse::Ok().json(record))
}

fn parse_or_default<T>(raw: Option<String>, default: T) -> AppResult<T>
where
    T: std::str::FromStr<Err = String>,
{
    match raw {
        Some(raw) => raw.parse().map_err(AppError::BadRequest),
        None => Ok(default),
    }
}

#[derive(Debug, Deserialize)]
pub struct ComparisonRequest {
    #[serde(default)]
    pub station_ids: Vec<StationId>,
    pub parameters: Option<Vec<Parameter>>,
}

/// POST /api/analytics/comparison
pub async fn compare(
    state: web::Data<SharedStore>,
    body: web::Json<ComparisonRequest>,
) -> Result<HttpResponse, AppError> {
    let request = body.into_inner();
    let mut store = state.write().await;
    let report = compare_stations(
        &mut *store,
        &request.station_ids,
        request.parameters.as_deref(),
        Utc::now(),
    )?;
    Ok(HttpResponse::Ok().json(report))
}

/// GET /api/analytics/comparisons
pub async fn list_comparisons(state: web::Data<SharedStore>) -> Result<HttpResponse, AppError> {
    let comparisons = state.read().await.list_comparisons()?;
    Ok(HttpResponse::Ok().json(comparisons))
}

/// POST /api/analytics/reports
pub async fn create_report(
    state: web::Data<SharedStore>,
    body: web::Json<ReportRequest>,
) -> Result<HttpResponse, AppError> {
    let mut store = state.write().await;
    let report = generate_report(&mut *store, body.into_inner(), Utc::now())?;
    Ok(HttpResponse::Ok().json(report))
}

/// Extract or generate correlation ID from request headers
fn extract_correlation_id(req: &HttpRequest) -> String {
    req.headers()
        .get("X-Correlation-ID")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}
