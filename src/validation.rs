//! Input validation module
//!
//! Provides validation for station and sample ingestion and analytics requests.

use crate::error::{AppError, AppResult};
use crate::models::{SampleInput, StationId, StationInput};
use tracing::{debug, warn};
use validator::{Validate, ValidationErrors};

/// Minimum number of distinct stations in a comparison
pub const MIN_COMPARISON_STATIONS: usize = 2;

fn describe(validation_errors: &ValidationErrors) -> String {
    let mut messages: Vec<String> = validation_errors
        .field_errors()
        .iter()
        .map(|(field, errors)| {
            let msgs: Vec<String> = errors
                .iter()
                .map(|e| {
                    e.message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string())
                })
                .collect();
            format!("{}: {}", field, msgs.join(", "))
        })
        .collect();

    // Nested structs (station location) report separately
    for (field, kind) in validation_errors.errors() {
        if let validator::ValidationErrorsKind::Struct(inner) = kind {
            messages.push(format!("{}: {}", field, describe(inner)));
        }
    }

    messages.sort();
    messages.join("; ")
}

/// Validate station registration data
pub fn validate_station_input(input: &StationInput) -> AppResult<()> {
    if let Err(validation_errors) = input.validate() {
        let message = describe(&validation_errors);
        warn!(errors = %message, "Station input validation failed");
        return Err(AppError::ValidationError(message));
    }

    validate_finite("Latitude", input.location.lat)?;
    validate_finite("Longitude", input.location.lng)?;

    if input.name.trim().is_empty() {
        return Err(AppError::ValidationError(
            "Station name cannot be blank".to_string(),
        ));
    }

    debug!("Station input validation passed");
    Ok(())
}

/// Validate sample ingestion data
pub fn validate_sample_input(input: &SampleInput) -> AppResult<()> {
    // Range checks silently pass NaN, so check finiteness first
    validate_finite("pH", input.ph)?;
    validate_finite("Turbidity", input.turbidity)?;
    validate_finite("Dissolved oxygen", input.dissolved_oxygen)?;
    validate_finite("Temperature", input.temperature)?;

    if let Err(validation_errors) = input.validate() {
        let message = describe(&validation_errors);
        warn!(errors = %message, "Sample input validation failed");
        return Err(AppError::ValidationError(message));
    }

    debug!("Sample input validation passed");
    Ok(())
}

fn validate_finite(name: &str, value: f64) -> AppResult<()> {
    if !value.is_finite() {
        return Err(AppError::ValidationError(format!(
            "{} must be a finite number",
            name
        )));
    }
    Ok(())
}

/// Deduplicate comparison ids (first occurrence wins) and require at least
/// two distinct stations.
pub fn validate_comparison_ids(station_ids: &[StationId]) -> AppResult<Vec<StationId>> {
    let mut unique = Vec::with_capacity(station_ids.len());
    for id in station_ids {
        if !unique.contains(id) {
            unique.push(*id);
        }
    }

    if unique.len() < MIN_COMPARISON_STATIONS {
        return Err(AppError::InvalidInput(format!(
            "At least {} distinct station_ids are required",
            MIN_COMPARISON_STATIONS
        )));
    }

    Ok(unique)
}

/// Validate pagination parameters
pub fn validate_pagination(page: Option<u32>, limit: Option<u32>) -> AppResult<(u32, u32)> {
    let page = page.unwrap_or(1);
    let limit = limit.unwrap_or(100);

    if page == 0 {
        return Err(AppError::ValidationError(
            "Page number must be greater than 0".to_string(),
        ));
    }

    if limit == 0 || limit > 1000 {
        return Err(AppError::ValidationError(
            "Limit must be between 1 and 1000".to_string(),
        ));
    }

    Ok((page, limit))
}
