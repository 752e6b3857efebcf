//! Periodic trend detection
//!
//! Buckets a station's samples by day, ISO week or month, fits an ordinary
//! least squares line of bucket average against bucket index, classifies the
//! slope and extrapolates a short forecast.

use chrono::{DateTime, Datelike, Utc};
use statrs::distribution::{ContinuousCDF, StudentsT};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::error::AppResult;
use crate::models::{
    Forecast, LinearFit, Parameter, Period, Sample, StationId, TrendDirection, TrendRecord,
    TrendSeries,
};
use crate::store::SampleStore;

/// Slopes with a smaller magnitude are classified as stable
pub const STABLE_SLOPE: f64 = 0.01;

/// Number of periods extrapolated past the observed series
pub const FORECAST_PERIODS: usize = 3;

/// Minimum non-empty buckets for a fit
pub const MIN_BUCKETS: usize = 2;

/// Analyze and persist the trend of `parameter` for a station.
///
/// Returns `Ok(None)` when fewer than two non-empty buckets exist; nothing is
/// written in that case.
pub fn analyze_trend<S: SampleStore + ?Sized>(
    store: &mut S,
    station_id: StationId,
    parameter: &Parameter,
    period: Period,
    now: DateTime<Utc>,
) -> AppResult<Option<TrendRecord>> {
    let station = store.get_station(station_id)?;
    let samples = store.list_samples(station.id, None)?;

    let series = bucket_series(&samples, parameter, period);
    if series.values.len() < MIN_BUCKETS {
        debug!(
            station_id,
            parameter = %parameter,
            period = %period,
            buckets = series.values.len(),
            "Insufficient data for trend analysis"
        );
        return Ok(None);
    }

    let fit = linear_fit(&series.values);
    let direction = classify_slope(fit.slope);
    let forecast = forecast(&fit, series.values.len());
    let data_points = series.values.len();

    let record = TrendRecord {
        station_id,
        parameter: parameter.clone(),
        period,
        series,
        fit,
        direction,
        trend_strength: fit.r_value.abs(),
        forecast,
        data_points,
        analyzed_at: now,
    };

    let outcome = store.upsert_trend(record.key(), record.clone())?;

    info!(
        station_id,
        parameter = %parameter,
        period = %period,
        slope = record.fit.slope,
        direction = %record.direction,
        outcome = ?outcome,
        "Trend analysis stored"
    );

    Ok(Some(record))
}

/// Ordering key and label of the bucket containing `ts`
fn bucket_of(ts: DateTime<Utc>, period: Period) -> ((i32, u32, u32), String) {
    match period {
        Period::Daily => (
            (ts.year(), ts.month(), ts.day()),
            ts.format("%Y-%m-%d").to_string(),
        ),
        Period::Weekly => {
            let week = ts.iso_week();
            (
                (week.year(), week.week(), 0),
                format!("{}-W{:02}", week.year(), week.week()),
            )
        }
        Period::Monthly => (
            (ts.year(), ts.month(), 0),
            ts.format("%Y-%m").to_string(),
        ),
    }
}

/// Average `parameter` per bucket in chronological order. Buckets without a
/// value for the parameter are left out.
pub fn bucket_series(samples: &[Sample], parameter: &Parameter, period: Period) -> TrendSeries {
    let mut buckets: BTreeMap<(i32, u32, u32), (String, f64, usize)> = BTreeMap::new();

    for sample in samples {
        let Some(value) = sample.value(parameter) else {
            continue;
        };
        let (key, label) = bucket_of(sample.timestamp, period);
        let entry = buckets.entry(key).or_insert((label, 0.0, 0));
        entry.1 += value;
        entry.2 += 1;
    }

    let mut series = TrendSeries {
        buckets: Vec::with_capacity(buckets.len()),
        time_points: Vec::with_capacity(buckets.len()),
        values: Vec::with_capacity(buckets.len()),
    };
    for (index, (label, sum, count)) in buckets.into_values().enumerate() {
        series.buckets.push(label);
        series.time_points.push(index);
        series.values.push(sum / count as f64);
    }
    series
}

/// Least squares fit of `values` against their indices 0, 1, 2, ...
///
/// Requires at least two values. A flat series yields r = 0 and p = 1.
pub fn linear_fit(values: &[f64]) -> LinearFit {
    let n = values.len() as f64;
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = values.iter().sum::<f64>() / n;

    let (sxx, sxy, syy) = values
        .iter()
        .enumerate()
        .fold((0.0, 0.0, 0.0), |(sxx, sxy, syy), (i, y)| {
            let dx = i as f64 - mean_x;
            let dy = y - mean_y;
            (sxx + dx * dx, sxy + dx * dy, syy + dy * dy)
        });

    let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
    let intercept = mean_y - slope * mean_x;

    let r_value = if sxx > 0.0 && syy > 0.0 {
        (sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0)
    } else {
        0.0
    };

    LinearFit {
        slope,
        intercept,
        r_value,
        r_squared: r_value * r_value,
        p_value: slope_p_value(r_value, values.len(), syy),
    }
}

/// Two-sided p-value for the null hypothesis of zero slope
fn slope_p_value(r: f64, n: usize, syy: f64) -> f64 {
    if syy == 0.0 {
        return 1.0;
    }
    // Two points always fit exactly
    if n <= 2 || r.abs() >= 1.0 {
        return 0.0;
    }

    let df = (n - 2) as f64;
    let t_stat = r * (df / ((1.0 - r) * (1.0 + r))).sqrt();

    match StudentsT::new(0.0, 1.0, df) {
        Ok(t_dist) => (2.0 * (1.0 - t_dist.cdf(t_stat.abs()))).clamp(0.0, 1.0),
        Err(_) => 1.0,
    }
}

/// Direction of a fitted slope
pub fn classify_slope(slope: f64) -> TrendDirection {
    if slope.abs() < STABLE_SLOPE {
        TrendDirection::Stable
    } else if slope > 0.0 {
        TrendDirection::Increasing
    } else {
        TrendDirection::Decreasing
    }
}

/// Extrapolate the next periods after `observed` buckets; values never go
/// below zero.
pub fn forecast(fit: &LinearFit, observed: usize) -> Forecast {
    let periods: Vec<usize> = (1..=FORECAST_PERIODS).map(|k| observed + k).collect();
    let values = periods
        .iter()
        .map(|period| fit.predict((period - 1) as f64).max(0.0))
        .collect();
    Forecast { periods, values }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::store::tests::{sample_input, station_input};
    use crate::store::InMemoryStore;
    use chrono::{Duration, TimeZone};

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 9, 0, 0).unwrap()
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_monthly_linear_series() {
        let mut store = InMemoryStore::new();
        let station = store.insert_station(station_input("A", "river")).unwrap();

        // Two samples per month averaging 10, 12, 14, 16
        for (month, avg) in [(1, 10.0), (2, 12.0), (3, 14.0), (4, 16.0)] {
            store
                .insert_sample(station.id, sample_input(at(2024, month, 3), 7.0, avg - 1.0, 8.0, 18.0))
                .unwrap();
            store
                .insert_sample(station.id, sample_input(at(2024, month, 20), 7.0, avg + 1.0, 8.0, 18.0))
                .unwrap();
        }

        let record = analyze_trend(
            &mut store,
            station.id,
            &Parameter::Turbidity,
            Period::Monthly,
            at(2024, 5, 1),
        )
        .unwrap()
        .unwrap();

        assert_eq!(record.series.buckets, vec!["2024-01", "2024-02", "2024-03", "2024-04"]);
        assert_eq!(record.data_points, 4);
        assert!(approx(record.fit.slope, 2.0));
        assert!(approx(record.fit.intercept, 10.0));
        assert!(approx(record.fit.r_squared, 1.0));
        assert_eq!(record.direction, TrendDirection::Increasing);
        assert_eq!(record.forecast.periods, vec![5, 6, 7]);
        assert!(approx(record.forecast.values[0], 18.0));
        assert!(approx(record.forecast.values[1], 20.0));
        assert!(approx(record.forecast.values[2], 22.0));
    }

    #[test]
    fn test_single_bucket_is_insufficient() {
        let mut store = InMemoryStore::new();
        let station = store.insert_station(station_input("A", "river")).unwrap();
        for day in 1..=5 {
            store
                .insert_sample(station.id, sample_input(at(2024, 3, day), 7.0, 1.0, 8.0, 18.0))
                .unwrap();
        }

        let result = analyze_trend(
            &mut store,
            station.id,
            &Parameter::Ph,
            Period::Monthly,
            at(2024, 4, 1),
        )
        .unwrap();
        assert!(result.is_none());
        assert!(store.trends_for_station(station.id).unwrap().is_empty());

        // Same data is enough when bucketed daily
        let daily = analyze_trend(
            &mut store,
            station.id,
            &Parameter::Ph,
            Period::Daily,
            at(2024, 4, 1),
        )
        .unwrap()
        .unwrap();
        assert_eq!(daily.data_points, 5);
        assert_eq!(daily.direction, TrendDirection::Stable);
        assert_eq!(daily.fit.p_value, 1.0);
    }

    #[test]
    fn test_no_samples_is_insufficient() {
        let mut store = InMemoryStore::new();
        let station = store.insert_station(station_input("A", "river")).unwrap();
        let result = analyze_trend(
            &mut store,
            station.id,
            &Parameter::Ph,
            Period::Weekly,
            at(2024, 4, 1),
        )
        .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_unknown_station() {
        let mut store = InMemoryStore::new();
        let result = analyze_trend(&mut store, 9, &Parameter::Ph, Period::Daily, at(2024, 4, 1));
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_empty_buckets_are_skipped() {
        let mut store = InMemoryStore::new();
        let station = store.insert_station(station_input("A", "river")).unwrap();
        store
            .insert_sample(station.id, sample_input(at(2024, 1, 10), 7.0, 4.0, 8.0, 18.0))
            .unwrap();
        store
            .insert_sample(station.id, sample_input(at(2024, 6, 10), 7.0, 2.0, 8.0, 18.0))
            .unwrap();

        let samples = store.list_samples(station.id, None).unwrap();
        let series = bucket_series(&samples, &Parameter::Turbidity, Period::Monthly);

        assert_eq!(series.buckets, vec!["2024-01", "2024-06"]);
        assert_eq!(series.time_points, vec![0, 1]);
        assert_eq!(series.values, vec![4.0, 2.0]);
    }

    #[test]
    fn test_weekly_buckets_span_year_boundary() {
        let mut store = InMemoryStore::new();
        let station = store.insert_station(station_input("A", "river")).unwrap();
        // 2024-12-30 belongs to ISO week 2025-W01
        for ts in [at(2024, 12, 23), at(2024, 12, 30), at(2025, 1, 2), at(2025, 1, 8)] {
            store
                .insert_sample(station.id, sample_input(ts, 7.0, 1.0, 8.0, 18.0))
                .unwrap();
        }

        let samples = store.list_samples(station.id, None).unwrap();
        let series = bucket_series(&samples, &Parameter::Ph, Period::Weekly);
        assert_eq!(series.buckets, vec!["2024-W52", "2025-W01", "2025-W02"]);
    }

    #[test]
    fn test_forecast_floored_at_zero() {
        let fit = linear_fit(&[9.0, 6.0, 3.0]);
        assert_eq!(classify_slope(fit.slope), TrendDirection::Decreasing);

        let projected = forecast(&fit, 3);
        assert_eq!(projected.periods, vec![4, 5, 6]);
        assert!(approx(projected.values[0], 0.0));
        assert!(projected.values.iter().all(|v| *v >= 0.0));
    }

    #[test]
    fn test_noisy_fit_p_value() {
        let fit = linear_fit(&[1.0, 3.0, 2.0, 5.0, 4.0, 6.0]);
        assert!(fit.slope > 0.0);
        assert!(fit.r_squared > 0.0 && fit.r_squared < 1.0);
        assert!(fit.p_value > 0.0 && fit.p_value < 0.05);
    }

    #[test]
    fn test_slope_classification_threshold() {
        assert_eq!(classify_slope(0.009), TrendDirection::Stable);
        assert_eq!(classify_slope(-0.009), TrendDirection::Stable);
        assert_eq!(classify_slope(0.01), TrendDirection::Increasing);
        assert_eq!(classify_slope(-0.5), TrendDirection::Decreasing);
    }

    #[test]
    fn test_reanalysis_replaces_record() {
        let mut store = InMemoryStore::new();
        let station = store.insert_station(station_input("A", "river")).unwrap();
        for day in 0..4 {
            store
                .insert_sample(
                    station.id,
                    sample_input(at(2024, 3, 1) + Duration::days(day), 7.0 + day as f64 * 0.1, 1.0, 8.0, 18.0),
                )
                .unwrap();
        }

        let first = analyze_trend(&mut store, station.id, &Parameter::Ph, Period::Daily, at(2024, 4, 1))
            .unwrap()
            .unwrap();
        let second = analyze_trend(&mut store, station.id, &Parameter::Ph, Period::Daily, at(2024, 4, 1))
            .unwrap()
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(store.trends_for_station(station.id).unwrap().len(), 1);
    }
}
