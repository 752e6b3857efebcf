//! Demo data generator
//!
//! Produces synthetic stations and samples with realistic measurement
//! ranges so the service can be explored without an import. Samples are
//! spread over the week before `now`, with a gentle daily temperature
//! cycle and occasional turbidity spikes after simulated rain.

use chrono::{DateTime, Duration, Timelike, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{AppError, AppResult};
use crate::models::{AuxData, AuxValue, GeoPoint, SampleInput, StationInput, StationStatus};
use crate::store::SampleStore;
use crate::validation::{validate_sample_input, validate_station_input};

const STATION_TYPES: [&str; 4] = ["river", "dam", "borehole", "estuary"];
const RIVERS: [&str; 8] = [
    "Vaal", "Orange", "Limpopo", "Olifants", "Crocodile", "Tugela", "Breede", "Sabie",
];

/// Samples generated per station
const SAMPLES_PER_STATION: std::ops::RangeInclusive<usize> = 24..=72;
const SPREAD_HOURS: i64 = 7 * 24;

/// Synthetic data generator
pub struct DemoGenerator<R: Rng> {
    rng: R,
    ph: Normal<f64>,
    turbidity: Normal<f64>,
    oxygen: Normal<f64>,
    temperature: Normal<f64>,
}

impl DemoGenerator<StdRng> {
    pub fn from_entropy() -> AppResult<Self> {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Reproducible generator
    pub fn seeded(seed: u64) -> AppResult<Self> {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> DemoGenerator<R> {
    pub fn with_rng(rng: R) -> AppResult<Self> {
        let normal = |mean: f64, std_dev: f64| {
            Normal::new(mean, std_dev)
                .map_err(|e| AppError::Unexpected(format!("Invalid demo distribution: {}", e)))
        };

        Ok(Self {
            rng,
            ph: normal(7.5, 0.4)?,
            turbidity: normal(4.0, 3.0)?,
            oxygen: normal(8.0, 1.5)?,
            temperature: normal(20.0, 4.0)?,
        })
    }

    pub fn station_input(&mut self, index: usize) -> StationInput {
        let river = RIVERS[index % RIVERS.len()];
        let station_type = STATION_TYPES[self.rng.gen_range(0..STATION_TYPES.len())];

        StationInput {
            name: format!("{} {} Station {}", river, capitalize(station_type), index + 1),
            // Roughly the extent of South Africa
            location: GeoPoint {
                lat: round(self.rng.gen_range(-34.5..-22.5), 4),
                lng: round(self.rng.gen_range(17.0..32.5), 4),
            },
            description: format!("Synthetic {} monitoring point", station_type),
            station_type: station_type.to_string(),
            status: StationStatus::Active,
        }
    }

    pub fn sample_input(&mut self, timestamp: DateTime<Utc>) -> SampleInput {
        let hour = f64::from(timestamp.hour());
        let daily_cycle = ((hour - 9.0) / 24.0 * std::f64::consts::TAU).sin() * 3.0;

        let ph = self.ph.sample(&mut self.rng).clamp(6.5, 8.5);
        let mut turbidity = self.turbidity.sample(&mut self.rng);
        if self.rng.gen::<f64>() < 0.05 {
            turbidity += self.rng.gen_range(5.0..10.0);
        }
        let turbidity = turbidity.clamp(0.5, 15.0);
        let dissolved_oxygen = self.oxygen.sample(&mut self.rng).clamp(4.0, 12.0);
        let temperature = (self.temperature.sample(&mut self.rng) + daily_cycle).clamp(10.0, 30.0);

        let conductivity = self.rng.gen_range(100.0..1500.0);
        let mut other_data = AuxData::new();
        other_data.insert(
            "conductivity".to_string(),
            AuxValue::Number(round(conductivity, 1)),
        );
        other_data.insert(
            "dissolved_solids".to_string(),
            AuxValue::Number(round(conductivity * 0.65, 1)),
        );

        SampleInput {
            ph: round(ph, 2),
            turbidity: round(turbidity, 2),
            dissolved_oxygen: round(dissolved_oxygen, 2),
            temperature: round(temperature, 1),
            timestamp: Some(timestamp),
            other_data,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DemoSeed {
    pub stations: usize,
    pub samples: usize,
}

/// Insert `stations` synthetic stations, each with a week of samples
pub fn seed_demo_data<S: SampleStore + ?Sized, R: Rng>(
    store: &mut S,
    generator: &mut DemoGenerator<R>,
    stations: usize,
    now: DateTime<Utc>,
) -> AppResult<DemoSeed> {
    info!(stations, "Seeding demo data");

    let mut seed = DemoSeed::default();
    for index in 0..stations {
        let input = generator.station_input(index);
        validate_station_input(&input)?;
        let station = store.insert_station(input)?;
        seed.stations += 1;

        let count = generator.rng.gen_range(SAMPLES_PER_STATION);
        for _ in 0..count {
            let offset = Duration::minutes(generator.rng.gen_range(0..SPREAD_HOURS * 60));
            let sample = generator.sample_input(now - offset);
            validate_sample_input(&sample)?;
            store.insert_sample(station.id, sample)?;
        }
        seed.samples += count;

        debug!(station_id = station.id, samples = count, "Demo station seeded");
    }

    info!(
        stations = seed.stations,
        samples = seed.samples,
        "Demo data seeded"
    );
    Ok(seed)
}

fn round(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
