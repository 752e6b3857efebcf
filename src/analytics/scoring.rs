//! Quality scoring
//!
//! Maps averaged measurements to a 0-100 heuristic score. Each parameter
//! subtracts a fixed, banded penalty; a missing parameter subtracts nothing.

/// Score for a station with every parameter in its ideal band
pub const MAX_SCORE: i32 = 100;

/// Stations scoring below this are counted as having issues
pub const ISSUE_THRESHOLD: u8 = 70;

/// Penalty bands: (lower, upper, penalty), checked in order
const PH_BANDS: [(f64, f64, i32); 3] = [(6.5, 8.5, 0), (6.0, 9.0, 10), (5.5, 9.5, 20)];
const PH_OUTSIDE: i32 = 30;

/// Upper bounds (NTU), lower is better
const TURBIDITY_BANDS: [(f64, i32); 3] = [(5.0, 0), (10.0, 10), (20.0, 20)];
const TURBIDITY_OUTSIDE: i32 = 30;

/// Lower bounds (mg/L), higher is better
const OXYGEN_BANDS: [(f64, i32); 3] = [(6.0, 0), (4.0, 10), (2.0, 20)];
const OXYGEN_OUTSIDE: i32 = 30;

const TEMPERATURE_BANDS: [(f64, f64, i32); 2] = [(10.0, 25.0, 0), (5.0, 30.0, 5)];
const TEMPERATURE_OUTSIDE: i32 = 15;

/// Calculate the quality score (0-100) from averaged parameters
pub fn quality_score(
    ph: Option<f64>,
    turbidity: Option<f64>,
    dissolved_oxygen: Option<f64>,
    temperature: Option<f64>,
) -> u8 {
    let penalty = ph.map_or(0, ph_penalty)
        + turbidity.map_or(0, turbidity_penalty)
        + dissolved_oxygen.map_or(0, oxygen_penalty)
        + temperature.map_or(0, temperature_penalty);

    (MAX_SCORE - penalty).clamp(0, MAX_SCORE) as u8
}

fn ph_penalty(ph: f64) -> i32 {
    banded(ph, &PH_BANDS).unwrap_or(PH_OUTSIDE)
}

fn turbidity_penalty(turbidity: f64) -> i32 {
    TURBIDITY_BANDS
        .iter()
        .find(|(upper, _)| turbidity <= *upper)
        .map_or(TURBIDITY_OUTSIDE, |(_, penalty)| *penalty)
}

fn oxygen_penalty(dissolved_oxygen: f64) -> i32 {
    OXYGEN_BANDS
        .iter()
        .find(|(lower, _)| dissolved_oxygen >= *lower)
        .map_or(OXYGEN_OUTSIDE, |(_, penalty)| *penalty)
}

fn temperature_penalty(temperature: f64) -> i32 {
    banded(temperature, &TEMPERATURE_BANDS).unwrap_or(TEMPERATURE_OUTSIDE)
}

fn banded(value: f64, bands: &[(f64, f64, i32)]) -> Option<i32> {
    bands
        .iter()
        .find(|(lower, upper, _)| (*lower..=*upper).contains(&value))
        .map(|(_, _, penalty)| *penalty)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_ideal() {
        assert_eq!(quality_score(Some(7.0), Some(3.0), Some(7.0), Some(18.0)), 100);
    }

    #[test]
    fn test_all_absent_is_perfect() {
        assert_eq!(quality_score(None, None, None, None), 100);
    }

    #[test]
    fn test_all_worst_clamps_to_zero() {
        // 100 - 30 - 30 - 30 - 15
        assert_eq!(quality_score(Some(5.0), Some(25.0), Some(1.0), Some(40.0)), 0);
    }

    #[test]
    fn test_band_edges() {
        assert_eq!(quality_score(Some(6.5), None, None, None), 100);
        assert_eq!(quality_score(Some(8.5), None, None, None), 100);
        assert_eq!(quality_score(Some(9.0), None, None, None), 90);
        assert_eq!(quality_score(Some(5.5), None, None, None), 80);
        assert_eq!(quality_score(Some(9.6), None, None, None), 70);

        assert_eq!(quality_score(None, Some(5.0), None, None), 100);
        assert_eq!(quality_score(None, Some(10.0), None, None), 90);
        assert_eq!(quality_score(None, Some(20.0), None, None), 80);
        assert_eq!(quality_score(None, Some(20.1), None, None), 70);

        assert_eq!(quality_score(None, None, Some(6.0), None), 100);
        assert_eq!(quality_score(None, None, Some(4.0), None), 90);
        assert_eq!(quality_score(None, None, Some(2.0), None), 80);
        assert_eq!(quality_score(None, None, Some(1.9), None), 70);

        assert_eq!(quality_score(None, None, None, Some(25.0)), 100);
        assert_eq!(quality_score(None, None, None, Some(30.0)), 95);
        assert_eq!(quality_score(None, None, None, Some(4.9)), 85);
    }

    #[test]
    fn test_penalties_are_additive() {
        // pH tier 2, turbidity tier 3, DO ideal, temperature tier 2
        assert_eq!(
            quality_score(Some(6.2), Some(15.0), Some(8.0), Some(28.0)),
            100 - 10 - 20 - 5
        );
    }

    #[test]
    fn test_score_always_in_range() {
        let phs = [None, Some(0.0), Some(5.7), Some(6.1), Some(7.0), Some(9.2), Some(14.0)];
        let turbidities = [None, Some(0.0), Some(7.0), Some(15.0), Some(500.0)];
        let oxygens = [None, Some(0.0), Some(3.0), Some(5.0), Some(12.0)];
        let temperatures = [None, Some(-5.0), Some(7.0), Some(20.0), Some(45.0)];

        for ph in phs {
            for turbidity in turbidities {
                for oxygen in oxygens {
                    for temperature in temperatures {
                        let score = quality_score(ph, turbidity, oxygen, temperature);
                        assert!(score <= 100);
                    }
                }
            }
        }
    }

    #[test]
    fn test_monotonic_away_from_ideal() {
        let ph_path = [7.5, 8.5, 8.8, 9.0, 9.3, 9.5, 10.0, 12.0];
        let scores: Vec<u8> = ph_path
            .iter()
            .map(|ph| quality_score(Some(*ph), Some(3.0), Some(7.0), Some(18.0)))
            .collect();
        assert!(scores.windows(2).all(|w| w[1] <= w[0]));

        let turbidity_path = [0.0, 5.0, 6.0, 10.0, 15.0, 20.0, 21.0, 100.0];
        let scores: Vec<u8> = turbidity_path
            .iter()
            .map(|t| quality_score(Some(7.0), Some(*t), Some(7.0), Some(18.0)))
            .collect();
        assert!(scores.windows(2).all(|w| w[1] <= w[0]));

        let oxygen_path = [12.0, 6.0, 5.0, 4.0, 3.0, 2.0, 1.0, 0.0];
        let scores: Vec<u8> = oxygen_path
            .iter()
            .map(|o| quality_score(Some(7.0), Some(3.0), Some(*o), Some(18.0)))
            .collect();
        assert!(scores.windows(2).all(|w| w[1] <= w[0]));

        let temperature_path = [18.0, 25.0, 27.0, 30.0, 31.0, 40.0];
        let scores: Vec<u8> = temperature_path
            .iter()
            .map(|t| quality_score(Some(7.0), Some(3.0), Some(7.0), Some(*t)))
            .collect();
        assert!(scores.windows(2).all(|w| w[1] <= w[0]));
    }
}
