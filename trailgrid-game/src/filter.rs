//! Position filter rejecting noisy or implausible samples.
//!
//! The filter keeps exactly one piece of state: the last accepted sample.
//! Rejected samples never touch it.
use geo::{HaversineDistance, Point};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{
    FILTER_DRIFT_DISTANCE_M, FILTER_DRIFT_SPEED_MPS, FILTER_IMPOSSIBLE_SPEED_MPS,
    FILTER_MAX_ACCURACY_M, FILTER_NOISE_FLOOR_M,
};
use crate::numbers::i64_to_f64;

/// Raw fix from the positioning collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy_m: Option<f64>,
    /// Instantaneous speed reported by the device.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed_mps: Option<f64>,
}

impl PositionSample {
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64, timestamp_ms: i64) -> Self {
        Self {
            latitude,
            longitude,
            timestamp_ms,
            accuracy_m: None,
            speed_mps: None,
        }
    }

    #[must_use]
    pub const fn with_accuracy(mut self, accuracy_m: f64) -> Self {
        self.accuracy_m = Some(accuracy_m);
        self
    }

    #[must_use]
    pub const fn with_speed(mut self, speed_mps: f64) -> Self {
        self.speed_mps = Some(speed_mps);
        self
    }

    fn point(&self) -> Point<f64> {
        Point::new(self.longitude, self.latitude)
    }

    /// Great-circle distance in metres.
    #[must_use]
    pub fn distance_m(&self, other: &Self) -> f64 {
        self.point().haversine_distance(&other.point())
    }

    fn has_valid_coordinates(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude.abs() <= 90.0
            && self.longitude.abs() <= 180.0
    }
}

/// Why a sample was dropped.
#[derive(Debug, Error, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FilterReject {
    #[error("accuracy {accuracy_m:.1} m exceeds limit")]
    Inaccurate { accuracy_m: f64 },
    #[error("coordinates out of range")]
    InvalidCoordinate,
    /// Not newer than the last accepted sample (duplicate or out-of-order delivery).
    #[error("sample is {elapsed_ms} ms relative to the last accepted fix")]
    Stale { elapsed_ms: i64 },
    #[error("drift: {speed_mps:.1} m/s over {distance_m:.1} m")]
    Drift { speed_mps: f64, distance_m: f64 },
    #[error("impossible speed {speed_mps:.1} m/s")]
    Impossible { speed_mps: f64 },
    #[error("movement {distance_m:.2} m below noise floor")]
    Noise { distance_m: f64 },
}

/// Accepted sample with its delta to the previous reference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcceptedFix {
    pub sample: PositionSample,
    /// Zero when this is the first accepted sample.
    pub distance_m: f64,
    pub elapsed_s: f64,
    pub implied_speed_mps: f64,
    pub bootstrap: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterDecision {
    Accept(AcceptedFix),
    Reject(FilterReject),
}

impl FilterDecision {
    #[must_use]
    pub const fn is_accept(&self) -> bool {
        matches!(self, Self::Accept(_))
    }
}

/// Filter thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterCfg {
    #[serde(default = "FilterCfg::default_max_accuracy")]
    pub max_accuracy_m: f64,
    #[serde(default = "FilterCfg::default_drift_speed")]
    pub drift_speed_mps: f64,
    #[serde(default = "FilterCfg::default_drift_distance")]
    pub drift_distance_m: f64,
    #[serde(default = "FilterCfg::default_impossible_speed")]
    pub impossible_speed_mps: f64,
    #[serde(default = "FilterCfg::default_noise_floor")]
    pub noise_floor_m: f64,
}

impl Default for FilterCfg {
    fn default() -> Self {
        Self {
            max_accuracy_m: Self::default_max_accuracy(),
            drift_speed_mps: Self::default_drift_speed(),
            drift_distance_m: Self::default_drift_distance(),
            impossible_speed_mps: Self::default_impossible_speed(),
            noise_floor_m: Self::default_noise_floor(),
        }
    }
}

impl FilterCfg {
    const fn default_max_accuracy() -> f64 {
        FILTER_MAX_ACCURACY_M
    }

    const fn default_drift_speed() -> f64 {
        FILTER_DRIFT_SPEED_MPS
    }

    const fn default_drift_distance() -> f64 {
        FILTER_DRIFT_DISTANCE_M
    }

    const fn default_impossible_speed() -> f64 {
        FILTER_IMPOSSIBLE_SPEED_MPS
    }

    const fn default_noise_floor() -> f64 {
        FILTER_NOISE_FLOOR_M
    }
}

/// Evaluate `sample` against the previous accepted sample.
#[must_use]
pub fn validate(
    sample: &PositionSample,
    previous: Option<&PositionSample>,
    cfg: &FilterCfg,
) -> FilterDecision {
    if let Some(accuracy_m) = sample.accuracy_m
        && (accuracy_m > cfg.max_accuracy_m || accuracy_m.is_nan())
    {
        return FilterDecision::Reject(FilterReject::Inaccurate { accuracy_m });
    }
    if !sample.has_valid_coordinates() {
        return FilterDecision::Reject(FilterReject::InvalidCoordinate);
    }
    let Some(previous) = previous else {
        return FilterDecision::Accept(AcceptedFix {
            sample: *sample,
            distance_m: 0.0,
            elapsed_s: 0.0,
            implied_speed_mps: 0.0,
            bootstrap: true,
        });
    };

    let elapsed_ms = sample.timestamp_ms.saturating_sub(previous.timestamp_ms);
    if elapsed_ms <= 0 {
        return FilterDecision::Reject(FilterReject::Stale { elapsed_ms });
    }
    let distance_m = sample.distance_m(previous);
    let elapsed_s = i64_to_f64(elapsed_ms) / 1000.0;
    let speed_mps = distance_m / elapsed_s;

    if speed_mps > cfg.drift_speed_mps && distance_m > cfg.drift_distance_m {
        return FilterDecision::Reject(FilterReject::Drift {
            speed_mps,
            distance_m,
        });
    }
    if speed_mps > cfg.impossible_speed_mps {
        return FilterDecision::Reject(FilterReject::Impossible { speed_mps });
    }
    if distance_m < cfg.noise_floor_m {
        return FilterDecision::Reject(FilterReject::Noise { distance_m });
    }
    FilterDecision::Accept(AcceptedFix {
        sample: *sample,
        distance_m,
        elapsed_s,
        implied_speed_mps: speed_mps,
        bootstrap: false,
    })
}

/// Stateful wrapper tracking the last accepted sample.
#[derive(Debug, Clone, Default)]
pub struct PositionFilter {
    cfg: FilterCfg,
    last_accepted: Option<PositionSample>,
}

impl PositionFilter {
    #[must_use]
    pub const fn new(cfg: FilterCfg) -> Self {
        Self {
            cfg,
            last_accepted: None,
        }
    }

    #[must_use]
    pub const fn last_accepted(&self) -> Option<&PositionSample> {
        self.last_accepted.as_ref()
    }

    /// Validate against the reference sample without advancing it.
    #[must_use]
    pub fn evaluate(&self, sample: &PositionSample) -> FilterDecision {
        let decision = validate(sample, self.last_accepted.as_ref(), &self.cfg);
        if let FilterDecision::Reject(reason) = &decision {
            log::debug!("dropped sample at {}: {reason}", sample.timestamp_ms);
        }
        decision
    }

    /// Make an accepted fix the new reference.
    pub fn commit(&mut self, fix: &AcceptedFix) {
        self.last_accepted = Some(fix.sample);
    }

    /// Validate and, on accept, advance the reference sample.
    pub fn observe(&mut self, sample: &PositionSample) -> FilterDecision {
        let decision = self.evaluate(sample);
        if let FilterDecision::Accept(fix) = &decision {
            self.commit(fix);
        }
        decision
    }

    /// Forget the reference sample, e.g. when a trip ends.
    pub fn reset(&mut self) {
        self.last_accepted = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ~1.11 m per 1e-5 degrees of latitude.
    const METRE_LAT: f64 = 1.0 / 111_195.0;

    fn at(north_m: f64, ts: i64) -> PositionSample {
        PositionSample::new(25.0 + north_m * METRE_LAT, 121.5, ts)
    }

    #[test]
    fn bootstrap_accepts_first_sample() {
        let decision = validate(&at(0.0, 0), None, &FilterCfg::default());
        let FilterDecision::Accept(fix) = decision else {
            panic!("expected accept");
        };
        assert!(fix.bootstrap);
        assert!(fix.distance_m.abs() < f64::EPSILON);
    }

    #[test]
    fn inaccurate_fix_rejected_before_bootstrap() {
        let sample = at(0.0, 0).with_accuracy(25.0);
        assert!(matches!(
            validate(&sample, None, &FilterCfg::default()),
            FilterDecision::Reject(FilterReject::Inaccurate { .. })
        ));
    }

    #[test]
    fn forty_metres_in_one_second_is_drift() {
        let decision = validate(&at(40.0, 1000), Some(&at(0.0, 0)), &FilterCfg::default());
        assert!(matches!(
            decision,
            FilterDecision::Reject(FilterReject::Drift { .. })
        ));
    }

    #[test]
    fn short_fast_hop_is_impossible_not_drift() {
        // 28 m in one second: fast, but under the drift distance gate.
        let decision = validate(&at(28.0, 1000), Some(&at(0.0, 0)), &FilterCfg::default());
        assert!(matches!(
            decision,
            FilterDecision::Reject(FilterReject::Impossible { .. })
        ));
    }

    #[test]
    fn sub_noise_movement_rejected() {
        let decision = validate(&at(1.0, 1000), Some(&at(0.0, 0)), &FilterCfg::default());
        assert!(matches!(
            decision,
            FilterDecision::Reject(FilterReject::Noise { .. })
        ));
    }

    #[test]
    fn duplicate_timestamps_are_stale() {
        let decision = validate(&at(10.0, 0), Some(&at(0.0, 0)), &FilterCfg::default());
        assert!(matches!(
            decision,
            FilterDecision::Reject(FilterReject::Stale { elapsed_ms: 0 })
        ));
    }

    #[test]
    fn extreme_timestamps_do_not_overflow() {
        let latest = at(0.0, i64::MAX);
        let decision = validate(&at(10.0, i64::MIN), Some(&latest), &FilterCfg::default());
        assert!(matches!(
            decision,
            FilterDecision::Reject(FilterReject::Stale { elapsed_ms: i64::MIN })
        ));
    }

    #[test]
    fn evaluate_does_not_move_the_reference() {
        let mut filter = PositionFilter::default();
        let FilterDecision::Accept(fix) = filter.evaluate(&at(0.0, 0)) else {
            panic!("bootstrap should accept");
        };
        assert!(filter.last_accepted().is_none());
        filter.commit(&fix);
        assert_eq!(filter.last_accepted().map(|s| s.timestamp_ms), Some(0));
    }

    #[test]
    fn walking_pace_accepted() {
        let decision = validate(&at(14.0, 10_000), Some(&at(0.0, 0)), &FilterCfg::default());
        let FilterDecision::Accept(fix) = decision else {
            panic!("expected accept, got {decision:?}");
        };
        assert!((fix.distance_m - 14.0).abs() < 0.1);
        assert!((fix.implied_speed_mps - 1.4).abs() < 0.01);
    }

    #[test]
    fn rejected_samples_do_not_move_reference() {
        let mut filter = PositionFilter::new(FilterCfg::default());
        assert!(filter.observe(&at(0.0, 0)).is_accept());
        assert!(!filter.observe(&at(500.0, 1000)).is_accept());
        assert_eq!(filter.last_accepted().map(|s| s.timestamp_ms), Some(0));
        assert!(filter.observe(&at(10.0, 5000)).is_accept());
        assert_eq!(filter.last_accepted().map(|s| s.timestamp_ms), Some(5000));
        filter.reset();
        assert!(filter.last_accepted().is_none());
    }
}
