//! Numeric conversion helpers centralizing safe numeric casts.

use num_traits::cast::cast;

/// Round a f64 and clamp it to the i32 range, returning 0 for NaN values.
#[must_use]
pub fn round_f64_to_i32(value: f64) -> i32 {
    if value.is_nan() {
        return 0;
    }
    let min = cast::<i32, f64>(i32::MIN).unwrap_or(f64::MIN);
    let max = cast::<i32, f64>(i32::MAX).unwrap_or(f64::MAX);
    let clamped = value.clamp(min, max).round();
    cast::<f64, i32>(clamped).unwrap_or(0)
}

/// Floor a non-negative f64 into a u32, returning 0 for negative or non-finite values.
#[must_use]
pub fn floor_f64_to_u32(value: f64) -> u32 {
    if !value.is_finite() || value <= 0.0 {
        return 0;
    }
    let max = f64::from(u32::MAX);
    cast::<f64, u32>(value.min(max).floor()).unwrap_or(0)
}

/// Round to a fixed number of decimal places.
#[must_use]
pub fn round_to(value: f64, decimals: i32) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    let factor = 10_f64.powi(decimals);
    (value * factor).round() / factor
}

/// Convert usize to f64 while allowing precision loss in a single location.
#[must_use]
pub fn usize_to_f64(value: usize) -> f64 {
    cast::<usize, f64>(value).unwrap_or(0.0)
}

/// Convert i64 to f64 while allowing precision loss in a single location.
#[must_use]
pub fn i64_to_f64(value: i64) -> f64 {
    cast::<i64, f64>(value).unwrap_or(0.0)
}

/// Clamp a stat value into `[min, max]`, mapping non-finite input to `min`.
#[must_use]
pub fn clamp_stat(value: f64, min: f64, max: f64) -> f64 {
    if value.is_nan() {
        return min;
    }
    value.clamp(min, max)
}

/// Days since the Unix epoch for a millisecond timestamp; pre-epoch maps to day 0.
#[must_use]
pub fn epoch_day(timestamp_ms: i64) -> u32 {
    let days = timestamp_ms.max(0) / crate::constants::MS_PER_DAY;
    u32::try_from(days).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_day_floors_and_clamps() {
        assert_eq!(epoch_day(-5), 0);
        assert_eq!(epoch_day(86_399_999), 0);
        assert_eq!(epoch_day(86_400_000), 1);
    }

    #[test]
    fn rounders_cover_ranges() {
        assert_eq!(round_f64_to_i32(1.6), 2);
        assert_eq!(round_f64_to_i32(-1.6), -2);
        assert_eq!(round_f64_to_i32(f64::NAN), 0);
        assert_eq!(round_f64_to_i32(f64::from(i32::MAX) * 2.0), i32::MAX);
    }

    #[test]
    fn floor_rejects_negative_and_nan() {
        assert_eq!(floor_f64_to_u32(7.9), 7);
        assert_eq!(floor_f64_to_u32(-3.0), 0);
        assert_eq!(floor_f64_to_u32(f64::NAN), 0);
    }

    #[test]
    fn round_to_two_decimals() {
        assert!((round_to(7.499_9, 2) - 7.5).abs() < f64::EPSILON);
        assert!((round_to(0.125, 1) - 0.1).abs() < 1e-12);
        assert!(round_to(f64::INFINITY, 2).abs() < f64::EPSILON);
    }

    #[test]
    fn clamp_stat_maps_nan_to_floor() {
        assert!((clamp_stat(f64::NAN, 0.0, 100.0)).abs() < f64::EPSILON);
        assert!((clamp_stat(140.0, 0.0, 100.0) - 100.0).abs() < f64::EPSILON);
        assert!((clamp_stat(-5.0, 0.0, 100.0)).abs() < f64::EPSILON);
    }
}
