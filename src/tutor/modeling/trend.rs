use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TrendState {
    Up,
    #[default]
    Flat,
    Down,
}

impl TrendState {
    pub fn from_slope(slope: f64, threshold: f64) -> Self {
        if slope > threshold {
            Self::Up
        } else if slope < -threshold {
            Self::Down
        } else {
            Self::Flat
        }
    }
}

/// Least-squares slope of `values` against their index.
pub fn regression_slope<'a, I>(values: I) -> f64
where
    I: IntoIterator<Item = &'a f64>,
{
    let ys: Vec<f64> = values.into_iter().copied().collect();
    if ys.len() < 2 {
        return 0.0;
    }

    let n = ys.len() as f64;
    let sum_x: f64 = (0..ys.len()).map(|i| i as f64).sum();
    let sum_y: f64 = ys.iter().sum();
    let sum_xy: f64 = ys.iter().enumerate().map(|(i, y)| i as f64 * y).sum();
    let sum_xx: f64 = (0..ys.len()).map(|i| (i as f64).powi(2)).sum();

    let denominator = n * sum_xx - sum_x.powi(2);
    if denominator.abs() < 1e-10 {
        return 0.0;
    }

    (n * sum_xy - sum_x * sum_y) / denominator
}

/// Population variance.
pub fn variance<'a, I>(values: I) -> f64
where
    I: IntoIterator<Item = &'a f64>,
{
    let xs: Vec<f64> = values.into_iter().copied().collect();
    if xs.is_empty() {
        return 0.0;
    }
    let mean = xs.iter().sum::<f64>() / xs.len() as f64;
    xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / xs.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slope_of_declining_correctness() {
        let slope = regression_slope(&[1.0, 0.0, 0.0, 0.0, 0.0]);
        assert!((slope + 0.2).abs() < 1e-12);
    }

    #[test]
    fn slope_of_short_series_is_zero() {
        assert_eq!(regression_slope(&[0.7]), 0.0);
    }

    #[test]
    fn variance_of_constant_is_zero() {
        assert_eq!(variance(&[2.0, 2.0, 2.0]), 0.0);
        assert!((variance(&[1.0, 3.0]) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn trend_state_thresholds() {
        assert_eq!(TrendState::from_slope(0.2, 0.05), TrendState::Up);
        assert_eq!(TrendState::from_slope(-0.2, 0.05), TrendState::Down);
        assert_eq!(TrendState::from_slope(0.01, 0.05), TrendState::Flat);
    }
}
