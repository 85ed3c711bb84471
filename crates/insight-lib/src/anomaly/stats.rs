//! Summary statistics over window samples

/// Mean and sample standard deviation of a set of values
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrailingStats {
    pub mean: f64,
    /// Sample standard deviation (Bessel's correction); zero below two samples
    pub std_dev: f64,
    pub count: usize,
}

impl TrailingStats {
    /// Two-pass computation for numerical stability
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }

        let count = values.len();
        let mean = values.iter().sum::<f64>() / count as f64;

        let std_dev = if count > 1 {
            let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
                / (count - 1) as f64;
            variance.sqrt()
        } else {
            0.0
        };

        Some(Self {
            mean,
            std_dev,
            count,
        })
    }

    /// Absolute z-score of `value`, or `None` when the spread is degenerate
    pub fn z_score(&self, value: f64) -> Option<f64> {
        if self.std_dev < f64::EPSILON {
            return None;
        }
        Some((value - self.mean).abs() / self.std_dev)
    }
}

/// Least-squares slope of `(seconds, value)` points, in value units per second
pub fn linear_regression_slope(points: &[(f64, f64)]) -> f64 {
    let n = points.len() as f64;
    if n < 2.0 {
        return 0.0;
    }

    // Normalize x to the first point to avoid precision loss on epoch seconds
    let x0 = points[0].0;

    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut sum_xy = 0.0;
    let mut sum_xx = 0.0;

    for (x, y) in points {
        let x = x - x0;
        sum_x += x;
        sum_y += y;
        sum_xy += x * y;
        sum_xx += x * x;
    }

    let denominator = n * sum_xx - sum_x * sum_x;
    if denominator.abs() < f64::EPSILON {
        return 0.0;
    }

    (n * sum_xy - sum_x * sum_y) / denominator
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_known_values() {
        let values: Vec<f64> = (1..=20).map(|v| v as f64).collect();
        let stats = TrailingStats::from_values(&values).unwrap();

        assert!((stats.mean - 10.5).abs() < 1e-9);
        // Sample std dev of 1..=20
        assert!((stats.std_dev - 5.916_079_783).abs() < 1e-6);
        assert_eq!(stats.count, 20);
    }

    #[test]
    fn test_stats_empty_and_single() {
        assert!(TrailingStats::from_values(&[]).is_none());

        let single = TrailingStats::from_values(&[4.0]).unwrap();
        assert_eq!(single.std_dev, 0.0);
        assert!(single.z_score(100.0).is_none());
    }

    #[test]
    fn test_z_score_zero_variance_is_none() {
        let stats = TrailingStats::from_values(&[5.0; 10]).unwrap();
        assert!(stats.z_score(50.0).is_none());
    }

    #[test]
    fn test_slope() {
        let points: Vec<(f64, f64)> = (0..10)
            .map(|i| (1_700_000_000.0 + i as f64 * 60.0, 0.5 + i as f64 * 0.01))
            .collect();
        let slope = linear_regression_slope(&points);
        assert!((slope - 0.01 / 60.0).abs() < 1e-9);

        assert_eq!(linear_regression_slope(&points[..1]), 0.0);
    }
}
