//! Rolling bounds of the spread history.

/// `mean ± k·std` of a spread history (sample standard deviation).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpreadBounds {
    pub mean: f64,
    pub std: f64,
    pub lower: f64,
    pub upper: f64,
}

impl SpreadBounds {
    /// `None` for fewer than two values.
    pub fn from_values(values: &[f64], k: f64) -> Option<Self> {
        if values.len() < 2 {
            return None;
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
        let std = variance.sqrt();
        Some(Self {
            mean,
            std,
            lower: mean - k * std,
            upper: mean + k * std,
        })
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_std_bounds() {
        let bounds = SpreadBounds::from_values(&[1.0, 2.0, 3.0, 4.0], 2.0).unwrap();
        assert!((bounds.mean - 2.5).abs() < 1e-12);
        // Sample variance of 1..4 is 5/3.
        assert!((bounds.std - (5.0f64 / 3.0).sqrt()).abs() < 1e-12);
        assert!((bounds.upper - (2.5 + 2.0 * bounds.std)).abs() < 1e-12);
        assert!(bounds.contains(2.5));
        assert!(!bounds.contains(10.0));
    }

    #[test]
    fn test_short_history_has_no_bounds() {
        assert!(SpreadBounds::from_values(&[], 2.0).is_none());
        assert!(SpreadBounds::from_values(&[1.0], 2.0).is_none());
    }
}
