// ==============================================================================
// curve.rs — SAMPLED PIECEWISE-LINEAR CURVES
// ------------------------------------------------------------------------------
// Used for the engine torque curve (RPM -> normalized torque) and the
// speed-vs-steering curve (m/s -> steering effectiveness).
//
// - sample(x) clamps x into the key domain before interpolating
// - value_range() reports the curve's own min/max output
// - sample_normalized(x) divides by the max output so callers never assume
//   an authored curve is pre-normalized
// ==============================================================================

use serde::{Deserialize, Serialize};

use crate::track_sim::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Curve {
    /// (x, y) keys, strictly increasing in x.
    pub keys: Vec<(f32, f32)>,
}

impl Curve {
    pub fn new(keys: Vec<(f32, f32)>) -> Self {
        Self { keys }
    }

    /// Flat curve returning `value` everywhere.
    pub fn constant(value: f32) -> Self {
        Self { keys: vec![(0.0, value)] }
    }

    pub fn validate(&self, name: &'static str) -> Result<(), ConfigError> {
        if self.keys.is_empty() {
            return Err(ConfigError::EmptyCurve(name));
        }
        let sorted = self.keys.windows(2).all(|w| w[1].0 > w[0].0);
        let finite = self.keys.iter().all(|(x, y)| x.is_finite() && y.is_finite());
        if !sorted || !finite {
            return Err(ConfigError::UnsortedCurve(name));
        }
        Ok(())
    }

    pub fn domain(&self) -> (f32, f32) {
        match (self.keys.first(), self.keys.last()) {
            (Some(a), Some(b)) => (a.0, b.0),
            _ => (0.0, 0.0),
        }
    }

    pub fn value_range(&self) -> (f32, f32) {
        self.keys.iter().fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &(_, y)| {
            (lo.min(y), hi.max(y))
        })
    }

    pub fn sample(&self, x: f32) -> f32 {
        let Some(&(x0, y0)) = self.keys.first() else { return 0.0 };
        if self.keys.len() == 1 || x <= x0 {
            return y0;
        }
        let &(xn, yn) = self.keys.last().unwrap_or(&(x0, y0));
        if x >= xn {
            return yn;
        }

        // first key strictly right of x
        let i = self.keys.partition_point(|k| k.0 <= x);
        let (xa, ya) = self.keys[i - 1];
        let (xb, yb) = self.keys[i];
        let t = (x - xa) / (xb - xa);
        ya + (yb - ya) * t
    }

    /// Sample divided by the curve's max output; 1.0 when the max is not positive.
    pub fn sample_normalized(&self, x: f32) -> f32 {
        let (_, max) = self.value_range();
        if max <= f32::EPSILON {
            return 1.0;
        }
        self.sample(x) / max
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn torque_like() -> Curve {
        Curve::new(vec![(0.0, 0.2), (1000.0, 0.8), (3000.0, 1.0), (5000.0, 0.6)])
    }

    #[test]
    fn interpolates_between_keys() {
        let c = torque_like();
        assert_relative_eq!(c.sample(500.0), 0.5, epsilon = 1e-6);
        assert_relative_eq!(c.sample(2000.0), 0.9, epsilon = 1e-6);
        assert_relative_eq!(c.sample(3000.0), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn clamps_outside_domain() {
        let c = torque_like();
        assert_eq!(c.sample(-50.0), 0.2);
        assert_eq!(c.sample(9000.0), 0.6);
        assert_eq!(c.domain(), (0.0, 5000.0));
    }

    #[test]
    fn normalizes_by_own_max() {
        // authored in "percent", not 0..1
        let c = Curve::new(vec![(0.0, 100.0), (30.0, 40.0)]);
        assert_relative_eq!(c.sample_normalized(0.0), 1.0, epsilon = 1e-6);
        assert_relative_eq!(c.sample_normalized(30.0), 0.4, epsilon = 1e-6);
        assert_relative_eq!(c.sample_normalized(60.0), 0.4, epsilon = 1e-6);
    }

    #[test]
    fn rejects_bad_keys() {
        assert_eq!(Curve::new(vec![]).validate("c"), Err(ConfigError::EmptyCurve("c")));
        let unsorted = Curve::new(vec![(1.0, 0.0), (1.0, 1.0)]);
        assert_eq!(unsorted.validate("c"), Err(ConfigError::UnsortedCurve("c")));
    }
}
