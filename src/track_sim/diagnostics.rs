//! Per-vehicle counters and numeric guards.
//!
//! One `Diagnostics` lives with each vehicle and is passed into the pipeline
//! explicitly; `reset()` clears it.

use nalgebra::Vector3;
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Diagnostics {
    pub steps: u64,
    pub probe_queries: u64,
    pub numeric_guards: u64,
    pub last_guard: Option<&'static str>,
    pub last_step_micros: u64,
}

impl Diagnostics {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Replace NaN/Inf with 0 and count it.
    pub fn guard_f32(&mut self, value: f32, site: &'static str) -> f32 {
        if value.is_finite() {
            return value;
        }
        self.record(site);
        0.0
    }

    pub fn guard_vec(&mut self, value: Vector3<f32>, site: &'static str) -> Vector3<f32> {
        if value.iter().all(|c| c.is_finite()) {
            return value;
        }
        self.record(site);
        Vector3::zeros()
    }

    fn record(&mut self, site: &'static str) {
        self.numeric_guards += 1;
        // first hit per site is enough in the log; the counter keeps the rest
        if self.last_guard != Some(site) {
            warn!(site, total = self.numeric_guards, "non-finite value zeroed");
        }
        self.last_guard = Some(site);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guards_zero_and_count() {
        let mut d = Diagnostics::default();
        assert_eq!(d.guard_f32(1.5, "rpm"), 1.5);
        assert_eq!(d.guard_f32(f32::NAN, "rpm"), 0.0);
        assert_eq!(d.guard_vec(Vector3::new(0.0, f32::INFINITY, 0.0), "force"), Vector3::zeros());
        assert_eq!(d.numeric_guards, 2);
        assert_eq!(d.last_guard, Some("force"));
        d.reset();
        assert_eq!(d, Diagnostics::default());
    }
}
