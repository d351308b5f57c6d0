// ==============================================================================
// aero.rs — CHASSIS DRAG + DOWNFORCE
// ------------------------------------------------------------------------------
// Both act at the chassis centre of mass:
//
//     q         = ½ · rho · |v|²
//     drag      = -v̂ · q · Cd · A
//     downforce = -up · ½ · rho · v_fwd² · Cl · A
//
// Below MIN_SPEED nothing is emitted, so a parked vehicle feels no aero.
// ==============================================================================

use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::track_sim::error::ConfigError;

const MIN_SPEED: f32 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AerodynamicsConfig {
    pub drag_coefficient: f32,
    pub downforce_coefficient: f32,
    pub area: f32,        // m², frontal
    pub air_density: f32, // kg/m³
}

impl Default for AerodynamicsConfig {
    fn default() -> Self {
        Self { drag_coefficient: 0.8, downforce_coefficient: 0.0, area: 4.0, air_density: 1.225 }
    }
}

impl AerodynamicsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("aerodynamics.drag_coefficient", self.drag_coefficient),
            ("aerodynamics.downforce_coefficient", self.downforce_coefficient),
            ("aerodynamics.area", self.area),
            ("aerodynamics.air_density", self.air_density),
        ] {
            if !(value >= 0.0) {
                return Err(ConfigError::NegativeCoefficient { field, value });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AeroForces {
    pub drag: Vector3<f32>,
    pub downforce: Vector3<f32>,
}

impl AeroForces {
    pub fn total(&self) -> Vector3<f32> {
        self.drag + self.downforce
    }

    pub fn is_zero(&self) -> bool {
        self.drag == Vector3::zeros() && self.downforce == Vector3::zeros()
    }
}

pub fn aero_forces(
    cfg: &AerodynamicsConfig,
    rotation: &UnitQuaternion<f32>,
    velocity: &Vector3<f32>,
) -> AeroForces {
    let speed = velocity.norm();
    if !(speed > MIN_SPEED) {
        return AeroForces::default();
    }
    let half_rho_a = 0.5 * cfg.air_density * cfg.area;

    let drag = -velocity / speed * (half_rho_a * speed * speed * cfg.drag_coefficient);

    let forward_speed = velocity.dot(&(rotation * Vector3::z()));
    let up = rotation * Vector3::y();
    let downforce = -up * (half_rho_a * forward_speed * forward_speed * cfg.downforce_coefficient);

    AeroForces { drag, downforce }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn cfg() -> AerodynamicsConfig {
        AerodynamicsConfig { drag_coefficient: 1.0, downforce_coefficient: 0.5, area: 2.0, air_density: 1.0 }
    }

    #[test]
    fn drag_opposes_motion_and_grows_with_speed_squared() {
        let slow = aero_forces(&cfg(), &UnitQuaternion::identity(), &Vector3::new(0.0, 0.0, 10.0));
        // ½ · 1 · 2 · 100 · 1
        assert_relative_eq!(slow.drag, Vector3::new(0.0, 0.0, -100.0), epsilon = 1e-3);

        let fast = aero_forces(&cfg(), &UnitQuaternion::identity(), &Vector3::new(0.0, 0.0, 20.0));
        assert_relative_eq!(fast.drag.norm(), 4.0 * slow.drag.norm(), max_relative = 1e-5);
    }

    #[test]
    fn downforce_pushes_along_chassis_down_from_forward_speed_only() {
        let f = aero_forces(&cfg(), &UnitQuaternion::identity(), &Vector3::new(0.0, 0.0, 10.0));
        assert_relative_eq!(f.downforce, Vector3::new(0.0, -50.0, 0.0), epsilon = 1e-3);

        // sliding sideways makes drag but no downforce
        let side = aero_forces(&cfg(), &UnitQuaternion::identity(), &Vector3::new(10.0, 0.0, 0.0));
        assert_relative_eq!(side.downforce.norm(), 0.0);
        assert!(side.drag.x < 0.0);

        // reversing still presses the chassis down
        let back = aero_forces(&cfg(), &UnitQuaternion::identity(), &Vector3::new(0.0, 0.0, -10.0));
        assert!(back.downforce.y < 0.0);
    }

    #[test]
    fn parked_vehicle_feels_nothing() {
        let f = aero_forces(&cfg(), &UnitQuaternion::identity(), &Vector3::zeros());
        assert!(f.is_zero());
    }

    #[test]
    fn negative_coefficients_are_rejected() {
        let bad = AerodynamicsConfig { area: -1.0, ..cfg() };
        assert_eq!(
            bad.validate(),
            Err(ConfigError::NegativeCoefficient { field: "aerodynamics.area", value: -1.0 })
        );
        assert_eq!(cfg().validate(), Ok(()));
    }
}
