// ==============================================================================
// arcade.rs — ARCADE CHASSIS CONTROLS (TORQUE, TARGET ROTATION, STABILIZE)
// ------------------------------------------------------------------------------
// Optional helpers that push the chassis directly instead of through the
// wheels. All are off by default and all scale with chassis mass, so the
// configured values read as accelerations.
//
// Torque control (chassis frame, +X right, +Y up, +Z forward):
//     pitch = pitch_in · pitch_scaling
//     yaw   = (yaw_in + steering · yaw_from_steering) · yaw_scaling
//     roll  = roll_in · roll_scaling + yaw_term · yaw_from_roll_scaling
//     minus rotation_damping · local angular velocity
//
// Target rotation: spring the chassis toward a roll/pitch target from the
// roll/pitch inputs (or steering × speed with roll_vs_speed), damp yaw, and
// clamp the result to max_accel.
//
// Stabilize: oppose vertical velocity (altitude hold) and horizontal velocity
// (position hold).
// ==============================================================================

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::track_sim::error::ConfigError;
use crate::track_sim::types::{AppliedControls, ChassisState};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TorqueControlConfig {
    pub enabled: bool,
    pub yaw_torque_scaling: f32,
    pub yaw_from_steering: f32,
    pub yaw_from_roll_torque_scaling: f32,
    pub roll_torque_scaling: f32,
    pub pitch_torque_scaling: f32,
    pub rotation_damping: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetRotationConfig {
    pub enabled: bool,
    /// Lean into turns from steering × forward speed instead of the roll input.
    pub roll_vs_speed_enabled: bool,
    pub roll_control_scaling: f32,
    pub roll_max_angle: f32, // rad
    pub pitch_control_scaling: f32,
    pub pitch_max_angle: f32, // rad
    pub rotation_stiffness: f32,
    pub rotation_damping: f32,
    /// Cap on the corrective angular acceleration (rad/s²).
    pub max_accel: f32,
    pub auto_centre_roll_strength: f32,
    pub auto_centre_pitch_strength: f32,
    pub auto_centre_yaw_strength: f32,
}

impl Default for TargetRotationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            roll_vs_speed_enabled: false,
            roll_control_scaling: 1.0,
            roll_max_angle: 0.5,
            pitch_control_scaling: 1.0,
            pitch_max_angle: 0.5,
            rotation_stiffness: 10.0,
            rotation_damping: 2.0,
            max_accel: 20.0,
            auto_centre_roll_strength: 1.0,
            auto_centre_pitch_strength: 1.0,
            auto_centre_yaw_strength: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilizeConfig {
    pub enabled: bool,
    pub altitude_hold_z: f32,
    pub position_hold_xy: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArcadeControls {
    pub torque_control: TorqueControlConfig,
    pub target_rotation: TargetRotationConfig,
    pub stabilize: StabilizeConfig,
}

impl ArcadeControls {
    pub fn any_enabled(&self) -> bool {
        self.torque_control.enabled || self.target_rotation.enabled || self.stabilize.enabled
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.target_rotation;
        for (field, value) in [
            ("arcade.torque_control.rotation_damping", self.torque_control.rotation_damping),
            ("arcade.target_rotation.roll_max_angle", t.roll_max_angle),
            ("arcade.target_rotation.pitch_max_angle", t.pitch_max_angle),
            ("arcade.target_rotation.rotation_stiffness", t.rotation_stiffness),
            ("arcade.target_rotation.rotation_damping", t.rotation_damping),
            ("arcade.target_rotation.max_accel", t.max_accel),
            ("arcade.stabilize.altitude_hold_z", self.stabilize.altitude_hold_z),
            ("arcade.stabilize.position_hold_xy", self.stabilize.position_hold_xy),
        ] {
            if !(value >= 0.0) {
                return Err(ConfigError::NegativeCoefficient { field, value });
            }
        }
        Ok(())
    }
}

/// Roll/pitch/yaw axes for the arcade controls, -1..1.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ArcadeInput {
    pub pitch: f32,
    pub roll: f32,
    pub yaw: f32,
}

/// World-space force (at the centre of mass) and torque.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ChassisPush {
    pub force: Vector3<f32>,
    pub torque: Vector3<f32>,
}

/// Chassis roll (about +Z, right side up positive) and pitch (about +X,
/// nose down positive).
pub fn roll_and_pitch(chassis: &ChassisState) -> (f32, f32) {
    let rot = chassis.transform.rotation;
    let right = rot * Vector3::x();
    let forward = rot * Vector3::z();
    (right.y.clamp(-1.0, 1.0).asin(), (-forward.y).clamp(-1.0, 1.0).asin())
}

pub fn torque_control(
    cfg: &TorqueControlConfig,
    controls: &AppliedControls,
    arcade: &ArcadeInput,
    chassis: &ChassisState,
) -> Vector3<f32> {
    if !cfg.enabled {
        return Vector3::zeros();
    }
    let rot = chassis.transform.rotation;
    let omega = rot.inverse_transform_vector(&chassis.angular_velocity);

    let yaw = (arcade.yaw + controls.steering * cfg.yaw_from_steering) * cfg.yaw_torque_scaling;
    let local = Vector3::new(
        arcade.pitch * cfg.pitch_torque_scaling,
        yaw,
        arcade.roll * cfg.roll_torque_scaling + yaw * cfg.yaw_from_roll_torque_scaling,
    ) - omega * cfg.rotation_damping;

    rot * local * chassis.mass
}

pub fn target_rotation(
    cfg: &TargetRotationConfig,
    controls: &AppliedControls,
    arcade: &ArcadeInput,
    chassis: &ChassisState,
) -> Vector3<f32> {
    if !cfg.enabled {
        return Vector3::zeros();
    }
    let rot = chassis.transform.rotation;
    let omega = rot.inverse_transform_vector(&chassis.angular_velocity);
    let (roll, pitch) = roll_and_pitch(chassis);

    let roll_cmd = if cfg.roll_vs_speed_enabled {
        controls.steering * chassis.forward_speed()
    } else {
        arcade.roll
    };
    let target_roll = (roll_cmd * cfg.roll_control_scaling * cfg.roll_max_angle)
        .clamp(-cfg.roll_max_angle, cfg.roll_max_angle);
    let target_pitch = (arcade.pitch * cfg.pitch_control_scaling * cfg.pitch_max_angle)
        .clamp(-cfg.pitch_max_angle, cfg.pitch_max_angle);

    let k = cfg.rotation_stiffness;
    let c = cfg.rotation_damping;
    let accel = Vector3::new(
        k * (target_pitch - pitch) - cfg.auto_centre_pitch_strength * pitch - c * omega.x,
        -cfg.auto_centre_yaw_strength * omega.y,
        k * (target_roll - roll) - cfg.auto_centre_roll_strength * roll - c * omega.z,
    );
    let accel = if accel.norm() > cfg.max_accel { accel.normalize() * cfg.max_accel } else { accel };

    rot * accel * chassis.mass
}

pub fn stabilize(cfg: &StabilizeConfig, chassis: &ChassisState) -> Vector3<f32> {
    if !cfg.enabled {
        return Vector3::zeros();
    }
    let v = chassis.linear_velocity;
    Vector3::new(
        -v.x * cfg.position_hold_xy,
        -v.y * cfg.altitude_hold_z,
        -v.z * cfg.position_hold_xy,
    ) * chassis.mass
}

/// Combined push of every enabled control.
pub fn chassis_push(
    cfg: &ArcadeControls,
    controls: &AppliedControls,
    arcade: &ArcadeInput,
    chassis: &ChassisState,
) -> ChassisPush {
    ChassisPush {
        force: stabilize(&cfg.stabilize, chassis),
        torque: torque_control(&cfg.torque_control, controls, arcade, chassis)
            + target_rotation(&cfg.target_rotation, controls, arcade, chassis),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Isometry3, Translation3, UnitQuaternion};

    fn chassis() -> ChassisState {
        ChassisState::at_rest(Isometry3::identity(), 100.0)
    }

    #[test]
    fn everything_is_off_by_default() {
        let cfg = ArcadeControls::default();
        assert!(!cfg.any_enabled());
        let mut c = chassis();
        c.linear_velocity = Vector3::new(3.0, -2.0, 5.0);
        let push = chassis_push(&cfg, &AppliedControls { steering: 1.0, ..AppliedControls::default() }, &ArcadeInput::default(), &c);
        assert_eq!(push, ChassisPush::default());
    }

    #[test]
    fn steering_yaws_to_the_right() {
        let cfg = TorqueControlConfig { enabled: true, yaw_torque_scaling: 2.0, yaw_from_steering: 1.0, ..TorqueControlConfig::default() };
        let torque = torque_control(&cfg, &AppliedControls { steering: 1.0, ..AppliedControls::default() }, &ArcadeInput::default(), &chassis());
        // right turn is positive rotation about +Y
        assert_relative_eq!(torque, Vector3::new(0.0, 200.0, 0.0), epsilon = 1e-3);
    }

    #[test]
    fn torque_control_damps_spin() {
        let cfg = TorqueControlConfig { enabled: true, rotation_damping: 0.5, ..TorqueControlConfig::default() };
        let mut c = chassis();
        c.angular_velocity = Vector3::new(0.0, 2.0, 0.0);
        let torque = torque_control(&cfg, &AppliedControls::default(), &ArcadeInput::default(), &c);
        assert_relative_eq!(torque.y, -100.0, epsilon = 1e-3);
    }

    #[test]
    fn target_rotation_rights_a_rolled_chassis() {
        let cfg = TargetRotationConfig { enabled: true, ..TargetRotationConfig::default() };
        let mut c = chassis();
        // right side raised by 0.3 rad
        c.transform = Isometry3::from_parts(Translation3::identity(), UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.3));
        let (roll, pitch) = roll_and_pitch(&c);
        assert_relative_eq!(roll, 0.3, epsilon = 1e-5);
        assert_relative_eq!(pitch, 0.0, epsilon = 1e-5);

        let torque = target_rotation(&cfg, &AppliedControls::default(), &ArcadeInput::default(), &c);
        let local = c.transform.rotation.inverse_transform_vector(&torque);
        assert!(local.z < 0.0, "roll torque {local:?}");
        assert!(local.norm() <= cfg.max_accel * c.mass + 1e-3);
    }

    #[test]
    fn stabilize_opposes_drift() {
        let cfg = StabilizeConfig { enabled: true, altitude_hold_z: 2.0, position_hold_xy: 1.0 };
        let mut c = chassis();
        c.linear_velocity = Vector3::new(1.0, -3.0, -2.0);
        assert_relative_eq!(stabilize(&cfg, &c), Vector3::new(-100.0, 600.0, 200.0), epsilon = 1e-3);
    }

    #[test]
    fn negative_gains_are_rejected() {
        let mut cfg = ArcadeControls::default();
        cfg.stabilize.position_hold_xy = -1.0;
        assert!(matches!(cfg.validate(), Err(ConfigError::NegativeCoefficient { .. })));
        assert_eq!(ArcadeControls::default().validate(), Ok(()));
    }
}
