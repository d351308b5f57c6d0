//! Core shared types for `track_sim` (engine-agnostic).
//!
//! Inputs flow in as an immutable [`TickInput`], runtime state is owned by the
//! simulation ([`WheelRuntimeState`], [`VehicleRuntimeState`]) and a complete
//! [`TickOutput`] is published once per step.

use nalgebra::{Isometry3, Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::track_sim::collab::ProbeHit;
use crate::track_sim::differential::TrackSplit;
use crate::track_sim::kinematics::AxleLayout;
use crate::track_sim::transmission::TransmissionState;

pub type Vec3 = [f32; 3];

#[inline]
pub fn v3(v: &Vector3<f32>) -> Vec3 {
    [v.x, v.y, v.z]
}

#[inline]
pub fn p3(p: &Point3<f32>) -> Vec3 {
    [p.x, p.y, p.z]
}

// ============================================
// ----- control input ------------------------
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GearRequest {
    Up,
    Down,
    Select(i32),
}

/// One step's worth of control, captured by the consumer before the step
/// begins. The simulation only ever reads it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TickInput {
    pub throttle: f32,  // 0..1
    pub brake: f32,     // 0..1
    pub handbrake: f32, // 0..1
    pub steering: f32,  // -1 (left) .. 1 (right)
    #[serde(default)]
    pub gear_request: Option<GearRequest>,
    /// Optional per-wheel external torque (N·m), combined per wheel setup.
    #[serde(default)]
    pub wheel_torque_overrides: Vec<Option<f32>>,
    /// Arcade chassis axes, -1..1; ignored unless an arcade control is on.
    #[serde(default)]
    pub pitch: f32,
    #[serde(default)]
    pub roll: f32,
    #[serde(default)]
    pub yaw: f32,
    pub dt: f32,
}

impl TickInput {
    pub fn with_dt(dt: f32) -> Self {
        Self { dt, ..Self::default() }
    }

    pub fn wheel_override(&self, wheel: usize) -> Option<f32> {
        self.wheel_torque_overrides.get(wheel).copied().flatten()
    }
}

/// Control values after clamping, stored on the runtime state.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AppliedControls {
    pub throttle: f32,
    pub brake: f32,
    pub handbrake: f32,
    pub steering: f32,
}

// ============================================
// ----- chassis (from the rigid-body host) ---
// ============================================

/// Read-only view of the chassis body at the start of a step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChassisState {
    pub transform: Isometry3<f32>,
    pub linear_velocity: Vector3<f32>,
    pub angular_velocity: Vector3<f32>,
    /// World-space centre of mass.
    pub center_of_mass: Point3<f32>,
    pub mass: f32,
}

impl ChassisState {
    pub fn at_rest(transform: Isometry3<f32>, mass: f32) -> Self {
        Self {
            transform,
            linear_velocity: Vector3::zeros(),
            angular_velocity: Vector3::zeros(),
            center_of_mass: Point3::from(transform.translation.vector),
            mass,
        }
    }

    /// v(p) = v_com + ω × (p - com)
    pub fn point_velocity(&self, p: &Point3<f32>) -> Vector3<f32> {
        self.linear_velocity + self.angular_velocity.cross(&(p - self.center_of_mass))
    }

    pub fn forward(&self) -> Vector3<f32> {
        self.transform.rotation * Vector3::z()
    }

    pub fn forward_speed(&self) -> f32 {
        self.linear_velocity.dot(&self.forward())
    }
}

// ============================================
// ----- runtime state ------------------------
// ============================================

#[derive(Debug, Clone, PartialEq, Default)]
pub struct WheelRuntimeState {
    pub local_position: Vec3,
    pub world_position: Vec3,
    pub world_velocity: Vec3,
    pub local_velocity: Vec3, // (lateral, vertical, longitudinal) in wheel frame

    pub hit: Option<ProbeHit>,
    pub in_contact: bool,

    pub compression_ratio: f32, // 0 = fully extended, 1 = fully compressed
    pub spring_force: f32,      // N (total normal load after damping)
    pub suspension_offset: f32, // m, positive = raised

    pub steer_angle: f32, // rad
    pub slip_angle: f32,  // rad
    pub slip: f32,        // m/s, wheel surface speed - ground speed
    pub slipping: bool,
    pub skid_magnitude: f32,
    pub skid_direction: Vec3,
    pub skidding: bool,

    pub drive_torque: f32, // N·m
    pub brake_torque: f32, // N·m
    pub abs_active: bool,
    pub tcs_active: bool,

    pub friction_force: Vec3, // N, world
    pub angular_position: f32, // rad, [0, 2π)
    pub angular_velocity: f32, // rad/s
}

impl WheelRuntimeState {
    pub fn in_air(&self) -> bool {
        !self.in_contact
    }

    /// Visual rotation in degrees (rolling forward reads as negative pitch).
    pub fn rotation_angle_degrees(&self) -> f32 {
        -self.angular_position.to_degrees()
    }

    pub fn rotation_angular_velocity_degrees(&self) -> f32 {
        -self.angular_velocity.to_degrees()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct VehicleRuntimeState {
    pub transmission: TransmissionState,
    pub engine_rpm: f32,
    pub track_split: TrackSplit,
    pub layout: AxleLayout,
    pub controls: AppliedControls,
    pub steering_command: f32, // rate-limited steering, -1..1
    pub track_bias: f32,
    pub forward_speed: f32,
}

impl VehicleRuntimeState {
    pub fn current_gear(&self) -> i32 {
        self.transmission.current_gear
    }
}

/// Everything a consumer sees for one completed step.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TickOutput {
    pub step: u64,
    pub vehicle: VehicleRuntimeState,
    pub wheels: Vec<WheelRuntimeState>,
}

impl TickOutput {
    /// Panics if `index` is outside the configured wheel count.
    pub fn wheel(&self, index: usize) -> &WheelRuntimeState {
        assert!(
            index < self.wheels.len(),
            "wheel index {index} out of range ({} wheels)",
            self.wheels.len()
        );
        &self.wheels[index]
    }
}
