//! Flat, versionless vehicle snapshot for save/restore and replication.
//!
//! Import overwrites runtime state directly and bypasses the tick pipeline;
//! the caller is responsible for applying the returned chassis pose to its
//! rigid body.

use nalgebra::{Isometry3, Quaternion, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::track_sim::error::ConfigError;
use crate::track_sim::pipeline::RuntimeState;
use crate::track_sim::setup::ValidatedConfig;
use crate::track_sim::suspension::ratio_from_offset;
use crate::track_sim::types::{ChassisState, Vec3, v3};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WheelSnapshot {
    pub suspension_offset: f32, // m
    pub rotation_angle: f32,    // rad, [0, 2π)
    pub steer_angle: f32,       // rad
    pub radius: f32,            // m, informational
    pub angular_velocity: f32,  // rad/s
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleSnapshot {
    pub position: Vec3,
    /// Quaternion as (i, j, k, w).
    pub rotation: [f32; 4],
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
    pub gear: i32,
    pub engine_rpm: f32,
    pub wheels: Vec<WheelSnapshot>,
}

impl VehicleSnapshot {
    pub fn capture(config: &ValidatedConfig, runtime: &RuntimeState, chassis: &ChassisState) -> Self {
        let t = chassis.transform.translation.vector;
        let q = chassis.transform.rotation.quaternion();
        Self {
            position: v3(&t),
            rotation: [q.i, q.j, q.k, q.w],
            linear_velocity: v3(&chassis.linear_velocity),
            angular_velocity: v3(&chassis.angular_velocity),
            gear: runtime.vehicle.transmission.current_gear,
            engine_rpm: runtime.vehicle.engine_rpm,
            wheels: runtime
                .wheels
                .iter()
                .zip(&config.wheels)
                .map(|(w, setup)| WheelSnapshot {
                    suspension_offset: w.suspension_offset,
                    rotation_angle: w.angular_position,
                    steer_angle: w.steer_angle,
                    radius: setup.radius,
                    angular_velocity: w.angular_velocity,
                })
                .collect(),
        }
    }

    /// Write the snapshot into `runtime`. Returns the chassis pose and
    /// velocities to apply to the body. Nothing is touched on error.
    pub fn restore(
        &self,
        config: &ValidatedConfig,
        runtime: &mut RuntimeState,
        mass: f32,
    ) -> Result<ChassisState, ConfigError> {
        if self.wheels.len() != config.wheel_count() {
            return Err(ConfigError::WheelCountMismatch {
                expected: config.wheel_count(),
                actual: self.wheels.len(),
            });
        }

        let [i, j, k, w] = self.rotation;
        let rotation = UnitQuaternion::from_quaternion(Quaternion::new(w, i, j, k));
        let [x, y, z] = self.position;
        let transform = Isometry3::from_parts(Translation3::new(x, y, z), rotation);
        let chassis = ChassisState {
            transform,
            linear_velocity: Vector3::from(self.linear_velocity),
            angular_velocity: Vector3::from(self.angular_velocity),
            center_of_mass: transform.translation.vector.into(),
            mass,
        };

        let gear = self
            .gear
            .clamp(config.transmission.lowest_reverse(), config.transmission.top_gear());
        let tx = &mut runtime.vehicle.transmission;
        tx.current_gear = gear;
        tx.target_gear = gear;
        tx.change_timer = 0.0;
        tx.cooldown = 0.0;
        runtime.vehicle.engine_rpm = self.engine_rpm;
        runtime.vehicle.forward_speed = chassis.forward_speed();

        for ((state, snap), setup) in runtime.wheels.iter_mut().zip(&self.wheels).zip(&config.wheels) {
            state.suspension_offset = snap.suspension_offset;
            state.compression_ratio = ratio_from_offset(setup, snap.suspension_offset);
            state.angular_position = snap.rotation_angle;
            state.steer_angle = snap.steer_angle;
            state.angular_velocity = snap.angular_velocity;
        }
        Ok(chassis)
    }
}
