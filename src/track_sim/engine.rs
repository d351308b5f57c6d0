// ==============================================================================
// engine.rs — ENGINE TORQUE + RPM MODEL
// ------------------------------------------------------------------------------
// get_torque(rpm):
// - samples the normalized torque curve (RPM -> 0..1) and scales by max torque
// - undefined outside [0, max_rpm]; callers clamp first
//
// integrate_rpm(current, target, throttle, dt):
// - rev-up limited by available torque over the rev-up moment of inertia
// - rev-down at a fixed rate (rpm/s)
// - never crosses the target inside one step, clamped to max_rpm
//
// engine_brake_torque(rpm, throttle):
// - opposing torque proportional to engine_brake_effect when off-throttle
// ==============================================================================

use serde::{Deserialize, Serialize};

use crate::track_sim::curve::Curve;
use crate::track_sim::error::ConfigError;

const RAD_PER_SEC_TO_RPM: f32 = 60.0 / std::f32::consts::TAU;

/// Throttle below this counts as "released" for engine braking.
const THROTTLE_RELEASED: f32 = 0.01;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub torque_curve: Curve,      // RPM -> normalized torque
    pub max_torque: f32,          // N·m
    pub max_rpm: f32,             // rpm
    pub idle_rpm: f32,            // rpm
    pub rev_up_moi: f32,          // kg·m² (lower = faster rev-up)
    pub rev_down_rate: f32,       // rpm/s
    pub engine_brake_effect: f32, // 0..1 of max torque at max rpm
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.max_rpm > 0.0) {
            return Err(ConfigError::InvalidMaxRpm(self.max_rpm));
        }
        if !(self.max_torque > 0.0) {
            return Err(ConfigError::InvalidMaxTorque(self.max_torque));
        }
        if !(self.idle_rpm > 0.0 && self.idle_rpm < self.max_rpm) {
            return Err(ConfigError::InvalidIdleRpm { idle: self.idle_rpm, max: self.max_rpm });
        }
        if !(self.engine_brake_effect >= 0.0 && self.engine_brake_effect <= 1.0) {
            return Err(ConfigError::OutOfUnitRange {
                field: "engine_brake_effect",
                value: self.engine_brake_effect,
            });
        }
        self.torque_curve.validate("torque_curve")
    }
}

/// Stateless engine evaluation over a validated config.
#[derive(Debug, Clone, Copy)]
pub struct EngineModel<'a> {
    pub config: &'a EngineConfig,
}

impl<'a> EngineModel<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    pub fn get_torque(&self, rpm: f32) -> f32 {
        self.config.torque_curve.sample(rpm) * self.config.max_torque
    }

    /// Torque the engine delivers to the gearbox input for the given throttle,
    /// including engine braking when the throttle is released.
    pub fn output_torque(&self, rpm: f32, throttle: f32) -> f32 {
        let rpm = rpm.clamp(0.0, self.config.max_rpm);
        let throttle = throttle.clamp(0.0, 1.0);
        self.get_torque(rpm) * throttle + self.engine_brake_torque(rpm, throttle)
    }

    pub fn engine_brake_torque(&self, rpm: f32, throttle: f32) -> f32 {
        if throttle > THROTTLE_RELEASED {
            return 0.0;
        }
        let rpm = rpm.clamp(0.0, self.config.max_rpm);
        -self.config.engine_brake_effect * self.config.max_torque * (rpm / self.config.max_rpm)
    }

    /// Largest RPM increase allowed in one step at this RPM/throttle.
    ///
    /// A released throttle still gets the idle torque so a stalled engine can
    /// recover toward idle.
    pub fn rev_up_step(&self, rpm: f32, throttle: f32, dt: f32) -> f32 {
        let cfg = self.config;
        let idle_drive = cfg.torque_curve.sample(cfg.idle_rpm) * cfg.max_torque * 0.1;
        let drive = (self.get_torque(rpm.clamp(0.0, cfg.max_rpm)) * throttle.clamp(0.0, 1.0))
            .max(idle_drive);
        let accel = drive / cfg.rev_up_moi.max(1e-3); // rad/s²
        accel * RAD_PER_SEC_TO_RPM * dt
    }

    /// Advance engine RPM one step toward `target_rpm`.
    ///
    /// `target_rpm` is what the driveline asks for: the free-rev target when
    /// disengaged, the wheel-derived RPM when a gear is engaged.
    pub fn integrate_rpm(&self, current_rpm: f32, target_rpm: f32, throttle: f32, dt: f32) -> f32 {
        let cfg = self.config;
        let floor = if current_rpm >= cfg.idle_rpm { cfg.idle_rpm } else { current_rpm };
        let target = target_rpm.clamp(cfg.idle_rpm, cfg.max_rpm);

        let next = if target > current_rpm {
            let step = self.rev_up_step(current_rpm, throttle, dt);
            (current_rpm + step).min(target)
        } else {
            let step = cfg.rev_down_rate.max(0.0) * dt;
            (current_rpm - step).max(target)
        };

        next.max(floor).min(cfg.max_rpm)
    }

    /// Free-revving target for a disengaged engine.
    pub fn free_rev_target(&self, throttle: f32) -> f32 {
        let cfg = self.config;
        cfg.idle_rpm + (cfg.max_rpm - cfg.idle_rpm) * throttle.clamp(0.0, 1.0)
    }
}
