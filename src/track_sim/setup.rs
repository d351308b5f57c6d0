// ==============================================================================
// setup.rs — AUTHORED VEHICLE CONFIGURATION + VALIDATION
// ------------------------------------------------------------------------------
// VehicleConfig is plain data (serde / TOML). Nothing simulates from it until
// validate() turns it into a ValidatedConfig, which also caches the derived
// layout (axles, track sides, driven wheels, static wheel loads).
//
// Presets:
// - tank():  32 t, 8 road wheels, 4-speed automatic, counter-rotating pivot
// - dozer(): 20 t, 6 road wheels, 3-speed, slow + high torque
// ==============================================================================

use std::ops::Deref;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::track_sim::aero::AerodynamicsConfig;
use crate::track_sim::arcade::ArcadeControls;
use crate::track_sim::curve::Curve;
use crate::track_sim::differential::{DriveStyle, TrackedDifferentialConfig};
use crate::track_sim::engine::EngineConfig;
use crate::track_sim::error::ConfigError;
use crate::track_sim::friction::SlipCurveKind;
use crate::track_sim::kinematics::AxleLayout;
use crate::track_sim::steering::{SteeringConfig, SteeringStyle};
use crate::track_sim::suspension::SuspensionMode;
use crate::track_sim::transmission::{GearChangeTorquePolicy, TransmissionConfig};

pub const GRAVITY: f32 = 9.81;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeKind {
    #[default]
    Ray,
    SphereSweep,
}

/// How `TickInput::wheel_torque_overrides` combine with simulated drive torque.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExternalTorqueCombine {
    /// Overrides are ignored.
    #[default]
    None,
    /// Override replaces the simulated drive torque.
    Override,
    /// Override is added to the simulated drive torque.
    Additive,
}

impl ExternalTorqueCombine {
    pub fn combine(&self, simulated: f32, external: Option<f32>) -> f32 {
        match (self, external) {
            (ExternalTorqueCombine::Override, Some(t)) => t,
            (ExternalTorqueCombine::Additive, Some(t)) => simulated + t,
            _ => simulated,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WheelSetup {
    pub name: String,
    /// Rest position of the wheel centre in chassis space (m).
    pub offset: [f32; 3],

    pub radius: f32, // m
    pub width: f32,  // m
    pub mass: f32,   // kg

    pub friction_force_multiplier: f32,
    pub side_slip_modifier: f32,
    pub cornering_stiffness: f32, // N/rad at static load
    pub slip_threshold: f32,      // m/s
    pub skid_threshold: f32,      // m/s
    pub max_wheelspin_rotation: f32, // rad/s

    pub affected_by_brake: bool,
    pub affected_by_handbrake: bool,
    pub affected_by_steering: bool,
    pub affected_by_engine: bool,
    pub abs_enabled: bool,
    pub traction_control_enabled: bool,

    pub max_steer_angle: f32,       // rad
    pub max_brake_torque: f32,      // N·m
    pub max_hand_brake_torque: f32, // N·m

    pub spring_rate: f32,    // N/m
    pub spring_preload: f32, // N
    pub damping_ratio: f32,  // zeta
    pub max_raise: f32,      // m above rest
    pub max_drop: f32,       // m below rest
    /// Direction the wheel drops in, chassis space.
    pub suspension_axis: [f32; 3],
    /// Force application point offset from the wheel centre, chassis space.
    pub suspension_force_offset: [f32; 3],
    pub rollbar_scaling: f32,
    /// 0 = friction from static load, 1 = from the live spring load.
    pub wheel_load_ratio: f32,

    pub probe: ProbeKind,
    pub external_torque_combine: ExternalTorqueCombine,
    /// Replaces the contacted surface friction when set.
    pub friction_override: Option<f32>,
}

impl Default for WheelSetup {
    fn default() -> Self {
        Self {
            name: String::new(),
            offset: [0.0; 3],
            radius: 0.32,
            width: 0.2,
            mass: 20.0,
            friction_force_multiplier: 1.0,
            side_slip_modifier: 1.0,
            cornering_stiffness: 1000.0,
            slip_threshold: 2.0,
            skid_threshold: 2.0,
            max_wheelspin_rotation: 100.0,
            affected_by_brake: true,
            affected_by_handbrake: false,
            affected_by_steering: false,
            affected_by_engine: true,
            abs_enabled: false,
            traction_control_enabled: false,
            max_steer_angle: 50f32.to_radians(),
            max_brake_torque: 1500.0,
            max_hand_brake_torque: 3000.0,
            spring_rate: 25_000.0,
            spring_preload: 500.0,
            damping_ratio: 0.5,
            max_raise: 0.1,
            max_drop: 0.1,
            suspension_axis: [0.0, -1.0, 0.0],
            suspension_force_offset: [0.0; 3],
            rollbar_scaling: 0.15,
            wheel_load_ratio: 0.5,
            probe: ProbeKind::Ray,
            external_torque_combine: ExternalTorqueCombine::None,
            friction_override: None,
        }
    }
}

impl WheelSetup {
    pub fn full_travel(&self) -> f32 {
        self.max_raise + self.max_drop
    }

    /// I = ½·m·r²
    pub fn inertia(&self) -> f32 {
        0.5 * self.mass * self.radius * self.radius
    }

    fn validate(&self, wheel: usize) -> Result<(), ConfigError> {
        let positive = |field: &'static str, value: f32| {
            if value > 0.0 && value.is_finite() {
                Ok(())
            } else {
                Err(ConfigError::InvalidWheel { wheel, field, value })
            }
        };
        let non_negative = |field: &'static str, value: f32| {
            if value >= 0.0 && value.is_finite() {
                Ok(())
            } else {
                Err(ConfigError::InvalidWheel { wheel, field, value })
            }
        };
        positive("radius", self.radius)?;
        positive("mass", self.mass)?;
        positive("cornering_stiffness", self.cornering_stiffness)?;
        positive("slip_threshold", self.slip_threshold)?;
        positive("skid_threshold", self.skid_threshold)?;
        positive("max_wheelspin_rotation", self.max_wheelspin_rotation)?;
        positive("suspension travel", self.full_travel())?;
        non_negative("max_raise", self.max_raise)?;
        non_negative("max_drop", self.max_drop)?;
        non_negative("spring_rate", self.spring_rate)?;
        non_negative("spring_preload", self.spring_preload)?;
        non_negative("damping_ratio", self.damping_ratio)?;
        non_negative("friction_force_multiplier", self.friction_force_multiplier)?;
        non_negative("max_brake_torque", self.max_brake_torque)?;
        non_negative("max_hand_brake_torque", self.max_hand_brake_torque)?;
        non_negative("max_steer_angle", self.max_steer_angle)?;
        if !(0.0..=1.0).contains(&self.wheel_load_ratio) {
            return Err(ConfigError::OutOfUnitRange {
                field: "wheel_load_ratio",
                value: self.wheel_load_ratio,
            });
        }
        let [x, y, z] = self.suspension_axis;
        if (x * x + y * y + z * z).sqrt() < 1e-6 {
            return Err(ConfigError::ZeroSuspensionAxis(wheel));
        }
        Ok(())
    }
}

/// Driver-assist limits, shared by every wheel that opts in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistConfig {
    /// Fraction of the traction torque the brake may demand before ABS cuts in.
    pub abs_limit: f32,
    /// Fraction of the traction torque the drive may demand before TCS cuts in.
    pub tcs_limit: f32,
    /// ABS only acts above this ground speed (m/s).
    pub abs_min_speed: f32,
}

impl Default for AssistConfig {
    fn default() -> Self {
        Self { abs_limit: 0.9, tcs_limit: 1.0, abs_min_speed: 1.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimFlags {
    pub mechanical_sim_enabled: bool,
    pub suspension_enabled: bool,
    pub wheel_friction_enabled: bool,
    /// Submit all wheel probes as one batch query.
    pub batch_probes: bool,
}

impl Default for SimFlags {
    fn default() -> Self {
        Self {
            mechanical_sim_enabled: true,
            suspension_enabled: true,
            wheel_friction_enabled: true,
            batch_probes: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleConfig {
    pub name: String,
    pub chassis_mass: f32, // kg
    /// Chassis collider half extents (m), used by hosts that build a body.
    #[serde(default = "default_half_extents")]
    pub chassis_half_extents: [f32; 3],
    pub engine: EngineConfig,
    pub transmission: TransmissionConfig,
    pub drive: DriveStyle,
    #[serde(default)]
    pub steering: SteeringConfig,
    pub wheels: Vec<WheelSetup>,
    #[serde(default)]
    pub assists: AssistConfig,
    #[serde(default)]
    pub flags: SimFlags,
    #[serde(default)]
    pub suspension_mode: SuspensionMode,
    #[serde(default)]
    pub slip_curve: SlipCurveKind,
    /// Collision channel bits the wheel probes test against.
    #[serde(default = "default_channel")]
    pub probe_channel: u32,
    /// Broad-phase expansion for batched probes (m).
    #[serde(default)]
    pub probe_margin: f32,
    #[serde(default)]
    pub aerodynamics: AerodynamicsConfig,
    #[serde(default)]
    pub arcade: ArcadeControls,
}

fn default_half_extents() -> [f32; 3] {
    [1.6, 0.6, 3.0]
}

fn default_channel() -> u32 {
    u32::MAX
}

impl VehicleConfig {
    pub fn validate(self) -> Result<ValidatedConfig, ConfigError> {
        if !(self.chassis_mass > 0.0) {
            return Err(ConfigError::InvalidChassisMass(self.chassis_mass));
        }
        if self.wheels.is_empty() {
            return Err(ConfigError::NoWheels);
        }
        self.engine.validate()?;
        self.transmission.validate()?;
        self.drive.validate()?;
        self.aerodynamics.validate()?;
        self.arcade.validate()?;
        self.steering.speed_curve.validate("steering.speed_curve")?;
        if !(0.0..=1.0).contains(&self.steering.ackermann_accuracy) {
            return Err(ConfigError::OutOfUnitRange {
                field: "steering.ackermann_accuracy",
                value: self.steering.ackermann_accuracy,
            });
        }
        for (i, w) in self.wheels.iter().enumerate() {
            w.validate(i)?;
        }
        Ok(ValidatedConfig::derive(self))
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    // ------------------------------------------------------------------
    // presets
    // ------------------------------------------------------------------

    pub fn tank() -> Self {
        let mass = 32_000.0;
        let zs = [1.8, 0.6, -0.6, -1.8];
        let wheel = WheelSetup {
            radius: 0.35,
            width: 0.6,
            mass: 180.0,
            cornering_stiffness: 300_000.0,
            // track links slide sideways more easily than they roll
            side_slip_modifier: 0.5,
            max_raise: 0.15,
            max_drop: 0.15,
            spring_preload: 5_000.0,
            max_brake_torque: 40_000.0,
            max_hand_brake_torque: 60_000.0,
            affected_by_handbrake: true,
            ..WheelSetup::default()
        };

        Self {
            name: "tank".into(),
            chassis_mass: mass,
            chassis_half_extents: [1.7, 0.7, 3.2],
            engine: EngineConfig {
                torque_curve: Curve::new(vec![(0.0, 0.6), (1200.0, 1.0), (2200.0, 0.95), (2800.0, 0.7)]),
                max_torque: 3_000.0,
                max_rpm: 2_800.0,
                idle_rpm: 700.0,
                rev_up_moi: 2.0,
                rev_down_rate: 900.0,
                engine_brake_effect: 0.2,
            },
            transmission: TransmissionConfig {
                automatic: true,
                auto_reverse: true,
                forward_ratios: vec![4.0, 2.5, 1.6, 1.1],
                reverse_ratios: vec![4.0],
                final_ratio: 8.0,
                change_up_rpm: 2_400.0,
                change_down_rpm: 1_200.0,
                gear_change_time: 0.4,
                efficiency: 0.9,
                torque_policy: GearChangeTorquePolicy::Cut,
            },
            drive: DriveStyle::DoubleDifferential(TrackedDifferentialConfig {
                front_rear_split: 0.5,
                left_track_torque_multiplier: 1.0,
                right_track_torque_multiplier: 1.0,
                max_counter_rotation: 0.5,
                steering_authority: 1.5,
                pivot_torque: 60_000.0,
            }),
            steering: SteeringConfig {
                style: SteeringStyle::SingleAngle,
                speed_curve: Curve::new(vec![(0.0, 1.0), (10.0, 0.8), (20.0, 0.5)]),
                max_steer_rate: 3.0,
                ..SteeringConfig::default()
            },
            wheels: tracked_wheels(&wheel, 1.4, -0.55, &zs, mass, 0.075),
            assists: AssistConfig::default(),
            flags: SimFlags::default(),
            suspension_mode: SuspensionMode::Force,
            slip_curve: SlipCurveKind::LinearSaturating,
            probe_channel: default_channel(),
            probe_margin: 0.1,
            aerodynamics: AerodynamicsConfig::default(),
            arcade: ArcadeControls::default(),
        }
    }

    pub fn dozer() -> Self {
        let mass = 20_000.0;
        let zs = [1.3, 0.0, -1.3];
        let wheel = WheelSetup {
            radius: 0.4,
            width: 0.7,
            mass: 150.0,
            cornering_stiffness: 250_000.0,
            friction_force_multiplier: 1.2,
            side_slip_modifier: 0.6,
            max_raise: 0.08,
            max_drop: 0.08,
            spring_preload: 3_000.0,
            max_brake_torque: 30_000.0,
            max_hand_brake_torque: 50_000.0,
            affected_by_handbrake: true,
            slip_threshold: 1.0,
            skid_threshold: 1.5,
            ..WheelSetup::default()
        };

        Self {
            name: "dozer".into(),
            chassis_mass: mass,
            chassis_half_extents: [1.5, 0.8, 2.2],
            engine: EngineConfig {
                torque_curve: Curve::new(vec![(0.0, 0.7), (900.0, 1.0), (1800.0, 0.9), (2200.0, 0.75)]),
                max_torque: 2_200.0,
                max_rpm: 2_200.0,
                idle_rpm: 650.0,
                rev_up_moi: 3.0,
                rev_down_rate: 700.0,
                engine_brake_effect: 0.35,
            },
            transmission: TransmissionConfig {
                automatic: true,
                auto_reverse: true,
                forward_ratios: vec![5.0, 3.2, 2.0],
                reverse_ratios: vec![5.0, 3.2],
                final_ratio: 10.0,
                change_up_rpm: 1_900.0,
                change_down_rpm: 1_000.0,
                gear_change_time: 0.6,
                efficiency: 0.85,
                torque_policy: GearChangeTorquePolicy::Ramp,
            },
            drive: DriveStyle::DoubleDifferential(TrackedDifferentialConfig {
                front_rear_split: 0.5,
                left_track_torque_multiplier: 1.0,
                right_track_torque_multiplier: 1.0,
                max_counter_rotation: 0.3,
                steering_authority: 1.3,
                pivot_torque: 45_000.0,
            }),
            steering: SteeringConfig {
                style: SteeringStyle::Ackermann,
                speed_curve: Curve::new(vec![(0.0, 1.0), (6.0, 0.7)]),
                max_steer_rate: 2.0,
                ..SteeringConfig::default()
            },
            wheels: tracked_wheels(&wheel, 1.2, -0.6, &zs, mass, 0.04),
            assists: AssistConfig::default(),
            flags: SimFlags::default(),
            suspension_mode: SuspensionMode::Force,
            slip_curve: SlipCurveKind::LinearSaturating,
            probe_channel: default_channel(),
            probe_margin: 0.1,
            aerodynamics: AerodynamicsConfig { drag_coefficient: 1.1, area: 7.5, ..AerodynamicsConfig::default() },
            arcade: ArcadeControls::default(),
        }
    }
}

/// Spring rate that settles a wheel `sag` metres under its static share of
/// `mass` (after preload).
pub fn spring_rate_from_sag(mass: f32, wheels: usize, preload: f32, sag: f32) -> f32 {
    let f_static = mass * GRAVITY / wheels.max(1) as f32;
    (f_static - preload).max(0.0) / sag.max(1e-3)
}

/// Left/right pairs at each `z`, springs sized from `sag`.
fn tracked_wheels(
    template: &WheelSetup,
    half_track: f32,
    y: f32,
    zs: &[f32],
    mass: f32,
    sag: f32,
) -> Vec<WheelSetup> {
    let count = zs.len() * 2;
    // settles where ratio * full_travel == sag
    let k = spring_rate_from_sag(mass, count, template.spring_preload, sag);
    let mut out = Vec::with_capacity(count);
    for (i, &z) in zs.iter().enumerate() {
        for (side, x) in [("L", -half_track), ("R", half_track)] {
            out.push(WheelSetup {
                name: format!("{side}{i}"),
                offset: [x, y, z],
                spring_rate: k,
                ..template.clone()
            });
        }
    }
    out
}

/// A configuration that passed validation, plus values derived from it.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedConfig {
    config: VehicleConfig,
    pub layout: AxleLayout,
    pub driven: Vec<bool>,
    /// Static normal load per wheel (N), chassis mass spread evenly.
    pub static_load: f32,
    /// Sprung mass per wheel (kg).
    pub sprung_mass: f32,
}

impl ValidatedConfig {
    fn derive(config: VehicleConfig) -> Self {
        let offsets: Vec<[f32; 3]> = config.wheels.iter().map(|w| w.offset).collect();
        let n = config.wheels.len() as f32;
        Self {
            layout: AxleLayout::from_offsets(&offsets),
            driven: config.wheels.iter().map(|w| w.affected_by_engine).collect(),
            static_load: config.chassis_mass * GRAVITY / n,
            sprung_mass: config.chassis_mass / n,
            config,
        }
    }

    pub fn config(&self) -> &VehicleConfig {
        &self.config
    }

    pub fn wheel_count(&self) -> usize {
        self.config.wheels.len()
    }

    pub fn into_inner(self) -> VehicleConfig {
        self.config
    }
}

impl Deref for ValidatedConfig {
    type Target = VehicleConfig;

    fn deref(&self) -> &VehicleConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn presets_validate() {
        let tank = VehicleConfig::tank().validate().expect("tank preset");
        assert_eq!(tank.wheel_count(), 8);
        assert_eq!(tank.layout.axles.len(), 4);
        assert!(tank.drive.is_tracked());

        let dozer = VehicleConfig::dozer().validate().expect("dozer preset");
        assert_eq!(dozer.wheel_count(), 6);
    }

    #[test]
    fn tank_springs_carry_static_load_near_sag() {
        let tank = VehicleConfig::tank().validate().expect("tank preset");
        let w = &tank.wheels[0];
        let spring_at_sag = w.spring_rate * 0.075 + w.spring_preload;
        assert_relative_eq!(spring_at_sag, tank.static_load, max_relative = 1e-4);
    }

    #[test]
    fn rejects_wheelless_vehicle() {
        let mut cfg = VehicleConfig::tank();
        cfg.wheels.clear();
        assert_eq!(cfg.validate().err(), Some(ConfigError::NoWheels));
    }

    #[test]
    fn rejects_bad_wheel_geometry() {
        let mut cfg = VehicleConfig::tank();
        cfg.wheels[3].radius = 0.0;
        assert_eq!(
            cfg.validate().err(),
            Some(ConfigError::InvalidWheel { wheel: 3, field: "radius", value: 0.0 })
        );

        let mut cfg = VehicleConfig::tank();
        cfg.wheels[1].suspension_axis = [0.0; 3];
        assert_eq!(cfg.validate().err(), Some(ConfigError::ZeroSuspensionAxis(1)));
    }

    #[test]
    fn rejects_negative_drag() {
        let mut cfg = VehicleConfig::tank();
        cfg.aerodynamics.drag_coefficient = -0.2;
        assert_eq!(
            cfg.validate().err(),
            Some(ConfigError::NegativeCoefficient { field: "aerodynamics.drag_coefficient", value: -0.2 })
        );
    }

    #[test]
    fn toml_round_trip_keeps_config() {
        let cfg = VehicleConfig::dozer();
        let text = cfg.to_toml_string().expect("serialize");
        let back = VehicleConfig::from_toml_str(&text).expect("parse");
        assert_eq!(back, cfg);
    }

    #[test]
    fn parse_errors_are_reported() {
        let err = VehicleConfig::from_toml_str("name = 3").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn external_torque_combine_modes() {
        assert_eq!(ExternalTorqueCombine::None.combine(10.0, Some(5.0)), 10.0);
        assert_eq!(ExternalTorqueCombine::Override.combine(10.0, Some(5.0)), 5.0);
        assert_eq!(ExternalTorqueCombine::Additive.combine(10.0, Some(5.0)), 15.0);
        assert_eq!(ExternalTorqueCombine::Override.combine(10.0, None), 10.0);
    }
}
