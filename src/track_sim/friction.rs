// ==============================================================================
// friction.rs — CONTACT-PATCH FRICTION, DRIVER ASSISTS, SLIP CLASSIFICATION
// ------------------------------------------------------------------------------
// Per contacting wheel:
// 1) ABS / TCS limit brake / drive torque against the traction torque
//        traction = mu * Fz * r,  mu = friction_multiplier * surface
//    (hooks run before any force is computed)
// 2) longitudinal force from the limited torques:
//        F_long = T_drive / r - sign(v_long) * T_brake / r
//    brake never reverses motion inside one step
// 3) lateral force from the slip angle through a SlipForceCurve:
//        alpha = atan2(v_lat, |v_long|)
//        F_lat = -curve(alpha, C, load_ratio, mu * Fz) * side_slip_modifier
//    capped at the force that would cancel v_lat in one step
// 4) friction circle: |(F_long, F_lat)| <= mu * Fz
//
// Fz blends the static and the live spring load with wheel_load_ratio.
// ==============================================================================

use serde::{Deserialize, Serialize};

use crate::track_sim::setup::{AssistConfig, WheelSetup};

/// Below this longitudinal speed the brake holds instead of opposing motion.
const HOLD_SPEED: f32 = 0.05;

/// Force-vs-slip mapping for the lateral direction.
///
/// Implementations must be odd, monotonic in `slip_angle` and bounded by
/// `limit`.
pub trait SlipForceCurve {
    fn lateral_force(&self, slip_angle: f32, cornering_stiffness: f32, load_ratio: f32, limit: f32) -> f32;
}

/// F = C · α · load_ratio, saturating at the friction limit.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LinearSaturating;

impl SlipForceCurve for LinearSaturating {
    fn lateral_force(&self, slip_angle: f32, cornering_stiffness: f32, load_ratio: f32, limit: f32) -> f32 {
        (cornering_stiffness * slip_angle * load_ratio).clamp(-limit, limit)
    }
}

/// F = limit · tanh(C · α · load_ratio / limit): same slope at zero, smooth
/// approach to the limit.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SmoothSaturating;

impl SlipForceCurve for SmoothSaturating {
    fn lateral_force(&self, slip_angle: f32, cornering_stiffness: f32, load_ratio: f32, limit: f32) -> f32 {
        if limit <= 0.0 {
            return 0.0;
        }
        limit * (cornering_stiffness * slip_angle * load_ratio / limit).tanh()
    }
}

/// Config-selectable curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlipCurveKind {
    #[default]
    LinearSaturating,
    SmoothSaturating,
}

impl SlipForceCurve for SlipCurveKind {
    fn lateral_force(&self, slip_angle: f32, cornering_stiffness: f32, load_ratio: f32, limit: f32) -> f32 {
        match self {
            SlipCurveKind::LinearSaturating => {
                LinearSaturating.lateral_force(slip_angle, cornering_stiffness, load_ratio, limit)
            }
            SlipCurveKind::SmoothSaturating => {
                SmoothSaturating.lateral_force(slip_angle, cornering_stiffness, load_ratio, limit)
            }
        }
    }
}

// ============================================
// ----- driver assists -----------------------
// ============================================

/// Torque a wheel can put through the contact patch before it breaks loose.
pub fn traction_torque(mu: f32, normal_force: f32, radius: f32) -> f32 {
    (mu * normal_force * radius).max(0.0)
}

/// Returns (limited drive torque, tcs active).
pub fn apply_traction_control(drive_torque: f32, traction_torque: f32, limit: f32) -> (f32, bool) {
    let cap = limit * traction_torque;
    if drive_torque.abs() > cap {
        (drive_torque.signum() * cap, true)
    } else {
        (drive_torque, false)
    }
}

/// Returns (limited brake torque, abs active).
pub fn apply_abs(
    brake_torque: f32,
    traction_torque: f32,
    limit: f32,
    ground_speed: f32,
    min_speed: f32,
) -> (f32, bool) {
    let cap = limit * traction_torque;
    if ground_speed.abs() > min_speed && brake_torque > cap {
        (cap, true)
    } else {
        (brake_torque, false)
    }
}

// ============================================
// ----- slip classification ------------------
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SlipClass {
    pub slipping: bool,
    pub skidding: bool,
    pub skid_magnitude: f32,
    /// Normalised (longitudinal, lateral) slip velocity; zero if none.
    pub skid_direction: [f32; 2],
}

pub fn classify_slip(long_slip: f32, lat_slip: f32, setup: &WheelSetup) -> SlipClass {
    let magnitude = (long_slip * long_slip + lat_slip * lat_slip).sqrt();
    let skid_direction = if magnitude > 1e-6 {
        [long_slip / magnitude, lat_slip / magnitude]
    } else {
        [0.0, 0.0]
    };
    SlipClass {
        slipping: long_slip.abs() > setup.slip_threshold,
        skidding: magnitude > setup.skid_threshold,
        skid_magnitude: magnitude,
        skid_direction,
    }
}

// ============================================
// ----- friction solve -----------------------
// ============================================

/// Contact-patch inputs for one wheel.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PatchInput {
    pub v_long: f32, // m/s, along the wheel heading
    pub v_lat: f32,  // m/s, along the wheel's right
    pub normal_force: f32,   // N, live (after rollbars)
    pub static_load: f32,    // N
    pub surface_friction: f32,
    pub drive_torque: f32,   // N·m, after assists
    pub brake_torque: f32,   // N·m, magnitude, after assists
    pub angular_velocity: f32, // rad/s, after spin integration
    /// Chassis mass carried by this wheel (kg).
    pub mass_share: f32,
    pub dt: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrictionResult {
    pub force_long: f32,
    pub force_lat: f32,
    /// Surface speed minus ground speed (m/s).
    pub slip: f32,
    pub slip_angle: f32,
    /// Friction circle clipped the force.
    pub saturated: bool,
    pub classification: SlipClass,
}

pub fn effective_mu(setup: &WheelSetup, surface_friction: f32) -> f32 {
    setup.friction_force_multiplier * surface_friction.max(0.0)
}

pub fn effective_load(setup: &WheelSetup, normal_force: f32, static_load: f32) -> f32 {
    let r = setup.wheel_load_ratio;
    (static_load * (1.0 - r) + normal_force * r).max(0.0)
}

pub fn solve_wheel_friction(
    setup: &WheelSetup,
    curve: &impl SlipForceCurve,
    patch: &PatchInput,
) -> FrictionResult {
    let mu = effective_mu(setup, patch.surface_friction);
    // no live load, no grip, whatever the static share says
    let fz = if patch.normal_force > 0.0 {
        effective_load(setup, patch.normal_force, patch.static_load)
    } else {
        0.0
    };
    let limit = mu * fz;
    let r = setup.radius;
    let dt = patch.dt.max(1e-6);

    // ---- longitudinal ----
    let drive = patch.drive_torque / r;
    let brake = patch.brake_torque.max(0.0) / r;
    let brake_force = if patch.v_long.abs() < HOLD_SPEED {
        // hold: cancel drive up to the brake capacity
        -drive.clamp(-brake, brake)
    } else {
        let stop = patch.mass_share * patch.v_long.abs() / dt;
        -patch.v_long.signum() * brake.min(stop)
    };
    let force_long = drive + brake_force;

    // ---- lateral ----
    let slip_angle = patch.v_lat.atan2(patch.v_long.abs());
    let load_ratio = if patch.static_load > 0.0 { fz / patch.static_load } else { 0.0 };
    let lat_cap = patch.mass_share * patch.v_lat.abs() / dt;
    let force_lat = (-curve.lateral_force(slip_angle, setup.cornering_stiffness, load_ratio, limit)
        * setup.side_slip_modifier)
        .clamp(-lat_cap, lat_cap);

    // ---- friction circle ----
    let magnitude = (force_long * force_long + force_lat * force_lat).sqrt();
    let (scale, saturated) = if magnitude > limit && magnitude > 0.0 {
        (limit / magnitude, true)
    } else {
        (1.0, false)
    };

    let slip = patch.angular_velocity * r - patch.v_long;
    FrictionResult {
        force_long: force_long * scale,
        force_lat: force_lat * scale,
        slip,
        slip_angle,
        saturated,
        classification: classify_slip(slip, patch.v_lat, setup),
    }
}

/// Assists for one wheel: returns (drive, brake, tcs, abs).
pub fn limit_torques(
    setup: &WheelSetup,
    assists: &AssistConfig,
    drive_torque: f32,
    brake_torque: f32,
    traction: f32,
    ground_speed: f32,
) -> (f32, f32, bool, bool) {
    let (drive, tcs) = if setup.traction_control_enabled {
        apply_traction_control(drive_torque, traction, assists.tcs_limit)
    } else {
        (drive_torque, false)
    };
    let (brake, abs) = if setup.abs_enabled {
        apply_abs(brake_torque, traction, assists.abs_limit, ground_speed, assists.abs_min_speed)
    } else {
        (brake_torque, false)
    };
    (drive, brake, tcs, abs)
}
