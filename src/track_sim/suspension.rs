// ==============================================================================
// suspension.rs — PROBE GEOMETRY + SPRING/DAMPER FORCE MODEL
// ------------------------------------------------------------------------------
// Probe:
//     origin = attachment - axis * max_raise      (top of travel)
//     dir    = axis                               (wheel drop direction)
//     length = max_raise + max_drop + radius
//
// Compression:
//     ratio = 1 - clamp((hit_distance - radius) / full_travel, 0, 1)
//     0 = fully extended, 1 = fully compressed; no hit -> 0, airborne
//
// Force:
//     spring = k * ratio * full_travel + preload
//     damper = c * v_compress, c = 2 * zeta * sqrt(k * m_sprung)
//     damper clamped to ±60% of spring, total >= 0
//
// Visual offset (positive = raised):
//     offset = max_raise - (1 - ratio) * full_travel
// ==============================================================================

use nalgebra::{Isometry3, Point3, Unit, Vector3};
use serde::{Deserialize, Serialize};

use crate::track_sim::collab::{ProbeHit, ProbeRequest, ProbeShape, SuspensionConstraint};
use crate::track_sim::setup::{ProbeKind, WheelSetup};

/// Fraction of the spring force the damper may add or remove.
const DAMPER_CLAMP: f32 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuspensionMode {
    /// Spring/damper force applied at the attachment point.
    #[default]
    Force,
    /// Host-side constraint; no suspension force is emitted.
    Constraint,
}

/// World-space drop direction for a wheel.
pub fn world_axis(setup: &WheelSetup, transform: &Isometry3<f32>) -> Unit<Vector3<f32>> {
    let [x, y, z] = setup.suspension_axis;
    Unit::try_new(transform.rotation * Vector3::new(x, y, z), 1e-6)
        .unwrap_or_else(|| -Vector3::y_axis())
}

/// World-space wheel centre at rest.
pub fn attachment_point(setup: &WheelSetup, transform: &Isometry3<f32>) -> Point3<f32> {
    transform * Point3::from(setup.offset)
}

pub fn probe_request(
    wheel: usize,
    setup: &WheelSetup,
    transform: &Isometry3<f32>,
    channel: u32,
) -> ProbeRequest {
    let axis = world_axis(setup, transform);
    let origin = attachment_point(setup, transform) - axis.into_inner() * setup.max_raise;
    ProbeRequest {
        wheel,
        origin,
        direction: axis,
        length: setup.full_travel() + setup.radius,
        shape: match setup.probe {
            ProbeKind::Ray => ProbeShape::Ray,
            ProbeKind::SphereSweep => ProbeShape::Sphere { radius: setup.radius },
        },
        channel,
        friction_override: setup.friction_override,
    }
}

pub fn compression_ratio(hit_distance: f32, radius: f32, full_travel: f32) -> f32 {
    if !(full_travel > 0.0) || !hit_distance.is_finite() {
        return 0.0;
    }
    1.0 - ((hit_distance - radius) / full_travel).clamp(0.0, 1.0)
}

/// Visual offset for a compression ratio.
pub fn offset_from_ratio(setup: &WheelSetup, ratio: f32) -> f32 {
    setup.max_raise - (1.0 - ratio.clamp(0.0, 1.0)) * setup.full_travel()
}

/// Inverse of [`offset_from_ratio`], clamped into travel.
pub fn ratio_from_offset(setup: &WheelSetup, offset: f32) -> f32 {
    let full = setup.full_travel();
    if full <= 0.0 {
        return 0.0;
    }
    (1.0 - (setup.max_raise - offset) / full).clamp(0.0, 1.0)
}

/// c = 2·ζ·sqrt(k·m)
pub fn damping_coefficient(setup: &WheelSetup, sprung_mass: f32) -> f32 {
    2.0 * setup.damping_ratio * (setup.spring_rate * sprung_mass.max(0.0)).sqrt()
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SuspensionForce {
    pub spring_force: f32,
    pub damping_force: f32,
    /// spring + damper, never negative.
    pub normal_force: f32,
}

impl SuspensionForce {
    pub const ZERO: SuspensionForce =
        SuspensionForce { spring_force: 0.0, damping_force: 0.0, normal_force: 0.0 };
}

/// `compression_velocity` > 0 means the spring is being compressed.
pub fn compute_force(
    setup: &WheelSetup,
    ratio: f32,
    compression_velocity: f32,
    sprung_mass: f32,
) -> SuspensionForce {
    let spring = setup.spring_rate * ratio.clamp(0.0, 1.0) * setup.full_travel() + setup.spring_preload;
    let c = damping_coefficient(setup, sprung_mass);
    let limit = spring.abs() * DAMPER_CLAMP;
    let damper = (c * compression_velocity).clamp(-limit, limit);
    SuspensionForce {
        spring_force: spring,
        damping_force: damper,
        normal_force: (spring + damper).max(0.0),
    }
}

/// Rate of compression (> 0 = compressing). Uses the exact velocity of the
/// attachment point projected on the axis when known, else a finite
/// difference.
pub fn compression_velocity(
    point_velocity: Option<&Vector3<f32>>,
    axis: &Unit<Vector3<f32>>,
    ratio: f32,
    previous_ratio: f32,
    full_travel: f32,
    dt: f32,
) -> f32 {
    match point_velocity {
        // the probe origin rides on the chassis: closing on the ground compresses
        Some(v) => v.dot(&axis.into_inner()),
        None if dt > 0.0 => (ratio - previous_ratio) * full_travel / dt,
        None => 0.0,
    }
}

/// Per-wheel result of the suspension stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SuspensionSample {
    pub in_contact: bool,
    pub compression_ratio: f32,
    pub force: SuspensionForce,
    pub offset: f32,
    pub axis: Unit<Vector3<f32>>,
    /// Where the suspension force acts (world).
    pub apply_point: Point3<f32>,
}

impl SuspensionSample {
    pub fn airborne(setup: &WheelSetup, transform: &Isometry3<f32>) -> Self {
        Self {
            in_contact: false,
            compression_ratio: 0.0,
            force: SuspensionForce::ZERO,
            offset: offset_from_ratio(setup, 0.0),
            axis: world_axis(setup, transform),
            apply_point: force_point(setup, transform),
        }
    }
}

pub fn force_point(setup: &WheelSetup, transform: &Isometry3<f32>) -> Point3<f32> {
    let [x, y, z] = setup.offset;
    let [ox, oy, oz] = setup.suspension_force_offset;
    transform * Point3::new(x + ox, y + oy, z + oz)
}

/// Evaluate one wheel against its probe result.
pub fn sample_wheel(
    setup: &WheelSetup,
    transform: &Isometry3<f32>,
    hit: Option<&ProbeHit>,
    point_velocity: Option<&Vector3<f32>>,
    previous_ratio: f32,
    sprung_mass: f32,
    dt: f32,
) -> SuspensionSample {
    let Some(hit) = hit else {
        return SuspensionSample::airborne(setup, transform);
    };

    let full = setup.full_travel();
    let axis = world_axis(setup, transform);
    let ratio = compression_ratio(hit.distance, setup.radius, full);
    let v_compress = compression_velocity(point_velocity, &axis, ratio, previous_ratio, full, dt);

    SuspensionSample {
        in_contact: true,
        compression_ratio: ratio,
        force: compute_force(setup, ratio, v_compress, sprung_mass),
        offset: offset_from_ratio(setup, ratio),
        axis,
        apply_point: force_point(setup, transform),
    }
}

/// Constraint parameters for hosts running `SuspensionMode::Constraint`.
/// Free length at which the spring alone would stop pushing; the preload
/// shows up as extra length past full droop.
pub fn rest_length(setup: &WheelSetup) -> f32 {
    let preload = if setup.spring_rate > 0.0 { setup.spring_preload / setup.spring_rate } else { 0.0 };
    setup.full_travel() + preload
}

pub fn constraint_for(
    wheel: usize,
    setup: &WheelSetup,
    transform: &Isometry3<f32>,
    sample: &SuspensionSample,
    sprung_mass: f32,
) -> SuspensionConstraint {
    SuspensionConstraint {
        wheel,
        anchor: attachment_point(setup, transform) - sample.axis.into_inner() * setup.max_raise,
        axis: sample.axis,
        target_length: rest_length(setup),
        stiffness: setup.spring_rate,
        damping: damping_coefficient(setup, sprung_mass),
        enabled: sample.in_contact,
    }
}
