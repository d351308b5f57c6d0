// ==============================================================================
// kinematics.rs — WHEEL LAYOUT, WHEEL BASIS + SLIP DECOMPOSITION
// ------------------------------------------------------------------------------
// AxleLayout::from_offsets(...):
// - groups wheels into axles by longitudinal offset (chassis +Z forward)
// - assigns each wheel to the left (-X) or right (+X) track
// - caches wheelbase (front-most to rear-most axle) and track width
//
// wheel_basis_world(rot, steer_angle):
// - chassis forward (+Z) rotated about chassis up by the wheel's steer angle
// - side = up × forward, the wheel's right
//
// slip_components(point_vel, forward, side):
//     v_long = dot(v, forward)
//     v_lat  = dot(v, side)
// ==============================================================================

use nalgebra::{Unit, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Wheels whose longitudinal offsets differ by less than this share an axle.
const AXLE_TOLERANCE: f32 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackSide {
    #[default]
    Left,
    Right,
}

impl TrackSide {
    pub fn from_offset_x(x: f32) -> Self {
        if x < 0.0 { TrackSide::Left } else { TrackSide::Right }
    }
}

/// Wheel index -> axle grouping plus cached geometry.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AxleLayout {
    /// Axle index per wheel; axle 0 is the front-most.
    pub wheel_axle: Vec<usize>,
    pub wheel_side: Vec<TrackSide>,
    /// Wheel indices per axle, front to rear.
    pub axles: Vec<Vec<usize>>,
    pub wheelbase: f32,
    pub track_width: f32,
}

impl AxleLayout {
    pub fn from_offsets(offsets: &[[f32; 3]]) -> Self {
        let mut order: Vec<usize> = (0..offsets.len()).collect();
        order.sort_by(|&a, &b| offsets[b][2].total_cmp(&offsets[a][2]));

        let mut axles: Vec<Vec<usize>> = Vec::new();
        let mut axle_z: Vec<f32> = Vec::new();
        for i in order {
            let z = offsets[i][2];
            match axle_z.last() {
                Some(&last) if (last - z).abs() < AXLE_TOLERANCE => {
                    if let Some(axle) = axles.last_mut() {
                        axle.push(i);
                    }
                }
                _ => {
                    axles.push(vec![i]);
                    axle_z.push(z);
                }
            }
        }

        let mut wheel_axle = vec![0; offsets.len()];
        for (a, wheels) in axles.iter().enumerate() {
            for &w in wheels {
                wheel_axle[w] = a;
            }
        }

        let wheelbase = match (axle_z.first(), axle_z.last()) {
            (Some(f), Some(r)) => f - r,
            _ => 0.0,
        };
        let (min_x, max_x) = offsets
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), o| (lo.min(o[0]), hi.max(o[0])));
        let track_width = if offsets.is_empty() { 0.0 } else { max_x - min_x };

        Self {
            wheel_axle,
            wheel_side: offsets.iter().map(|o| TrackSide::from_offset_x(o[0])).collect(),
            axles,
            wheelbase,
            track_width,
        }
    }

    /// Front half of the axles (by index) counts as "front" for drive splits.
    pub fn is_front_half(&self, wheel: usize) -> bool {
        let n = self.axles.len();
        match self.wheel_axle.get(wheel) {
            Some(&a) if n > 1 => a < n.div_ceil(2),
            Some(_) => true,
            None => false,
        }
    }

    pub fn side(&self, wheel: usize) -> TrackSide {
        self.wheel_side[wheel]
    }
}

/// Returns (forward, side) in world space for a wheel steered by `steer_angle`
/// (positive = right).
#[inline]
pub fn wheel_basis_world(
    rot: &UnitQuaternion<f32>,
    steer_angle: f32,
) -> (Unit<Vector3<f32>>, Unit<Vector3<f32>>) {
    let up = Vector3::y_axis();
    // positive rotation about +Y swings +Z toward +X
    let steer = UnitQuaternion::from_axis_angle(&up, steer_angle);
    let local_fwd = steer * Vector3::z();
    let local_right = up.cross(&local_fwd);
    (
        Unit::new_normalize(rot * local_fwd),
        Unit::new_normalize(rot * local_right),
    )
}

/// Compute (v_long, v_lat) given point velocity and wheel basis.
#[inline]
pub fn slip_components(
    point_vel: &Vector3<f32>,
    forward: &Unit<Vector3<f32>>,
    side: &Unit<Vector3<f32>>,
) -> (f32, f32) {
    (point_vel.dot(&forward.into_inner()), point_vel.dot(&side.into_inner()))
}

/// Remove the component along `n` and renormalise; `fallback` if degenerate.
#[inline]
pub fn project_on_plane(
    v: &Vector3<f32>,
    n: &Unit<Vector3<f32>>,
    fallback: Unit<Vector3<f32>>,
) -> Unit<Vector3<f32>> {
    let n = n.into_inner();
    let p = v - n * v.dot(&n);
    Unit::try_new(p, 1e-6).unwrap_or(fallback)
}
