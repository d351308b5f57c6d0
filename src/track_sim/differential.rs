// ==============================================================================
// differential.rs — DRIVE SPLIT + DOUBLE-DIFFERENTIAL (SKID-STEER) STEERING
// ------------------------------------------------------------------------------
// Tracked vehicles steer by torque, not by wheel angle:
//
//     left  = 0.5 + 0.5 * bias * authority
//     right = 0.5 - 0.5 * bias * authority        (bias +1 = full right)
//
// - left + right == 1 always (the differential only redistributes)
// - the inner track may counter-rotate down to -max_counter_rotation / 2;
//   beyond that the bias is clipped and `clipped` is reported
// - per-track multipliers (0..1) are applied after the split
// - off-throttle + steering adds a pivot pair (+outer / -inner, net zero)
//
// Wheeled styles (AllWheel / FrontWheel / RearWheel) use a front/rear split
// with an open left/right split and ignore the bias.
// ==============================================================================

use serde::{Deserialize, Serialize};

use crate::track_sim::error::ConfigError;
use crate::track_sim::kinematics::{AxleLayout, TrackSide};

const BIAS_EPS: f32 = 1e-4;
const THROTTLE_RELEASED: f32 = 0.01;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedDifferentialConfig {
    /// Share of each track's torque that goes to its front half of wheels.
    pub front_rear_split: f32,
    #[serde(default = "one")]
    pub left_track_torque_multiplier: f32,
    #[serde(default = "one")]
    pub right_track_torque_multiplier: f32,
    /// How far the inner track may be driven backwards, as a fraction of
    /// the driveshaft torque (0 = inner track can only be unloaded).
    #[serde(default)]
    pub max_counter_rotation: f32,
    /// Bias multiplier before clipping (> 1 reaches counter-rotation).
    #[serde(default = "one")]
    pub steering_authority: f32,
    /// N·m per track for neutral (pivot) turns.
    #[serde(default)]
    pub pivot_torque: f32,
}

fn one() -> f32 {
    1.0
}

impl Default for TrackedDifferentialConfig {
    fn default() -> Self {
        Self {
            front_rear_split: 0.5,
            left_track_torque_multiplier: 1.0,
            right_track_torque_multiplier: 1.0,
            max_counter_rotation: 0.0,
            steering_authority: 1.0,
            pivot_torque: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "style")]
pub enum DriveStyle {
    AllWheel { front_rear_split: f32 },
    FrontWheel,
    RearWheel,
    DoubleDifferential(TrackedDifferentialConfig),
}

impl Default for DriveStyle {
    fn default() -> Self {
        DriveStyle::DoubleDifferential(TrackedDifferentialConfig::default())
    }
}

impl DriveStyle {
    pub fn is_tracked(&self) -> bool {
        matches!(self, DriveStyle::DoubleDifferential(_))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let unit = |field: &'static str, value: f32| {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(ConfigError::OutOfUnitRange { field, value })
            }
        };
        match self {
            DriveStyle::AllWheel { front_rear_split } => unit("front_rear_split", *front_rear_split),
            DriveStyle::FrontWheel | DriveStyle::RearWheel => Ok(()),
            DriveStyle::DoubleDifferential(cfg) => {
                unit("front_rear_split", cfg.front_rear_split)?;
                unit("left_track_torque_multiplier", cfg.left_track_torque_multiplier)?;
                unit("right_track_torque_multiplier", cfg.right_track_torque_multiplier)?;
                unit("max_counter_rotation", cfg.max_counter_rotation)?;
                if !(cfg.steering_authority >= 0.0) {
                    return Err(ConfigError::OutOfUnitRange {
                        field: "steering_authority",
                        value: cfg.steering_authority,
                    });
                }
                Ok(())
            }
        }
    }
}

/// Left/right share of the driveshaft torque for one step.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TrackSplit {
    pub left: f32,
    pub right: f32,
    /// Bias was reduced to keep the inner track within its counter-rotation limit.
    pub clipped: bool,
}

impl TrackSplit {
    pub const EVEN: TrackSplit = TrackSplit { left: 0.5, right: 0.5, clipped: false };

    pub fn share(&self, side: TrackSide) -> f32 {
        match side {
            TrackSide::Left => self.left,
            TrackSide::Right => self.right,
        }
    }
}

pub fn track_split(cfg: &TrackedDifferentialConfig, bias: f32) -> TrackSplit {
    let wanted = bias.clamp(-1.0, 1.0) * cfg.steering_authority;
    // inner = 0.5 - 0.5*|b| >= -mcr/2  =>  |b| <= 1 + mcr
    let limit = 1.0 + cfg.max_counter_rotation;
    let effective = wanted.clamp(-limit, limit);
    TrackSplit {
        left: 0.5 + 0.5 * effective,
        right: 0.5 - 0.5 * effective,
        clipped: (effective - wanted).abs() > BIAS_EPS,
    }
}

/// Per-wheel drive torque plus the split that produced it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Distribution {
    pub wheel_torque: Vec<f32>,
    pub split: TrackSplit,
}

/// Spread `driveshaft_torque` over the wheels flagged in `driven`.
pub fn distribute(
    style: &DriveStyle,
    driveshaft_torque: f32,
    bias: f32,
    throttle: f32,
    layout: &AxleLayout,
    driven: &[bool],
) -> Distribution {
    let n = driven.len();
    let mut wheel_torque = vec![0.0; n];

    match style {
        DriveStyle::DoubleDifferential(cfg) => {
            let split = track_split(cfg, bias);

            let mut pivot = [0.0_f32; 2];
            if throttle <= THROTTLE_RELEASED && bias.abs() > BIAS_EPS {
                // bias > 0 turns right: left track forward, right track back
                let p = cfg.pivot_torque * bias.clamp(-1.0, 1.0);
                pivot = [p, -p];
            }

            for (side_idx, side) in [TrackSide::Left, TrackSide::Right].into_iter().enumerate() {
                let mult = match side {
                    TrackSide::Left => cfg.left_track_torque_multiplier,
                    TrackSide::Right => cfg.right_track_torque_multiplier,
                };
                let track_torque = driveshaft_torque * split.share(side) * mult + pivot[side_idx];
                let weights = half_weights(layout, driven, cfg.front_rear_split, |w| {
                    layout.side(w) == side
                });
                for (w, weight) in weights.into_iter().enumerate() {
                    wheel_torque[w] += track_torque * weight;
                }
            }

            Distribution { wheel_torque, split }
        }
        wheeled => {
            let front_share = match wheeled {
                DriveStyle::AllWheel { front_rear_split } => *front_rear_split,
                DriveStyle::FrontWheel => 1.0,
                _ => 0.0,
            };
            let weights = half_weights(layout, driven, front_share, |_| true);
            for (w, weight) in weights.into_iter().enumerate() {
                wheel_torque[w] = driveshaft_torque * weight;
            }
            Distribution { wheel_torque, split: TrackSplit::EVEN }
        }
    }
}

/// Weight per wheel within the group selected by `in_group`: front half gets
/// `front_share`, rear half the rest, split evenly among driven wheels. A half
/// with no driven wheels hands its share to the other half.
fn half_weights(
    layout: &AxleLayout,
    driven: &[bool],
    front_share: f32,
    in_group: impl Fn(usize) -> bool,
) -> Vec<f32> {
    let members: Vec<usize> = (0..driven.len()).filter(|&w| driven[w] && in_group(w)).collect();
    let front = members.iter().filter(|&&w| layout.is_front_half(w)).count();
    let rear = members.len() - front;

    let (front_share, rear_share) = match (front, rear) {
        (0, 0) => (0.0, 0.0),
        (0, _) => (0.0, 1.0),
        (_, 0) => (1.0, 0.0),
        _ => (front_share, 1.0 - front_share),
    };

    let mut weights = vec![0.0; driven.len()];
    for &w in &members {
        weights[w] = if layout.is_front_half(w) {
            front_share / front as f32
        } else {
            rear_share / rear as f32
        };
    }
    weights
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn layout() -> AxleLayout {
        let mut offsets = Vec::new();
        for z in [1.5, 0.5, -0.5, -1.5] {
            offsets.push([-1.2, -0.4, z]);
            offsets.push([1.2, -0.4, z]);
        }
        AxleLayout::from_offsets(&offsets)
    }

    #[test]
    fn split_never_amplifies_torque() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..500 {
            let cfg = TrackedDifferentialConfig {
                max_counter_rotation: rng.gen_range(0.0..=1.0),
                steering_authority: rng.gen_range(0.0..=3.0),
                ..Default::default()
            };
            let bias = rng.gen_range(-1.0..=1.0);
            let s = track_split(&cfg, bias);
            assert_relative_eq!(s.left + s.right, 1.0, epsilon = 1e-5);
            let inner = s.left.min(s.right);
            assert!(inner >= -cfg.max_counter_rotation / 2.0 - 1e-5);
        }
    }

    #[test]
    fn full_right_loads_left_track() {
        let cfg = TrackedDifferentialConfig {
            front_rear_split: 0.5,
            steering_authority: 1.5,
            ..Default::default()
        };
        let s = track_split(&cfg, 1.0);
        assert!(s.left > s.right);
        assert!(s.clipped);
        assert!(s.right >= 0.0);
    }

    #[test]
    fn tracked_distribution_conserves_driveshaft_torque() {
        let style = DriveStyle::DoubleDifferential(TrackedDifferentialConfig::default());
        let driven = vec![true; 8];
        let d = distribute(&style, 1000.0, 0.4, 1.0, &layout(), &driven);
        let total: f32 = d.wheel_torque.iter().sum();
        assert_relative_eq!(total, 1000.0, epsilon = 1e-3);
        let left: f32 = d.wheel_torque.iter().step_by(2).sum();
        assert_relative_eq!(left, 700.0, epsilon = 1e-3);
    }

    #[test]
    fn pivot_pair_has_zero_net_torque() {
        let style = DriveStyle::DoubleDifferential(TrackedDifferentialConfig {
            pivot_torque: 5000.0,
            ..Default::default()
        });
        let driven = vec![true; 8];
        let d = distribute(&style, 0.0, -1.0, 0.0, &layout(), &driven);
        let total: f32 = d.wheel_torque.iter().sum();
        assert_relative_eq!(total, 0.0, epsilon = 1e-3);
        // left turn: left wheels reverse, right wheels forward
        assert!(d.wheel_torque[0] < 0.0);
        assert!(d.wheel_torque[1] > 0.0);
    }

    #[test]
    fn multipliers_only_reduce_torque() {
        let style = DriveStyle::DoubleDifferential(TrackedDifferentialConfig {
            left_track_torque_multiplier: 0.5,
            ..Default::default()
        });
        let driven = vec![true; 8];
        let d = distribute(&style, 1000.0, 0.0, 1.0, &layout(), &driven);
        let total: f32 = d.wheel_torque.iter().sum();
        assert_relative_eq!(total, 750.0, epsilon = 1e-3);
    }

    #[test]
    fn rear_wheel_drive_ignores_front_axles() {
        let driven = vec![true; 8];
        let d = distribute(&DriveStyle::RearWheel, 800.0, 1.0, 1.0, &layout(), &driven);
        assert_eq!(d.wheel_torque[0], 0.0);
        assert_relative_eq!(d.wheel_torque[7], 200.0, epsilon = 1e-4);
        assert_eq!(d.split, TrackSplit::EVEN);
    }

    #[test]
    fn undriven_half_hands_over_its_share() {
        let style = DriveStyle::AllWheel { front_rear_split: 0.7 };
        let mut driven = vec![false; 8];
        driven[6] = true;
        driven[7] = true;
        let d = distribute(&style, 100.0, 0.0, 1.0, &layout(), &driven);
        assert_relative_eq!(d.wheel_torque[6], 50.0, epsilon = 1e-4);
    }

    #[test]
    fn rejects_multiplier_above_one() {
        let style = DriveStyle::DoubleDifferential(TrackedDifferentialConfig {
            right_track_torque_multiplier: 1.5,
            ..Default::default()
        });
        assert!(style.validate().is_err());
    }
}
