// ==============================================================================
// steering.rs — STEERING POLICIES (WHEEL ANGLE + TRACK BIAS)
// ------------------------------------------------------------------------------
// Three policies, picked by config:
// - SingleAngle: every steerable wheel gets the same angle
// - AngleRatio:  inner wheel full angle, outer wheel * angle_ratio
// - Ackermann:   inner/outer from wheelbase + track width, blended with a
//                parallel steer by ackermann_accuracy (0 = parallel, 1 = full)
//
// Authority scales with speed:
//     eff(v) = speed_curve(|v| clamped to domain) / max(speed_curve)
//
// Tracked vehicles consume `track_bias` (-1..1) instead of wheel angles; the
// differential turns it into a left/right torque split.
//
// Sign: +input / +angle = right turn. On a right turn the right wheels are
// the inner wheels.
// ==============================================================================

use serde::{Deserialize, Serialize};

use crate::track_sim::curve::Curve;
use crate::track_sim::kinematics::{AxleLayout, TrackSide};
use crate::track_sim::setup::WheelSetup;

const EPS: f32 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SteeringStyle {
    #[default]
    SingleAngle,
    AngleRatio,
    Ackermann,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SteeringConfig {
    pub style: SteeringStyle,
    pub angle_ratio: f32,        // outer / inner, AngleRatio only
    pub ackermann_accuracy: f32, // 0..1
    pub speed_curve: Curve,      // |forward speed| (m/s) -> authority
    pub max_steer_rate: f32,     // normalized input per second, <= 0 = unlimited
    pub track_bias_gain: f32,
}

impl Default for SteeringConfig {
    fn default() -> Self {
        Self {
            style: SteeringStyle::SingleAngle,
            angle_ratio: 0.7,
            ackermann_accuracy: 1.0,
            speed_curve: Curve::constant(1.0),
            max_steer_rate: 4.0,
            track_bias_gain: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SteeringOutput {
    pub wheel_angles: Vec<f32>, // rad, per wheel (0 for non-steerable)
    pub track_bias: f32,        // -1..1
    pub effectiveness: f32,
}

impl SteeringConfig {
    pub fn effectiveness(&self, forward_speed: f32) -> f32 {
        self.speed_curve.sample_normalized(forward_speed.abs())
    }

    pub fn solve(
        &self,
        input: f32,
        forward_speed: f32,
        layout: &AxleLayout,
        wheels: &[WheelSetup],
    ) -> SteeringOutput {
        let input = input.clamp(-1.0, 1.0);
        let eff = self.effectiveness(forward_speed);
        let command = input * eff;

        // side that is on the inside of the turn
        let inner_side = if command >= 0.0 { TrackSide::Right } else { TrackSide::Left };

        let wheel_angles = wheels
            .iter()
            .enumerate()
            .map(|(i, w)| {
                if !w.affected_by_steering {
                    return 0.0;
                }
                let base = command * w.max_steer_angle;
                let inner = layout.side(i) == inner_side;
                match self.style {
                    SteeringStyle::SingleAngle => base,
                    SteeringStyle::AngleRatio => {
                        if inner { base } else { base * self.angle_ratio }
                    }
                    SteeringStyle::Ackermann => {
                        let (ack_inner, ack_outer) =
                            ackermann_angles(base, layout.wheelbase, layout.track_width);
                        let ack = if inner { ack_inner } else { ack_outer };
                        (1.0 - self.ackermann_accuracy) * base + self.ackermann_accuracy * ack
                    }
                }
            })
            .collect();

        let raw_bias = match self.style {
            SteeringStyle::SingleAngle => command,
            SteeringStyle::AngleRatio => command * (1.0 + self.angle_ratio) * 0.5,
            SteeringStyle::Ackermann => {
                let lock = max_lock_angle(wheels);
                ackermann_yaw_factor(command * lock, layout)
                    / ackermann_yaw_factor(lock, layout).max(EPS)
            }
        };

        SteeringOutput {
            wheel_angles,
            track_bias: (raw_bias * self.track_bias_gain).clamp(-1.0, 1.0),
            effectiveness: eff,
        }
    }
}

/// Ackermann (inner, outer) angles for a bicycle-model angle `base`.
/// Signs follow `base`.
pub fn ackermann_angles(base: f32, wheelbase: f32, track: f32) -> (f32, f32) {
    if base.abs() < EPS || wheelbase <= EPS {
        return (base, base);
    }

    let sign = base.signum();
    let r = wheelbase / base.abs().tan();

    let r_in = (r - track * 0.5).max(0.01);
    let r_out = (r + track * 0.5).max(0.01);

    ((wheelbase / r_in).atan() * sign, (wheelbase / r_out).atan() * sign)
}

/// Yaw-rate proxy for a tracked turn at virtual angle `theta`:
/// track_width * tan(theta) / (2 * wheelbase).
fn ackermann_yaw_factor(theta: f32, layout: &AxleLayout) -> f32 {
    let wheelbase = layout.wheelbase.max(EPS);
    let track = if layout.track_width > EPS { layout.track_width } else { 1.0 };
    track * theta.clamp(-1.5, 1.5).tan() / (2.0 * wheelbase)
}

fn max_lock_angle(wheels: &[WheelSetup]) -> f32 {
    wheels
        .iter()
        .map(|w| w.max_steer_angle)
        .fold(0.0_f32, f32::max)
        .max(EPS)
}

/// Move `current` toward `target` by at most `max_rate * dt`.
pub fn rate_limit(current: f32, target: f32, max_rate: f32, dt: f32) -> f32 {
    if max_rate <= 0.0 {
        return target;
    }
    let step = max_rate * dt;
    current + (target - current).clamp(-step, step)
}
