// ==============================================================================
// transmission.rs — GEARBOX STATE MACHINE + RATIOS
// ------------------------------------------------------------------------------
// Neutral -> Engaged(gear), gear 0 = neutral (zero ratio, no torque path).
//
// Automatic: up-shift at change_up_rpm, down-shift at change_down_rpm, with a
//            cooldown of gear_change_time between shifts.
// Manual:    only explicit GearRequest values move the gearbox.
// Auto-reverse: brake while (nearly) stationary selects reverse and the brake
//            pedal becomes reverse throttle.
//
// While a change is in flight the output torque follows the configured
// GearChangeTorquePolicy; consumers must not expect torque continuity across
// a shift.
// ==============================================================================

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::track_sim::error::ConfigError;
use crate::track_sim::types::GearRequest;

/// Forward speed (m/s) below which the vehicle counts as stationary for
/// auto-reverse decisions.
const STATIONARY_SPEED: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GearChangeTorquePolicy {
    /// Zero torque for the whole change window.
    #[default]
    Cut,
    /// Fade out over the first half of the window, back in over the second.
    Ramp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransmissionConfig {
    pub automatic: bool,
    pub auto_reverse: bool,
    pub forward_ratios: Vec<f32>,
    pub reverse_ratios: Vec<f32>,
    pub final_ratio: f32,
    pub change_up_rpm: f32,
    pub change_down_rpm: f32,
    pub gear_change_time: f32, // s
    pub efficiency: f32,       // 0..1
    #[serde(default)]
    pub torque_policy: GearChangeTorquePolicy,
}

impl TransmissionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.forward_ratios.is_empty() {
            return Err(ConfigError::EmptyGearTable);
        }
        for (index, &value) in self.forward_ratios.iter().chain(&self.reverse_ratios).enumerate() {
            if !(value > 0.0) {
                return Err(ConfigError::InvalidGearRatio { index, value });
            }
        }
        if !(self.final_ratio > 0.0) {
            return Err(ConfigError::InvalidFinalRatio(self.final_ratio));
        }
        if self.automatic && self.change_down_rpm >= self.change_up_rpm {
            return Err(ConfigError::InvertedShiftPoints {
                down: self.change_down_rpm,
                up: self.change_up_rpm,
            });
        }
        if !(self.efficiency > 0.0 && self.efficiency <= 1.0) {
            return Err(ConfigError::OutOfUnitRange { field: "efficiency", value: self.efficiency });
        }
        Ok(())
    }

    pub fn top_gear(&self) -> i32 {
        self.forward_ratios.len() as i32
    }

    pub fn lowest_reverse(&self) -> i32 {
        -(self.reverse_ratios.len() as i32)
    }

    /// Signed overall ratio: forward > 0, reverse < 0, neutral or unknown = 0.
    pub fn gear_ratio(&self, gear: i32) -> f32 {
        if gear > 0 {
            self.forward_ratios
                .get(gear as usize - 1)
                .map_or(0.0, |r| r * self.final_ratio)
        } else if gear < 0 {
            self.reverse_ratios
                .get(gear.unsigned_abs() as usize - 1)
                .map_or(0.0, |r| -r * self.final_ratio)
        } else {
            0.0
        }
    }
}

/// Throttle/brake after auto-reverse remapping.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DriveIntent {
    pub throttle: f32, // 0..1 engine demand
    pub brake: f32,    // 0..1
    pub reverse: bool, // driver wants to move backwards
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TransmissionState {
    pub current_gear: i32,
    pub target_gear: i32,
    pub change_timer: f32, // s remaining in an active change
    pub cooldown: f32,     // s until the automatic box may shift again
}

impl TransmissionState {
    pub fn is_changing(&self) -> bool {
        self.current_gear != self.target_gear
    }

    /// Start a change toward `gear`; `immediate` skips the change window.
    pub fn set_gear(&mut self, cfg: &TransmissionConfig, gear: i32, immediate: bool) {
        let gear = gear.clamp(cfg.lowest_reverse(), cfg.top_gear());
        if gear == self.target_gear {
            return;
        }
        debug!(from = self.current_gear, to = gear, immediate, "gear change");
        self.target_gear = gear;
        if immediate || cfg.gear_change_time <= 0.0 {
            self.current_gear = gear;
            self.change_timer = 0.0;
        } else {
            self.change_timer = cfg.gear_change_time;
        }
        self.cooldown = cfg.gear_change_time;
    }

    /// Apply an explicit request. Automatic boxes only honour neutral/reverse
    /// selection; everything else is the shift logic's call.
    pub fn request(&mut self, cfg: &TransmissionConfig, request: GearRequest) {
        let gear = match request {
            GearRequest::Up => self.target_gear + 1,
            GearRequest::Down => self.target_gear - 1,
            GearRequest::Select(g) => g,
        };
        if cfg.automatic && !matches!(request, GearRequest::Select(g) if g <= 0) {
            return;
        }
        self.set_gear(cfg, gear, false);
    }

    /// Remap pedals for auto-reverse and engage first/reverse from neutral.
    pub fn resolve_drive_intent(
        &mut self,
        cfg: &TransmissionConfig,
        throttle: f32,
        brake: f32,
        forward_speed: f32,
    ) -> DriveIntent {
        let throttle = throttle.clamp(0.0, 1.0);
        let brake = brake.clamp(0.0, 1.0);

        if !cfg.automatic {
            return DriveIntent { throttle, brake, reverse: self.target_gear < 0 };
        }

        let stationary = forward_speed.abs() < STATIONARY_SPEED;
        let in_reverse = self.target_gear < 0;

        if cfg.auto_reverse && !cfg.reverse_ratios.is_empty() {
            if !in_reverse && stationary && brake > 0.0 && throttle <= 0.0 {
                debug!("auto-reverse engaged");
                self.set_gear(cfg, -1, false);
            } else if in_reverse && throttle > 0.0 && forward_speed > -STATIONARY_SPEED {
                self.set_gear(cfg, 1, false);
            }
        }

        if self.target_gear == 0 && throttle > 0.0 {
            self.set_gear(cfg, 1, true);
        }

        if self.target_gear < 0 {
            // brake pedal drives backwards, throttle brakes
            DriveIntent { throttle: brake, brake: throttle, reverse: true }
        } else {
            DriveIntent { throttle, brake, reverse: false }
        }
    }

    /// Automatic shift decision from the current engine RPM.
    pub fn update_auto(&mut self, cfg: &TransmissionConfig, rpm: f32) {
        if !cfg.automatic || self.is_changing() || self.cooldown > 0.0 {
            return;
        }
        let gear = self.current_gear;
        if gear > 0 {
            if rpm >= cfg.change_up_rpm && gear < cfg.top_gear() {
                self.set_gear(cfg, gear + 1, false);
            } else if rpm <= cfg.change_down_rpm && gear > 1 {
                self.set_gear(cfg, gear - 1, false);
            }
        } else if gear < 0 {
            if rpm >= cfg.change_up_rpm && gear > cfg.lowest_reverse() {
                self.set_gear(cfg, gear - 1, false);
            } else if rpm <= cfg.change_down_rpm && gear < -1 {
                self.set_gear(cfg, gear + 1, false);
            }
        }
    }

    pub fn advance(&mut self, dt: f32) {
        self.cooldown = (self.cooldown - dt).max(0.0);
        if self.is_changing() {
            self.change_timer -= dt;
            if self.change_timer <= 0.0 {
                self.change_timer = 0.0;
                self.current_gear = self.target_gear;
            }
        }
    }

    /// Ratio currently carrying torque (the outgoing gear during the first
    /// half of a ramped change, the incoming gear afterwards).
    pub fn effective_ratio(&self, cfg: &TransmissionConfig) -> f32 {
        if self.is_changing() && cfg.gear_change_time > 0.0 {
            let progress = 1.0 - self.change_timer / cfg.gear_change_time;
            if progress >= 0.5 {
                return cfg.gear_ratio(self.target_gear);
            }
        }
        cfg.gear_ratio(self.current_gear)
    }

    /// Multiplier on driveshaft torque for the active change window.
    pub fn torque_scale(&self, cfg: &TransmissionConfig) -> f32 {
        if !self.is_changing() {
            return 1.0;
        }
        match cfg.torque_policy {
            GearChangeTorquePolicy::Cut => 0.0,
            GearChangeTorquePolicy::Ramp => {
                if cfg.gear_change_time <= 0.0 {
                    return 1.0;
                }
                let progress = (1.0 - self.change_timer / cfg.gear_change_time).clamp(0.0, 1.0);
                (1.0 - 2.0 * progress).abs()
            }
        }
    }

    /// Engine torque -> driveshaft torque through the engaged ratio.
    pub fn driveshaft_torque(&self, cfg: &TransmissionConfig, engine_torque: f32) -> f32 {
        engine_torque * self.effective_ratio(cfg) * cfg.efficiency * self.torque_scale(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn config() -> TransmissionConfig {
        TransmissionConfig {
            automatic: true,
            auto_reverse: true,
            forward_ratios: vec![4.0, 2.5, 1.6, 1.1],
            reverse_ratios: vec![4.0, 2.0],
            final_ratio: 8.0,
            change_up_rpm: 2400.0,
            change_down_rpm: 1200.0,
            gear_change_time: 0.4,
            efficiency: 0.9,
            torque_policy: GearChangeTorquePolicy::Cut,
        }
    }

    #[test]
    fn gear_ratio_sign_follows_gear() {
        let cfg = config();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let g: i32 = rng.gen_range(cfg.lowest_reverse()..=cfg.top_gear());
            let r = cfg.gear_ratio(g);
            assert_eq!(r.signum() as i32 * (r != 0.0) as i32, g.signum());
            let table = if g > 0 {
                cfg.forward_ratios[g as usize - 1]
            } else if g < 0 {
                cfg.reverse_ratios[g.unsigned_abs() as usize - 1]
            } else {
                0.0
            };
            assert_relative_eq!(r.abs(), table * cfg.final_ratio);
        }
        assert_eq!(cfg.gear_ratio(0), 0.0);
        assert_eq!(cfg.gear_ratio(99), 0.0);
    }

    #[test]
    fn auto_box_upshifts_after_cooldown() {
        let cfg = config();
        let mut t = TransmissionState::default();
        t.set_gear(&cfg, 1, true);
        t.cooldown = 0.0;

        t.update_auto(&cfg, 2500.0);
        assert_eq!(t.target_gear, 2);
        assert!(t.is_changing());
        assert_eq!(t.driveshaft_torque(&cfg, 1000.0), 0.0);

        // cooldown blocks a second decision mid-change
        t.update_auto(&cfg, 2500.0);
        assert_eq!(t.target_gear, 2);

        for _ in 0..30 {
            t.advance(1.0 / 60.0);
        }
        assert_eq!(t.current_gear, 2);
        assert_relative_eq!(t.driveshaft_torque(&cfg, 1000.0), 1000.0 * 2.5 * 8.0 * 0.9);
    }

    #[test]
    fn auto_box_downshifts_to_first_and_stops() {
        let cfg = config();
        let mut t = TransmissionState::default();
        t.set_gear(&cfg, 3, true);
        t.cooldown = 0.0;

        for expected in [2, 1, 1] {
            t.update_auto(&cfg, 1000.0);
            assert_eq!(t.target_gear, expected);
            for _ in 0..30 {
                t.advance(1.0 / 60.0);
            }
            assert_eq!(t.current_gear, expected);
        }

        // low rpm in second reverse drops back to first reverse
        t.set_gear(&cfg, -2, true);
        t.cooldown = 0.0;
        t.update_auto(&cfg, 1000.0);
        assert_eq!(t.target_gear, -1);
    }

    #[test]
    fn manual_down_walks_through_neutral_and_floors_at_last_reverse() {
        let mut cfg = config();
        cfg.automatic = false;
        let mut t = TransmissionState::default();
        t.set_gear(&cfg, 1, true);

        for expected in [0, -1, -2, -2] {
            t.request(&cfg, GearRequest::Down);
            t.advance(1.0);
            assert_eq!(t.current_gear, expected);
        }
        assert_relative_eq!(t.effective_ratio(&cfg), -2.0 * 8.0);
    }

    #[test]
    fn manual_box_ignores_rpm() {
        let mut cfg = config();
        cfg.automatic = false;
        let mut t = TransmissionState::default();
        t.request(&cfg, GearRequest::Up);
        t.advance(1.0);
        assert_eq!(t.current_gear, 1);
        t.update_auto(&cfg, 5000.0);
        assert_eq!(t.target_gear, 1);
        t.request(&cfg, GearRequest::Select(-1));
        t.advance(1.0);
        assert_eq!(t.current_gear, -1);
    }

    #[test]
    fn neutral_is_never_selected_implicitly() {
        let cfg = config();
        let mut t = TransmissionState::default();
        t.set_gear(&cfg, 1, true);
        t.cooldown = 0.0;
        for _ in 0..50 {
            t.update_auto(&cfg, 0.0);
            t.advance(0.1);
            assert_ne!(t.current_gear, 0);
        }
    }

    #[test]
    fn brake_at_standstill_selects_reverse() {
        let cfg = config();
        let mut t = TransmissionState::default();
        let intent = t.resolve_drive_intent(&cfg, 0.0, 0.8, 0.0);
        assert_eq!(t.target_gear, -1);
        assert!(intent.reverse);
        assert_relative_eq!(intent.throttle, 0.8);
        assert_eq!(intent.brake, 0.0);

        // throttle while creeping backwards flips back to first
        t.advance(1.0);
        let intent = t.resolve_drive_intent(&cfg, 1.0, 0.0, -0.1);
        assert_eq!(t.target_gear, 1);
        assert!(!intent.reverse);
    }

    #[test]
    fn ramp_policy_fades_torque() {
        let mut cfg = config();
        cfg.torque_policy = GearChangeTorquePolicy::Ramp;
        let mut t = TransmissionState::default();
        t.set_gear(&cfg, 1, true);
        t.set_gear(&cfg, 2, false);
        assert_relative_eq!(t.torque_scale(&cfg), 1.0);
        t.advance(0.2);
        assert!(t.torque_scale(&cfg) < 1e-3);
        t.advance(0.1);
        assert_relative_eq!(t.torque_scale(&cfg), 0.5, epsilon = 1e-3);
    }

    #[test]
    fn rejects_empty_gear_table() {
        let mut cfg = config();
        cfg.forward_ratios.clear();
        assert_eq!(cfg.validate(), Err(ConfigError::EmptyGearTable));
    }
}
