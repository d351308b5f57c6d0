// ==============================================================================
// wheel.rs — WHEEL SPIN INTEGRATION
// ------------------------------------------------------------------------------
// On the ground a wheel rolls with the surface (omega = v_long / r). Only the
// torque the contact patch cannot carry changes that:
// - drive beyond traction spins the wheel up         (I = ½·m·r²)
// - brake beyond traction (and drive) locks the wheel
// - existing spin decays back to rolling through traction
// In the air drive and brake act on the wheel inertia alone.
//
// omega is clamped to ±max_wheelspin_rotation, position wrapped to [0, 2π).
// ==============================================================================

use std::f32::consts::TAU;

use crate::track_sim::setup::WheelSetup;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SpinInput {
    pub angular_velocity: f32, // rad/s, previous step
    pub angular_position: f32, // rad, previous step
    pub v_long: f32,           // m/s, 0 when airborne
    pub drive_torque: f32,     // N·m
    pub brake_torque: f32,     // N·m, magnitude
    pub traction_torque: f32,  // N·m, 0 when airborne
    pub in_contact: bool,
    pub dt: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SpinState {
    pub angular_velocity: f32,
    pub angular_position: f32,
    pub locked: bool,
}

pub fn integrate_spin(setup: &WheelSetup, input: &SpinInput) -> SpinState {
    let r = setup.radius;
    let inertia = setup.inertia().max(1e-4);
    let dt = input.dt.max(0.0);
    let brake = input.brake_torque.max(0.0);

    let (omega, locked) = if input.in_contact {
        let rolling = input.v_long / r;
        let traction = input.traction_torque.max(0.0);

        if brake > traction + input.drive_torque.abs() && input.v_long.abs() > 0.0 {
            (0.0, true)
        } else {
            let mut spin = input.angular_velocity - rolling;
            let excess = input.drive_torque.abs() - traction;
            if excess > 0.0 {
                spin += input.drive_torque.signum() * excess / inertia * dt;
            } else {
                let decay = traction / inertia * dt;
                spin -= spin.signum() * spin.abs().min(decay);
            }
            (rolling + spin, false)
        }
    } else {
        let mut omega = input.angular_velocity + input.drive_torque / inertia * dt;
        let stop = brake / inertia * dt;
        omega -= omega.signum() * omega.abs().min(stop);
        (omega, false)
    };

    let max = setup.max_wheelspin_rotation;
    let omega = if omega.is_finite() { omega.clamp(-max, max) } else { 0.0 };
    let position = (input.angular_position + omega * dt).rem_euclid(TAU);

    SpinState {
        angular_velocity: omega,
        angular_position: if position.is_finite() { position } else { 0.0 },
        locked,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn setup() -> WheelSetup {
        WheelSetup { radius: 0.5, mass: 40.0, max_wheelspin_rotation: 80.0, ..WheelSetup::default() }
    }

    #[test]
    fn rolling_wheel_tracks_ground_speed() {
        let s = integrate_spin(
            &setup(),
            &SpinInput { angular_velocity: 18.0, v_long: 10.0, traction_torque: 5_000.0, drive_torque: 1_000.0, in_contact: true, dt: 0.01, ..SpinInput::default() },
        );
        // 2 rad/s of spin decays in one step at 10 rad/s per step
        assert_relative_eq!(s.angular_velocity, 20.0);
        assert!(!s.locked);
    }

    #[test]
    fn excess_drive_spins_up() {
        // I = 0.5 * 40 * 0.25 = 5
        let s = integrate_spin(
            &setup(),
            &SpinInput { v_long: 0.0, traction_torque: 100.0, drive_torque: 600.0, in_contact: true, dt: 0.1, ..SpinInput::default() },
        );
        assert_relative_eq!(s.angular_velocity, 10.0, epsilon = 1e-4);
    }

    #[test]
    fn heavy_brake_locks_the_wheel() {
        let s = integrate_spin(
            &setup(),
            &SpinInput { angular_velocity: 20.0, v_long: 10.0, traction_torque: 1_000.0, brake_torque: 5_000.0, in_contact: true, dt: 0.01, ..SpinInput::default() },
        );
        assert_eq!(s.angular_velocity, 0.0);
        assert!(s.locked);
    }

    #[test]
    fn spin_is_capped_and_position_wrapped() {
        let mut state = SpinState::default();
        for _ in 0..500 {
            state = integrate_spin(
                &setup(),
                &SpinInput {
                    angular_velocity: state.angular_velocity,
                    angular_position: state.angular_position,
                    drive_torque: 10_000.0,
                    in_contact: false,
                    dt: 1.0 / 60.0,
                    ..SpinInput::default()
                },
            );
            assert!((0.0..TAU).contains(&state.angular_position));
        }
        assert_eq!(state.angular_velocity, 80.0);
    }

    #[test]
    fn airborne_brake_stops_without_reversing() {
        let s = integrate_spin(
            &setup(),
            &SpinInput { angular_velocity: 1.0, brake_torque: 10_000.0, dt: 0.1, ..SpinInput::default() },
        );
        assert_eq!(s.angular_velocity, 0.0);
    }
}
