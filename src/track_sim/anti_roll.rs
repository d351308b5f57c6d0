// ==============================================================================
// anti_roll.rs — ROLLBAR LOAD TRANSFER PER AXLE
// ------------------------------------------------------------------------------
// A rollbar creates no net vertical force; it moves load across an axle from
// the less compressed wheel to the more compressed one:
//
//     transfer = rollbar_scaling * spring_rate * full_travel * (ratio_l - ratio_r)
//     |transfer| <= 0.4 * static axle-wheel load
//     transfer limited to the load the giving wheel actually carries
//     left  += transfer, right -= transfer
//
// Runs between the suspension stage and friction so the friction circle sees
// the redistributed normal loads.
// ==============================================================================

use crate::track_sim::kinematics::{AxleLayout, TrackSide};
use crate::track_sim::setup::WheelSetup;

const MAX_TRANSFER_FRACTION: f32 = 0.4;

/// Redistribute `normal_force` in place. Only axles with exactly one wheel per
/// side in contact take part.
pub fn apply_rollbars(
    layout: &AxleLayout,
    wheels: &[WheelSetup],
    compression: &[f32],
    in_contact: &[bool],
    normal_force: &mut [f32],
    static_load: f32,
) {
    for axle in &layout.axles {
        let left = axle.iter().copied().find(|&w| layout.side(w) == TrackSide::Left);
        let right = axle.iter().copied().find(|&w| layout.side(w) == TrackSide::Right);
        let (Some(l), Some(r)) = (left, right) else { continue };
        if !(in_contact[l] && in_contact[r]) {
            continue;
        }

        let delta = compression[l] - compression[r];
        if delta.abs() < 1e-4 {
            continue;
        }

        let setup_l = &wheels[l];
        let setup_r = &wheels[r];
        let stiffness = 0.5
            * (setup_l.rollbar_scaling * setup_l.spring_rate * setup_l.full_travel()
                + setup_r.rollbar_scaling * setup_r.spring_rate * setup_r.full_travel());

        let max_transfer = MAX_TRANSFER_FRACTION * static_load;
        let transfer = (stiffness * delta)
            .clamp(-max_transfer, max_transfer)
            .clamp(-normal_force[l].max(0.0), normal_force[r].max(0.0));

        normal_force[l] += transfer;
        normal_force[r] -= transfer;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn axle() -> (AxleLayout, Vec<WheelSetup>) {
        let offsets = [[-1.0, 0.0, 0.0], [1.0, 0.0, 0.0]];
        let wheels = offsets
            .iter()
            .map(|o| WheelSetup {
                offset: *o,
                spring_rate: 100_000.0,
                max_raise: 0.1,
                max_drop: 0.1,
                rollbar_scaling: 0.15,
                ..WheelSetup::default()
            })
            .collect();
        (AxleLayout::from_offsets(&offsets), wheels)
    }

    #[test]
    fn loads_the_more_compressed_side_without_creating_force() {
        let (layout, wheels) = axle();
        let mut fz = [10_000.0, 10_000.0];
        apply_rollbars(&layout, &wheels, &[0.7, 0.5], &[true, true], &mut fz, 10_000.0);
        // 0.15 * 100k * 0.2 * 0.2 = 600 N
        assert_relative_eq!(fz[0], 10_600.0, epsilon = 1e-2);
        assert_relative_eq!(fz[1], 9_400.0, epsilon = 1e-2);
    }

    #[test]
    fn transfer_is_capped_and_never_negative() {
        let (mut layout, mut wheels) = axle();
        for w in &mut wheels {
            w.rollbar_scaling = 100.0;
        }
        layout.axles = vec![vec![0, 1]];

        // capped at 40 % of the static load
        let mut fz = [8_000.0, 6_000.0];
        apply_rollbars(&layout, &wheels, &[1.0, 0.0], &[true, true], &mut fz, 10_000.0);
        assert_relative_eq!(fz[0], 12_000.0, epsilon = 1e-2);
        assert_relative_eq!(fz[1], 2_000.0, epsilon = 1e-2);

        // the light wheel can only give what it carries
        let mut fz = [1_000.0, 100.0];
        apply_rollbars(&layout, &wheels, &[1.0, 0.0], &[true, true], &mut fz, 10_000.0);
        assert_relative_eq!(fz[0] + fz[1], 1_100.0, epsilon = 1e-2);
        assert_eq!(fz[1], 0.0);
    }

    #[test]
    fn reversed_compression_moves_load_the_other_way() {
        let (layout, wheels) = axle();
        let mut fz = [300.0, 20_000.0];
        let total: f32 = fz.iter().sum();
        apply_rollbars(&layout, &wheels, &[0.0, 1.0], &[true, true], &mut fz, 10_000.0);
        // wanted 3000 N, the left wheel only carries 300
        assert_eq!(fz[0], 0.0);
        assert_relative_eq!(fz[0] + fz[1], total, epsilon = 1e-2);
    }

    #[test]
    fn airborne_side_disables_the_bar() {
        let (layout, wheels) = axle();
        let mut fz = [10_000.0, 0.0];
        apply_rollbars(&layout, &wheels, &[0.7, 0.0], &[true, false], &mut fz, 10_000.0);
        assert_eq!(fz, [10_000.0, 0.0]);
    }
}
