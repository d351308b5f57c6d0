// ==============================================================================
// pipeline.rs — ONE SIMULATION STEP, FIXED ORDER
// ------------------------------------------------------------------------------
// 1) input       clamp + copy TickInput into runtime state, gear requests
// 2) mechanical  engine -> transmission -> differential => per-wheel torque
//                (skipped when mechanical_sim_enabled = false: overrides only)
// 3) steering    wheel angles + track bias, rate limited
// 4) trace       ground probes, batched or per wheel
// 5) suspension  spring/damper (+ rollbars) -> forces or constraints
// 6) friction    assists -> wheel spin -> contact forces
//    chassis     aero drag/downforce at the centre of mass, arcade controls
// 7) output      fill the back buffer, publish
//
// 4+5 are skipped with suspension_enabled = false (every wheel reads as
// airborne), 6 with wheel_friction_enabled = false.
//
// The differential consumes the track bias produced by the steering stage of
// the previous step, keeping the stage order strict.
//
// Forces go to a ForceSink; nothing touches the rigid body directly.
// ==============================================================================

use std::sync::Arc;
use std::time::Instant;

use nalgebra::{Point3, Unit, Vector3};

use crate::track_sim::aero::aero_forces;
use crate::track_sim::anti_roll::apply_rollbars;
use crate::track_sim::arcade::{ArcadeInput, chassis_push};
use crate::track_sim::collab::{ForceSink, GroundProbe, ProbeHit};
use crate::track_sim::diagnostics::Diagnostics;
use crate::track_sim::differential::{TrackSplit, distribute};
use crate::track_sim::engine::EngineModel;
use crate::track_sim::friction::{
    PatchInput, effective_load, effective_mu, limit_torques, solve_wheel_friction, traction_torque,
};
use crate::track_sim::handoff::HandoffWriter;
use crate::track_sim::kinematics::{project_on_plane, slip_components, wheel_basis_world};
use crate::track_sim::setup::ValidatedConfig;
use crate::track_sim::steering::rate_limit;
use crate::track_sim::suspension::{
    self, SuspensionMode, SuspensionSample, constraint_for, probe_request, sample_wheel,
};
use crate::track_sim::types::{
    AppliedControls, ChassisState, TickInput, TickOutput, VehicleRuntimeState, WheelRuntimeState,
    p3, v3,
};
use crate::track_sim::wheel::{SpinInput, integrate_spin};

const RAD_PER_SEC_TO_RPM: f32 = 60.0 / std::f32::consts::TAU;

/// Everything a vehicle carries from one step to the next.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeState {
    pub step: u64,
    pub vehicle: VehicleRuntimeState,
    pub wheels: Vec<WheelRuntimeState>,
}

impl RuntimeState {
    pub fn new(config: &ValidatedConfig) -> Self {
        let wheels = config
            .wheels
            .iter()
            .map(|w| WheelRuntimeState {
                local_position: w.offset,
                suspension_offset: suspension::offset_from_ratio(w, 0.0),
                ..WheelRuntimeState::default()
            })
            .collect();
        Self {
            step: 0,
            vehicle: VehicleRuntimeState {
                engine_rpm: config.engine.idle_rpm,
                track_split: TrackSplit::EVEN,
                layout: config.layout.clone(),
                ..VehicleRuntimeState::default()
            },
            wheels,
        }
    }

    /// Publishable copy of the current state.
    pub fn to_output(&self) -> TickOutput {
        TickOutput { step: self.step, vehicle: self.vehicle.clone(), wheels: self.wheels.clone() }
    }
}

/// Runs one step. Returns the published output.
#[allow(clippy::too_many_arguments)]
pub fn run_tick<P, S>(
    config: &ValidatedConfig,
    runtime: &mut RuntimeState,
    input: &TickInput,
    chassis: &ChassisState,
    probe: &P,
    sink: &mut S,
    diagnostics: &mut Diagnostics,
    handoff: &mut HandoffWriter,
) -> Arc<TickOutput>
where
    P: GroundProbe + ?Sized,
    S: ForceSink + ?Sized,
{
    let started = Instant::now();
    assert_eq!(
        runtime.wheels.len(),
        config.wheel_count(),
        "runtime wheel count out of sync with configuration"
    );
    let dt = if input.dt.is_finite() && input.dt > 0.0 { input.dt } else { 0.0 };
    let n = config.wheel_count();

    // ---------------------------------------------------------------
    // 1) input
    // ---------------------------------------------------------------
    let controls = AppliedControls {
        throttle: input.throttle.clamp(0.0, 1.0),
        brake: input.brake.clamp(0.0, 1.0),
        handbrake: input.handbrake.clamp(0.0, 1.0),
        steering: input.steering.clamp(-1.0, 1.0),
    };
    let controls = AppliedControls {
        throttle: diagnostics.guard_f32(controls.throttle, "input.throttle"),
        brake: diagnostics.guard_f32(controls.brake, "input.brake"),
        handbrake: diagnostics.guard_f32(controls.handbrake, "input.handbrake"),
        steering: diagnostics.guard_f32(controls.steering, "input.steering"),
    };
    runtime.vehicle.controls = controls;
    if let Some(request) = input.gear_request {
        runtime.vehicle.transmission.request(&config.transmission, request);
    }
    let forward_speed = diagnostics.guard_f32(chassis.forward_speed(), "chassis.forward_speed");
    runtime.vehicle.forward_speed = forward_speed;

    // ---------------------------------------------------------------
    // 2) mechanical
    // ---------------------------------------------------------------
    let mut drive_torque = vec![0.0_f32; n];
    let mut engine_brake = 0.0_f32;
    let mut pedal_brake = controls.brake;

    if config.flags.mechanical_sim_enabled {
        let cfg_tx = &config.transmission;
        let vehicle = &mut runtime.vehicle;
        let intent = vehicle.transmission.resolve_drive_intent(
            cfg_tx,
            controls.throttle,
            controls.brake,
            forward_speed,
        );
        pedal_brake = intent.brake;

        vehicle.transmission.update_auto(cfg_tx, vehicle.engine_rpm);
        vehicle.transmission.advance(dt);

        let engine = EngineModel::new(&config.engine);
        let ratio = vehicle.transmission.effective_ratio(cfg_tx);
        let target_rpm = if ratio != 0.0 && !vehicle.transmission.is_changing() {
            driven_wheel_speed(config, &runtime.wheels) * ratio.abs() * RAD_PER_SEC_TO_RPM
        } else {
            engine.free_rev_target(intent.throttle)
        };
        let rpm = engine.integrate_rpm(vehicle.engine_rpm, target_rpm, intent.throttle, dt);
        vehicle.engine_rpm = diagnostics.guard_f32(rpm, "engine.rpm");

        let engine_torque = engine.get_torque(vehicle.engine_rpm) * intent.throttle;
        let driveshaft = vehicle.transmission.driveshaft_torque(cfg_tx, engine_torque);

        // engine braking reaches the driven wheels as a brake, never as drive
        let coupling = ratio.abs() * cfg_tx.efficiency * vehicle.transmission.torque_scale(cfg_tx);
        let driven = config.driven.iter().filter(|d| **d).count().max(1) as f32;
        engine_brake = engine.engine_brake_torque(vehicle.engine_rpm, intent.throttle).abs()
            * coupling
            / driven;

        let split = distribute(
            &config.drive,
            driveshaft,
            vehicle.track_bias,
            intent.throttle,
            &config.layout,
            &config.driven,
        );
        vehicle.track_split = split.split;
        drive_torque = split.wheel_torque;
    }

    for (i, (setup, state)) in config.wheels.iter().zip(runtime.wheels.iter_mut()).enumerate() {
        let combined = setup.external_torque_combine.combine(drive_torque[i], input.wheel_override(i));
        state.drive_torque = diagnostics.guard_f32(combined, "wheel.drive_torque");

        let mut brake = 0.0;
        if setup.affected_by_brake {
            brake += pedal_brake * setup.max_brake_torque;
        }
        if setup.affected_by_handbrake {
            brake += controls.handbrake * setup.max_hand_brake_torque;
        }
        if setup.affected_by_engine {
            brake += engine_brake;
        }
        state.brake_torque = brake;
    }

    // ---------------------------------------------------------------
    // 3) steering
    // ---------------------------------------------------------------
    {
        let vehicle = &mut runtime.vehicle;
        vehicle.steering_command = rate_limit(
            vehicle.steering_command,
            controls.steering,
            config.steering.max_steer_rate,
            dt,
        );
        let out = config.steering.solve(
            vehicle.steering_command,
            forward_speed,
            &config.layout,
            &config.wheels,
        );
        vehicle.track_bias = out.track_bias;
        for (state, angle) in runtime.wheels.iter_mut().zip(out.wheel_angles) {
            state.steer_angle = angle;
        }
    }

    // ---------------------------------------------------------------
    // 4) trace
    // ---------------------------------------------------------------
    let transform = chassis.transform;
    let hits: Vec<Option<ProbeHit>> = if config.flags.suspension_enabled {
        let requests: Vec<_> = config
            .wheels
            .iter()
            .enumerate()
            .map(|(i, w)| probe_request(i, w, &transform, config.probe_channel))
            .collect();
        diagnostics.probe_queries += requests.len() as u64;
        let mut hits = if config.flags.batch_probes {
            probe.probe_batch(&requests, config.probe_margin)
        } else {
            requests.iter().map(|r| probe.probe(r)).collect()
        };
        hits.resize(n, None);
        hits
    } else {
        vec![None; n]
    };

    // ---------------------------------------------------------------
    // 5) suspension
    // ---------------------------------------------------------------
    let samples: Vec<SuspensionSample> = config
        .wheels
        .iter()
        .zip(&runtime.wheels)
        .zip(&hits)
        .map(|((setup, state), hit)| {
            let attach = suspension::attachment_point(setup, &transform);
            let v = chassis.point_velocity(&attach);
            sample_wheel(
                setup,
                &transform,
                hit.as_ref(),
                Some(&v),
                state.compression_ratio,
                config.sprung_mass,
                dt,
            )
        })
        .collect();

    let mut normal_force: Vec<f32> = samples.iter().map(|s| s.force.normal_force).collect();
    let ratios: Vec<f32> = samples.iter().map(|s| s.compression_ratio).collect();
    let contact: Vec<bool> = samples.iter().map(|s| s.in_contact).collect();
    apply_rollbars(&config.layout, &config.wheels, &ratios, &contact, &mut normal_force, config.static_load);

    for (i, sample) in samples.iter().enumerate() {
        let setup = &config.wheels[i];
        let fz = diagnostics.guard_f32(normal_force[i], "suspension.normal_force");
        normal_force[i] = fz;

        let state = &mut runtime.wheels[i];
        state.hit = hits[i];
        state.in_contact = sample.in_contact;
        state.compression_ratio = sample.compression_ratio;
        state.spring_force = fz;
        state.suspension_offset = sample.offset;

        let local = Vector3::from(setup.offset)
            - Vector3::from(setup.suspension_axis).normalize() * sample.offset;
        let world = transform * Point3::from(local);
        let world_velocity = chassis.point_velocity(&world);
        state.local_position = v3(&local);
        state.world_position = p3(&world);
        state.world_velocity = v3(&world_velocity);
        state.local_velocity = v3(&transform.rotation.inverse_transform_vector(&world_velocity));

        if !config.flags.suspension_enabled || !sample.in_contact {
            continue;
        }
        match config.suspension_mode {
            SuspensionMode::Force => {
                let force = diagnostics.guard_vec(-sample.axis.into_inner() * fz, "suspension.force");
                sink.add_force_at_point(i, force, sample.apply_point);
            }
            SuspensionMode::Constraint => {
                sink.set_suspension_constraint(constraint_for(i, setup, &transform, sample, config.sprung_mass));
            }
        }
    }

    // ---------------------------------------------------------------
    // 6) friction + wheel spin
    // ---------------------------------------------------------------
    for i in 0..n {
        let setup = &config.wheels[i];
        let state = &mut runtime.wheels[i];
        state.abs_active = false;
        state.tcs_active = false;

        let grounded = config.flags.wheel_friction_enabled && state.in_contact;
        let Some(hit) = state.hit.filter(|_| grounded) else {
            let spin = integrate_spin(
                setup,
                &SpinInput {
                    angular_velocity: state.angular_velocity,
                    angular_position: state.angular_position,
                    drive_torque: state.drive_torque,
                    brake_torque: state.brake_torque,
                    dt,
                    ..SpinInput::default()
                },
            );
            state.angular_velocity = spin.angular_velocity;
            state.angular_position = spin.angular_position;
            clear_contact_outputs(state);
            continue;
        };

        let (fwd, _) = wheel_basis_world(&transform.rotation, state.steer_angle);
        let forward = project_on_plane(&fwd, &hit.normal, fwd);
        let side = Unit::try_new(hit.normal.cross(&forward.into_inner()), 1e-6)
            .unwrap_or_else(|| Unit::new_unchecked(transform.rotation * Vector3::x()));

        let contact_velocity = chassis.point_velocity(&hit.point);
        let (v_long, v_lat) = slip_components(&contact_velocity, &forward, &side);
        let v_long = diagnostics.guard_f32(v_long, "friction.v_long");
        let v_lat = diagnostics.guard_f32(v_lat, "friction.v_lat");

        let surface = setup.friction_override.unwrap_or(hit.material.friction);
        let mu = effective_mu(setup, surface);
        let load = effective_load(setup, normal_force[i], config.static_load);
        let traction = traction_torque(mu, load, setup.radius);

        let (drive, brake, tcs, abs) = limit_torques(
            setup,
            &config.assists,
            state.drive_torque,
            state.brake_torque,
            traction,
            v_long,
        );
        state.drive_torque = drive;
        state.brake_torque = brake;
        state.tcs_active = tcs;
        state.abs_active = abs;

        let spin = integrate_spin(
            setup,
            &SpinInput {
                angular_velocity: state.angular_velocity,
                angular_position: state.angular_position,
                v_long,
                drive_torque: drive,
                brake_torque: brake,
                traction_torque: traction,
                in_contact: true,
                dt,
            },
        );
        state.angular_velocity = spin.angular_velocity;
        state.angular_position = spin.angular_position;

        let result = solve_wheel_friction(
            setup,
            &config.slip_curve,
            &PatchInput {
                v_long,
                v_lat,
                normal_force: normal_force[i],
                static_load: config.static_load,
                surface_friction: surface,
                drive_torque: drive,
                brake_torque: brake,
                angular_velocity: spin.angular_velocity,
                mass_share: config.sprung_mass,
                dt,
            },
        );

        let force = forward.into_inner() * result.force_long + side.into_inner() * result.force_lat;
        let force = diagnostics.guard_vec(force, "friction.force");
        sink.add_force_at_point(i, force, hit.point);

        let class = result.classification;
        let skid = forward.into_inner() * class.skid_direction[0] + side.into_inner() * class.skid_direction[1];
        state.slip = result.slip;
        state.slip_angle = result.slip_angle;
        state.slipping = class.slipping;
        state.skidding = class.skidding;
        state.skid_magnitude = class.skid_magnitude;
        state.skid_direction = v3(&skid);
        state.friction_force = v3(&force);
    }

    // chassis-level forces
    let aero = aero_forces(&config.aerodynamics, &chassis.transform.rotation, &chassis.linear_velocity);
    if !aero.is_zero() {
        let force = diagnostics.guard_vec(aero.total(), "aero.force");
        sink.add_chassis_force(force, chassis.center_of_mass);
    }
    if config.arcade.any_enabled() {
        let arcade = ArcadeInput {
            pitch: diagnostics.guard_f32(input.pitch.clamp(-1.0, 1.0), "input.pitch"),
            roll: diagnostics.guard_f32(input.roll.clamp(-1.0, 1.0), "input.roll"),
            yaw: diagnostics.guard_f32(input.yaw.clamp(-1.0, 1.0), "input.yaw"),
        };
        let push = chassis_push(&config.arcade, &controls, &arcade, chassis);
        sink.add_chassis_force(diagnostics.guard_vec(push.force, "arcade.force"), chassis.center_of_mass);
        sink.add_torque(diagnostics.guard_vec(push.torque, "arcade.torque"));
    }

    // ---------------------------------------------------------------
    // 7) output
    // ---------------------------------------------------------------
    runtime.step += 1;
    let back = handoff.back_mut();
    back.step = runtime.step;
    back.vehicle.clone_from(&runtime.vehicle);
    back.wheels.clone_from(&runtime.wheels);
    let published = handoff.publish();

    diagnostics.steps += 1;
    diagnostics.last_step_micros = started.elapsed().as_micros() as u64;
    published
}

/// Mean |omega| of engine-driven wheels (rad/s).
fn driven_wheel_speed(config: &ValidatedConfig, wheels: &[WheelRuntimeState]) -> f32 {
    let (sum, count) = wheels
        .iter()
        .zip(&config.driven)
        .filter(|(_, driven)| **driven)
        .fold((0.0, 0usize), |(s, c), (w, _)| (s + w.angular_velocity.abs(), c + 1));
    if count == 0 { 0.0 } else { sum / count as f32 }
}

fn clear_contact_outputs(state: &mut WheelRuntimeState) {
    state.slip = 0.0;
    state.slip_angle = 0.0;
    state.slipping = false;
    state.skidding = false;
    state.skid_magnitude = 0.0;
    state.skid_direction = [0.0; 3];
    state.friction_force = [0.0; 3];
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track_sim::collab::{ForceBuffer, ProbeRequest, SurfaceMaterial};
    use crate::track_sim::handoff;
    use crate::track_sim::setup::VehicleConfig;
    use approx::assert_relative_eq;
    use nalgebra::{Isometry3, Vector3};

    /// Infinite plane at y = 0.
    struct FlatGround;

    impl GroundProbe for FlatGround {
        fn probe(&self, r: &ProbeRequest) -> Option<ProbeHit> {
            let down = -r.direction.y;
            if down <= 1e-6 {
                return None;
            }
            let distance = r.origin.y / down;
            (distance >= 0.0 && distance <= r.length).then(|| ProbeHit {
                distance,
                point: r.origin + r.direction.into_inner() * distance,
                normal: Vector3::y_axis(),
                material: SurfaceMaterial::default(),
                component: None,
            })
        }
    }

    struct NoGround;

    impl GroundProbe for NoGround {
        fn probe(&self, _: &ProbeRequest) -> Option<ProbeHit> {
            None
        }
    }

    fn tank_at(height: f32) -> (ValidatedConfig, RuntimeState, ChassisState) {
        let config = VehicleConfig::tank().validate().expect("tank");
        let runtime = RuntimeState::new(&config);
        let chassis = ChassisState::at_rest(
            Isometry3::translation(0.0, height, 0.0),
            config.chassis_mass,
        );
        (config, runtime, chassis)
    }

    #[test]
    fn airborne_wheels_produce_no_force() {
        let (config, mut runtime, chassis) = tank_at(50.0);
        let (mut writer, reader) = handoff::channel(runtime.to_output());
        let mut sink = ForceBuffer::default();
        let mut diag = Diagnostics::default();
        for w in &mut runtime.wheels {
            w.angular_velocity = 40.0;
        }
        let input = TickInput { throttle: 1.0, ..TickInput::with_dt(1.0 / 60.0) };
        run_tick(&config, &mut runtime, &input, &chassis, &NoGround, &mut sink, &mut diag, &mut writer);

        assert!(sink.is_empty());
        let out = reader.latest();
        assert_eq!(out.step, 1);
        for w in &out.wheels {
            assert!(w.in_air());
            assert_eq!(w.compression_ratio, 0.0);
            assert_eq!(w.spring_force, 0.0);
            assert_eq!(w.friction_force, [0.0; 3]);
        }
    }

    #[test]
    fn grounded_tank_is_held_up_by_its_springs() {
        // wheel centres 0.55 below the body origin, rest at ratio 0.5
        let (config, mut runtime, chassis) = tank_at(0.9);
        let (mut writer, _reader) = handoff::channel(runtime.to_output());
        let mut sink = ForceBuffer::default();
        let mut diag = Diagnostics::default();
        let out = run_tick(
            &config,
            &mut runtime,
            &TickInput::with_dt(1.0 / 60.0),
            &chassis,
            &FlatGround,
            &mut sink,
            &mut diag,
            &mut writer,
        );
        assert!(out.wheels.iter().all(|w| w.in_contact));
        assert!(sink.net_force().y > 0.0);
        assert_eq!(diag.probe_queries, 8);
    }

    #[test]
    fn batched_probes_match_per_wheel_probes() {
        let (config, runtime, chassis) = tank_at(0.85);
        let mut batched = config.clone().into_inner();
        batched.flags.batch_probes = true;
        let batched = batched.validate().expect("batched tank");

        let run = |config: &ValidatedConfig| {
            let mut runtime = runtime.clone();
            let (mut writer, _r) = handoff::channel(runtime.to_output());
            let mut sink = ForceBuffer::default();
            let mut diag = Diagnostics::default();
            run_tick(config, &mut runtime, &TickInput::with_dt(0.01), &chassis, &FlatGround, &mut sink, &mut diag, &mut writer);
            sink.net_force()
        };
        assert_eq!(run(&config), run(&batched));
    }

    #[test]
    fn disabled_suspension_reads_as_airborne() {
        let (config, mut runtime, chassis) = tank_at(0.9);
        let mut cfg = config.into_inner();
        cfg.flags.suspension_enabled = false;
        let config = cfg.validate().expect("tank");
        let (mut writer, _r) = handoff::channel(runtime.to_output());
        let mut sink = ForceBuffer::default();
        let mut diag = Diagnostics::default();
        let out = run_tick(&config, &mut runtime, &TickInput::with_dt(0.01), &chassis, &FlatGround, &mut sink, &mut diag, &mut writer);
        assert!(sink.is_empty());
        assert!(out.wheels.iter().all(|w| w.in_air()));
        assert_eq!(diag.probe_queries, 0);
    }

    #[test]
    fn constraint_mode_emits_constraints_not_spring_forces() {
        let (config, mut runtime, chassis) = tank_at(0.9);
        let mut cfg = config.into_inner();
        cfg.suspension_mode = SuspensionMode::Constraint;
        cfg.flags.wheel_friction_enabled = false;
        let config = cfg.validate().expect("tank");
        let (mut writer, _r) = handoff::channel(runtime.to_output());
        let mut sink = ForceBuffer::default();
        let mut diag = Diagnostics::default();
        run_tick(&config, &mut runtime, &TickInput::with_dt(0.01), &chassis, &FlatGround, &mut sink, &mut diag, &mut writer);
        assert_eq!(sink.commands.len(), 8);
        assert!(sink.commands.iter().all(|c| matches!(c, crate::track_sim::collab::ForceCommand::Constraint(_))));
    }

    #[test]
    fn nan_input_is_guarded() {
        let (config, mut runtime, chassis) = tank_at(0.9);
        let (mut writer, _r) = handoff::channel(runtime.to_output());
        let mut sink = ForceBuffer::default();
        let mut diag = Diagnostics::default();
        let input = TickInput { throttle: f32::NAN, ..TickInput::with_dt(0.01) };
        let out = run_tick(&config, &mut runtime, &input, &chassis, &FlatGround, &mut sink, &mut diag, &mut writer);
        assert!(diag.numeric_guards >= 1);
        assert_eq!(out.vehicle.controls.throttle, 0.0);
        assert!(sink.net_force().iter().all(|c| c.is_finite()));
    }

    #[test]
    fn moving_chassis_feels_drag_at_its_centre_of_mass() {
        let (config, mut runtime, mut chassis) = tank_at(50.0);
        chassis.linear_velocity = Vector3::new(0.0, 0.0, 10.0);
        let (mut writer, _r) = handoff::channel(runtime.to_output());
        let mut sink = ForceBuffer::default();
        let mut diag = Diagnostics::default();
        run_tick(&config, &mut runtime, &TickInput::with_dt(0.01), &chassis, &NoGround, &mut sink, &mut diag, &mut writer);

        let aero = &config.aerodynamics;
        let expected = 0.5 * aero.air_density * aero.area * 100.0 * aero.drag_coefficient;
        assert_eq!(sink.commands.len(), 1);
        match sink.commands[0] {
            crate::track_sim::collab::ForceCommand::ChassisForce { force, point } => {
                assert_relative_eq!(force.z, -expected, max_relative = 1e-5);
                assert_eq!(point, chassis.center_of_mass);
            }
            ref other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn stabilizer_holds_altitude_through_the_sink() {
        let (config, mut runtime, mut chassis) = tank_at(50.0);
        let mut cfg = config.into_inner();
        cfg.arcade.stabilize.enabled = true;
        cfg.arcade.stabilize.altitude_hold_z = 1.0;
        let config = cfg.validate().expect("tank");
        chassis.linear_velocity = Vector3::new(0.0, -2.0, 0.0);
        let (mut writer, _r) = handoff::channel(runtime.to_output());
        let mut sink = ForceBuffer::default();
        let mut diag = Diagnostics::default();
        run_tick(&config, &mut runtime, &TickInput::with_dt(0.01), &chassis, &NoGround, &mut sink, &mut diag, &mut writer);

        // stabilizer plus a little upward drag from the fall
        assert!(sink.net_force().y > 2.0 * config.chassis_mass);
        assert_eq!(sink.net_torque(), Vector3::zeros());
    }
}
