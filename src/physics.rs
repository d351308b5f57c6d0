// src/physics.rs
//
// Rapier host for the tracked-vehicle simulation.
//
// Per step:
// 1) refresh the query pipeline so probes see this step's poses
// 2) each vehicle reads its chassis body, runs the simulation step against a
//    RapierGroundProbe and leaves its forces in its ForceBuffer
// 3) buffered forces are applied as impulses (F·dt) to bodies that still exist
// 4) rapier integrates
// 5) bodies that went non-finite or left the world are reset

use std::collections::HashMap;

use nalgebra::{Point3, UnitQuaternion, Vector3};
use rand::Rng;
use rapier3d::prelude::*;
use tracing::{info, warn};

use crate::suspension_contact::RapierGroundProbe;
use crate::track_sim::collab::SuspensionConstraint;
use crate::track_sim::{
    ChassisState, ConfigError, ForceCommand, TickInput, VehicleConfig, VehicleSnapshot,
};
use crate::vehicle::TrackedVehicle;

pub const GROUP_GROUND: Group = Group::from_bits_truncate(0b0001);
pub const GROUP_CHASSIS: Group = Group::from_bits_truncate(0b0010);

pub const GROUND_FRICTION: f32 = 1.2;
const WORLD_LIMIT: f32 = 1_000.0;
const RESET_HEIGHT: f32 = 3.0;

/// A simulated vehicle plus the body it drives and the input captured for
/// the next step.
pub struct HostedVehicle {
    pub body: RigidBodyHandle,
    pub vehicle: TrackedVehicle,
    pub input: TickInput,
}

pub struct PhysicsWorld {
    pub gravity: Vector<Real>,
    pub pipeline: PhysicsPipeline,
    pub island_manager: IslandManager,
    pub broad_phase: DefaultBroadPhase,
    pub narrow_phase: NarrowPhase,
    pub bodies: RigidBodySet,
    pub colliders: ColliderSet,
    pub joints: ImpulseJointSet,
    pub multibody_joints: MultibodyJointSet,
    pub ccd: CCDSolver,
    pub query_pipeline: QueryPipeline, // wheel probes
    pub vehicles: HashMap<String, HostedVehicle>, // vehicle id -> vehicle
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl PhysicsWorld {
    pub fn new() -> Self {
        let mut bodies = RigidBodySet::new();
        let mut colliders = ColliderSet::new();

        // === static ground, top surface at y = 0 ===
        let ground = bodies.insert(RigidBodyBuilder::fixed().translation(vector![0.0, -1.0, 0.0]).build());
        let ground_collider = ColliderBuilder::cuboid(500.0, 1.0, 500.0)
            .collision_groups(InteractionGroups::new(GROUP_GROUND, GROUP_CHASSIS))
            .friction(GROUND_FRICTION)
            .restitution(0.0)
            .build();
        colliders.insert_with_parent(ground_collider, ground, &mut bodies);

        let mut query_pipeline = QueryPipeline::new();
        query_pipeline.update(&colliders);

        info!(bodies = bodies.len(), colliders = colliders.len(), "ground inserted");

        Self {
            gravity: vector![0.0, -crate::track_sim::setup::GRAVITY, 0.0],
            pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies,
            colliders,
            joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd: CCDSolver::new(),
            query_pipeline,
            vehicles: HashMap::new(),
        }
    }

    /// Build a chassis body for `config` at `position` and start simulating
    /// it. Nothing is inserted when the configuration is rejected.
    pub fn spawn_tracked_vehicle(
        &mut self,
        id: impl Into<String>,
        config: VehicleConfig,
        position: [f32; 3],
    ) -> Result<String, ConfigError> {
        let id = id.into();
        let [hx, hy, hz] = config.chassis_half_extents;
        let mass = config.chassis_mass;
        let vehicle = TrackedVehicle::new(id.clone(), config)?;

        let rb = RigidBodyBuilder::dynamic()
            .translation(vector![position[0], position[1], position[2]])
            .linear_damping(0.05)
            .angular_damping(0.5)
            .ccd_enabled(true)
            .build();
        let collider = ColliderBuilder::cuboid(hx, hy, hz)
            .collision_groups(InteractionGroups::new(GROUP_CHASSIS, GROUP_GROUND))
            .mass(mass)
            .friction(0.0) // the wheels carry all ground friction
            .restitution(0.0)
            .build();

        let body = self.bodies.insert(rb);
        self.colliders.insert_with_parent(collider, body, &mut self.bodies);
        if let Some(old) = self.vehicles.insert(id.clone(), HostedVehicle { body, vehicle, input: TickInput::default() }) {
            self.remove_body(old.body);
        }

        info!(vehicle = %id, ?position, ?body, "spawned tracked vehicle");
        Ok(id)
    }

    /// Random spot near the origin, clear of the ground.
    pub fn random_spawn_point(&self) -> [f32; 3] {
        let mut rng = rand::thread_rng();
        [rng.gen_range(-20.0..20.0), RESET_HEIGHT, rng.gen_range(-20.0..20.0)]
    }

    pub fn despawn_vehicle(&mut self, id: &str) -> bool {
        let Some(hosted) = self.vehicles.remove(id) else {
            return false;
        };
        self.remove_body(hosted.body);
        true
    }

    fn remove_body(&mut self, body: RigidBodyHandle) {
        self.bodies.remove(
            body,
            &mut self.island_manager,
            &mut self.colliders,
            &mut self.joints,
            &mut self.multibody_joints,
            true,
        );
    }

    /// Store input for the next step. `dt` is filled in by `step`.
    pub fn set_input(&mut self, id: &str, input: TickInput) {
        if let Some(hosted) = self.vehicles.get_mut(id) {
            hosted.input = input;
        }
    }

    pub fn vehicle(&self, id: &str) -> Option<&TrackedVehicle> {
        self.vehicles.get(id).map(|h| &h.vehicle)
    }

    pub fn vehicle_mut(&mut self, id: &str) -> Option<&mut TrackedVehicle> {
        self.vehicles.get_mut(id).map(|h| &mut h.vehicle)
    }

    pub fn chassis_state(&self, id: &str) -> Option<ChassisState> {
        let hosted = self.vehicles.get(id)?;
        self.bodies.get(hosted.body).map(chassis_from_body)
    }

    pub fn ground_probe(&self, id: &str) -> Option<RapierGroundProbe<'_>> {
        let hosted = self.vehicles.get(id)?;
        Some(RapierGroundProbe {
            query: &self.query_pipeline,
            bodies: &self.bodies,
            colliders: &self.colliders,
            exclude: hosted.body,
        })
    }

    pub fn export_snapshot(&self, id: &str) -> Option<VehicleSnapshot> {
        let hosted = self.vehicles.get(id)?;
        let chassis = chassis_from_body(self.bodies.get(hosted.body)?);
        Some(hosted.vehicle.export_snapshot(&chassis))
    }

    /// Restore a vehicle and put its body at the snapshot pose.
    /// Returns `Ok(false)` when there is no such vehicle.
    pub fn import_snapshot(&mut self, id: &str, snapshot: &VehicleSnapshot) -> Result<bool, ConfigError> {
        let Some(hosted) = self.vehicles.get_mut(id) else {
            return Ok(false);
        };
        let Some(body) = self.bodies.get_mut(hosted.body) else {
            return Ok(false);
        };
        let chassis = hosted.vehicle.import_snapshot(snapshot)?;
        body.set_position(chassis.transform, true);
        body.set_linvel(chassis.linear_velocity, true);
        body.set_angvel(chassis.angular_velocity, true);
        Ok(true)
    }

    pub fn step(&mut self, dt: Real) {
        let hooks = ();
        let events = ();

        // 1) probes read the poses rapier left at the end of the last step
        self.query_pipeline.update(&self.colliders);

        // 2) simulate every vehicle against the scene
        for hosted in self.vehicles.values_mut() {
            let Some(body) = self.bodies.get(hosted.body) else {
                continue;
            };
            let chassis = chassis_from_body(body);
            let probe = RapierGroundProbe {
                query: &self.query_pipeline,
                bodies: &self.bodies,
                colliders: &self.colliders,
                exclude: hosted.body,
            };
            let input = TickInput { dt, ..hosted.input.clone() };
            hosted.vehicle.step(&input, &chassis, &probe);
            if let Some(request) = hosted.input.gear_request.take() {
                tracing::debug!(vehicle = %hosted.vehicle.id(), ?request, "gear request consumed");
            }
        }

        // 3) flush buffered forces
        for hosted in self.vehicles.values_mut() {
            let Some(body) = self.bodies.get_mut(hosted.body) else {
                hosted.vehicle.drain_forces().for_each(drop);
                continue;
            };
            let lengths = constraint_lengths(&hosted.vehicle);
            for command in hosted.vehicle.drain_forces() {
                match command {
                    ForceCommand::AtPoint { force, point, .. } | ForceCommand::ChassisForce { force, point } => {
                        body.apply_impulse_at_point(force * dt, point, true);
                    }
                    ForceCommand::Torque(torque) => body.apply_torque_impulse(torque * dt, true),
                    ForceCommand::Constraint(c) => {
                        let length = lengths.get(c.wheel).copied().flatten();
                        if let Some(force) = length.map(|l| constraint_force(&c, l, body)) {
                            body.apply_impulse_at_point(force * dt, c.anchor, true);
                        }
                    }
                }
            }
        }

        // 4) integrate
        self.pipeline.step(
            &self.gravity,
            &IntegrationParameters { dt, ..IntegrationParameters::default() },
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.joints,
            &mut self.multibody_joints,
            &mut self.ccd,
            Some(&mut self.query_pipeline),
            &hooks,
            &events,
        );

        // 5) keep exploding bodies inside the world
        for (handle, body) in self.bodies.iter_mut() {
            let pos = *body.translation();
            let bad = !pos.iter().all(|c| c.is_finite()) || pos.iter().any(|c| c.abs() > WORLD_LIMIT);
            if bad {
                body.set_translation(vector![0.0, RESET_HEIGHT, 0.0], true);
                body.set_rotation(UnitQuaternion::identity(), true);
                body.set_linvel(Vector3::zeros(), true);
                body.set_angvel(Vector3::zeros(), true);
                warn!(?handle, ?pos, "reset exploding body");
            }
        }
    }
}

/// Chassis view of a rapier body (centre of mass in world space).
pub fn chassis_from_body(body: &RigidBody) -> ChassisState {
    ChassisState {
        transform: *body.position(),
        linear_velocity: *body.linvel(),
        angular_velocity: *body.angvel(),
        center_of_mass: *body.center_of_mass(),
        mass: body.mass(),
    }
}

/// Current anchor-to-wheel-centre length per wheel, from the last step's
/// probe hits.
fn constraint_lengths(vehicle: &TrackedVehicle) -> Vec<Option<f32>> {
    vehicle
        .runtime()
        .wheels
        .iter()
        .zip(&vehicle.config().wheels)
        .map(|(state, setup)| state.hit.map(|hit| (hit.distance - setup.radius).max(0.0)))
        .collect()
}

/// Spring-damper along the constraint axis; pushes only.
fn constraint_force(c: &SuspensionConstraint, length: f32, body: &RigidBody) -> Vector3<f32> {
    if !c.enabled {
        return Vector3::zeros();
    }
    let axis = c.axis.into_inner();
    let anchor: Point3<f32> = c.anchor;
    let closing = body.velocity_at_point(&anchor).dot(&axis);
    let push = c.stiffness * (c.target_length - length) + c.damping * closing;
    -axis * push.max(0.0)
}
