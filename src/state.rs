use std::collections::HashMap;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

use crate::physics::PhysicsWorld;
use crate::track_sim::{ChassisState, HandoffReader, TickInput, TickOutput, Vec3, WheelRuntimeState, v3};

/// Ticks without a fresh input message before a driver's controls are
/// released (half a second at 60 Hz).
pub const INPUT_TIMEOUT_TICKS: u64 = 30;

/// A connected driver: the input captured for the next step and a reader
/// on the vehicle's published steps.
pub struct Entity {
    pub id: String,
    pub input: TickInput,
    pub last_input_tick: u64,
    pub reader: HandoffReader,
}

#[derive(Debug, Clone, Serialize)]
pub struct WheelFrame {
    pub position: Vec3,
    pub in_air: bool,
    pub suspension_offset: f32,  // m
    pub steer_angle: f32,        // rad
    pub rotation_angle: f32,     // deg
    pub rotation_speed: f32,     // deg/s
    pub spring_force: f32,       // N
    pub drive_torque: f32,       // N·m
    pub slipping: bool,
    pub skidding: bool,
    pub skid_magnitude: f32,
    pub abs: bool,
    pub tcs: bool,
}

impl From<&WheelRuntimeState> for WheelFrame {
    fn from(w: &WheelRuntimeState) -> Self {
        Self {
            position: w.world_position,
            in_air: w.in_air(),
            suspension_offset: w.suspension_offset,
            steer_angle: w.steer_angle,
            rotation_angle: w.rotation_angle_degrees(),
            rotation_speed: w.rotation_angular_velocity_degrees(),
            spring_force: w.spring_force,
            drive_torque: w.drive_torque,
            slipping: w.slipping,
            skidding: w.skidding,
            skid_magnitude: w.skid_magnitude,
            abs: w.abs_active,
            tcs: w.tcs_active,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VehicleFrame {
    pub id: String,
    pub step: u64,
    pub position: Vec3,
    pub rotation: [f32; 4], // i, j, k, w
    pub speed: f32,         // m/s along the chassis forward axis
    pub gear: i32,
    pub engine_rpm: f32,
    pub track_split: [f32; 2], // left, right
    pub wheels: Vec<WheelFrame>,
}

impl VehicleFrame {
    pub fn new(id: &str, output: &TickOutput, chassis: &ChassisState) -> Self {
        let q = chassis.transform.rotation.quaternion();
        Self {
            id: id.to_string(),
            step: output.step,
            position: v3(&chassis.transform.translation.vector),
            rotation: [q.i, q.j, q.k, q.w],
            speed: output.vehicle.forward_speed,
            gear: output.vehicle.current_gear(),
            engine_rpm: output.vehicle.engine_rpm,
            track_split: [output.vehicle.track_split.left, output.vehicle.track_split.right],
            wheels: output.wheels.iter().map(WheelFrame::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub tick: u64,
    pub vehicles: Vec<VehicleFrame>,
}

pub struct SharedGameState {
    pub tick: u64,
    pub clients: HashMap<String, UnboundedSender<String>>,
    pub entities: HashMap<String, Entity>,
}

impl Default for SharedGameState {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedGameState {
    pub fn new() -> Self {
        Self {
            tick: 0,
            clients: HashMap::new(),
            entities: HashMap::new(),
        }
    }

    pub fn register_client(&mut self, id: &str, tx: UnboundedSender<String>) {
        self.clients.insert(id.to_string(), tx);
    }

    pub fn add_entity(&mut self, id: &str, reader: HandoffReader) {
        self.entities.insert(
            id.to_string(),
            Entity { id: id.to_string(), input: TickInput::default(), last_input_tick: self.tick, reader },
        );
    }

    pub fn remove_entity(&mut self, id: &str) {
        self.entities.remove(id);
        self.clients.remove(id);
    }

    pub fn update_input(&mut self, id: &str, input: TickInput) {
        let tick = self.tick;
        if let Some(entity) = self.entities.get_mut(id) {
            // a pending gear request survives until the next step consumes it
            let gear_request = input.gear_request.or(entity.input.gear_request);
            entity.input = TickInput { gear_request, ..input };
            entity.last_input_tick = tick;
        }
    }

    /// Hand every captured input to the physics world. Gear requests are
    /// one-shot and cleared here; a driver that went quiet for longer than
    /// [`INPUT_TIMEOUT_TICKS`] has its controls released.
    pub fn push_inputs(&mut self, physics: &mut PhysicsWorld) {
        let tick = self.tick;
        for entity in self.entities.values_mut() {
            if tick.saturating_sub(entity.last_input_tick) > INPUT_TIMEOUT_TICKS {
                let gear_request = entity.input.gear_request;
                entity.input = TickInput { gear_request, ..TickInput::default() };
            }
            physics.set_input(&entity.id, entity.input.clone());
            entity.input.gear_request = None;
        }
    }

    /// Latest published step of every vehicle, posed from its body.
    pub fn build_snapshot(&self, physics: &PhysicsWorld) -> Snapshot {
        let mut vehicles = Vec::with_capacity(self.entities.len());
        for entity in self.entities.values() {
            let Some(chassis) = physics.chassis_state(&entity.id) else {
                continue;
            };
            let output = entity.reader.latest();
            vehicles.push(VehicleFrame::new(&entity.id, &output, &chassis));
        }
        vehicles.sort_by(|a, b| a.id.cmp(&b.id));
        Snapshot { kind: "snapshot", tick: self.tick, vehicles }
    }

    /// Build and send a snapshot of all vehicles to all clients.
    pub fn broadcast_snapshot(&mut self, physics: &PhysicsWorld) {
        let json = match serde_json::to_string(&self.build_snapshot(physics)) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "snapshot serialization failed");
                return;
            }
        };
        self.clients.retain(|_, tx| tx.send(json.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track_sim::{GearRequest, VehicleConfig};
    use tokio::sync::mpsc;

    fn world_with(state: &mut SharedGameState, id: &str) -> PhysicsWorld {
        let mut physics = PhysicsWorld::new();
        physics.spawn_tracked_vehicle(id, VehicleConfig::tank(), [0.0, 2.0, 0.0]).expect("tank");
        let reader = physics.vehicle(id).expect("vehicle").reader();
        state.add_entity(id, reader);
        physics
    }

    #[test]
    fn gear_request_is_delivered_once() {
        let mut state = SharedGameState::new();
        let mut physics = world_with(&mut state, "a");
        state.update_input("a", TickInput { gear_request: Some(GearRequest::Up), ..TickInput::default() });
        state.update_input("a", TickInput { throttle: 0.5, ..TickInput::default() });
        assert_eq!(state.entities["a"].input.gear_request, Some(GearRequest::Up));

        state.push_inputs(&mut physics);
        assert_eq!(physics.vehicles["a"].input.gear_request, Some(GearRequest::Up));
        assert_eq!(physics.vehicles["a"].input.throttle, 0.5);
        assert_eq!(state.entities["a"].input.gear_request, None);
    }

    #[test]
    fn silent_driver_has_controls_released() {
        let mut state = SharedGameState::new();
        let mut physics = world_with(&mut state, "a");
        state.update_input("a", TickInput { throttle: 1.0, steering: 0.5, ..TickInput::default() });

        state.tick = INPUT_TIMEOUT_TICKS;
        state.push_inputs(&mut physics);
        assert_eq!(physics.vehicles["a"].input.throttle, 1.0);

        state.tick = INPUT_TIMEOUT_TICKS + 1;
        state.push_inputs(&mut physics);
        assert_eq!(physics.vehicles["a"].input.throttle, 0.0);
        assert_eq!(physics.vehicles["a"].input.steering, 0.0);

        // a fresh message takes over again
        state.update_input("a", TickInput { throttle: 0.3, ..TickInput::default() });
        state.push_inputs(&mut physics);
        assert_eq!(physics.vehicles["a"].input.throttle, 0.3);
    }

    #[test]
    fn snapshot_reflects_published_step() {
        let mut state = SharedGameState::new();
        let mut physics = world_with(&mut state, "a");
        state.push_inputs(&mut physics);
        physics.step(1.0 / 60.0);
        physics.step(1.0 / 60.0);

        let snap = state.build_snapshot(&physics);
        assert_eq!(snap.vehicles.len(), 1);
        assert_eq!(snap.vehicles[0].step, 2);
        assert_eq!(snap.vehicles[0].wheels.len(), 8);

        let json = serde_json::to_value(&snap).expect("json");
        assert_eq!(json["type"], "snapshot");
    }

    #[test]
    fn closed_clients_are_dropped_on_broadcast() {
        let mut state = SharedGameState::new();
        let physics = world_with(&mut state, "a");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (dead_tx, dead_rx) = mpsc::unbounded_channel();
        drop(dead_rx);
        state.register_client("a", tx);
        state.register_client("b", dead_tx);

        state.broadcast_snapshot(&physics);
        assert!(rx.try_recv().is_ok());
        assert_eq!(state.clients.len(), 1);
    }
}
