use approx::assert_relative_eq;
use tracked_vehicle_server::physics::PhysicsWorld;
use tracked_vehicle_server::track_sim::{ConfigError, TickInput, VehicleConfig, VehicleSnapshot};

const DT: f32 = 1.0 / 60.0;

fn world_with_tank(position: [f32; 3]) -> (PhysicsWorld, String) {
    let mut world = PhysicsWorld::new();
    let id = world
        .spawn_tracked_vehicle("tank", VehicleConfig::tank(), position)
        .expect("tank spawns");
    (world, id)
}

fn run(world: &mut PhysicsWorld, id: &str, input: &TickInput, steps: usize) {
    for _ in 0..steps {
        world.set_input(id, input.clone());
        world.step(DT);
    }
}

#[test]
fn tank_settles_on_its_suspension() {
    // wheels just short of the ground at spawn
    let (mut world, id) = world_with_tank([0.0, 1.05, 0.0]);
    run(&mut world, &id, &TickInput::default(), 240);

    let chassis = world.chassis_state(&id).expect("chassis");
    let y = chassis.transform.translation.vector.y;
    assert!((0.7..1.3).contains(&y), "ride height {y}");
    assert!(chassis.linear_velocity.norm() < 0.3, "still moving: {:?}", chassis.linear_velocity);

    let out = world.vehicle(&id).expect("vehicle").reader().latest();
    assert_eq!(out.step, 240);
    for w in &out.wheels {
        assert!(w.in_contact);
        assert!(w.compression_ratio > 0.0 && w.compression_ratio < 1.0);
        assert!(w.spring_force > 0.0);
    }
}

#[test]
fn airborne_tank_feels_no_wheel_forces() {
    let (mut world, id) = world_with_tank([0.0, 30.0, 0.0]);
    run(&mut world, &id, &TickInput { throttle: 1.0, ..TickInput::default() }, 1);

    let vehicle = world.vehicle(&id).expect("vehicle");
    assert!(vehicle.forces().is_empty());
    let out = vehicle.reader().latest();
    assert!(out.wheels.iter().all(|w| w.in_air() && w.spring_force == 0.0));
}

#[test]
fn throttle_drives_the_tank_forward() {
    let (mut world, id) = world_with_tank([0.0, 1.05, 0.0]);
    run(&mut world, &id, &TickInput::default(), 90);
    let start = world.chassis_state(&id).expect("chassis").transform.translation.vector;

    run(&mut world, &id, &TickInput { throttle: 1.0, ..TickInput::default() }, 180);
    let chassis = world.chassis_state(&id).expect("chassis");
    let moved = chassis.transform.translation.vector - start;

    assert!(chassis.forward_speed() > 1.0, "speed {}", chassis.forward_speed());
    assert!(moved.z > 1.0, "moved {moved:?}");
    assert!(moved.x.abs() < 0.5 * moved.z);
    let out = world.vehicle(&id).expect("vehicle").reader().latest();
    assert!(out.vehicle.current_gear() >= 1);
}

#[test]
fn released_throttle_with_full_steer_pivots_in_place() {
    let (mut world, id) = world_with_tank([0.0, 1.05, 0.0]);
    run(&mut world, &id, &TickInput::default(), 90);
    let start = world.chassis_state(&id).expect("chassis").transform.translation.vector;

    run(&mut world, &id, &TickInput { steering: 1.0, ..TickInput::default() }, 120);
    let chassis = world.chassis_state(&id).expect("chassis");

    // right turn: yaw about +Y swings the nose toward +X
    assert!(chassis.angular_velocity.y > 0.05, "yaw rate {}", chassis.angular_velocity.y);
    assert!(chassis.forward().x > 0.05, "heading {:?}", chassis.forward());
    let drift = chassis.transform.translation.vector - start;
    assert!(drift.xz().norm() < 1.5, "drifted {drift:?}");
}

#[test]
fn snapshot_restores_into_a_fresh_world() {
    let (mut world, id) = world_with_tank([0.0, 1.05, 0.0]);
    run(&mut world, &id, &TickInput::default(), 60);
    run(&mut world, &id, &TickInput { throttle: 1.0, ..TickInput::default() }, 60);
    let snapshot = world.export_snapshot(&id).expect("snapshot");

    let text = serde_json::to_string(&snapshot).expect("serialize");
    let snapshot: VehicleSnapshot = serde_json::from_str(&text).expect("parse");

    let (mut other, other_id) = world_with_tank([10.0, 5.0, 10.0]);
    assert_eq!(other.import_snapshot(&other_id, &snapshot), Ok(true));

    let chassis = other.chassis_state(&other_id).expect("chassis");
    let [x, y, z] = snapshot.position;
    assert_relative_eq!(chassis.transform.translation.vector.x, x, epsilon = 1e-5);
    assert_relative_eq!(chassis.transform.translation.vector.y, y, epsilon = 1e-5);
    assert_relative_eq!(chassis.transform.translation.vector.z, z, epsilon = 1e-5);

    let vehicle = other.vehicle(&other_id).expect("vehicle");
    assert_eq!(vehicle.runtime().vehicle.current_gear(), snapshot.gear);
    assert_relative_eq!(vehicle.runtime().vehicle.engine_rpm, snapshot.engine_rpm);
    for (state, wheel) in vehicle.runtime().wheels.iter().zip(&snapshot.wheels) {
        assert_relative_eq!(state.suspension_offset, wheel.suspension_offset);
        assert_relative_eq!(state.angular_velocity, wheel.angular_velocity);
    }

    // carries on simulating from the restored state
    other.step(DT);
    assert_eq!(other.vehicle(&other_id).expect("vehicle").runtime().step, 1);
}

#[test]
fn snapshot_for_another_vehicle_is_rejected() {
    let mut world = PhysicsWorld::new();
    let tank = world.spawn_tracked_vehicle("tank", VehicleConfig::tank(), [0.0, 2.0, 0.0]).expect("tank");
    let dozer = world.spawn_tracked_vehicle("dozer", VehicleConfig::dozer(), [8.0, 2.0, 0.0]).expect("dozer");
    run(&mut world, &dozer, &TickInput::default(), 5);
    let before = world.vehicle(&dozer).expect("dozer").runtime().clone();
    let pose_before = world.chassis_state(&dozer).expect("chassis").transform;

    let snapshot = world.export_snapshot(&tank).expect("snapshot");
    assert_eq!(
        world.import_snapshot(&dozer, &snapshot),
        Err(ConfigError::WheelCountMismatch { expected: 6, actual: 8 })
    );
    assert_eq!(world.vehicle(&dozer).expect("dozer").runtime(), &before);
    assert_eq!(world.chassis_state(&dozer).expect("chassis").transform, pose_before);
}

#[tokio::test]
async fn readers_follow_steps_from_another_task() {
    let (mut world, id) = world_with_tank([0.0, 1.05, 0.0]);
    let mut reader = world.vehicle(&id).expect("vehicle").reader();

    let watcher = tokio::spawn(async move {
        let mut seen = Vec::new();
        while reader.changed().await.is_ok() {
            seen.push(reader.latest_and_mark_seen().step);
        }
        seen
    });

    for _ in 0..5 {
        world.step(DT);
        tokio::task::yield_now().await;
    }
    world.despawn_vehicle(&id);

    let seen = watcher.await.expect("watcher");
    assert!(!seen.is_empty());
    assert!(seen.windows(2).all(|w| w[0] < w[1]));
    assert!(*seen.last().expect("seen") <= 5);
}
