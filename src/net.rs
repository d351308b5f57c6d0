use std::sync::Arc;

use anyhow::Context;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{info, warn};
use uuid::Uuid;

use crate::physics::PhysicsWorld;
use crate::state::SharedGameState;
use crate::track_sim::{GearRequest, TickInput, VehicleConfig};

/// Messages a driver may send. Unknown fields are ignored; missing axes
/// read as zero.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Ping,
    Input {
        #[serde(default)]
        throttle: f32,
        #[serde(default)]
        brake: f32,
        #[serde(default)]
        handbrake: f32,
        #[serde(default)]
        steer: f32,
        #[serde(default)]
        gear: Option<GearRequest>,
        #[serde(default)]
        pitch: f32,
        #[serde(default)]
        roll: f32,
        #[serde(default)]
        yaw: f32,
    },
    /// Ask for the vehicle's full snapshot (save/restore tooling).
    Export,
}

impl ClientMessage {
    pub fn from_json(txt: &str) -> Option<Self> {
        serde_json::from_str(txt).ok()
    }

    pub fn to_input(&self) -> Option<TickInput> {
        match *self {
            ClientMessage::Input { throttle, brake, handbrake, steer, gear, pitch, roll, yaw } => Some(TickInput {
                throttle,
                brake,
                handbrake,
                steering: steer,
                gear_request: gear,
                pitch,
                roll,
                yaw,
                ..TickInput::default()
            }),
            _ => None,
        }
    }
}

pub async fn start_websocket_server(
    listener: TcpListener,
    state: Arc<Mutex<SharedGameState>>,
    physics: Arc<Mutex<PhysicsWorld>>,
    vehicle: VehicleConfig,
) -> anyhow::Result<()> {
    let addr = listener.local_addr().context("reading listener address")?;
    info!(%addr, "websocket listening");

    loop {
        let (raw, peer) = listener.accept().await.context("accepting connection")?;
        let state = Arc::clone(&state);
        let physics = Arc::clone(&physics);
        let vehicle = vehicle.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_client(raw, state, physics, vehicle).await {
                warn!(%peer, error = %e, "client session ended with error");
            }
        });
    }
}

async fn handle_client(
    raw: TcpStream,
    state: Arc<Mutex<SharedGameState>>,
    physics: Arc<Mutex<PhysicsWorld>>,
    vehicle: VehicleConfig,
) -> anyhow::Result<()> {
    let ws = accept_async(raw).await.context("websocket handshake")?;
    let (mut write, mut read) = ws.split();

    // -------------------------------
    // 1) outgoing message channel + send loop
    // -------------------------------
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if write.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    // -------------------------------
    // 2) vehicle + body, registered with the state
    // -------------------------------
    let player_id = Uuid::new_v4().to_string();
    {
        let mut phys = physics.lock().await;
        let spawn = phys.random_spawn_point();
        phys.spawn_tracked_vehicle(player_id.clone(), vehicle, spawn)
            .context("spawning vehicle")?;
        let reader = phys
            .vehicle(&player_id)
            .map(|v| v.reader())
            .context("vehicle vanished after spawn")?;

        let mut game = state.lock().await;
        game.add_entity(&player_id, reader);
        game.register_client(&player_id, tx.clone());
    }
    info!(player = %player_id, "player connected");

    let welcome = serde_json::json!({ "type": "welcome", "player_id": player_id });
    let _ = tx.send(welcome.to_string());

    // -------------------------------
    // 3) receive loop
    // -------------------------------
    while let Some(msg) = read.next().await {
        let Ok(msg) = msg else { break };
        if !msg.is_text() {
            continue;
        }
        let Ok(text) = msg.to_text() else { continue };

        match ClientMessage::from_json(text) {
            Some(ClientMessage::Ping) => {
                let _ = tx.send(r#"{"type":"pong"}"#.to_string());
            }
            Some(message @ ClientMessage::Input { .. }) => {
                if let Some(input) = message.to_input() {
                    state.lock().await.update_input(&player_id, input);
                }
            }
            Some(ClientMessage::Export) => {
                let snapshot = physics.lock().await.export_snapshot(&player_id);
                if let Some(snapshot) = snapshot {
                    let reply = serde_json::json!({ "type": "vehicle_snapshot", "snapshot": snapshot });
                    let _ = tx.send(reply.to_string());
                }
            }
            None => continue,
        }
    }

    info!(player = %player_id, "player disconnected");
    // lock order matches the tick loop: physics, then state
    let mut phys = physics.lock().await;
    let mut game = state.lock().await;
    game.remove_entity(&player_id);
    phys.despawn_vehicle(&player_id);
    Ok(())
}
