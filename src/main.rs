use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info};

use tracked_vehicle_server::config::ServerConfig;
use tracked_vehicle_server::net::start_websocket_server;
use tracked_vehicle_server::physics::PhysicsWorld;
use tracked_vehicle_server::state::SharedGameState;

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = matches!(std::env::var("LOG_FORMAT").as_deref(), Ok("json"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }

    std::panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::capture();
        tracing::error!(%info, ?backtrace, "panic");
    }));
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env locally; fine when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = ServerConfig::from_env();
    let vehicle = config.load_vehicle()?;
    vehicle
        .clone()
        .validate()
        .with_context(|| format!("vehicle config {:?} cannot be simulated", vehicle.name))?;
    info!(?config, vehicle = %vehicle.name, "starting tracked vehicle server");

    let state = Arc::new(Mutex::new(SharedGameState::new()));
    let physics = Arc::new(Mutex::new(PhysicsWorld::new()));

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;

    let ws_state = Arc::clone(&state);
    let ws_physics = Arc::clone(&physics);
    tokio::spawn(async move {
        if let Err(e) = start_websocket_server(listener, ws_state, ws_physics, vehicle).await {
            error!(error = %e, "websocket server stopped");
        }
    });

    // Fixed timestep
    let dt = config.tick_dt();
    let mut ticker = interval(config.tick_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let mut phys = physics.lock().await;
        let mut game = state.lock().await;

        // input captured before the step begins
        game.push_inputs(&mut phys);
        phys.step(dt);

        game.tick += 1;
        game.broadcast_snapshot(&phys);
    }
}
