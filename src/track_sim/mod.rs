//! track_sim - engine-agnostic tracked vehicle simulation (pure types + models + step pipeline)

pub mod aero;
pub mod anti_roll;
pub mod arcade;
pub mod collab;
pub mod curve;
pub mod diagnostics;
pub mod differential;
pub mod engine;
pub mod error;
pub mod friction;
pub mod handoff;
pub mod kinematics;
pub mod pipeline;
pub mod setup;
pub mod snapshot;
pub mod steering;
pub mod suspension;
pub mod transmission;
pub mod types;
pub mod wheel;

pub use collab::{ForceBuffer, ForceCommand, ForceSink, GroundProbe, ProbeHit, ProbeRequest};
pub use diagnostics::Diagnostics;
pub use error::ConfigError;
pub use handoff::{HandoffReader, HandoffWriter};
pub use pipeline::{RuntimeState, run_tick};
pub use setup::{ValidatedConfig, VehicleConfig, WheelSetup};
pub use snapshot::{VehicleSnapshot, WheelSnapshot};
pub use types::*;
