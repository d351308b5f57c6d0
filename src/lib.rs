//! Tracked-vehicle simulation server.
//!
//! `track_sim` is the engine-agnostic simulation; everything else hosts it
//! on rapier and serves it over a WebSocket.

pub mod config;
pub mod net;
pub mod physics;
pub mod state;
pub mod suspension_contact;
pub mod track_sim;
pub mod vehicle;
