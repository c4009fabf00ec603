//! HTTP and `WebSocket` front end for the multiverse engine.
//!
//! This crate provides an Axum server that exposes:
//!
//! - **REST endpoints** to create universes, reset the multiverse, and
//!   merge all universes into one.
//! - **`WebSocket` endpoint** (`/ws/updates`) streaming the serialized
//!   multiverse once per tick.
//!
//! # Architecture
//!
//! The REST handlers mutate the shared multiverse under its lock. Each tick
//! the engine hands the serialized multiverse to the [`Hub`], which pushes it
//! to every connected client's bounded queue without waiting on any socket.
//! A slow client only loses its own oldest updates.
//!
//! [`Hub`]: hub::Hub

pub mod error;
pub mod handlers;
pub mod hub;
pub mod router;
pub mod server;
pub mod startup;
pub mod state;
pub mod ws;

// Re-export primary types for convenience.
pub use hub::{BroadcastReport, ConnectionId, Hub, Payload, Sink, SinkError};
pub use router::build_router;
pub use server::{ServerConfig, ServerError, start_server};
pub use startup::{StartupError, spawn_observer};
pub use state::AppState;
