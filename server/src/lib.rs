//! ClassPulse realtime activity fan-out backend
//!
//! The core subsystem (`core`) implements a process-wide WebSocket fan-out
//! hub for a multi-tenant educational activity platform: typing, math,
//! piano, and reading mini-apps each submit results over HTTP, and every
//! connected client receives live updates over a single shared WebSocket
//! connection. `api` wires the core up to axum; `data` holds the SQLite
//! persistence and the HTTP-facing ambient cache; `utils` is shared,
//! domain-agnostic helpers used by the other three.

pub mod api;
pub mod app;
pub mod core;
pub mod data;
pub mod utils;
