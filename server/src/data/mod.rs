//! Data storage layer
//!
//! The Realtime Fan-Out Core's own state (hub indexes, authenticator cache,
//! achievement unlocked-set) lives in memory inside `core::*` and never
//! touches this module. What's here is the thin persistence surface its
//! collaborators need:
//!
//! - `sqlite` — the single embedded database: session records (C2) and the
//!   minimal per-activity result tables the thin CRUD routes write to.
//! - `cache` — in-memory (moka) caching for HTTP-facing ambient concerns
//!   (rate limiting). Unrelated to the hub/authenticator's own locks.
//! - `error` — a unified error type for this layer.

pub mod cache;
pub mod error;
pub mod sqlite;

pub use error::DataError;
pub use sqlite::SqliteService;
