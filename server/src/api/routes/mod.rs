//! API route handlers

pub mod activities;
pub mod health;
pub mod sessions;
pub mod ws;
