//! API server and routes

mod embedded;
pub mod middleware;
pub mod rate_limit;
pub mod routes;
mod server;
pub mod types;

pub use server::ApiServer;
