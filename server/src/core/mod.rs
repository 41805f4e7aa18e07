//! Core application infrastructure

pub mod achievement;
pub(crate) mod banner;
pub mod cli;
pub mod config;
pub mod connection;
pub mod constants;
pub mod error;
pub mod hub;
pub mod message;
pub mod secret;
pub mod session;
pub mod shutdown;
pub mod storage;

pub use crate::app::CoreApp;
pub use achievement::{AchievementEvaluator, Unlock};
pub use cli::{CliConfig, Commands};
pub use config::{AppConfig, AuthConfig, ServerConfig};
pub use error::CoreError;
pub use hub::{ConnectionId, HubHandle, HubStats};
pub use message::{Message, MessageKind};
pub use secret::{Secret, SecretBackend, SecretManager};
pub use session::{Principal, ResolveError, SessionAuthenticator};
pub use shutdown::ShutdownService;
pub use storage::{AppStorage, DataSubdir};
