//! API server initialization

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tower_http::compression::CompressionLayer;

use super::embedded;
use super::middleware::{self, AllowedOrigins};
use super::rate_limit::{KeyExtractor, RateLimitState, rate_limit_middleware};
use super::routes::activities::ActivitiesState;
use super::routes::ws::WsState;
use super::routes::{activities, health, sessions, ws};
use crate::core::CoreApp;
use crate::core::constants::{AUTH_BODY_LIMIT, DEFAULT_BODY_LIMIT};
use crate::data::cache::RateLimitBucket;

pub struct ApiServer {
    app: CoreApp,
    allowed_origins: AllowedOrigins,
}

impl ApiServer {
    pub fn new(app: CoreApp) -> Self {
        let allowed_origins = AllowedOrigins::new(&app.config.server.host, app.config.server.port);
        Self {
            app,
            allowed_origins,
        }
    }

    /// Returns CoreApp for graceful shutdown
    pub async fn start(self) -> Result<CoreApp> {
        let Self {
            app,
            allowed_origins,
        } = self;

        let shutdown = app.shutdown.clone();

        let host = app.config.server.host.clone();
        let port = app.config.server.port;
        let addr = SocketAddr::new(host.parse()?, port);

        let ws_state = WsState {
            hub: app.hub.clone(),
            authenticator: app.authenticator.clone(),
        };
        let ws_routes = Router::new()
            .route("/ws", get(ws::ws_upgrade))
            .with_state(ws_state);

        let activities_state = ActivitiesState {
            pool: app.database.pool().clone(),
            hub: app.hub.clone(),
            achievements: app.achievements.clone(),
        };
        let activities_routes = Router::new()
            .route(
                "/typing",
                post(activities::submit_typing_result),
            )
            .route(
                "/typing/{user_id}",
                get(activities::list_typing_results),
            )
            .route("/math", post(activities::submit_math_result))
            .route("/math/{user_id}", get(activities::list_math_results))
            .route("/piano", post(activities::submit_piano_session))
            .route(
                "/piano/{user_id}",
                get(activities::list_piano_sessions),
            )
            .route("/reading", post(activities::submit_reading_session))
            .route(
                "/reading/{user_id}",
                get(activities::list_reading_sessions),
            )
            .with_state(activities_state);

        // Session creation is rate limited per IP — it's the one endpoint an
        // unauthenticated caller can hit repeatedly to mint sessions.
        let sessions_routes = Router::new()
            .route("/sessions", post(sessions::create_session))
            .layer(DefaultBodyLimit::max(AUTH_BODY_LIMIT))
            .with_state(app.authenticator.clone());
        let sessions_routes = if app.config.rate_limit.enabled {
            sessions_routes.layer(axum::middleware::from_fn_with_state(
                RateLimitState {
                    limiter: app.rate_limiter.clone(),
                    bucket: RateLimitBucket::auth(app.config.rate_limit.auth_rpm),
                    key_extractor: KeyExtractor::IpAddress,
                    bypass_header: None,
                },
                rate_limit_middleware,
            ))
        } else {
            sessions_routes
        };

        let router = Router::new()
            .merge(ws_routes)
            .route("/api/v1/health", get(health::health))
            .nest("/api/v1/activities", activities_routes)
            .nest("/api/v1", sessions_routes)
            .fallback(embedded::serve_assets)
            .layer(CompressionLayer::new())
            .layer(middleware::cors(&allowed_origins))
            .layer(DefaultBodyLimit::max(DEFAULT_BODY_LIMIT));

        let listener = TcpListener::bind(addr).await?;
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown.wait())
        .await?;

        Ok(app)
    }
}
