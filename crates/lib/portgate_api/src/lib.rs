//! # portgate_api
//!
//! HTTP surface for Portgate: the portal router (login, application list,
//! launch, admin) and the gateway router (token launch, framed
//! application, keep-alive, iframe validation). Both share one
//! [`AppState`].

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod pages;
pub mod routes;
pub mod services;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post, put};
use portgate_core::gateway::GatewaySessions;
use portgate_core::gateway::store::MemoryGatewayStore;
use portgate_core::liveness::Prober;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};

use crate::config::ApiConfig;
use crate::handlers::{admin, apps, auth, gateway, health};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// SQLite connection pool.
    pub pool: SqlitePool,
    /// API configuration.
    pub config: ApiConfig,
    /// Gateway session layer.
    pub gateway: Arc<GatewaySessions>,
    /// Liveness prober for registered applications.
    pub prober: Prober,
}

impl AppState {
    /// State with an in-process gateway store and a prober aimed at
    /// `config.app_host`.
    pub fn new(pool: SqlitePool, config: ApiConfig) -> Result<Self, reqwest::Error> {
        let gateway = GatewaySessions::new(
            Arc::new(MemoryGatewayStore::new()),
            config.gateway_session_ttl,
            config.iframe_token_ttl,
        );
        let prober = Prober::new(
            config.app_host.clone(),
            config.probe_timeout,
            config.probe_concurrency,
        )?;
        Ok(Self {
            pool,
            config,
            gateway: Arc::new(gateway),
            prober,
        })
    }
}

/// Builds the portal router.
pub fn portal_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (no session required)
    let public = Router::new()
        .route(routes::GET_HEALTH, get(health::portal_health_handler))
        .route(routes::POST_AUTH_LOGIN, post(auth::login_handler))
        .route(routes::POST_AUTH_LOGOUT, post(auth::logout_handler))
        .route(routes::POST_AUTH_REFRESH, post(auth::refresh_handler));

    // Admin routes (session + admin role)
    let admin_routes = Router::new()
        .route(
            routes::ADMIN_USERS,
            get(admin::list_users_handler).post(admin::create_user_handler),
        )
        .route(
            routes::ADMIN_USERS_ID,
            put(admin::update_user_handler).delete(admin::delete_user_handler),
        )
        .route(
            routes::PUT_ADMIN_USERS_ID_GROUPS,
            put(admin::set_user_groups_handler),
        )
        .route(routes::GET_ADMIN_GROUPS, get(admin::list_groups_handler))
        .route(
            routes::ADMIN_APPS,
            get(admin::list_apps_handler).post(admin::register_app_handler),
        )
        .route(routes::DELETE_ADMIN_APPS_ID, delete(admin::delete_app_handler))
        .route(
            routes::PUT_ADMIN_APPS_ID_PERMISSIONS,
            put(admin::set_app_permissions_handler),
        )
        .route(routes::GET_ADMIN_SCAN, get(admin::scan_handler))
        .layer(axum::middleware::from_fn(middleware::auth::require_admin));

    // Protected routes (require a portal session)
    let protected = Router::new()
        .route(routes::GET_AUTH_ME, get(auth::me_handler))
        .route(routes::GET_API_APPS, get(apps::list_apps_handler))
        .route(routes::POST_API_APPS_ID_LAUNCH, post(apps::launch_handler))
        .merge(admin_routes)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_session,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(cors)
        .with_state(state)
}

/// Builds the gateway router.
pub fn gateway_router(state: AppState) -> Router {
    Router::new()
        .route(routes::GET_HEALTH, get(health::gateway_health_handler))
        .route(
            routes::LAUNCH_ID,
            get(gateway::launch_query_handler).post(gateway::launch_form_handler),
        )
        .route(routes::APP_ID, get(gateway::app_redirect_handler))
        .route(routes::APP_ID_ROOT, get(gateway::serve_app_handler))
        .route(routes::POST_APP_ID_REFRESH, post(gateway::refresh_handler))
        .route(routes::POST_APP_ID_SIGN_OUT, post(gateway::sign_out_handler))
        .route(
            routes::GET_VALIDATE_SESSION,
            get(gateway::validate_session_handler),
        )
        .with_state(state)
}
