/// Application state and router builder
///
/// This module defines the shared application state and provides
/// a function to build the Axum router with all routes and middleware.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use shellhacks_api::{app::{build_router, AppState}, config::Config};
/// use shellhacks_shared::lifecycle::ApplicantLifecycle;
///
/// # async fn example(lifecycle: ApplicantLifecycle) -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let state = AppState::new(Arc::new(lifecycle), config);
/// let app = build_router(state);
///
/// let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
/// axum::serve(listener, app).await?;
/// # Ok(())
/// # }
/// ```
use crate::{
    config::Config,
    middleware::{
        auth::{admin_auth_layer, applicant_auth_layer},
        security::SecurityHeadersLayer,
    },
    routes,
};
use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use shellhacks_shared::lifecycle::ApplicantLifecycle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Largest accepted multipart body on `/apply`
pub const MAX_APPLICATION_BYTES: usize = 10 * 1024 * 1024;

/// Shared application state
///
/// Cloned for each request handler via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Arc<ApplicantLifecycle>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(lifecycle: Arc<ApplicantLifecycle>, config: Config) -> Self {
        Self {
            lifecycle,
            config: Arc::new(config),
        }
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /
/// ├── GET /health
/// └── /v1/
///     ├── /applicants/                 public
///     │   ├── POST /register
///     │   ├── POST /confirm-email
///     │   ├── POST /resend-confirmation
///     │   ├── POST /login
///     │   ├── POST /forgot-password
///     │   ├── POST /reset-password
///     │   ├── POST /apply              applicant session
///     │   └── GET  /me                 applicant session
///     └── /admin/                      dashboard password
///         ├── GET  /applicants
///         ├── GET  /applicants/:shell_id
///         ├── POST /accept
///         ├── POST /confirm
///         ├── POST /unconfirm
///         ├── POST /check-in
///         ├── POST /remind/apply
///         └── POST /remind/confirm
/// ```
///
/// # Middleware Stack
///
/// Applied in order (bottom to top):
/// 1. Logging (tower-http TraceLayer)
/// 2. CORS (tower-http CorsLayer)
/// 3. Security headers
/// 4. Authentication (per route group)
pub fn build_router(state: AppState) -> Router {
    let health_routes = Router::new().route("/health", get(routes::health::health_check));

    let public_routes = Router::new()
        .route("/register", post(routes::applicants::register))
        .route("/confirm-email", post(routes::applicants::confirm_email))
        .route("/resend-confirmation", post(routes::applicants::resend_confirmation))
        .route("/login", post(routes::applicants::login))
        .route("/forgot-password", post(routes::applicants::forgot_password))
        .route("/reset-password", post(routes::applicants::reset_password));

    let session_routes = Router::new()
        .route(
            "/apply",
            post(routes::applicants::apply).layer(DefaultBodyLimit::max(MAX_APPLICATION_BYTES)),
        )
        .route("/me", get(routes::applicants::me))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            applicant_auth_layer,
        ));

    let admin_routes = Router::new()
        .route("/applicants", get(routes::admin::list_applicants))
        .route("/applicants/:shell_id", get(routes::admin::get_applicant))
        .route("/accept", post(routes::admin::accept))
        .route("/confirm", post(routes::admin::confirm))
        .route("/unconfirm", post(routes::admin::unconfirm))
        .route("/check-in", post(routes::admin::check_in))
        .route("/remind/apply", post(routes::admin::remind_apply))
        .route("/remind/confirm", post(routes::admin::remind_confirm))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            admin_auth_layer,
        ));

    let v1_routes = Router::new()
        .nest("/applicants", public_routes.merge(session_routes))
        .nest("/admin", admin_routes);

    Router::new()
        .merge(health_routes)
        .nest("/v1", v1_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_layer(&state.config.api.cors_origins))
        .layer(SecurityHeadersLayer::new(state.config.api.production))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|origin| origin == "*") {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .max_age(Duration::from_secs(3600))
}
