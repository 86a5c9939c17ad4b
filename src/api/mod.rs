//! HTTP surface: router, shared state, and the server entry point.

use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::{MatchedPath, Request},
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Extension, Router,
};
use secrecy::SecretString;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{
    cors::CorsLayer,
    propagate_header::PropagateHeaderLayer,
    request_id::{MakeRequestId, RequestId, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::info;
use ulid::Ulid;

use crate::auth::{
    ledger::PgSessionLedger, lockout::PgLockoutStore, users::PgCredentialStore, AuthConfig,
    AuthEngine, Role, TokenService,
};
use crate::authz::{
    guard, DomainDirectory, GuardState, GuardTable, OwnershipResolver, PgDomainDirectory,
    RequestLimiter, ResourceKind, RoutePolicy, SlidingWindowLimiter,
};

pub mod handlers;
pub mod openapi;

const RATE_LIMIT_BUDGET: usize = 30;
const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);
const X_REQUEST_ID: &str = "x-request-id";

/// State the handlers share. Guard-chain state lives separately in
/// [`GuardState`].
pub struct AppState {
    pub engine: AuthEngine,
    pub directory: Arc<dyn DomainDirectory>,
}

/// Everything `serve` needs, resolved by the CLI layer.
pub struct ServerSettings {
    pub port: u16,
    pub dsn: String,
    pub access_secret: SecretString,
    pub refresh_secret: SecretString,
    pub config: AuthConfig,
    pub cors_origins: Vec<String>,
}

/// Access policy for every registered route. Deny-by-default: a route
/// missing from this table is refused by the guard.
#[must_use]
pub fn guard_table() -> GuardTable {
    GuardTable::new(vec![
        RoutePolicy::public(Method::GET, "/"),
        RoutePolicy::public(Method::GET, "/health"),
        RoutePolicy::public(Method::GET, "/openapi.json"),
        RoutePolicy::public(Method::POST, "/v1/auth/login").rate_limited(),
        RoutePolicy::public(Method::POST, "/v1/auth/refresh").rate_limited(),
        RoutePolicy::authenticated(Method::POST, "/v1/auth/logout"),
        RoutePolicy::authenticated(Method::POST, "/v1/auth/register").roles(&[Role::Superadmin]),
        RoutePolicy::authenticated(Method::GET, "/v1/auth/me"),
        RoutePolicy::authenticated(Method::GET, "/v1/classes/:id")
            .owned(ResourceKind::Class, "id"),
        RoutePolicy::authenticated(Method::GET, "/v1/subjects/:id")
            .owned(ResourceKind::Subject, "id"),
        RoutePolicy::authenticated(Method::GET, "/v1/enrollments/:id")
            .owned(ResourceKind::Enrollment, "id"),
        RoutePolicy::authenticated(Method::GET, "/v1/grades/:id")
            .owned(ResourceKind::Grade, "id"),
        RoutePolicy::authenticated(Method::GET, "/v1/attendance/:id")
            .owned(ResourceKind::Attendance, "id"),
        RoutePolicy::authenticated(Method::GET, "/v1/reports/:id")
            .owned(ResourceKind::Report, "id"),
    ])
}

#[derive(Clone, Default)]
struct MakeRequestUlid;

impl MakeRequestId for MakeRequestUlid {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        Ulid::new().to_string().parse().ok().map(RequestId::new)
    }
}

/// Assemble the application router. Split out from [`serve`] so tests can
/// drive it with in-memory state.
#[must_use]
pub fn router(state: Arc<AppState>, guard_state: Arc<GuardState>, cors: CorsLayer) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/openapi.json", get(openapi::openapi_json))
        .route("/v1/auth/login", post(handlers::auth::login))
        .route("/v1/auth/refresh", post(handlers::auth::refresh))
        .route("/v1/auth/logout", post(handlers::auth::logout))
        .route("/v1/auth/register", post(handlers::auth::register))
        .route("/v1/auth/me", get(handlers::auth::me))
        .route("/v1/classes/:id", get(handlers::records::get_class))
        .route("/v1/subjects/:id", get(handlers::records::get_subject))
        .route("/v1/enrollments/:id", get(handlers::records::get_enrollment))
        .route("/v1/grades/:id", get(handlers::records::get_grade))
        .route("/v1/attendance/:id", get(handlers::records::get_attendance))
        .route("/v1/reports/:id", get(handlers::records::get_report))
        .layer(middleware::from_fn_with_state(guard_state, guard))
        .layer(Extension(state))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                let route = request.extensions().get::<MatchedPath>().map_or_else(
                    || request.uri().path().to_string(),
                    |matched| matched.as_str().to_string(),
                );
                let request_id = request
                    .headers()
                    .get(X_REQUEST_ID)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                tracing::info_span!(
                    "http.request",
                    http.method = %request.method(),
                    http.route = route,
                    request_id
                )
            }),
        )
        .layer(PropagateHeaderLayer::new(header::HeaderName::from_static(
            X_REQUEST_ID,
        )))
        .layer(SetRequestIdLayer::new(
            header::HeaderName::from_static(X_REQUEST_ID),
            MakeRequestUlid,
        ))
        .layer(cors)
}

fn cors_layer(origins: &[String]) -> Result<CorsLayer> {
    anyhow::ensure!(!origins.is_empty(), "no CORS origins configured");
    let origins = origins
        .iter()
        .map(|origin| {
            origin
                .parse::<HeaderValue>()
                .with_context(|| format!("invalid CORS origin: {origin}"))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to install shutdown handler: {err}");
    }
    info!("shutting down");
}

pub async fn serve(settings: ServerSettings) -> Result<()> {
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .connect(&settings.dsn)
        .await
        .context("failed to connect to the database")?;

    let tokens = Arc::new(TokenService::new(
        &settings.access_secret,
        &settings.refresh_secret,
        &settings.config,
    ));
    let engine = AuthEngine::new(
        Arc::new(PgCredentialStore::new(pool.clone())),
        Arc::new(PgSessionLedger::new(pool.clone())),
        Arc::new(PgLockoutStore::new(pool.clone())),
        Arc::clone(&tokens),
        settings.config.clone(),
    );
    let directory: Arc<dyn DomainDirectory> = Arc::new(PgDomainDirectory::new(pool));
    let resolver = OwnershipResolver::new(Arc::clone(&directory));
    let limiter: Arc<dyn RequestLimiter> =
        Arc::new(SlidingWindowLimiter::new(RATE_LIMIT_BUDGET, RATE_LIMIT_WINDOW));

    let state = Arc::new(AppState { engine, directory });
    let guard_state = Arc::new(GuardState {
        tokens,
        resolver,
        limiter,
        table: guard_table(),
    });

    let app = router(state, guard_state, cors_layer(&settings.cors_origins)?);

    let listener = TcpListener::bind(format!("::0:{}", settings.port)).await?;
    info!(port = settings.port, "listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
