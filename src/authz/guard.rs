//! Route guard chain: rate limit, authenticate, role check, ownership check.
//!
//! Policies are declared per route pattern in a [`GuardTable`] and enforced by
//! a single middleware, so handlers never re-implement access control.

use axum::{
    body::{to_bytes, Body},
    extract::{MatchedPath, Request, State},
    http::{header, HeaderMap, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::auth::{AuthenticatedUser, Role, TokenService};

use super::ownership::{OwnershipResolver, ResourceKind};
use super::rate_limit::{RateLimitDecision, RequestLimiter};

const MAX_GUARD_BODY_BYTES: usize = 256 * 1024;

/// Where an ownership-gated route carries the target resource id.
#[derive(Clone, Copy, Debug)]
pub struct OwnershipSpec {
    pub kind: ResourceKind,
    /// Path-param, JSON body field, or query-param name, tried in that order.
    pub id_field: &'static str,
}

/// Access policy for one route pattern.
#[derive(Clone, Debug)]
pub struct RoutePolicy {
    pub method: Method,
    pub path: &'static str,
    pub public: bool,
    pub rate_limited: bool,
    pub roles: &'static [Role],
    pub ownership: Option<OwnershipSpec>,
}

impl RoutePolicy {
    #[must_use]
    pub fn public(method: Method, path: &'static str) -> Self {
        Self {
            method,
            path,
            public: true,
            rate_limited: false,
            roles: &[],
            ownership: None,
        }
    }

    #[must_use]
    pub fn authenticated(method: Method, path: &'static str) -> Self {
        Self {
            method,
            path,
            public: false,
            rate_limited: false,
            roles: &[],
            ownership: None,
        }
    }

    #[must_use]
    pub fn rate_limited(mut self) -> Self {
        self.rate_limited = true;
        self
    }

    #[must_use]
    pub fn roles(mut self, roles: &'static [Role]) -> Self {
        self.roles = roles;
        self
    }

    #[must_use]
    pub fn owned(mut self, kind: ResourceKind, id_field: &'static str) -> Self {
        self.ownership = Some(OwnershipSpec { kind, id_field });
        self
    }
}

/// All route policies, looked up by method and matched path pattern.
#[derive(Clone, Debug, Default)]
pub struct GuardTable {
    policies: Vec<RoutePolicy>,
}

impl GuardTable {
    #[must_use]
    pub fn new(policies: Vec<RoutePolicy>) -> Self {
        Self { policies }
    }

    #[must_use]
    pub fn find(&self, method: &Method, path: &str) -> Option<&RoutePolicy> {
        self.policies
            .iter()
            .find(|policy| policy.method == *method && policy.path == path)
    }
}

/// Everything the guard middleware needs, shared across requests.
pub struct GuardState {
    pub tokens: Arc<TokenService>,
    pub resolver: OwnershipResolver,
    pub limiter: Arc<dyn RequestLimiter>,
    pub table: GuardTable,
}

/// Guard middleware. Runs rate limiting, bearer authentication, role
/// membership, and ownership resolution in order; the first failing stage
/// produces the response and later stages never run.
pub async fn guard(
    State(state): State<Arc<GuardState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(matched) = request.extensions().get::<MatchedPath>().cloned() else {
        // Unrouted request: let the router produce its 404.
        return next.run(request).await;
    };
    let method = request.method().clone();
    let Some(policy) = state.table.find(&method, matched.as_str()).cloned() else {
        warn!(method = %method, route = matched.as_str(), "route has no guard policy");
        return deny(StatusCode::FORBIDDEN, "Forbidden");
    };

    if policy.rate_limited {
        let caller = client_ip(request.headers()).unwrap_or_else(|| "unknown".to_string());
        if state.limiter.check(&caller) == RateLimitDecision::Limited {
            return deny(StatusCode::TOO_MANY_REQUESTS, "Too many requests");
        }
    }

    if policy.public {
        return next.run(request).await;
    }

    let actor = match authenticate(&state.tokens, &request) {
        Ok(actor) => actor,
        Err(response) => return response,
    };

    if !policy.roles.is_empty() && !policy.roles.contains(&actor.role) {
        return deny(StatusCode::FORBIDDEN, "Forbidden");
    }

    if let Some(spec) = policy.ownership {
        let (id, rebuilt) = match resource_id(request, &matched, spec.id_field).await {
            Ok(found) => found,
            Err(response) => return response,
        };
        request = rebuilt;
        match state.resolver.can_access(&actor, spec.kind, id).await {
            Ok(true) => {}
            Ok(false) => return deny(StatusCode::FORBIDDEN, "Forbidden"),
            Err(err) => {
                tracing::error!("ownership resolution failed: {err:?}");
                return deny(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error");
            }
        }
    }

    request.extensions_mut().insert(actor);
    next.run(request).await
}

fn deny(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "message": message }))).into_response()
}

/// Client ip from proxy headers. Trusts the left-most x-forwarded-for entry.
#[must_use]
pub fn client_ip(headers: &HeaderMap) -> Option<String> {
    if let Some(forwarded) = headers.get("x-forwarded-for") {
        if let Ok(value) = forwarded.to_str() {
            if let Some(first) = value.split(',').next() {
                let first = first.trim();
                if !first.is_empty() {
                    return Some(first.to_string());
                }
            }
        }
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn authenticate(
    tokens: &TokenService,
    request: &Request,
) -> Result<AuthenticatedUser, Response> {
    let header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| deny(StatusCode::UNAUTHORIZED, "Invalid token"))?;
    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| deny(StatusCode::UNAUTHORIZED, "Invalid token"))?;
    let claims = tokens
        .verify_access(token)
        .map_err(|_| deny(StatusCode::UNAUTHORIZED, "Invalid token"))?;
    Ok(claims.to_authenticated_user())
}

/// Extract the target resource id: path param, then JSON body field, then
/// query param. Returns the request (rebuilt when the body was read) so the
/// handler still sees it intact.
async fn resource_id(
    request: Request,
    matched: &MatchedPath,
    id_field: &str,
) -> Result<(Uuid, Request), Response> {
    if let Some(id) = path_param(matched.as_str(), request.uri().path(), id_field) {
        let id = parse_id(&id)?;
        return Ok((id, request));
    }

    let is_json = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/json"));
    if is_json {
        let (parts, body) = request.into_parts();
        let bytes = to_bytes(body, MAX_GUARD_BODY_BYTES)
            .await
            .map_err(|_| deny(StatusCode::BAD_REQUEST, "Missing payload"))?;
        let id = serde_json::from_slice::<serde_json::Value>(&bytes)
            .ok()
            .and_then(|value| value.get(id_field).and_then(|id| id.as_str().map(String::from)));
        let request = Request::from_parts(parts, Body::from(bytes));
        if let Some(id) = id {
            let id = parse_id(&id)?;
            return Ok((id, request));
        }
        return finish_with_query(request, id_field);
    }

    finish_with_query(request, id_field)
}

fn finish_with_query(request: Request, id_field: &str) -> Result<(Uuid, Request), Response> {
    let id = request
        .uri()
        .query()
        .and_then(|query| {
            query.split('&').find_map(|pair| {
                let (key, value) = pair.split_once('=')?;
                (key == id_field).then(|| value.to_string())
            })
        })
        .ok_or_else(|| deny(StatusCode::FORBIDDEN, "Forbidden"))?;
    let id = parse_id(&id)?;
    Ok((id, request))
}

fn parse_id(raw: &str) -> Result<Uuid, Response> {
    Uuid::parse_str(raw).map_err(|_| deny(StatusCode::FORBIDDEN, "Forbidden"))
}

/// Match a concrete request path against the route pattern and pull out one
/// named `:param` segment.
fn path_param(pattern: &str, path: &str, name: &str) -> Option<String> {
    let mut pattern_segments = pattern.split('/').filter(|segment| !segment.is_empty());
    let mut path_segments = path.split('/').filter(|segment| !segment.is_empty());
    loop {
        match (pattern_segments.next(), path_segments.next()) {
            (Some(pattern_segment), Some(path_segment)) => {
                if let Some(param) = pattern_segment.strip_prefix(':') {
                    if param == name {
                        return Some(path_segment.to_string());
                    }
                }
            }
            _ => return None,
        }
    }
}
