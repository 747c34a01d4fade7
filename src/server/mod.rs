//! HTTP surface.
//!
//! | Route | Caller | Handled by |
//! |-------|--------|------------|
//! | `POST/DELETE /v3/security_groups/{g}/relationships/{lifecycle}_spaces` | any | [`BindingService`] |
//! | `GET /v3/security_groups/{g}/relationships/spaces/{s}/check` | any | [`BindingService::check`] |
//! | `GET /v3/security_groups[/{g}]` | non-admin | [`ViewReassembler`] |
//! | `GET /v3/security_groups[/{g}]` | admin | [`Proxy`] |
//! | `/v2/security_entitlement` | admin | [`EntitlementService`] |
//! | any other `/v3` path | admin | [`Proxy`] |
//! | anything else | any | 404 |
//! | `GET /metrics` | unauthenticated | Prometheus |

pub mod liveness;
mod middleware;
pub mod proxy;
pub mod response;
pub mod routes;

pub use proxy::Proxy;
pub use response::ErrorBody;
pub use routes::{RouteKind, RouteMatch, dispatch};

use std::sync::Arc;

use axum::body::{Bytes, to_bytes};
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::{Extension, Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::auth::{Session, SessionVerifier, TokenManager, extract_user_id};
use crate::config::TuningConfig;
use crate::models::{CallerIdentity, Entitlement, RelationshipData};
use crate::services::{
    BindingService, EntitlementService, ListQuery, PairLocks, ViewReassembler,
};
use crate::storage::EntitlementBackend;
use crate::upstream::CloudController;
use crate::{Error, Result};

/// Largest JSON body accepted by the gateway's own handlers.
const MAX_BODY: usize = 64 * 1024;

/// Shared state of every handler.
#[derive(Clone)]
pub struct AppState {
    /// Caller token verification.
    pub verifier: Arc<SessionVerifier>,
    /// Service credential.
    pub tokens: Arc<TokenManager>,
    /// Non-admin list/get.
    pub reassembler: Arc<ViewReassembler>,
    /// Bind, unbind and check.
    pub bindings: Arc<BindingService>,
    /// Admin entitlement management.
    pub entitlements: Arc<EntitlementService>,
    /// Admin pass-through.
    pub proxy: Arc<Proxy>,
}

impl AppState {
    /// Wires the services over one store and one platform facade.
    #[must_use]
    pub fn new(
        verifier: SessionVerifier,
        tokens: Arc<TokenManager>,
        store: Arc<dyn EntitlementBackend>,
        upstream: Arc<dyn CloudController>,
        proxy: Proxy,
        tuning: &TuningConfig,
    ) -> Self {
        let locks = Arc::new(PairLocks::new());
        Self {
            verifier: Arc::new(verifier),
            tokens,
            reassembler: Arc::new(ViewReassembler::new(
                Arc::clone(&store),
                Arc::clone(&upstream),
                tuning,
            )),
            bindings: Arc::new(BindingService::new(
                Arc::clone(&store),
                upstream,
                Arc::clone(&locks),
            )),
            entitlements: Arc::new(EntitlementService::new(store, locks)),
            proxy: Arc::new(proxy),
        }
    }
}

/// Builds the gateway router.
///
/// `/metrics` is only mounted when a Prometheus handle is given.
pub fn build_router(state: AppState, prometheus: Option<PrometheusHandle>) -> Router {
    let authenticated = Router::new()
        .route(
            "/v2/security_entitlement",
            get(list_entitlements)
                .post(create_entitlement)
                .delete(delete_entitlement),
        )
        .route("/v3", any(gateway))
        .route("/v3/{*path}", any(gateway))
        .fallback(not_found)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::authenticate,
        ))
        .with_state(state);

    let router = match prometheus {
        Some(handle) => authenticated.route(
            "/metrics",
            get(move || std::future::ready(handle.render())),
        ),
        None => authenticated,
    };

    router
        .layer(axum::middleware::from_fn(middleware::track))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
}

async fn not_found(request: Request) -> Response {
    Error::NotFound(format!("Unknown route {}", request.uri().path())).into_response()
}

/// Dispatches every `/v3` request through the route table.
async fn gateway(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    request: Request,
) -> Response {
    let route = dispatch(request.method().as_str(), request.uri().path());
    match handle(&state, &session, route, request).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

async fn handle(
    state: &AppState,
    session: &Session,
    route: RouteMatch,
    request: Request,
) -> Result<Response> {
    match route.kind {
        RouteKind::BindUnbind => {
            let caller = caller_identity(session, request.headers())?;
            let (Some(group), Some(lifecycle)) = (route.guid(0), route.lifecycle) else {
                return Err(Error::NotFound("Unknown route".to_string()));
            };

            if let Some(space) = route.guid(1) {
                state
                    .bindings
                    .unbind(&caller, group, space, lifecycle)
                    .await?;
                Ok(StatusCode::NO_CONTENT.into_response())
            } else {
                let body: RelationshipData = read_json(request).await?;
                let bound = state
                    .bindings
                    .bind(&caller, group, &body, lifecycle)
                    .await?;
                Ok(Json(bound).into_response())
            }
        },
        RouteKind::Check => {
            caller_identity(session, request.headers())?;
            let (Some(group), Some(space)) = (route.guid(0), route.guid(1)) else {
                return Err(Error::NotFound("Unknown route".to_string()));
            };
            Ok(Json(state.bindings.check(group, space).await?).into_response())
        },
        RouteKind::ListGet if session.is_admin => state.proxy.forward(request).await,
        RouteKind::ListGet => {
            let caller = caller_identity(session, request.headers())?;
            match route.guid(0) {
                Some(group) => {
                    Ok(Json(state.reassembler.get(&caller.user_id, group).await?).into_response())
                },
                None => {
                    let query = ListQuery::from_pairs(url::form_urlencoded::parse(
                        request.uri().query().unwrap_or_default().as_bytes(),
                    ))?;
                    Ok(Json(state.reassembler.list(&caller.user_id, &query).await?).into_response())
                },
            }
        },
        RouteKind::PassThrough if session.is_admin => state.proxy.forward(request).await,
        RouteKind::PassThrough => Err(Error::Forbidden(format!(
            "{} {} is only available to platform administrators",
            request.method(),
            request.uri().path()
        ))),
    }
}

/// Builds the caller from the verified session and the token's `user_id`.
fn caller_identity(session: &Session, headers: &HeaderMap) -> Result<CallerIdentity> {
    let header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    Ok(CallerIdentity {
        user_id: extract_user_id(header)?,
        is_admin: session.is_admin,
    })
}

async fn read_json<T: serde::de::DeserializeOwned>(request: Request) -> Result<T> {
    let bytes = to_bytes(request.into_body(), MAX_BODY)
        .await
        .map_err(|e| Error::InvalidInput(format!("unreadable request body: {e}")))?;
    parse_json(&bytes)
}

fn parse_json<T: serde::de::DeserializeOwned>(bytes: &Bytes) -> Result<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| Error::InvalidInput(format!("invalid request body: {e}")))
}

/// Admin endpoints identify the caller by session only; client tokens carry
/// no `user_id`.
fn admin_caller(session: &Session) -> CallerIdentity {
    CallerIdentity {
        user_id: session.user_id.clone().unwrap_or_default(),
        is_admin: session.is_admin,
    }
}

async fn list_entitlements(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Json<Vec<Entitlement>>> {
    Ok(Json(state.entitlements.list(&admin_caller(&session)).await?))
}

async fn create_entitlement(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    body: Bytes,
) -> Result<Response> {
    let caller = admin_caller(&session);
    let entitlement: Entitlement = parse_json(&body)?;
    let created = state.entitlements.entitle(&caller, &entitlement).await?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(entitlement)).into_response())
}

async fn delete_entitlement(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    body: Bytes,
) -> Result<StatusCode> {
    let caller = admin_caller(&session);
    let entitlement: Entitlement = parse_json(&body)?;
    state.entitlements.revoke(&caller, &entitlement).await?;
    Ok(StatusCode::NO_CONTENT)
}
