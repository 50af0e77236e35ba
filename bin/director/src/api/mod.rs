//! Thin HTTP routing layer (spec §6): plain per-route Axum handlers that
//! validate just enough to hand work to the task manager and redirect to
//! the resulting task's location. Deep request validation, full user
//! management, and content negotiation beyond the table in spec §6 are not
//! reproduced (out of scope per spec.md §1).

use axum::{
  Router,
  http::{HeaderMap, StatusCode, header},
  middleware,
  response::{IntoResponse, Response},
};

use crate::context::Context;

mod auth;
mod deployments;
mod releases;
mod status;
mod stemcells;
mod tasks;
mod users;

pub fn router(ctx: Context) -> Router {
  Router::new()
    .nest("/users", users::router())
    .nest("/releases", releases::router())
    .nest("/deployments", deployments::router())
    .nest("/stemcells", stemcells::router())
    .nest("/tasks", tasks::router())
    .nest("/status", status::router())
    .route_layer(middleware::from_fn_with_state(ctx.clone(), auth::basic_auth))
    .with_state(ctx)
}

/// Spec §6's content-type negotiation: a route that requires a specific
/// body content type returns a bare `404` (not `415`) on mismatch, as if
/// the route didn't exist.
fn require_content_type(headers: &HeaderMap, expected: &str) -> Result<(), Response> {
  match headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()) {
    Some(ct) if ct.starts_with(expected) => Ok(()),
    _ => Err(StatusCode::NOT_FOUND.into_response()),
  }
}

/// Redirects the caller to the newly created task's status, per the
/// `302 -> /tasks/:id` rows of spec §6's routing table.
fn redirect_to_task(id: &str) -> Response {
  (
    StatusCode::FOUND,
    [(header::LOCATION, format!("/tasks/{id}"))],
  )
    .into_response()
}
