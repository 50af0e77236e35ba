use axum::{Extension, Router, http::StatusCode, response::IntoResponse, routing::get};
use director_client::entities::user::User;
use serde::Serialize;

use crate::context::Context;

pub fn router() -> Router<Context> {
  Router::new().route("/", get(status))
}

#[derive(Serialize)]
struct Status {
  status: String,
}

async fn status(Extension(user): Extension<User>) -> impl IntoResponse {
  (
    StatusCode::OK,
    axum::Json(Status { status: format!("ok {}", user.username) }),
  )
}
