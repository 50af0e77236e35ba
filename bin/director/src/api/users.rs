use axum::{
  Router,
  extract::{Path, State},
  http::{HeaderMap, StatusCode},
  response::{IntoResponse, Response},
  routing::{post, put},
};
use database::hash_password;
use director_client::{entities::user::User, error::DirectorError};
use serde::Deserialize;

use super::require_content_type;
use crate::context::Context;

pub fn router() -> Router<Context> {
  Router::new()
    .route("/", post(create_user))
    .route("/{username}", put(update_user).delete(delete_user))
}

#[derive(Deserialize)]
struct UserBody {
  username: String,
  password: String,
}

async fn create_user(
  State(ctx): State<Context>,
  headers: HeaderMap,
  body: axum::body::Bytes,
) -> Response {
  if let Err(resp) = require_content_type(&headers, "application/json") {
    return resp;
  }
  let body: UserBody = match serde_json::from_slice(&body) {
    Ok(b) => b,
    Err(e) => return DirectorError::ValidationFailed(vec![e.to_string()]).into_response(),
  };

  let password_hash = match hash_password(&body.password) {
    Ok(h) => h,
    Err(e) => return DirectorError::Internal(e.to_string()).into_response(),
  };
  let user = User { id: String::new(), username: body.username, password_hash };
  match ctx.db.insert_user(&user).await {
    Ok(()) => StatusCode::NO_CONTENT.into_response(),
    Err(e) => DirectorError::Internal(e.to_string()).into_response(),
  }
}

async fn update_user(
  State(ctx): State<Context>,
  Path(username): Path<String>,
  headers: HeaderMap,
  body: axum::body::Bytes,
) -> Response {
  if let Err(resp) = require_content_type(&headers, "application/json") {
    return resp;
  }
  let body: UserBody = match serde_json::from_slice(&body) {
    Ok(b) => b,
    Err(e) => return DirectorError::ValidationFailed(vec![e.to_string()]).into_response(),
  };
  if body.username != username {
    return DirectorError::UserImmutableUsername.into_response();
  }

  match ctx.db.find_user_by_username(&username).await {
    Ok(Some(_)) => {}
    Ok(None) => return DirectorError::NotFound(format!("user {username}")).into_response(),
    Err(e) => return DirectorError::Internal(e.to_string()).into_response(),
  }

  let password_hash = match hash_password(&body.password) {
    Ok(h) => h,
    Err(e) => return DirectorError::Internal(e.to_string()).into_response(),
  };
  match ctx.db.update_user_password_hash(&username, &password_hash).await {
    Ok(()) => StatusCode::NO_CONTENT.into_response(),
    Err(e) => DirectorError::Internal(e.to_string()).into_response(),
  }
}

async fn delete_user(State(ctx): State<Context>, Path(username): Path<String>) -> Response {
  match ctx.db.delete_user(&username).await {
    Ok(()) => StatusCode::NO_CONTENT.into_response(),
    Err(e) => DirectorError::Internal(e.to_string()).into_response(),
  }
}
