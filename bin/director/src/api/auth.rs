//! HTTP Basic auth middleware (spec §6). Minimal by design — user CRUD and
//! richer auth flows are out of scope; this only needs to make the `401`
//! behavior in the routing table real.

use axum::{
  body::Body,
  extract::State,
  http::{Request, StatusCode, header},
  middleware::Next,
  response::Response,
};
use base64::Engine;
use director_client::entities::user::User;

use crate::context::Context;

pub async fn basic_auth(
  State(ctx): State<Context>,
  mut req: Request<Body>,
  next: Next,
) -> Response {
  match authenticate(&ctx, &req).await {
    Ok(user) => {
      req.extensions_mut().insert(user);
      next.run(req).await
    }
    Err(status) => Response::builder().status(status).body(Body::empty()).unwrap(),
  }
}

async fn authenticate(ctx: &Context, req: &Request<Body>) -> Result<User, StatusCode> {
  let header = req
    .headers()
    .get(header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .ok_or(StatusCode::UNAUTHORIZED)?;

  let encoded = header.strip_prefix("Basic ").ok_or(StatusCode::UNAUTHORIZED)?;
  let decoded = base64::engine::general_purpose::STANDARD
    .decode(encoded)
    .map_err(|_| StatusCode::UNAUTHORIZED)?;
  let decoded = String::from_utf8(decoded).map_err(|_| StatusCode::UNAUTHORIZED)?;
  let (username, password) =
    decoded.split_once(':').ok_or(StatusCode::UNAUTHORIZED)?;

  let user = ctx
    .db
    .find_user_by_username(username)
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
    .ok_or(StatusCode::UNAUTHORIZED)?;

  let verified = bcrypt::verify(password, &user.password_hash)
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
  if !verified {
    return Err(StatusCode::UNAUTHORIZED);
  }

  Ok(user)
}
