use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::{Deserialize, Serialize};

/// The closed set of domain errors the director can raise.
///
/// Each variant carries a stable numeric code and maps to a default HTTP
/// status, per spec §7. Non-domain failures are not represented here — they
/// are `anyhow::Error`s that the task worker wraps as [`DirectorError::Internal`]
/// only at the boundary where they're recorded (see `helpers::update`).
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum DirectorError {
  #[error("not found: {0}")]
  NotFound(String),
  #[error("validation failed: {}", .0.join("; "))]
  ValidationFailed(Vec<String>),
  #[error("bad manifest: {0}")]
  BadManifest(String),
  #[error("username in path must match username in body")]
  UserImmutableUsername,
  #[error("not authorized")]
  NotAuthorized,
  #[error("lock busy: {0}")]
  LockBusy(String),
  #[error("release in use: {0}")]
  ReleaseInUse(String),
  #[error("stemcell in use: {0}")]
  StemcellInUse(String),
  #[error("deployment in use: {0}")]
  DeploymentInUse(String),
  #[error("agent unreachable: {0}")]
  AgentUnreachable(String),
  #[error("agent timeout: {0}")]
  AgentTimeout(String),
  #[error("remote error: {0}")]
  RemoteError(String),
  #[error("cloud error: {0}")]
  CloudError(String),
  #[error("compilation failed for package {package}: {message}")]
  CompilationFailed { package: String, message: String },
  #[error("instance update failed for {job}/{index}: {message}")]
  InstanceUpdateFailed {
    job: String,
    index: i64,
    message: String,
  },
  #[error("cancelled")]
  Cancelled,
  #[error("internal error: {0}")]
  Internal(String),
}

impl DirectorError {
  /// Stable numeric error code, independent of HTTP status, surfaced in
  /// the `{code, description}` error body of spec §7.
  pub fn code(&self) -> u32 {
    use DirectorError::*;
    match self {
      NotFound(_) => 1000,
      ValidationFailed(_) => 1001,
      BadManifest(_) => 1002,
      UserImmutableUsername => 1003,
      NotAuthorized => 1004,
      LockBusy(_) => 2000,
      ReleaseInUse(_) => 2001,
      StemcellInUse(_) => 2002,
      DeploymentInUse(_) => 2003,
      AgentUnreachable(_) => 3000,
      AgentTimeout(_) => 3001,
      RemoteError(_) => 3002,
      CloudError(_) => 3003,
      CompilationFailed { .. } => 4000,
      InstanceUpdateFailed { .. } => 4001,
      Cancelled => 4002,
      Internal(_) => 5000,
    }
  }

  pub fn status(&self) -> StatusCode {
    use DirectorError::*;
    match self {
      NotFound(_) => StatusCode::NOT_FOUND,
      ValidationFailed(_) | BadManifest(_) | UserImmutableUsername => {
        StatusCode::BAD_REQUEST
      }
      NotAuthorized => StatusCode::FORBIDDEN,
      LockBusy(_) | ReleaseInUse(_) | StemcellInUse(_)
      | DeploymentInUse(_) => StatusCode::CONFLICT,
      AgentUnreachable(_) | AgentTimeout(_) | RemoteError(_)
      | CloudError(_) => StatusCode::BAD_GATEWAY,
      CompilationFailed { .. } | InstanceUpdateFailed { .. }
      | Cancelled => StatusCode::UNPROCESSABLE_ENTITY,
      Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  /// The short body recorded into a Task's `result` field.
  pub fn description(&self) -> String {
    self.to_string()
  }

  pub fn to_body(&self) -> ErrorBody {
    ErrorBody { code: self.code(), description: self.description() }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
  pub code: u32,
  pub description: String,
}

impl IntoResponse for DirectorError {
  fn into_response(self) -> axum::response::Response {
    (self.status(), Json(self.to_body())).into_response()
  }
}

pub type Result<T> = std::result::Result<T, DirectorError>;
