use axum::{
  Router,
  extract::{Path, State},
  http::{HeaderMap, StatusCode},
  response::{IntoResponse, Response},
  routing::get,
};
use director_client::{entities::task::TaskKind, error::DirectorError};

use super::{redirect_to_task, require_content_type};
use crate::{context::Context, jobs};

pub fn router() -> Router<Context> {
  Router::new()
    .route("/", get(list_deployments).post(upload_deployment))
    .route("/{name}", axum::routing::delete(delete_deployment))
}

async fn upload_deployment(
  State(ctx): State<Context>,
  headers: HeaderMap,
  body: axum::body::Bytes,
) -> Response {
  if let Err(resp) = require_content_type(&headers, "text/yaml") {
    return resp;
  }
  let manifest_text = String::from_utf8_lossy(&body).into_owned();

  let manifest = match director_client::manifest::Manifest::parse(&manifest_text) {
    Ok(m) => m,
    Err(e) => return DirectorError::BadManifest(e.to_string()).into_response(),
  };
  let target = manifest.name.clone();
  let task_log_directory = ctx.config.task_log_directory.clone();
  let tasks = ctx.tasks.clone();

  let task = tasks
    .create(
      &task_log_directory,
      TaskKind::UpdateDeployment,
      format!("update deployment {target}"),
      target,
      move |handle| jobs::update_deployment(ctx.clone(), manifest_text, handle),
    )
    .await;

  match task {
    Ok(task) => redirect_to_task(&task.id),
    Err(e) => e.into_response(),
  }
}

#[derive(serde::Serialize)]
struct DeploymentSummary {
  name: String,
}

async fn list_deployments(State(ctx): State<Context>) -> Response {
  match ctx.db.list_deployments().await {
    Ok(deployments) => {
      let summaries: Vec<_> =
        deployments.into_iter().map(|d| DeploymentSummary { name: d.name }).collect();
      (StatusCode::OK, axum::Json(summaries)).into_response()
    }
    Err(e) => DirectorError::Internal(e.to_string()).into_response(),
  }
}

async fn delete_deployment(State(ctx): State<Context>, Path(name): Path<String>) -> Response {
  let target = name.clone();
  let task_log_directory = ctx.config.task_log_directory.clone();
  let tasks = ctx.tasks.clone();

  let task = tasks
    .create(
      &task_log_directory,
      TaskKind::DeleteDeployment,
      format!("delete deployment {name}"),
      target,
      move |handle| jobs::delete_deployment(ctx.clone(), name, handle),
    )
    .await;

  match task {
    Ok(task) => redirect_to_task(&task.id),
    Err(e) => e.into_response(),
  }
}
