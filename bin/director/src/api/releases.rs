use axum::{
  Router,
  extract::{Path, Query, State},
  http::{HeaderMap, StatusCode},
  response::{IntoResponse, Response},
  routing::get,
};
use director_client::{
  entities::{
    release::{Package, Template},
    task::TaskKind,
  },
  error::DirectorError,
};
use serde::Deserialize;

use super::{redirect_to_task, require_content_type};
use crate::{context::Context, jobs, jobs::ReleaseUpload};

pub fn router() -> Router<Context> {
  Router::new()
    .route("/", get(list_releases).post(upload_release))
    .route("/{name}", axum::routing::delete(delete_release))
}

/// Release descriptor consumed from the uploaded bundle. Tarball
/// extraction is out of scope (spec §1) — the fields this system acts on
/// (packages, templates, their identities) are read directly as YAML,
/// the same ambient parser deployment manifests use.
#[derive(Deserialize)]
struct ReleaseDescriptor {
  name: String,
  version: String,
  #[serde(default)]
  packages: Vec<Package>,
  #[serde(default)]
  templates: Vec<Template>,
}

async fn upload_release(
  State(ctx): State<Context>,
  headers: HeaderMap,
  body: axum::body::Bytes,
) -> Response {
  if let Err(resp) = require_content_type(&headers, "application/x-compressed") {
    return resp;
  }
  let text = String::from_utf8_lossy(&body);
  let descriptor: ReleaseDescriptor = match serde_yaml_ng::from_str(&text) {
    Ok(d) => d,
    Err(e) => return DirectorError::BadManifest(e.to_string()).into_response(),
  };

  let upload = ReleaseUpload {
    name: descriptor.name.clone(),
    version: descriptor.version,
    packages: descriptor.packages,
    templates: descriptor.templates,
  };
  let target = descriptor.name;
  let task_log_directory = ctx.config.task_log_directory.clone();
  let tasks = ctx.tasks.clone();

  let task = tasks
    .create(
      &task_log_directory,
      TaskKind::UpdateRelease,
      format!("update release {target}"),
      target,
      move |handle| jobs::update_release(ctx.clone(), upload, handle),
    )
    .await;

  match task {
    Ok(task) => redirect_to_task(&task.id),
    Err(e) => e.into_response(),
  }
}

#[derive(serde::Serialize)]
struct ReleaseSummary {
  name: String,
  versions: Vec<String>,
}

async fn list_releases(State(ctx): State<Context>) -> Response {
  let releases = match ctx.db.list_releases().await {
    Ok(r) => r,
    Err(e) => return DirectorError::Internal(e.to_string()).into_response(),
  };

  let mut summaries = Vec::with_capacity(releases.len());
  for release in releases {
    let versions = match ctx.db.list_release_versions(&release.name).await {
      Ok(v) => v.into_iter().map(|v| v.version).collect(),
      Err(e) => return DirectorError::Internal(e.to_string()).into_response(),
    };
    summaries.push(ReleaseSummary { name: release.name, versions });
  }

  (StatusCode::OK, axum::Json(summaries)).into_response()
}

#[derive(Deserialize)]
struct DeleteReleaseQuery {
  #[serde(default)]
  force: bool,
}

async fn delete_release(
  State(ctx): State<Context>,
  Path(name): Path<String>,
  Query(query): Query<DeleteReleaseQuery>,
) -> Response {
  let target = name.clone();
  let task_log_directory = ctx.config.task_log_directory.clone();
  let tasks = ctx.tasks.clone();

  let task = tasks
    .create(
      &task_log_directory,
      TaskKind::DeleteRelease,
      format!("delete release {name}"),
      target,
      move |handle| jobs::delete_release(ctx.clone(), name, query.force, handle),
    )
    .await;

  match task {
    Ok(task) => redirect_to_task(&task.id),
    Err(e) => e.into_response(),
  }
}
