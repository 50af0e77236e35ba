use axum::{
  Router,
  extract::{Path, State},
  http::{HeaderMap, StatusCode},
  response::{IntoResponse, Response},
  routing::get,
};
use director_client::{entities::task::TaskKind, error::DirectorError};
use serde::Deserialize;

use super::{redirect_to_task, require_content_type};
use crate::{context::Context, jobs};

pub fn router() -> Router<Context> {
  Router::new()
    .route("/", get(list_stemcells).post(upload_stemcell))
    .route("/{name}/{version}", axum::routing::delete(delete_stemcell))
}

/// Stemcell descriptor consumed from the uploaded bundle. Tarball/image
/// extraction is out of scope (spec §1); `image_path` names wherever the
/// actual image bytes were staged by an out-of-band upload.
#[derive(Deserialize)]
struct StemcellDescriptor {
  name: String,
  version: String,
  sha1: String,
  image_path: String,
  #[serde(default)]
  cloud_properties: serde_json::Value,
}

async fn upload_stemcell(
  State(ctx): State<Context>,
  headers: HeaderMap,
  body: axum::body::Bytes,
) -> Response {
  if let Err(resp) = require_content_type(&headers, "application/x-compressed") {
    return resp;
  }
  let text = String::from_utf8_lossy(&body);
  let descriptor: StemcellDescriptor = match serde_yaml_ng::from_str(&text) {
    Ok(d) => d,
    Err(e) => return DirectorError::BadManifest(e.to_string()).into_response(),
  };

  let target = format!("{}/{}", descriptor.name, descriptor.version);
  let task_log_directory = ctx.config.task_log_directory.clone();
  let tasks = ctx.tasks.clone();

  let task = tasks
    .create(
      &task_log_directory,
      TaskKind::UpdateStemcell,
      format!("update stemcell {target}"),
      target,
      move |handle| {
        jobs::update_stemcell(
          ctx.clone(),
          descriptor.image_path,
          descriptor.cloud_properties,
          descriptor.name,
          descriptor.version,
          descriptor.sha1,
          handle,
        )
      },
    )
    .await;

  match task {
    Ok(task) => redirect_to_task(&task.id),
    Err(e) => e.into_response(),
  }
}

#[derive(serde::Serialize)]
struct StemcellSummary {
  name: String,
  version: String,
  cid: String,
}

async fn list_stemcells(State(ctx): State<Context>) -> Response {
  match ctx.db.list_stemcells().await {
    Ok(stemcells) => {
      let summaries: Vec<_> = stemcells
        .into_iter()
        .map(|s| StemcellSummary { name: s.name, version: s.version, cid: s.cid })
        .collect();
      (StatusCode::OK, axum::Json(summaries)).into_response()
    }
    Err(e) => DirectorError::Internal(e.to_string()).into_response(),
  }
}

async fn delete_stemcell(
  State(ctx): State<Context>,
  Path((name, version)): Path<(String, String)>,
) -> Response {
  let target = format!("{name}/{version}");
  let task_log_directory = ctx.config.task_log_directory.clone();
  let tasks = ctx.tasks.clone();

  let task = tasks
    .create(
      &task_log_directory,
      TaskKind::DeleteStemcell,
      format!("delete stemcell {target}"),
      target,
      move |handle| jobs::delete_stemcell(ctx.clone(), name, version, handle),
    )
    .await;

  match task {
    Ok(task) => redirect_to_task(&task.id),
    Err(e) => e.into_response(),
  }
}
