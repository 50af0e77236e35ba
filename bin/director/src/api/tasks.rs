use axum::{
  Router,
  extract::{Path, Query, State},
  http::StatusCode,
  response::{IntoResponse, Response},
  routing::get,
};
use director_client::{
  entities::task::{Task, TaskState},
  error::DirectorError,
};
use serde::Deserialize;
use std::str::FromStr;

use crate::context::Context;

pub fn router() -> Router<Context> {
  Router::new()
    .route("/", get(list_tasks))
    .route("/{id}", get(get_task))
    .route("/{id}/output", get(get_task_output))
}

#[derive(Deserialize)]
struct ListTasksQuery {
  limit: Option<i64>,
  state: Option<String>,
}

async fn list_tasks(
  State(ctx): State<Context>,
  Query(query): Query<ListTasksQuery>,
) -> Response {
  let tasks = match ctx.db.list_tasks(query.limit.unwrap_or(100)).await {
    Ok(t) => t,
    Err(e) => return DirectorError::Internal(e.to_string()).into_response(),
  };

  let tasks: Vec<Task> = match query.state {
    Some(state) => {
      let Ok(state) = TaskState::from_str(&state) else {
        return DirectorError::ValidationFailed(vec![format!("unknown task state {state}")])
          .into_response();
      };
      tasks.into_iter().filter(|t| t.state == state).collect()
    }
    None => tasks,
  };

  (StatusCode::OK, axum::Json(tasks)).into_response()
}

async fn get_task(State(ctx): State<Context>, Path(id): Path<String>) -> Response {
  match ctx.db.get_task(&id).await {
    Ok(Some(task)) => (StatusCode::OK, axum::Json(task)).into_response(),
    Ok(None) => DirectorError::NotFound(format!("task {id}")).into_response(),
    Err(e) => DirectorError::Internal(e.to_string()).into_response(),
  }
}

async fn get_task_output(State(ctx): State<Context>, Path(id): Path<String>) -> Response {
  let task = match ctx.db.get_task(&id).await {
    Ok(Some(task)) => task,
    Ok(None) => return DirectorError::NotFound(format!("task {id}")).into_response(),
    Err(e) => return DirectorError::Internal(e.to_string()).into_response(),
  };

  match tokio::fs::read_to_string(format!("{}/event", task.output)).await {
    Ok(text) => (StatusCode::OK, [("content-type", "text/plain")], text).into_response(),
    Err(_) => StatusCode::NO_CONTENT.into_response(),
  }
}
