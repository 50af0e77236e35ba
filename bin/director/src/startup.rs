use director_client::entities::user::User;

use crate::context::Context;

/// Run once, after the database client is initialized but before the HTTP
/// listener binds and before the task worker pool starts pulling from the
/// queue.
pub async fn on_startup(ctx: &Context) {
  match ctx.db.mark_stuck_tasks_errored().await {
    Ok(0) => {}
    Ok(n) => warn!("cleaned up {n} task(s) stuck in-flight from a previous run"),
    Err(e) => error!("failed to clean up stuck tasks on startup | {e:#}"),
  }

  ensure_init_admin(ctx).await;
}

/// Every other user-management route requires Basic auth against the
/// `users` collection (spec §6), so without this there would be no way
/// to create the very first user.
async fn ensure_init_admin(ctx: &Context) {
  let Some(username) = &ctx.config.init_admin_username else { return };

  match ctx.db.find_user_by_username(username).await {
    Ok(Some(_)) => return,
    Ok(None) => {}
    Err(e) => {
      error!("failed to check for init admin user | {e:#}");
      return;
    }
  }

  let password = ctx.config.init_admin_password.as_deref().unwrap_or_default();
  let password_hash = match database::hash_password(password) {
    Ok(hash) => hash,
    Err(e) => {
      error!("failed to hash init admin password | {e:#}");
      return;
    }
  };

  let user = User { id: String::new(), username: username.clone(), password_hash };
  match ctx.db.insert_user(&user).await {
    Ok(()) => info!("created init admin user {username}"),
    Err(e) => error!("failed to create init admin user | {e:#}"),
  }
}
