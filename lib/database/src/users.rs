use anyhow::Context;
use director_client::entities::user::User;
use mungos::mongodb::bson::doc;

use crate::Client;

impl Client {
  pub async fn find_user_by_username(
    &self,
    username: &str,
  ) -> anyhow::Result<Option<User>> {
    self
      .users
      .find_one(doc! { "username": username })
      .await
      .context("failed to query user")
  }

  pub async fn insert_user(&self, user: &User) -> anyhow::Result<()> {
    self
      .users
      .insert_one(user)
      .await
      .context("failed to insert user")?;
    Ok(())
  }

  pub async fn update_user_password_hash(
    &self,
    username: &str,
    password_hash: &str,
  ) -> anyhow::Result<()> {
    self
      .users
      .update_one(
        doc! { "username": username },
        doc! { "$set": { "password_hash": password_hash } },
      )
      .await
      .context("failed to update user")?;
    Ok(())
  }

  pub async fn delete_user(&self, username: &str) -> anyhow::Result<()> {
    self
      .users
      .delete_one(doc! { "username": username })
      .await
      .context("failed to delete user")?;
    Ok(())
  }
}
