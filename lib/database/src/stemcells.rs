use anyhow::Context;
use director_client::entities::stemcell::Stemcell;
use futures_util::TryStreamExt;
use mungos::mongodb::bson::doc;

use crate::Client;

impl Client {
  pub async fn find_stemcell(
    &self,
    name: &str,
    version: &str,
  ) -> anyhow::Result<Option<Stemcell>> {
    self
      .stemcells
      .find_one(doc! { "name": name, "version": version })
      .await
      .context("failed to query stemcell")
  }

  pub async fn list_stemcells(&self) -> anyhow::Result<Vec<Stemcell>> {
    self
      .stemcells
      .find(doc! {})
      .await
      .context("failed to query stemcells")?
      .try_collect()
      .await
      .context("failed to collect stemcells")
  }

  pub async fn insert_stemcell(&self, stemcell: &Stemcell) -> anyhow::Result<()> {
    self
      .stemcells
      .insert_one(stemcell)
      .await
      .context("failed to insert stemcell")?;
    Ok(())
  }

  pub async fn delete_stemcell(&self, name: &str, version: &str) -> anyhow::Result<()> {
    self
      .stemcells
      .delete_one(doc! { "name": name, "version": version })
      .await
      .context("failed to delete stemcell")?;
    Ok(())
  }
}
