use anyhow::Context;
use director_client::entities::compiled_package::{CompileKey, CompiledPackage};
use mungos::mongodb::bson::doc;

use crate::Client;

impl Client {
  pub async fn find_compiled_package(
    &self,
    key: &CompileKey,
  ) -> anyhow::Result<Option<CompiledPackage>> {
    self
      .compiled_packages
      .find_one(doc! {
        "package_name": &key.package_name,
        "package_version": &key.package_version,
        "stemcell_name": &key.stemcell_name,
        "stemcell_version": &key.stemcell_version,
        "dependency_key": &key.dependency_key,
      })
      .await
      .context("failed to query compiled package")
  }

  pub async fn insert_compiled_package(
    &self,
    compiled: &CompiledPackage,
  ) -> anyhow::Result<()> {
    self
      .compiled_packages
      .insert_one(compiled)
      .await
      .context("failed to insert compiled package")?;
    Ok(())
  }
}
