use anyhow::Context;
use director_client::entities::release::{Package, Release, ReleaseVersion, Template};
use futures_util::TryStreamExt;
use mungos::mongodb::bson::{doc, oid::ObjectId};

use crate::Client;

impl Client {
  pub async fn find_release_by_name(
    &self,
    name: &str,
  ) -> anyhow::Result<Option<Release>> {
    self
      .releases
      .find_one(doc! { "name": name })
      .await
      .context("failed to query release")
  }

  pub async fn get_or_create_release(&self, name: &str) -> anyhow::Result<Release> {
    if let Some(release) = self.find_release_by_name(name).await? {
      return Ok(release);
    }
    let release =
      Release { id: ObjectId::new().to_hex(), name: name.to_string() };
    self
      .releases
      .insert_one(&release)
      .await
      .context("failed to insert release")?;
    Ok(release)
  }

  pub async fn list_releases(&self) -> anyhow::Result<Vec<Release>> {
    self
      .releases
      .find(doc! {})
      .await
      .context("failed to query releases")?
      .try_collect()
      .await
      .context("failed to collect releases")
  }

  pub async fn list_release_versions(&self, release: &str) -> anyhow::Result<Vec<ReleaseVersion>> {
    self
      .release_versions
      .find(doc! { "release": release })
      .await
      .context("failed to query release versions")?
      .try_collect()
      .await
      .context("failed to collect release versions")
  }

  pub async fn find_release_version(
    &self,
    release: &str,
    version: &str,
  ) -> anyhow::Result<Option<ReleaseVersion>> {
    self
      .release_versions
      .find_one(doc! { "release": release, "version": version })
      .await
      .context("failed to query release version")
  }

  pub async fn insert_release_version(
    &self,
    version: &ReleaseVersion,
  ) -> anyhow::Result<()> {
    self
      .release_versions
      .insert_one(version)
      .await
      .context("failed to insert release version")?;
    Ok(())
  }

  pub async fn find_package_by_identity(
    &self,
    name: &str,
    version: &str,
    fingerprint: &str,
  ) -> anyhow::Result<Option<Package>> {
    self
      .packages
      .find_one(
        doc! { "name": name, "version": version, "fingerprint": fingerprint },
      )
      .await
      .context("failed to query package")
  }

  /// Inserts the package if its identity isn't already present, returning
  /// the (possibly pre-existing) row — package content is immutable once
  /// fingerprinted (spec §3).
  pub async fn upsert_package(&self, package: Package) -> anyhow::Result<Package> {
    if let Some(existing) = self
      .find_package_by_identity(
        &package.name,
        &package.version,
        &package.fingerprint,
      )
      .await?
    {
      return Ok(existing);
    }
    self
      .packages
      .insert_one(&package)
      .await
      .context("failed to insert package")?;
    Ok(package)
  }

  /// All uploaded versions of a package name. A release version's package
  /// list (spec §3) names packages without pinning which uploaded
  /// identity it means; callers resolve ambiguity themselves (the plan
  /// compiler picks the newest version).
  pub async fn find_packages_by_name(
    &self,
    name: &str,
  ) -> anyhow::Result<Vec<Package>> {
    self
      .packages
      .find(doc! { "name": name })
      .await
      .context("failed to query packages by name")?
      .try_collect()
      .await
      .context("failed to collect packages")
  }

  /// All uploaded versions of a template name, same ambiguity-resolution
  /// contract as [`find_packages_by_name`](Self::find_packages_by_name).
  pub async fn find_templates_by_name(
    &self,
    name: &str,
  ) -> anyhow::Result<Vec<Template>> {
    self
      .templates
      .find(doc! { "name": name })
      .await
      .context("failed to query templates by name")?
      .try_collect()
      .await
      .context("failed to collect templates")
  }

  pub async fn find_template_by_name_version(
    &self,
    name: &str,
    version: &str,
  ) -> anyhow::Result<Option<Template>> {
    self
      .templates
      .find_one(doc! { "name": name, "version": version })
      .await
      .context("failed to query template")
  }

  pub async fn upsert_template(&self, template: Template) -> anyhow::Result<Template> {
    if let Some(existing) = self
      .find_template_by_name_version(&template.name, &template.version)
      .await?
    {
      return Ok(existing);
    }
    self
      .templates
      .insert_one(&template)
      .await
      .context("failed to insert template")?;
    Ok(template)
  }
}
