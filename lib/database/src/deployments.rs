use anyhow::Context;
use director_client::entities::deployment::{Deployment, Disk, Instance, Vm};
use futures_util::TryStreamExt;
use mungos::mongodb::bson::doc;

use crate::Client;

impl Client {
  pub async fn find_deployment(&self, name: &str) -> anyhow::Result<Option<Deployment>> {
    self
      .deployments
      .find_one(doc! { "name": name })
      .await
      .context("failed to query deployment")
  }

  pub async fn list_deployments(&self) -> anyhow::Result<Vec<Deployment>> {
    self
      .deployments
      .find(doc! {})
      .await
      .context("failed to query deployments")?
      .try_collect()
      .await
      .context("failed to collect deployments")
  }

  pub async fn upsert_deployment(&self, deployment: &Deployment) -> anyhow::Result<()> {
    self
      .deployments
      .update_one(
        doc! { "name": &deployment.name },
        doc! { "$set": mungos::mongodb::bson::to_document(deployment)? },
      )
      .upsert(true)
      .await
      .context("failed to upsert deployment")?;
    Ok(())
  }

  pub async fn delete_deployment(&self, name: &str) -> anyhow::Result<()> {
    self
      .deployments
      .delete_one(doc! { "name": name })
      .await
      .context("failed to delete deployment")?;
    Ok(())
  }

  pub async fn find_instances(&self, deployment: &str) -> anyhow::Result<Vec<Instance>> {
    self
      .instances
      .find(doc! { "deployment": deployment })
      .await
      .context("failed to query instances")?
      .try_collect()
      .await
      .context("failed to collect instances")
  }

  pub async fn find_instance(
    &self,
    deployment: &str,
    job: &str,
    index: i64,
  ) -> anyhow::Result<Option<Instance>> {
    self
      .instances
      .find_one(doc! { "deployment": deployment, "job": job, "index": index })
      .await
      .context("failed to query instance")
  }

  pub async fn upsert_instance(&self, instance: &Instance) -> anyhow::Result<()> {
    self
      .instances
      .update_one(
        doc! {
          "deployment": &instance.deployment,
          "job": &instance.job,
          "index": instance.index,
        },
        doc! { "$set": mungos::mongodb::bson::to_document(instance)? },
      )
      .upsert(true)
      .await
      .context("failed to upsert instance")?;
    Ok(())
  }

  pub async fn delete_instance(
    &self,
    deployment: &str,
    job: &str,
    index: i64,
  ) -> anyhow::Result<()> {
    self
      .instances
      .delete_one(doc! { "deployment": deployment, "job": job, "index": index })
      .await
      .context("failed to delete instance")?;
    Ok(())
  }

  /// Finds one idle VM (not bound to any instance) in a resource pool, used
  /// by the resource pool updater to satisfy instance binding without a
  /// fresh `create_vm` call (spec §4.I).
  pub async fn find_idle_vm(
    &self,
    deployment: &str,
    resource_pool: &str,
  ) -> anyhow::Result<Option<Vm>> {
    self
      .vms
      .find_one(doc! {
        "deployment": deployment,
        "resource_pool": resource_pool,
        "instance": null,
      })
      .await
      .context("failed to query idle vm")
  }

  pub async fn list_idle_vms(
    &self,
    deployment: &str,
    resource_pool: &str,
    limit: i64,
  ) -> anyhow::Result<Vec<Vm>> {
    self
      .vms
      .find(doc! {
        "deployment": deployment,
        "resource_pool": resource_pool,
        "instance": null,
      })
      .limit(limit)
      .await
      .context("failed to query idle vms")?
      .try_collect()
      .await
      .context("failed to collect idle vms")
  }

  pub async fn find_vm(&self, cid: &str) -> anyhow::Result<Option<Vm>> {
    self.vms.find_one(doc! { "cid": cid }).await.context("failed to query vm")
  }

  pub async fn count_vms(
    &self,
    deployment: &str,
    resource_pool: &str,
  ) -> anyhow::Result<u64> {
    self
      .vms
      .count_documents(doc! { "deployment": deployment, "resource_pool": resource_pool })
      .await
      .context("failed to count vms")
  }

  pub async fn insert_vm(&self, vm: &Vm) -> anyhow::Result<()> {
    self.vms.insert_one(vm).await.context("failed to insert vm")?;
    Ok(())
  }

  pub async fn bind_vm(&self, cid: &str, instance: Option<&str>) -> anyhow::Result<()> {
    self
      .vms
      .update_one(
        doc! { "cid": cid },
        doc! { "$set": { "instance": instance } },
      )
      .await
      .context("failed to bind vm")?;
    Ok(())
  }

  pub async fn delete_vm(&self, cid: &str) -> anyhow::Result<()> {
    self.vms.delete_one(doc! { "cid": cid }).await.context("failed to delete vm")?;
    Ok(())
  }

  pub async fn insert_disk(&self, disk: &Disk) -> anyhow::Result<()> {
    self
      .disks
      .insert_one(disk)
      .await
      .context("failed to insert disk")?;
    Ok(())
  }

  pub async fn find_disk(&self, cid: &str) -> anyhow::Result<Option<Disk>> {
    self
      .disks
      .find_one(doc! { "cid": cid })
      .await
      .context("failed to query disk")
  }

  pub async fn delete_disk(&self, cid: &str) -> anyhow::Result<()> {
    self
      .disks
      .delete_one(doc! { "cid": cid })
      .await
      .context("failed to delete disk")?;
    Ok(())
  }
}
