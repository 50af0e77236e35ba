use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use director_client::error::Result;
use serde_json::Value;

use super::CloudProvider;

/// In-memory stand-in backend, used by the integration-test agent and by
/// manifests that declare a `dummy` resource pool. No network calls, no
/// polling — every operation completes as soon as the caller awaits it.
#[derive(Debug, Default)]
pub struct DummyCloudProvider {
  stemcells: DashSet<String>,
  vms: DashMap<String, Vec<String>>,
  disks: DashMap<String, i64>,
}

impl DummyCloudProvider {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl CloudProvider for DummyCloudProvider {
  async fn create_stemcell(
    &self,
    _image_path: &str,
    _properties: &Value,
  ) -> Result<String> {
    let cid = format!("dummy-stemcell-{}", uuid::Uuid::new_v4());
    self.stemcells.insert(cid.clone());
    Ok(cid)
  }

  async fn delete_stemcell(&self, cid: &str) -> Result<()> {
    self.stemcells.remove(cid);
    Ok(())
  }

  async fn create_vm(
    &self,
    _agent_id: &str,
    _stemcell_cid: &str,
    _resource_pool_properties: &Value,
    _networks: &Value,
    _env: &Value,
  ) -> Result<String> {
    let cid = format!("dummy-vm-{}", uuid::Uuid::new_v4());
    self.vms.insert(cid.clone(), Vec::new());
    Ok(cid)
  }

  async fn delete_vm(&self, cid: &str) -> Result<()> {
    self.vms.remove(cid);
    Ok(())
  }

  async fn reboot_vm(&self, cid: &str) -> Result<()> {
    if !self.vms.contains_key(cid) {
      return Err(director_client::error::DirectorError::CloudError(
        format!("no such vm: {cid}"),
      ));
    }
    Ok(())
  }

  async fn configure_networks(
    &self,
    cid: &str,
    _networks: &Value,
  ) -> Result<()> {
    if !self.vms.contains_key(cid) {
      return Err(director_client::error::DirectorError::CloudError(
        format!("no such vm: {cid}"),
      ));
    }
    Ok(())
  }

  async fn create_disk(&self, size_mb: i64, vm_cid: &str) -> Result<String> {
    let cid = format!("dummy-disk-{}", uuid::Uuid::new_v4());
    self.disks.insert(cid.clone(), size_mb);
    if let Some(mut attached) = self.vms.get_mut(vm_cid) {
      attached.push(cid.clone());
    }
    Ok(cid)
  }

  async fn delete_disk(&self, cid: &str) -> Result<()> {
    self.disks.remove(cid);
    Ok(())
  }

  async fn attach_disk(&self, vm_cid: &str, disk_cid: &str) -> Result<()> {
    let mut attached = self.vms.entry(vm_cid.to_string()).or_default();
    if !attached.contains(&disk_cid.to_string()) {
      attached.push(disk_cid.to_string());
    }
    Ok(())
  }

  async fn detach_disk(&self, vm_cid: &str, disk_cid: &str) -> Result<()> {
    if let Some(mut attached) = self.vms.get_mut(vm_cid) {
      attached.retain(|d| d != disk_cid);
    }
    Ok(())
  }

  async fn get_disks(&self, vm_cid: &str) -> Result<Vec<String>> {
    Ok(
      self
        .vms
        .get(vm_cid)
        .map(|disks| disks.clone())
        .unwrap_or_default(),
    )
  }

  async fn snapshot_disk(&self, disk_cid: &str) -> Result<String> {
    if !self.disks.contains_key(disk_cid) {
      return Err(director_client::error::DirectorError::CloudError(
        format!("no such disk: {disk_cid}"),
      ));
    }
    Ok(format!("dummy-snapshot-{}", uuid::Uuid::new_v4()))
  }
}
