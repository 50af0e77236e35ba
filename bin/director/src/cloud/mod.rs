use async_trait::async_trait;
use director_client::error::Result;
use serde_json::Value;

mod dummy;
mod http;

pub use dummy::DummyCloudProvider;
pub use http::{HttpCloudProvider, ProviderKind};

/// The capability set of §4.E, dispatched as a trait object rather than an
/// enum match — `Context::cloud` holds `Arc<dyn CloudProvider>` so adding a
/// fourth backend never touches call sites, matching the object-safe
/// capability-interface pattern `aion-cloud` uses for its own multi-cloud
/// abstraction. Every call is synchronous from the caller's perspective;
/// implementations own whatever polling their backend needs internally.
#[async_trait]
pub trait CloudProvider: Send + Sync + std::fmt::Debug {
  async fn create_stemcell(
    &self,
    image_path: &str,
    properties: &Value,
  ) -> Result<String>;

  async fn delete_stemcell(&self, cid: &str) -> Result<()>;

  async fn create_vm(
    &self,
    agent_id: &str,
    stemcell_cid: &str,
    resource_pool_properties: &Value,
    networks: &Value,
    env: &Value,
  ) -> Result<String>;

  async fn delete_vm(&self, cid: &str) -> Result<()>;

  async fn reboot_vm(&self, cid: &str) -> Result<()>;

  async fn configure_networks(
    &self,
    cid: &str,
    networks: &Value,
  ) -> Result<()>;

  async fn create_disk(&self, size_mb: i64, vm_cid: &str) -> Result<String>;

  async fn delete_disk(&self, cid: &str) -> Result<()>;

  async fn attach_disk(&self, vm_cid: &str, disk_cid: &str) -> Result<()>;

  async fn detach_disk(&self, vm_cid: &str, disk_cid: &str) -> Result<()>;

  async fn get_disks(&self, vm_cid: &str) -> Result<Vec<String>>;

  async fn snapshot_disk(&self, disk_cid: &str) -> Result<String>;
}
