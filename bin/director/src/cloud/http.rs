use async_trait::async_trait;
use director_client::error::{DirectorError, Result};
use serde::Deserialize;
use serde_json::{Value, json};

use super::CloudProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
  Vsphere,
  Esx,
}

impl ProviderKind {
  fn path_prefix(self) -> &'static str {
    match self {
      ProviderKind::Vsphere => "vsphere",
      ProviderKind::Esx => "esx",
    }
  }
}

/// Thin CPI client shared by the `vsphere` and `esx` variants: both speak
/// the same small JSON-over-HTTP contract against their provider's
/// management API, differing only in the base URL / path prefix and the
/// token used to authenticate. No vendor SDK is vendored in — these are
/// plain `reqwest` calls, the way the CLOUD dependencies section of the
/// workspace already assumes for CPI backends.
#[derive(Debug, Clone)]
pub struct HttpCloudProvider {
  kind: ProviderKind,
  base_url: String,
  token: String,
  client: reqwest::Client,
}

impl HttpCloudProvider {
  pub fn new(kind: ProviderKind, base_url: String, token: String) -> Self {
    Self { kind, base_url, token, client: reqwest::Client::new() }
  }

  fn url(&self, method: &str) -> String {
    format!(
      "{}/{}/{method}",
      self.base_url.trim_end_matches('/'),
      self.kind.path_prefix()
    )
  }

  async fn call<T: serde::de::DeserializeOwned>(
    &self,
    method: &str,
    body: Value,
  ) -> Result<T> {
    let response = self
      .client
      .post(self.url(method))
      .bearer_auth(&self.token)
      .json(&body)
      .send()
      .await
      .map_err(|e| DirectorError::CloudError(e.to_string()))?;

    if !response.status().is_success() {
      let status = response.status();
      let message = response
        .text()
        .await
        .unwrap_or_else(|_| status.to_string());
      return Err(DirectorError::CloudError(message));
    }

    response
      .json::<T>()
      .await
      .map_err(|e| DirectorError::CloudError(e.to_string()))
  }

  /// Same as `call`, but for methods that carry no response payload — the
  /// provider's 2xx status is the only signal.
  async fn call_ok(&self, method: &str, body: Value) -> Result<()> {
    let response = self
      .client
      .post(self.url(method))
      .bearer_auth(&self.token)
      .json(&body)
      .send()
      .await
      .map_err(|e| DirectorError::CloudError(e.to_string()))?;

    if !response.status().is_success() {
      let status = response.status();
      let message = response
        .text()
        .await
        .unwrap_or_else(|_| status.to_string());
      return Err(DirectorError::CloudError(message));
    }

    Ok(())
  }
}

#[derive(Deserialize)]
struct CidResponse {
  cid: String,
}

#[derive(Deserialize)]
struct DisksResponse {
  disks: Vec<String>,
}

#[async_trait]
impl CloudProvider for HttpCloudProvider {
  async fn create_stemcell(
    &self,
    image_path: &str,
    properties: &Value,
  ) -> Result<String> {
    let resp: CidResponse = self
      .call(
        "create_stemcell",
        json!({ "image_path": image_path, "cloud_properties": properties }),
      )
      .await?;
    Ok(resp.cid)
  }

  async fn delete_stemcell(&self, cid: &str) -> Result<()> {
    self.call_ok("delete_stemcell", json!({ "cid": cid })).await
  }

  async fn create_vm(
    &self,
    agent_id: &str,
    stemcell_cid: &str,
    resource_pool_properties: &Value,
    networks: &Value,
    env: &Value,
  ) -> Result<String> {
    let resp: CidResponse = self
      .call(
        "create_vm",
        json!({
          "agent_id": agent_id,
          "stemcell_cid": stemcell_cid,
          "cloud_properties": resource_pool_properties,
          "networks": networks,
          "env": env,
        }),
      )
      .await?;
    Ok(resp.cid)
  }

  async fn delete_vm(&self, cid: &str) -> Result<()> {
    self.call_ok("delete_vm", json!({ "cid": cid })).await
  }

  async fn reboot_vm(&self, cid: &str) -> Result<()> {
    self.call_ok("reboot_vm", json!({ "cid": cid })).await
  }

  async fn configure_networks(
    &self,
    cid: &str,
    networks: &Value,
  ) -> Result<()> {
    self
      .call_ok(
        "configure_networks",
        json!({ "cid": cid, "networks": networks }),
      )
      .await
  }

  async fn create_disk(&self, size_mb: i64, vm_cid: &str) -> Result<String> {
    let resp: CidResponse = self
      .call(
        "create_disk",
        json!({ "size_mb": size_mb, "vm_cid": vm_cid }),
      )
      .await?;
    Ok(resp.cid)
  }

  async fn delete_disk(&self, cid: &str) -> Result<()> {
    self.call_ok("delete_disk", json!({ "cid": cid })).await
  }

  async fn attach_disk(&self, vm_cid: &str, disk_cid: &str) -> Result<()> {
    self
      .call_ok(
        "attach_disk",
        json!({ "vm_cid": vm_cid, "disk_cid": disk_cid }),
      )
      .await
  }

  async fn detach_disk(&self, vm_cid: &str, disk_cid: &str) -> Result<()> {
    self
      .call_ok(
        "detach_disk",
        json!({ "vm_cid": vm_cid, "disk_cid": disk_cid }),
      )
      .await
  }

  async fn get_disks(&self, vm_cid: &str) -> Result<Vec<String>> {
    let resp: DisksResponse =
      self.call("get_disks", json!({ "vm_cid": vm_cid })).await?;
    Ok(resp.disks)
  }

  async fn snapshot_disk(&self, disk_cid: &str) -> Result<String> {
    let resp: CidResponse = self
      .call("snapshot_disk", json!({ "disk_cid": disk_cid }))
      .await?;
    Ok(resp.cid)
  }
}
