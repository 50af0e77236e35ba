//! Typed persistence layer. Reconciliation logic in `bin/director` never
//! builds a `bson::doc!` directly — it calls the typed functions exported
//! from these submodules, keeping database queries out of business logic.

use anyhow::{Context, anyhow};
use mongo_indexed::{create_index, create_unique_index};
use mungos::{
  init::MongoBuilder,
  mongodb::{Collection, Database, IndexModel, bson::doc, options::IndexOptions},
};

use director_client::entities::{
  compiled_package::CompiledPackage,
  deployment::{Deployment, Disk, Instance, Vm},
  lock::LockRecord,
  release::{Package, Release, ReleaseVersion, Template},
  stemcell::Stemcell,
  task::Task,
  user::User,
};

pub mod compiled_packages;
pub mod deployments;
pub mod locks;
pub mod releases;
pub mod stemcells;
pub mod tasks;
pub mod users;

pub use mongo_indexed;
pub use mungos;

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct DatabaseConfig {
  /// Full Mongo connection URI. Takes priority over `address` if set.
  #[serde(default)]
  pub uri: String,
  #[serde(default)]
  pub address: String,
  #[serde(default)]
  pub username: String,
  #[serde(default)]
  pub password: String,
  #[serde(default = "default_app_name")]
  pub app_name: String,
  #[serde(default = "default_db_name")]
  pub db_name: String,
}

fn default_app_name() -> String {
  "director".to_string()
}

fn default_db_name() -> String {
  "director".to_string()
}

#[derive(Debug)]
pub struct Client {
  pub tasks: Collection<Task>,
  pub releases: Collection<Release>,
  pub release_versions: Collection<ReleaseVersion>,
  pub packages: Collection<Package>,
  pub templates: Collection<Template>,
  pub compiled_packages: Collection<CompiledPackage>,
  pub stemcells: Collection<Stemcell>,
  pub deployments: Collection<Deployment>,
  pub instances: Collection<Instance>,
  pub vms: Collection<Vm>,
  pub disks: Collection<Disk>,
  pub locks: Collection<LockRecord>,
  pub users: Collection<User>,
  pub counters: Collection<mungos::mongodb::bson::Document>,
  pub db: Database,
}

impl Client {
  pub async fn new(config: &DatabaseConfig) -> anyhow::Result<Client> {
    let db = init(config).await?;
    Self::from_database(db).await
  }

  pub async fn from_database(db: Database) -> anyhow::Result<Client> {
    let client = Client {
      tasks: db.collection("Task"),
      releases: unique_index_collection(&db, "Release", &["name"]).await?,
      release_versions: unique_index_collection(
        &db,
        "ReleaseVersion",
        &["release", "version"],
      )
      .await?,
      packages: unique_index_collection(
        &db,
        "Package",
        &["name", "version", "fingerprint"],
      )
      .await?,
      templates: unique_index_collection(&db, "Template", &["name", "version"])
        .await?,
      compiled_packages: unique_index_collection(
        &db,
        "CompiledPackage",
        &[
          "package_name",
          "package_version",
          "stemcell_name",
          "stemcell_version",
          "dependency_key",
        ],
      )
      .await?,
      stemcells: unique_index_collection(&db, "Stemcell", &["name", "version"])
        .await?,
      deployments: {
        let coll = db.collection("Deployment");
        create_unique_index(&coll, "name").await?;
        coll
      },
      instances: unique_index_collection(
        &db,
        "Instance",
        &["deployment", "job", "index"],
      )
      .await?,
      vms: {
        let coll = db.collection("Vm");
        create_index(&coll, "deployment").await?;
        coll
      },
      disks: db.collection("Disk"),
      locks: db.collection("Lock"),
      users: {
        let coll = db.collection("User");
        create_unique_index(&coll, "username").await?;
        coll
      },
      counters: db.collection("Counter"),
      db,
    };
    Ok(client)
  }

  /// Atomically allocates the next value for a named monotonic counter,
  /// used for the Task's human-facing `number` (spec §3).
  pub async fn next_counter(&self, name: &str) -> anyhow::Result<i64> {
    let doc = self
      .counters
      .find_one_and_update(
        doc! { "_id": name },
        doc! { "$inc": { "value": 1i64 } },
      )
      .upsert(true)
      .return_document(mungos::mongodb::options::ReturnDocument::After)
      .await
      .context("failed to increment counter")?
      .ok_or_else(|| anyhow!("counter upsert returned no document"))?;
    doc
      .get_i64("value")
      .context("counter document missing 'value'")
  }
}

async fn unique_index_collection<T: Send + Sync>(
  db: &Database,
  name: &str,
  fields: &[&str],
) -> anyhow::Result<Collection<T>> {
  let coll = db.collection::<T>(name);
  if fields.len() == 1 {
    create_unique_index(&coll, fields[0]).await?;
  } else {
    let keys = fields.iter().fold(doc! {}, |mut acc, f| {
      acc.insert(*f, 1);
      acc
    });
    coll
      .create_index(
        IndexModel::builder()
          .keys(keys)
          .options(IndexOptions::builder().unique(true).build())
          .build(),
      )
      .await
      .context("failed to create compound unique index")?;
  }
  Ok(coll)
}

pub async fn init(
  DatabaseConfig { uri, address, username, password, app_name, db_name }: &DatabaseConfig,
) -> anyhow::Result<Database> {
  let mut client = MongoBuilder::default().app_name(app_name);

  match (!uri.is_empty(), !address.is_empty(), !username.is_empty(), !password.is_empty()) {
    (true, _, _, _) => {
      client = client.uri(uri);
    }
    (_, true, true, true) => {
      client = client.address(address).username(username).password(password);
    }
    (_, true, _, _) => {
      client = client.address(address);
    }
    _ => {
      return Err(anyhow!(
        "database config not set correctly, pass either 'uri' or 'address' (+ optional 'username'/'password')"
      ));
    }
  }

  let client = client
    .build()
    .await
    .context("failed to initialize database connection")?;

  Ok(client.database(db_name))
}

const BCRYPT_COST: u32 = 10;

pub fn hash_password<P: AsRef<[u8]>>(password: P) -> anyhow::Result<String> {
  bcrypt::hash(password, BCRYPT_COST).context("failed to hash password")
}
