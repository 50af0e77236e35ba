use serde::{Deserialize, Serialize};

/// Subtypes of [Task][task::Task].
pub mod task;
/// [Release][release::Release], [ReleaseVersion][release::ReleaseVersion],
/// [Package][release::Package], [Template][release::Template].
pub mod release;
/// [CompiledPackage][compiled_package::CompiledPackage].
pub mod compiled_package;
/// [Stemcell][stemcell::Stemcell].
pub mod stemcell;
/// [Deployment][deployment::Deployment], [Instance][deployment::Instance],
/// [Vm][deployment::Vm], [Disk][deployment::Disk].
pub mod deployment;
/// [Lock][lock::Lock] rows.
pub mod lock;
/// Minimal [User][user::User] for HTTP basic auth.
pub mod user;
/// [LogConfig][logger::LogConfig] for `lib/logger`.
pub mod logger;
/// [Log][log::Log] record shared by task output streams.
pub mod log;

#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize,
)]
pub struct Empty {}

pub type I64 = i64;
pub type MongoId = String;

/// Current unix timestamp in milliseconds.
pub fn director_timestamp() -> I64 {
  std::time::SystemTime::now()
    .duration_since(std::time::UNIX_EPOCH)
    .expect("time went backwards")
    .as_millis() as I64
}
