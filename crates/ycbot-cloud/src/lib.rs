//! ycbot-cloud: the cloud side of the shutdown bot.
//!
//! - `CloudApi`: the provider calls, with a reqwest implementation
//! - `CredentialSupplier`/`CredentialHandle`: background bearer refresh
//! - `fetch_inventory`: clouds → folders → instances snapshot
//! - `select_expired`: the expiration policy
//! - `stop_instances`/`sweep_expired`: the shutdown executor

pub mod client;
pub mod credential;
pub mod error;
pub mod inventory;
pub mod policy;
pub mod shutdown;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod wire;

pub use client::{CloudApi, Endpoints, YandexCloudClient};
pub use credential::{Credential, CredentialHandle, CredentialSupplier, RefreshPolicy};
pub use error::{CloudError, CloudResult, Stage};
pub use inventory::{EXPIRATION_DATE_FORMAT, EXPIRATION_LABEL, fetch_inventory};
pub use policy::{is_expired, local_today, select_expired};
pub use shutdown::{ShutdownReport, StopOutcome, StopResult, stop_instances, sweep_expired};
