//! Shutdown executor and the fetch → select → stop sweep.

use std::fmt;

use chrono::NaiveDate;
use tracing::{info, warn};

use ycbot_types::Resource;

use crate::client::CloudApi;
use crate::error::{CloudError, CloudResult};
use crate::inventory::fetch_inventory;
use crate::policy::select_expired;

/// Result of one stop call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    /// The provider accepted the stop request.
    Stopping,
    /// The call failed. `status` is `None` when no HTTP response arrived.
    Failed { status: Option<u16>, body: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopResult {
    pub instance_id: String,
    pub instance_name: String,
    pub outcome: StopOutcome,
}

impl fmt::Display for StopResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            StopOutcome::Stopping => write!(f, "Instance {} is shutting down", self.instance_id),
            StopOutcome::Failed {
                status: Some(status),
                body,
            } => write!(f, "Error {}: {status}, {}", self.instance_id, one_line(body)),
            StopOutcome::Failed { status: None, body } => {
                write!(f, "Error {}: {}", self.instance_id, one_line(body))
            }
        }
    }
}

/// Error bodies are often pretty-printed JSON; a report line must stay one line.
fn one_line(body: &str) -> String {
    body.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// One line per attempted stop, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub results: Vec<StopResult>,
}

impl ShutdownReport {
    /// An empty report means there was nothing to stop.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.outcome == StopOutcome::Stopping)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }
}

impl fmt::Display for ShutdownReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for result in &self.results {
            writeln!(f, "{result}")?;
        }
        Ok(())
    }
}

/// Issue one stop call per resource. Failures never cut the run short.
pub async fn stop_instances(
    api: &dyn CloudApi,
    resources: &[Resource],
    token: &str,
) -> ShutdownReport {
    let mut results = Vec::with_capacity(resources.len());

    for resource in resources {
        let outcome = match api.stop_instance(token, &resource.id).await {
            Ok(()) => {
                info!(instance_id = %resource.id, "Stop requested");
                StopOutcome::Stopping
            }
            Err(CloudError::Api { status, body, .. }) => {
                warn!(instance_id = %resource.id, status, "Stop rejected: {body}");
                StopOutcome::Failed {
                    status: Some(status),
                    body,
                }
            }
            Err(e) => {
                warn!(instance_id = %resource.id, "Stop failed: {e}");
                StopOutcome::Failed {
                    status: None,
                    body: e.to_string(),
                }
            }
        };

        results.push(StopResult {
            instance_id: resource.id.clone(),
            instance_name: resource.name.clone(),
            outcome,
        });
    }

    ShutdownReport { results }
}

/// Fetch a fresh inventory, select what is expired on `today`, stop it.
///
/// A failed fetch is returned as an error and nothing is stopped.
pub async fn sweep_expired(
    api: &dyn CloudApi,
    token: &str,
    today: NaiveDate,
) -> CloudResult<ShutdownReport> {
    let inventory = fetch_inventory(api, token).await?;
    let expired = select_expired(inventory.instances(), today);
    info!(
        expired = expired.len(),
        total = inventory.instance_count(),
        "Expired instances selected"
    );
    Ok(stop_instances(api, &expired, token).await)
}
