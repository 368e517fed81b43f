//! In-memory `CloudApi` for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};

use ycbot_types::Organization;

use crate::client::CloudApi;
use crate::credential::Credential;
use crate::error::{CloudError, CloudResult, Stage};
use crate::inventory::EXPIRATION_LABEL;
use crate::wire::{CloudRecord, FolderRecord, InstanceRecord};

/// Build an instance record; `expires` is the raw `expired_date` label value.
pub fn instance(id: &str, status: &str, expires: Option<&str>) -> InstanceRecord {
    let mut labels = HashMap::new();
    if let Some(date) = expires {
        labels.insert(EXPIRATION_LABEL.to_string(), date.to_string());
    }
    InstanceRecord {
        id: id.to_string(),
        name: format!("vm-{id}"),
        status: status.to_string(),
        labels,
    }
}

#[derive(Default)]
struct FakeState {
    organizations: Vec<Organization>,
    clouds: Vec<CloudRecord>,
    folders: HashMap<String, Vec<FolderRecord>>,
    instances: HashMap<String, Vec<InstanceRecord>>,
    tokens: VecDeque<Result<Credential, String>>,
    oauth_tokens_seen: Vec<String>,
    bearers_seen: Vec<String>,
    failing_stage: Option<(Stage, u16, String)>,
    stop_failures: HashMap<String, (u16, String)>,
    stop_requests: Vec<String>,
    list_delay: Duration,
}

/// A scripted cloud. Instances keep their status when stopped, so the same
/// set stays expired across scheduler cycles.
#[derive(Default)]
pub struct FakeCloud {
    state: Mutex<FakeState>,
    inventory_fetches: AtomicUsize,
}

impl FakeCloud {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an instance under `cloud_id`/`folder_id`, creating both as needed.
    pub fn with_instance(self, cloud_id: &str, folder_id: &str, record: InstanceRecord) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            if !state.clouds.iter().any(|c| c.id == cloud_id) {
                state.clouds.push(CloudRecord {
                    id: cloud_id.to_string(),
                    name: format!("cloud-{cloud_id}"),
                });
            }
            let folders = state.folders.entry(cloud_id.to_string()).or_default();
            if !folders.iter().any(|f| f.id == folder_id) {
                folders.push(FolderRecord {
                    id: folder_id.to_string(),
                    name: format!("folder-{folder_id}"),
                });
            }
            state
                .instances
                .entry(folder_id.to_string())
                .or_default()
                .push(record);
        }
        self
    }

    pub fn with_organization(self, id: &str, title: &str) -> Self {
        self.state.lock().unwrap().organizations.push(Organization {
            id: id.to_string(),
            title: title.to_string(),
        });
        self
    }

    /// Delay every cloud listing, which makes inventory fetches slow.
    pub fn with_list_delay(self, delay: Duration) -> Self {
        self.state.lock().unwrap().list_delay = delay;
        self
    }

    /// Make every call of `stage` fail with `status` and `body`.
    pub fn fail_stage(&self, stage: Stage, status: u16, body: &str) {
        self.state.lock().unwrap().failing_stage = Some((stage, status, body.to_string()));
    }

    pub fn clear_failures(&self) {
        self.state.lock().unwrap().failing_stage = None;
    }

    /// Make stop calls for one instance fail.
    pub fn fail_stop(&self, instance_id: &str, status: u16, body: &str) {
        self.state
            .lock()
            .unwrap()
            .stop_failures
            .insert(instance_id.to_string(), (status, body.to_string()));
    }

    /// Queue the result of the next token exchange. When the queue is empty
    /// exchanges succeed with a 12-hour credential.
    pub fn push_token(&self, result: Result<Credential, String>) {
        self.state.lock().unwrap().tokens.push_back(result);
    }

    pub fn stop_requests(&self) -> Vec<String> {
        self.state.lock().unwrap().stop_requests.clone()
    }

    pub fn oauth_tokens_seen(&self) -> Vec<String> {
        self.state.lock().unwrap().oauth_tokens_seen.clone()
    }

    pub fn bearers_seen(&self) -> Vec<String> {
        self.state.lock().unwrap().bearers_seen.clone()
    }

    /// How many times the top of the hierarchy was listed.
    pub fn inventory_fetches(&self) -> usize {
        self.inventory_fetches.load(Ordering::SeqCst)
    }

    fn check(&self, stage: Stage, token: &str) -> CloudResult<()> {
        let mut state = self.state.lock().unwrap();
        state.bearers_seen.push(token.to_string());
        match &state.failing_stage {
            Some((failing, status, body)) if *failing == stage => Err(CloudError::Api {
                stage,
                status: *status,
                body: body.clone(),
            }),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl CloudApi for FakeCloud {
    async fn exchange_token(&self, oauth_token: &str) -> CloudResult<Credential> {
        let mut state = self.state.lock().unwrap();
        state.oauth_tokens_seen.push(oauth_token.to_string());
        match state.tokens.pop_front() {
            Some(Ok(credential)) => Ok(credential),
            Some(Err(reason)) => Err(CloudError::Auth(reason)),
            None => Ok(Credential::new("t1.fake", Utc::now() + TimeDelta::hours(12))),
        }
    }

    async fn list_organizations(&self, token: &str) -> CloudResult<Vec<Organization>> {
        self.check(Stage::Organizations, token)?;
        Ok(self.state.lock().unwrap().organizations.clone())
    }

    async fn list_clouds(&self, token: &str) -> CloudResult<Vec<CloudRecord>> {
        self.inventory_fetches.fetch_add(1, Ordering::SeqCst);
        let delay = self.state.lock().unwrap().list_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.check(Stage::Clouds, token)?;
        Ok(self.state.lock().unwrap().clouds.clone())
    }

    async fn list_folders(&self, token: &str, cloud_id: &str) -> CloudResult<Vec<FolderRecord>> {
        self.check(Stage::Folders, token)?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .folders
            .get(cloud_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_instances(
        &self,
        token: &str,
        folder_id: &str,
    ) -> CloudResult<Vec<InstanceRecord>> {
        self.check(Stage::Instances, token)?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .instances
            .get(folder_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn stop_instance(&self, token: &str, instance_id: &str) -> CloudResult<()> {
        self.check(Stage::Stop, token)?;
        let mut state = self.state.lock().unwrap();
        state.stop_requests.push(instance_id.to_string());
        match state.stop_failures.get(instance_id) {
            Some((status, body)) => Err(CloudError::Api {
                stage: Stage::Stop,
                status: *status,
                body: body.clone(),
            }),
            None => Ok(()),
        }
    }
}
