//! Cloud REST API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use ycbot_types::Organization;

use crate::credential::Credential;
use crate::error::{CloudError, CloudResult, Stage};
use crate::wire::{
    CloudRecord, CloudsPage, FolderRecord, FoldersPage, InstanceRecord, InstancesPage,
    OrganizationsPage, Page, TokenRequest, TokenResponse,
};

/// Calls the core needs from the cloud provider.
///
/// Every call except the token exchange is authenticated with a bearer token
/// passed by the caller, so implementations hold no credential state.
#[async_trait]
pub trait CloudApi: Send + Sync {
    /// Exchange the long-lived refresh token for a short-lived credential.
    async fn exchange_token(&self, oauth_token: &str) -> CloudResult<Credential>;

    async fn list_organizations(&self, token: &str) -> CloudResult<Vec<Organization>>;

    async fn list_clouds(&self, token: &str) -> CloudResult<Vec<CloudRecord>>;

    async fn list_folders(&self, token: &str, cloud_id: &str) -> CloudResult<Vec<FolderRecord>>;

    async fn list_instances(&self, token: &str, folder_id: &str)
    -> CloudResult<Vec<InstanceRecord>>;

    /// Request a stop of one instance. Success means the provider accepted it.
    async fn stop_instance(&self, token: &str, instance_id: &str) -> CloudResult<()>;
}

/// Base URLs of the services the client talks to.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub iam: String,
    pub resource_manager: String,
    pub compute: String,
    pub organization_manager: String,
}

impl Endpoints {
    /// Point every service at one base URL (used against mock servers).
    pub fn single(base: &str) -> Self {
        Self {
            iam: base.to_string(),
            resource_manager: base.to_string(),
            compute: base.to_string(),
            organization_manager: base.to_string(),
        }
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            iam: "https://iam.api.cloud.yandex.net".into(),
            resource_manager: "https://resource-manager.api.cloud.yandex.net".into(),
            compute: "https://compute.api.cloud.yandex.net".into(),
            organization_manager: "https://organization-manager.api.cloud.yandex.net".into(),
        }
    }
}

/// HTTP client for the Yandex Cloud REST API.
pub struct YandexCloudClient {
    client: Client,
    endpoints: Endpoints,
}

impl YandexCloudClient {
    /// Create a client whose every request is bounded by `timeout`.
    pub fn new(endpoints: Endpoints, timeout: Duration) -> CloudResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoints })
    }

    fn trim(base: &str) -> &str {
        base.trim_end_matches('/')
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
        token: &str,
        stage: Stage,
    ) -> CloudResult<T> {
        let resp = self
            .client
            .get(url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await?;

        let status = resp.status();
        if status != StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            return Err(CloudError::Api {
                stage,
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp.json().await?)
    }

    /// Fetch every page of a listing.
    async fn list_all<P: Page>(
        &self,
        url: &str,
        base_query: &[(&str, &str)],
        token: &str,
        stage: Stage,
    ) -> CloudResult<Vec<P::Item>> {
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = base_query.to_vec();
            if let Some(t) = page_token.as_deref() {
                query.push(("pageToken", t));
            }

            let page: P = self.get_json(url, &query, token, stage).await?;
            let (batch, next) = page.into_parts();
            items.extend(batch);

            match next {
                Some(next) if !next.is_empty() => {
                    debug!(%stage, "Following next page");
                    page_token = Some(next);
                }
                _ => return Ok(items),
            }
        }
    }
}

#[async_trait]
impl CloudApi for YandexCloudClient {
    async fn exchange_token(&self, oauth_token: &str) -> CloudResult<Credential> {
        let resp = self
            .client
            .post(format!("{}/iam/v1/tokens", Self::trim(&self.endpoints.iam)))
            .json(&TokenRequest { oauth_token })
            .send()
            .await
            .map_err(|e| CloudError::Auth(format!("token request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CloudError::Auth(format!("status {}: {body}", status.as_u16())));
        }

        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| CloudError::Auth(format!("malformed token response: {e}")))?;
        Ok(Credential::new(token.iam_token, token.expires_at))
    }

    async fn list_organizations(&self, token: &str) -> CloudResult<Vec<Organization>> {
        let url = format!(
            "{}/organization-manager/v1/organizations",
            Self::trim(&self.endpoints.organization_manager)
        );
        self.list_all::<OrganizationsPage>(&url, &[], token, Stage::Organizations)
            .await
    }

    async fn list_clouds(&self, token: &str) -> CloudResult<Vec<CloudRecord>> {
        let url = format!(
            "{}/resource-manager/v1/clouds",
            Self::trim(&self.endpoints.resource_manager)
        );
        self.list_all::<CloudsPage>(&url, &[], token, Stage::Clouds)
            .await
    }

    async fn list_folders(&self, token: &str, cloud_id: &str) -> CloudResult<Vec<FolderRecord>> {
        let url = format!(
            "{}/resource-manager/v1/folders",
            Self::trim(&self.endpoints.resource_manager)
        );
        self.list_all::<FoldersPage>(&url, &[("cloudId", cloud_id)], token, Stage::Folders)
            .await
    }

    async fn list_instances(
        &self,
        token: &str,
        folder_id: &str,
    ) -> CloudResult<Vec<InstanceRecord>> {
        let url = format!(
            "{}/compute/v1/instances",
            Self::trim(&self.endpoints.compute)
        );
        self.list_all::<InstancesPage>(&url, &[("folderId", folder_id)], token, Stage::Instances)
            .await
    }

    async fn stop_instance(&self, token: &str, instance_id: &str) -> CloudResult<()> {
        let url = format!(
            "{}/compute/v1/instances/{instance_id}:stop",
            Self::trim(&self.endpoints.compute)
        );
        let resp = self.client.post(url).bearer_auth(token).send().await?;

        let status = resp.status();
        if status != StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            return Err(CloudError::Api {
                stage: Stage::Stop,
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_endpoint() {
        let endpoints = Endpoints::single("http://127.0.0.1:8080");
        assert_eq!(endpoints.iam, "http://127.0.0.1:8080");
        assert_eq!(endpoints.compute, "http://127.0.0.1:8080");
    }

    #[test]
    fn test_trim_trailing_slash() {
        assert_eq!(
            YandexCloudClient::trim("https://compute.api.cloud.yandex.net/"),
            "https://compute.api.cloud.yandex.net"
        );
    }
}
