//! Inventory fetcher: walks clouds → folders → instances.

use chrono::NaiveDate;
use tracing::debug;

use ycbot_types::{Cloud, Folder, InstanceStatus, Inventory, Resource};

use crate::client::CloudApi;
use crate::error::{CloudError, CloudResult};
use crate::wire::InstanceRecord;

/// Label carrying the instance's expiration date.
pub const EXPIRATION_LABEL: &str = "expired_date";
/// Format of the expiration label value (`DD.MM.YYYY`).
pub const EXPIRATION_DATE_FORMAT: &str = "%d.%m.%Y";

/// Fetch a complete snapshot of the hierarchy.
///
/// Any failed listing, and any instance without a parseable expiration
/// label, fails the whole fetch. Partial snapshots are never returned.
pub async fn fetch_inventory(api: &dyn CloudApi, token: &str) -> CloudResult<Inventory> {
    let mut clouds = Vec::new();

    for cloud in api.list_clouds(token).await? {
        let mut folders = Vec::new();

        for folder in api.list_folders(token, &cloud.id).await? {
            let instances = api
                .list_instances(token, &folder.id)
                .await?
                .into_iter()
                .map(resource_from_record)
                .collect::<CloudResult<Vec<_>>>()?;

            folders.push(Folder {
                id: folder.id,
                name: folder.name,
                instances,
            });
        }

        clouds.push(Cloud {
            id: cloud.id,
            name: cloud.name,
            folders,
        });
    }

    let inventory = Inventory { clouds };
    debug!(
        clouds = inventory.clouds.len(),
        instances = inventory.instance_count(),
        "Inventory fetched"
    );
    Ok(inventory)
}

/// Validate one listed instance into a `Resource`.
pub fn resource_from_record(record: InstanceRecord) -> CloudResult<Resource> {
    let raw = record
        .labels
        .get(EXPIRATION_LABEL)
        .ok_or_else(|| CloudError::MissingLabel {
            instance_id: record.id.clone(),
            label: EXPIRATION_LABEL,
        })?;

    let expires_on = NaiveDate::parse_from_str(raw.trim(), EXPIRATION_DATE_FORMAT).map_err(|_| {
        CloudError::InvalidLabel {
            instance_id: record.id.clone(),
            label: EXPIRATION_LABEL,
            value: raw.clone(),
        }
    })?;

    Ok(Resource {
        id: record.id,
        name: record.name,
        status: InstanceStatus::from(record.status),
        expires_on,
    })
}
