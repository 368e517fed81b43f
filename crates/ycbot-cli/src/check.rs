//! One-shot expiry check from the terminal.

use anyhow::{Context, bail};
use tracing::info;

use ycbot_cloud::{
    CloudApi, EXPIRATION_DATE_FORMAT, YandexCloudClient, fetch_inventory, local_today,
    select_expired, stop_instances,
};
use ycbot_config::YcBotConfig;

pub async fn run_check(config: YcBotConfig, stop: bool) -> anyhow::Result<()> {
    let oauth_token = ycbot_config::oauth_token_from_env()?;
    let client = YandexCloudClient::new(
        crate::endpoints(&config.cloud),
        config.cloud.request_timeout(),
    )?;

    let credential = client
        .exchange_token(&oauth_token)
        .await
        .context("failed to obtain a cloud credential")?;
    let inventory = fetch_inventory(&client, credential.token())
        .await
        .context("failed to list instances")?;

    let today = local_today();
    let expired = select_expired(inventory.instances(), today);
    println!(
        "{} instances, {} expired as of {}",
        inventory.instance_count(),
        expired.len(),
        today.format(EXPIRATION_DATE_FORMAT)
    );
    for resource in &expired {
        println!(
            "  {}  {}  {}  {}",
            resource.id,
            resource.name,
            resource.status,
            resource.expires_on.format(EXPIRATION_DATE_FORMAT)
        );
    }

    if !stop || expired.is_empty() {
        return Ok(());
    }

    let report = stop_instances(&client, &expired, credential.token()).await;
    print!("{report}");
    info!(
        stopped = report.succeeded(),
        failed = report.failed(),
        "Shutdown finished"
    );
    if report.failed() > 0 {
        bail!("{} of {} stop requests failed", report.failed(), expired.len());
    }
    Ok(())
}
