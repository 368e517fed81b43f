//! The long-running bot.

use std::sync::Arc;

use anyhow::{Context, anyhow};
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use ycbot_channel_telegram::TelegramChannel;
use ycbot_cloud::{CloudApi, CloudResult, CredentialSupplier, YandexCloudClient};
use ycbot_config::{Secrets, YcBotConfig};
use ycbot_cron::AutoShutdown;
use ycbot_gateway::{CommandHandler, Gateway};

fn supplier_exit(result: Result<CloudResult<()>, JoinError>) -> anyhow::Error {
    match result {
        Ok(Ok(())) => anyhow!("credential supplier stopped unexpectedly"),
        Ok(Err(e)) => anyhow!(e).context("credential refresh failed"),
        Err(e) => anyhow!("credential supplier task failed: {e}"),
    }
}

fn gateway_exit(result: Result<anyhow::Result<()>, JoinError>) -> anyhow::Result<()> {
    match result {
        Ok(result) => result,
        Err(e) => Err(anyhow!("gateway task failed: {e}")),
    }
}

pub async fn run_bot(config: YcBotConfig) -> anyhow::Result<()> {
    let secrets = Secrets::from_env()?;
    let schedule = crate::schedule(&config.auto_shutdown)?;

    let client: Arc<dyn CloudApi> = Arc::new(YandexCloudClient::new(
        crate::endpoints(&config.cloud),
        config.cloud.request_timeout(),
    )?);

    let (credential, mut supplier) = CredentialSupplier::new(
        client.clone(),
        secrets.oauth_token.clone(),
        crate::refresh_policy(&config.credential),
    )
    .spawn();

    info!("Waiting for the first cloud credential");
    tokio::select! {
        ready = credential.ready() => {
            ready.context("credential supplier never became ready")?;
        }
        result = &mut supplier => {
            let e = supplier_exit(result);
            error!("Startup aborted: {e:#}");
            return Err(e);
        }
    }
    info!("Cloud credential ready");

    let (reports_tx, reports_rx) = mpsc::unbounded_channel();
    let auto_shutdown = Arc::new(AutoShutdown::new(
        client.clone(),
        credential.clone(),
        schedule,
        reports_tx,
    ));
    let handler = Arc::new(CommandHandler::new(
        client,
        credential,
        auto_shutdown.clone(),
    ));
    let channel = Arc::new(TelegramChannel::new(&secrets.bot_token)?);
    let gateway = Gateway::new(handler, channel, config.telegram.allowed_chat_ids.clone());

    let cancel = CancellationToken::new();
    let mut gateway_task = tokio::spawn(gateway.run(reports_rx, cancel.clone()));
    let mut gateway_done = false;

    let outcome = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!("Failed to listen for Ctrl-C: {e}");
            }
            info!("Shutdown requested");
            Ok(())
        }
        result = &mut supplier => Err(supplier_exit(result)),
        result = &mut gateway_task => {
            gateway_done = true;
            gateway_exit(result)
        }
    };

    if let Err(e) = &outcome {
        error!("Stopping on fatal error: {e:#}");
    }
    cancel.cancel();
    if !gateway_done {
        if let Err(e) = gateway_exit(gateway_task.await) {
            warn!("Gateway stopped with error: {e:#}");
        }
    }
    auto_shutdown.disable().await;
    supplier.abort();

    info!("ycbot stopped");
    outcome
}
