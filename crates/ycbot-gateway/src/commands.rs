//! Bot commands and the interactive flows behind them.

use std::sync::Arc;

use chrono::Local;
use tracing::{info, warn};

use ycbot_cloud::{
    CloudApi, CredentialHandle, fetch_inventory, local_today, select_expired, stop_instances,
};
use ycbot_cron::{AutoShutdown, Schedule};
use ycbot_types::{InboundMessage, OutboundMessage, Resource};

use crate::format;
use crate::session::{Conversation, SessionStore};

/// Commands shown in the chat menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotCommand {
    Help,
    Info,
    Instances,
    CheckExpired,
    AutoShutdown,
}

impl BotCommand {
    pub const ALL: [BotCommand; 5] = [
        Self::Help,
        Self::Info,
        Self::Instances,
        Self::CheckExpired,
        Self::AutoShutdown,
    ];

    /// Parse a command name without the leading slash. `start` is an alias
    /// of `help` since chat clients send it on first contact.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "help" | "start" => Some(Self::Help),
            "info" => Some(Self::Info),
            "instances" => Some(Self::Instances),
            "check_expired" => Some(Self::CheckExpired),
            "auto_shutdown" => Some(Self::AutoShutdown),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Help => "help",
            Self::Info => "info",
            Self::Instances => "instances",
            Self::CheckExpired => "check_expired",
            Self::AutoShutdown => "auto_shutdown",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Help => "List available commands",
            Self::Info => "Organization, clock and auto-shutdown status",
            Self::Instances => "Show all instances",
            Self::CheckExpired => "Find expired instances and offer to stop them",
            Self::AutoShutdown => "Toggle or edit scheduled auto-shutdown",
        }
    }
}

pub fn help_text() -> String {
    let mut text = String::from("Available commands:\n");
    for command in BotCommand::ALL {
        text.push_str(&format!("/{} - {}\n", command.name(), command.description()));
    }
    text
}

fn is_yes(answer: &str) -> bool {
    answer.trim().eq_ignore_ascii_case("yes")
}

fn is_edit(answer: &str) -> bool {
    answer.trim().eq_ignore_ascii_case("edit")
}

/// Turns inbound chat messages into replies, driving the cloud calls and the
/// auto-shutdown toggle.
pub struct CommandHandler {
    api: Arc<dyn CloudApi>,
    credential: CredentialHandle,
    auto_shutdown: Arc<AutoShutdown>,
    sessions: SessionStore,
}

impl CommandHandler {
    pub fn new(
        api: Arc<dyn CloudApi>,
        credential: CredentialHandle,
        auto_shutdown: Arc<AutoShutdown>,
    ) -> Self {
        Self {
            api,
            credential,
            auto_shutdown,
            sessions: SessionStore::new(),
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Produce the reply for one message.
    ///
    /// Messages from one chat are handled one at a time, in arrival order. A
    /// command always abandons whatever the chat was in the middle of.
    pub async fn handle(&self, message: &InboundMessage) -> OutboundMessage {
        let chat_id = message.chat_id;
        let mut conversation = self.sessions.lock(chat_id).await;

        if let Some(name) = message.command.as_deref() {
            *conversation = Conversation::Idle;
            return match BotCommand::parse(name) {
                Some(BotCommand::Help) => OutboundMessage::plain(chat_id, help_text()),
                Some(BotCommand::Info) => self.info(chat_id).await,
                Some(BotCommand::Instances) => self.instances(chat_id).await,
                Some(BotCommand::CheckExpired) => {
                    self.check_expired(chat_id, &mut conversation).await
                }
                Some(BotCommand::AutoShutdown) => {
                    self.auto_shutdown_menu(chat_id, &mut conversation).await
                }
                None => OutboundMessage::plain(
                    chat_id,
                    format!("Unknown command /{name}\n\n{}", help_text()),
                ),
            };
        }

        match std::mem::take(&mut *conversation) {
            Conversation::Idle => OutboundMessage::plain(chat_id, help_text()),
            Conversation::AwaitingShutdownConfirmation { expired } => {
                self.confirm_shutdown(chat_id, &message.text, &expired).await
            }
            Conversation::AwaitingToggleDecision => {
                self.toggle_decision(chat_id, &message.text, &mut conversation)
                    .await
            }
            Conversation::AwaitingScheduleEdit => self.edit_schedule(chat_id, &message.text).await,
        }
    }

    async fn info(&self, chat_id: i64) -> OutboundMessage {
        let token = self.credential.bearer();
        let organization = self
            .api
            .list_organizations(&token)
            .await
            .map(|orgs| orgs.into_iter().next());
        if let Err(e) = &organization {
            warn!(chat_id, "Organization lookup failed: {e}");
        }
        let last_report = self.auto_shutdown.last_report().await;
        let text = format::render_info(
            Local::now(),
            organization,
            self.auto_shutdown.is_enabled().await,
            &self.auto_shutdown.schedule().await,
            last_report.as_ref(),
        );
        OutboundMessage::plain(chat_id, text)
    }

    async fn instances(&self, chat_id: i64) -> OutboundMessage {
        match fetch_inventory(self.api.as_ref(), &self.credential.bearer()).await {
            Ok(inventory) => OutboundMessage::markdown(chat_id, format::render_inventory(&inventory)),
            Err(e) => {
                warn!(chat_id, "Inventory fetch failed: {e}");
                OutboundMessage::plain(chat_id, format::render_error("Could not list instances", &e))
            }
        }
    }

    async fn check_expired(
        &self,
        chat_id: i64,
        conversation: &mut Conversation,
    ) -> OutboundMessage {
        let inventory = match fetch_inventory(self.api.as_ref(), &self.credential.bearer()).await {
            Ok(inventory) => inventory,
            Err(e) => {
                warn!(chat_id, "Inventory fetch failed: {e}");
                return OutboundMessage::plain(
                    chat_id,
                    format::render_error("Could not list instances", &e),
                );
            }
        };

        let expired = select_expired(inventory.instances(), local_today());
        if expired.is_empty() {
            return OutboundMessage::plain(chat_id, "No instances need to be stopped.");
        }

        let text = format::render_expired(&expired);
        *conversation = Conversation::AwaitingShutdownConfirmation { expired };
        OutboundMessage::markdown(chat_id, text)
    }

    async fn confirm_shutdown(
        &self,
        chat_id: i64,
        answer: &str,
        expired: &[Resource],
    ) -> OutboundMessage {
        if !is_yes(answer) {
            return OutboundMessage::plain(chat_id, "Cancelled, nothing was stopped.");
        }

        let report = stop_instances(self.api.as_ref(), expired, &self.credential.bearer()).await;
        info!(
            chat_id,
            stopped = report.succeeded(),
            failed = report.failed(),
            "Manual shutdown finished"
        );
        OutboundMessage::plain(chat_id, report.to_string().trim_end())
    }

    async fn auto_shutdown_menu(
        &self,
        chat_id: i64,
        conversation: &mut Conversation,
    ) -> OutboundMessage {
        let enabled = self.auto_shutdown.is_enabled().await;
        let schedule = self.auto_shutdown.schedule().await;
        let action = if enabled { "disable" } else { "enable" };
        let text = format!(
            "Auto-shutdown is {}.\n{}\n\nReply `yes` to {action} it, `edit` to change the schedule, anything else cancels.",
            if enabled { "enabled" } else { "disabled" },
            format::render_schedule(&schedule),
        );
        *conversation = Conversation::AwaitingToggleDecision;
        OutboundMessage::markdown(chat_id, text)
    }

    async fn toggle_decision(
        &self,
        chat_id: i64,
        answer: &str,
        conversation: &mut Conversation,
    ) -> OutboundMessage {
        if is_edit(answer) {
            let schedule = self.auto_shutdown.schedule().await;
            *conversation = Conversation::AwaitingScheduleEdit;
            return OutboundMessage::plain(
                chat_id,
                format!(
                    "Current schedule:\n{}\n\nSend two lines: the start time (HH:MM) and the period (HH:MM, or 24:00 for once a day).",
                    format::render_schedule(&schedule)
                ),
            );
        }
        if !is_yes(answer) {
            return OutboundMessage::plain(chat_id, "Cancelled.");
        }

        let text = if self.auto_shutdown.is_enabled().await {
            if self.auto_shutdown.disable().await {
                "Auto-shutdown disabled."
            } else {
                "Auto-shutdown is already disabled."
            }
        } else if self.auto_shutdown.enable(chat_id).await {
            "Auto-shutdown enabled. Reports will be sent to this chat."
        } else {
            "Auto-shutdown is already enabled."
        };
        OutboundMessage::plain(chat_id, text)
    }

    async fn edit_schedule(&self, chat_id: i64, text: &str) -> OutboundMessage {
        match Schedule::parse_lines(text) {
            Ok(schedule) => {
                self.auto_shutdown.set_schedule(schedule).await;
                OutboundMessage::plain(
                    chat_id,
                    format!("Schedule changed:\n{}", format::render_schedule(&schedule)),
                )
            }
            Err(e) => OutboundMessage::plain(chat_id, format!("Cancelled, schedule unchanged: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::{Days, TimeDelta, Utc};
    use tokio::sync::mpsc;
    use ycbot_cloud::Credential;
    use ycbot_cloud::Stage;
    use ycbot_cloud::testing::{FakeCloud, instance};

    fn label(offset_days: i64) -> String {
        let today = local_today();
        let date = if offset_days >= 0 {
            today + Days::new(offset_days as u64)
        } else {
            today - Days::new(offset_days.unsigned_abs())
        };
        date.format("%d.%m.%Y").to_string()
    }

    fn scenario_cloud() -> FakeCloud {
        FakeCloud::new()
            .with_organization("bpf1", "ACME")
            .with_instance("c1", "f1", instance("A", "RUNNING", Some(&label(-1))))
            .with_instance("c1", "f1", instance("B", "STOPPED", Some(&label(-1))))
            .with_instance("c1", "f2", instance("C", "RUNNING", Some(&label(1))))
    }

    fn handler(cloud: Arc<FakeCloud>) -> (CommandHandler, Arc<AutoShutdown>) {
        let credential = CredentialHandle::fixed(Credential::new(
            "t1.test",
            Utc::now() + TimeDelta::hours(12),
        ));
        let (tx, _rx) = mpsc::unbounded_channel();
        let auto = Arc::new(AutoShutdown::new(
            cloud.clone(),
            credential.clone(),
            Schedule::default(),
            tx,
        ));
        (CommandHandler::new(cloud, credential, auto.clone()), auto)
    }

    async fn say(handler: &CommandHandler, text: &str) -> OutboundMessage {
        handler.handle(&InboundMessage::text(1, text)).await
    }

    async fn command(handler: &CommandHandler, name: &str) -> OutboundMessage {
        handler.handle(&InboundMessage::command(1, name)).await
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(BotCommand::parse("help"), Some(BotCommand::Help));
        assert_eq!(BotCommand::parse("start"), Some(BotCommand::Help));
        assert_eq!(BotCommand::parse("Check_Expired"), Some(BotCommand::CheckExpired));
        assert_eq!(BotCommand::parse("reboot"), None);
        for command in BotCommand::ALL {
            assert_eq!(BotCommand::parse(command.name()), Some(command));
        }
    }

    #[tokio::test]
    async fn test_free_text_gets_help() {
        let (handler, _) = handler(Arc::new(scenario_cloud()));
        let reply = say(&handler, "hello").await;
        assert_eq!(reply.chat_id, 1);
        assert!(reply.text.contains("/check_expired"));
    }

    #[tokio::test]
    async fn test_check_expired_then_confirm_stops_selection() {
        let cloud = Arc::new(scenario_cloud());
        let (handler, _) = handler(cloud.clone());

        let listing = command(&handler, "check_expired").await;
        assert!(listing.markdown);
        assert!(listing.text.contains("ID: A"));
        assert!(!listing.text.contains("ID: B"));
        assert!(!listing.text.contains("ID: C"));

        let reply = say(&handler, " YES ").await;
        assert_eq!(reply.text, "Instance A is shutting down");
        assert_eq!(cloud.stop_requests(), vec!["A".to_string()]);
        assert_eq!(handler.sessions().get(1).await, Conversation::Idle);
    }

    #[tokio::test]
    async fn test_confirmation_reports_stop_failure() {
        let cloud = Arc::new(scenario_cloud());
        cloud.fail_stop("A", 403, "permission denied");
        let (handler, _) = handler(cloud.clone());

        command(&handler, "check_expired").await;
        let reply = say(&handler, "yes").await;
        assert_eq!(reply.text, "Error A: 403, permission denied");
    }

    #[tokio::test]
    async fn test_anything_but_yes_cancels_shutdown() {
        let cloud = Arc::new(scenario_cloud());
        let (handler, _) = handler(cloud.clone());

        command(&handler, "check_expired").await;
        let reply = say(&handler, "no").await;
        assert!(reply.text.starts_with("Cancelled"));
        assert!(cloud.stop_requests().is_empty());
    }

    #[tokio::test]
    async fn test_new_command_abandons_pending_confirmation() {
        let cloud = Arc::new(scenario_cloud());
        let (handler, _) = handler(cloud.clone());

        command(&handler, "check_expired").await;
        command(&handler, "help").await;
        let reply = say(&handler, "yes").await;
        assert!(reply.text.contains("Available commands"));
        assert!(cloud.stop_requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_commands_resolve_in_arrival_order() {
        let cloud = Arc::new(scenario_cloud().with_list_delay(Duration::from_millis(200)));
        let (handler, auto) = handler(cloud.clone());
        let handler = Arc::new(handler);

        let listing = {
            let handler = handler.clone();
            tokio::spawn(async move { command(&handler, "check_expired").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        let menu = {
            let handler = handler.clone();
            tokio::spawn(async move { command(&handler, "auto_shutdown").await })
        };

        assert!(listing.await.unwrap().text.contains("ID: A"));
        assert!(menu.await.unwrap().text.contains("Auto-shutdown is disabled."));
        assert_eq!(handler.sessions().get(1).await, Conversation::AwaitingToggleDecision);

        let reply = say(&handler, "yes").await;
        assert!(reply.text.starts_with("Auto-shutdown enabled"));
        assert!(auto.disable().await);
    }

    #[tokio::test]
    async fn test_nothing_expired() {
        let cloud = Arc::new(
            FakeCloud::new().with_instance("c1", "f1", instance("C", "RUNNING", Some(&label(3)))),
        );
        let (handler, _) = handler(cloud);
        let reply = command(&handler, "check_expired").await;
        assert_eq!(reply.text, "No instances need to be stopped.");
        assert_eq!(handler.sessions().get(1).await, Conversation::Idle);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_reported_verbatim() {
        let cloud = Arc::new(scenario_cloud());
        cloud.fail_stage(Stage::Instances, 401, r#"{"message":"token expired"}"#);
        let (handler, _) = handler(cloud.clone());

        let reply = command(&handler, "check_expired").await;
        assert!(reply.text.contains("401"));
        assert!(reply.text.contains(r#"{"message":"token expired"}"#));

        // No pending confirmation was left behind.
        say(&handler, "yes").await;
        assert!(cloud.stop_requests().is_empty());
    }

    #[tokio::test]
    async fn test_instances_tree() {
        let (handler, _) = handler(Arc::new(scenario_cloud()));
        let reply = command(&handler, "instances").await;
        assert!(reply.markdown);
        assert!(reply.text.contains("(3 total)"));
        assert!(reply.text.contains("── cloud-c1"));
        assert!(reply.text.contains("└─ folder-f2"));
        assert!(reply.text.contains("Status: STOPPED"));
    }

    #[tokio::test]
    async fn test_info_shows_organization_and_toggle() {
        let (handler, _) = handler(Arc::new(scenario_cloud()));
        let reply = command(&handler, "info").await;
        assert!(reply.text.contains("Organization: ACME (bpf1)"));
        assert!(reply.text.contains("Auto-shutdown: disabled"));
        assert!(reply.text.contains("Last run: never"));
    }

    #[tokio::test]
    async fn test_info_without_organization_access() {
        let cloud = Arc::new(scenario_cloud());
        cloud.fail_stage(Stage::Organizations, 403, "forbidden");
        let (handler, _) = handler(cloud);
        let reply = command(&handler, "info").await;
        assert!(reply.text.contains("Organization: not connected"));
        assert!(reply.text.contains("forbidden"));
    }

    #[tokio::test]
    async fn test_toggle_enables_then_disables() {
        let (handler, auto) = handler(Arc::new(scenario_cloud()));

        let menu = command(&handler, "auto_shutdown").await;
        assert!(menu.text.contains("Auto-shutdown is disabled."));
        let reply = say(&handler, "yes").await;
        assert!(reply.text.starts_with("Auto-shutdown enabled"));
        assert!(auto.is_enabled().await);
        assert_eq!(auto.recipient().await, Some(1));

        let menu = command(&handler, "auto_shutdown").await;
        assert!(menu.text.contains("Auto-shutdown is enabled."));
        let reply = say(&handler, "yes").await;
        assert_eq!(reply.text, "Auto-shutdown disabled.");
        assert!(!auto.is_enabled().await);
    }

    #[tokio::test]
    async fn test_toggle_menu_cancel() {
        let (handler, auto) = handler(Arc::new(scenario_cloud()));
        command(&handler, "auto_shutdown").await;
        let reply = say(&handler, "later").await;
        assert_eq!(reply.text, "Cancelled.");
        assert!(!auto.is_enabled().await);
    }

    #[tokio::test]
    async fn test_edit_schedule() {
        let (handler, auto) = handler(Arc::new(scenario_cloud()));

        command(&handler, "auto_shutdown").await;
        let prompt = say(&handler, "Edit").await;
        assert!(prompt.text.contains("Start time: 00:01"));

        let reply = say(&handler, "09:00\n12:00").await;
        assert_eq!(reply.text, "Schedule changed:\nStart time: 09:00\nPeriod: 12:00");
        assert_eq!(auto.schedule().await, Schedule::parse("09:00", "12:00").unwrap());
    }

    #[tokio::test]
    async fn test_invalid_schedule_edit_keeps_previous() {
        let (handler, auto) = handler(Arc::new(scenario_cloud()));

        command(&handler, "auto_shutdown").await;
        say(&handler, "edit").await;
        let reply = say(&handler, "nine o'clock\n12:00").await;
        assert!(reply.text.starts_with("Cancelled, schedule unchanged: invalid start time"));
        assert_eq!(auto.schedule().await, Schedule::default());
        assert_eq!(handler.sessions().get(1).await, Conversation::Idle);
    }
}
