//! Chat rendering for inventory trees, reports and status.
//!
//! Tree output is wrapped in a Markdown code block so the box-drawing
//! characters line up.

use std::fmt::Write;

use chrono::{DateTime, Local};

use ycbot_cloud::{CloudError, EXPIRATION_DATE_FORMAT, EXPIRATION_LABEL};
use ycbot_cron::{CycleOutcome, CycleReport, Schedule};
use ycbot_types::{Inventory, Organization, Resource};

const TIME_FORMAT: &str = "%d.%m.%Y %H:%M:%S";

fn code_block(body: &str) -> String {
    format!("```\n{}```", body.replace("```", "'''"))
}

fn expiry(resource: &Resource) -> String {
    resource.expires_on.format(EXPIRATION_DATE_FORMAT).to_string()
}

/// Cloud → folder → instance tree of the whole inventory.
pub fn render_inventory(inventory: &Inventory) -> String {
    if inventory.clouds.is_empty() {
        return "No clouds are visible to this account.".into();
    }

    let mut out = String::new();
    for cloud in &inventory.clouds {
        let _ = writeln!(out, "── {}", cloud.name);
        for folder in &cloud.folders {
            let _ = writeln!(out, "   └─ {}", folder.name);
            if folder.instances.is_empty() {
                let _ = writeln!(out, "      (no instances)");
            }
            for resource in &folder.instances {
                let _ = writeln!(out, "      └─ {}", resource.name);
                let _ = writeln!(out, "         ID: {}", resource.id);
                let _ = writeln!(out, "         Status: {}", resource.status);
                let _ = writeln!(out, "         {EXPIRATION_LABEL}: {}", expiry(resource));
            }
        }
    }
    format!(
        "*Instances* ({} total)\n{}",
        inventory.instance_count(),
        code_block(&out)
    )
}

/// The expired set plus the confirmation question.
pub fn render_expired(expired: &[Resource]) -> String {
    let mut out = String::new();
    for resource in expired {
        let _ = writeln!(out, "└─ {}", resource.name);
        let _ = writeln!(out, "   ID: {}", resource.id);
        let _ = writeln!(out, "   {EXPIRATION_LABEL}: {}", expiry(resource));
    }
    format!(
        "*Expired instances* ({})\n{}\nStop them now? Reply `yes` to confirm, anything else cancels.",
        expired.len(),
        code_block(&out)
    )
}

pub fn render_schedule(schedule: &Schedule) -> String {
    format!(
        "Start time: {}\nPeriod: {}",
        schedule.start_label(),
        schedule.period
    )
}

pub fn render_cycle_report(report: &CycleReport) -> String {
    let at = report.finished_at.format(TIME_FORMAT);
    match &report.outcome {
        CycleOutcome::Swept(shutdown) if shutdown.is_empty() => {
            format!("Auto-shutdown at {at}: nothing to stop.")
        }
        CycleOutcome::Swept(shutdown) => {
            format!("Auto-shutdown at {at}:\n{}", shutdown.to_string().trim_end())
        }
        CycleOutcome::Failed(reason) => {
            format!("Auto-shutdown at {at} could not list instances: {reason}")
        }
    }
}

/// Status overview for `/info`.
pub fn render_info(
    now: DateTime<Local>,
    organization: Result<Option<Organization>, CloudError>,
    enabled: bool,
    schedule: &Schedule,
    last_report: Option<&CycleReport>,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Current time: {}", now.format(TIME_FORMAT));
    match organization {
        Ok(Some(org)) => {
            let _ = writeln!(out, "Organization: {} ({})", org.title, org.id);
        }
        Ok(None) => {
            let _ = writeln!(out, "Organization: not connected");
        }
        Err(e) => {
            let _ = writeln!(out, "Organization: not connected ({e})");
        }
    }
    let _ = writeln!(
        out,
        "Auto-shutdown: {}",
        if enabled { "enabled" } else { "disabled" }
    );
    let _ = writeln!(out, "{}", render_schedule(schedule));
    match last_report {
        Some(report) => {
            let _ = write!(out, "Last run: {}", render_cycle_report(report));
        }
        None => {
            let _ = write!(out, "Last run: never");
        }
    }
    out
}

pub fn render_error(context: &str, error: &CloudError) -> String {
    format!("{context}: {error}")
}
