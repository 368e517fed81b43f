//! Expiration policy.

use chrono::{Local, NaiveDate};

use ycbot_types::{InstanceStatus, Resource};

/// Whether `resource` must be stopped on `today`.
pub fn is_expired(resource: &Resource, today: NaiveDate) -> bool {
    resource.status == InstanceStatus::Running && resource.expires_on <= today
}

/// The running resources whose expiration date is on or before `today`,
/// in input order.
pub fn select_expired<'a, I>(resources: I, today: NaiveDate) -> Vec<Resource>
where
    I: IntoIterator<Item = &'a Resource>,
{
    resources
        .into_iter()
        .filter(|r| is_expired(r, today))
        .cloned()
        .collect()
}

/// The caller's local calendar day.
pub fn local_today() -> NaiveDate {
    Local::now().date_naive()
}
