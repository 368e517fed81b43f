//! Bearer credential and its background refresher.
//!
//! The supplier is the only writer. It publishes each new credential through a
//! `watch` channel, so readers always see either nothing (before the first
//! exchange) or one complete credential.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::client::CloudApi;
use crate::error::{CloudError, CloudResult};

/// A short-lived bearer token and its absolute expiry.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
    expires_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Lifetime left at `now`. Zero once expired.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).to_std().unwrap_or(Duration::ZERO)
    }

    /// Time to wait before refreshing so that the refresh lands `margin`
    /// ahead of expiry. Never negative.
    pub fn refresh_delay(&self, now: DateTime<Utc>, margin: Duration) -> Duration {
        self.remaining(now).saturating_sub(margin)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Read side of the shared credential cell. Cheap to clone.
#[derive(Clone)]
pub struct CredentialHandle {
    rx: watch::Receiver<Option<Arc<Credential>>>,
}

impl fmt::Debug for CredentialHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialHandle")
            .field("ready", &self.rx.borrow().is_some())
            .finish()
    }
}

impl CredentialHandle {
    /// A handle that always yields `credential`. No refresher is attached.
    pub fn fixed(credential: Credential) -> Self {
        let (_tx, rx) = watch::channel(Some(Arc::new(credential)));
        Self { rx }
    }

    /// The most recently published credential, if any.
    pub fn current(&self) -> Option<Arc<Credential>> {
        self.rx.borrow().clone()
    }

    /// The bearer token to attach to a call. Empty before the first exchange.
    pub fn bearer(&self) -> String {
        self.current()
            .map(|c| c.token().to_string())
            .unwrap_or_default()
    }

    /// Wait until the first credential is published.
    ///
    /// Fails if the supplier stopped before publishing anything.
    pub async fn ready(&self) -> CloudResult<Arc<Credential>> {
        let mut rx = self.rx.clone();
        let current = rx.wait_for(Option::is_some).await.map_err(|_| {
            CloudError::Auth("credential supplier stopped before the first exchange".into())
        })?;
        current
            .as_ref()
            .cloned()
            .ok_or_else(|| CloudError::Auth("credential missing after ready signal".into()))
    }
}

/// Retry and timing policy for the refresher.
#[derive(Debug, Clone)]
pub struct RefreshPolicy {
    /// Refresh this long before the credential expires.
    pub safety_margin: Duration,
    /// Consecutive failed exchanges before giving up.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            safety_margin: Duration::from_secs(3600),
            max_attempts: 5,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(60),
        }
    }
}

/// Lower bound on the wait between two successful exchanges.
const MIN_REFRESH_DELAY: Duration = Duration::from_secs(1);

impl RefreshPolicy {
    /// Wait before exchanging again after `credential` was issued.
    ///
    /// Aims for `safety_margin` ahead of expiry. A credential that does not
    /// outlive the margin is kept for half its remaining lifetime instead,
    /// and never for less than `initial_backoff`.
    pub fn next_refresh(&self, credential: &Credential, now: DateTime<Utc>) -> Duration {
        credential
            .refresh_delay(now, self.safety_margin)
            .max(credential.remaining(now) / 2)
            .max(self.initial_backoff)
            .max(MIN_REFRESH_DELAY)
    }
}

/// Keeps a valid credential published for the lifetime of the process.
pub struct CredentialSupplier {
    api: Arc<dyn CloudApi>,
    oauth_token: String,
    policy: RefreshPolicy,
}

impl CredentialSupplier {
    pub fn new(api: Arc<dyn CloudApi>, oauth_token: String, policy: RefreshPolicy) -> Self {
        Self {
            api,
            oauth_token,
            policy,
        }
    }

    /// Start the refresher.
    ///
    /// The returned task only finishes on its own when every handle has been
    /// dropped, or with `CloudError::Auth` once the retry budget is spent.
    /// Callers must treat the latter as fatal.
    pub fn spawn(self) -> (CredentialHandle, JoinHandle<CloudResult<()>>) {
        let (tx, rx) = watch::channel(None);
        let task = tokio::spawn(async move { self.run(tx).await });
        (CredentialHandle { rx }, task)
    }

    async fn run(self, tx: watch::Sender<Option<Arc<Credential>>>) -> CloudResult<()> {
        info!("Credential supplier started");
        loop {
            let credential = self.acquire_with_retry().await?;
            let now = Utc::now();
            let delay = self.policy.next_refresh(&credential, now);
            if credential.remaining(now) <= self.policy.safety_margin {
                warn!(
                    expires_at = %credential.expires_at(),
                    margin_secs = self.policy.safety_margin.as_secs(),
                    "Credential lifetime is within the refresh margin"
                );
            }
            info!(
                expires_at = %credential.expires_at(),
                refresh_in_secs = delay.as_secs(),
                "Credential published"
            );
            tx.send_replace(Some(Arc::new(credential)));

            tokio::time::sleep(delay).await;

            if tx.is_closed() {
                info!("No credential readers left, stopping supplier");
                return Ok(());
            }
        }
    }

    /// One exchange with bounded exponential backoff between failures.
    async fn acquire_with_retry(&self) -> CloudResult<Credential> {
        let mut backoff = self.policy.initial_backoff;
        let mut attempt = 1;

        loop {
            match self.api.exchange_token(&self.oauth_token).await {
                Ok(credential) => return Ok(credential),
                Err(e) if attempt < self.policy.max_attempts => {
                    warn!(
                        attempt,
                        backoff_secs = backoff.as_secs(),
                        "Credential exchange failed: {e}"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(self.policy.max_backoff);
                    attempt += 1;
                }
                Err(e) => {
                    error!(attempt, "Credential exchange failed, giving up: {e}");
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeCloud;
    use chrono::TimeDelta;

    fn policy() -> RefreshPolicy {
        RefreshPolicy {
            safety_margin: Duration::from_secs(3600),
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(4),
        }
    }

    #[test]
    fn test_refresh_delay_subtracts_margin() {
        let now = Utc::now();
        let credential = Credential::new("t", now + TimeDelta::hours(12));
        let delay = credential.refresh_delay(now, Duration::from_secs(3600));
        assert_eq!(delay, Duration::from_secs(11 * 3600));
    }

    #[test]
    fn test_refresh_delay_clamps_to_zero() {
        let now = Utc::now();
        let soon = Credential::new("t", now + TimeDelta::minutes(10));
        assert_eq!(soon.refresh_delay(now, Duration::from_secs(3600)), Duration::ZERO);

        let expired = Credential::new("t", now - TimeDelta::minutes(1));
        assert_eq!(expired.refresh_delay(now, Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn test_next_refresh_targets_the_margin() {
        let now = Utc::now();
        let credential = Credential::new("t", now + TimeDelta::hours(12));
        assert_eq!(
            policy().next_refresh(&credential, now),
            Duration::from_secs(11 * 3600)
        );
    }

    #[test]
    fn test_next_refresh_of_short_lived_credential() {
        let now = Utc::now();
        let short = Credential::new("t", now + TimeDelta::minutes(30));
        assert_eq!(policy().next_refresh(&short, now), Duration::from_secs(15 * 60));

        let expired = Credential::new("t", now - TimeDelta::minutes(1));
        assert_eq!(policy().next_refresh(&expired, now), Duration::from_secs(1));

        let no_backoff = RefreshPolicy {
            initial_backoff: Duration::ZERO,
            ..policy()
        };
        assert_eq!(no_backoff.next_refresh(&expired, now), MIN_REFRESH_DELAY);
    }

    #[test]
    fn test_debug_redacts_token() {
        let credential = Credential::new("t1.secret", Utc::now());
        assert!(!format!("{credential:?}").contains("t1.secret"));
    }

    #[tokio::test]
    async fn test_fixed_handle_is_ready() {
        let handle = CredentialHandle::fixed(Credential::new("t1.fixed", Utc::now()));
        assert_eq!(handle.bearer(), "t1.fixed");
        assert_eq!(handle.ready().await.unwrap().token(), "t1.fixed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_supplier_publishes_and_signals_ready() {
        let cloud = Arc::new(FakeCloud::new());
        cloud.push_token(Ok(Credential::new("t1.first", Utc::now() + TimeDelta::hours(12))));

        let (handle, _task) =
            CredentialSupplier::new(cloud.clone(), "y0_oauth".into(), policy()).spawn();
        assert_eq!(handle.bearer(), "");

        let credential = handle.ready().await.unwrap();
        assert_eq!(credential.token(), "t1.first");
        assert_eq!(handle.bearer(), "t1.first");
        assert_eq!(cloud.oauth_tokens_seen(), vec!["y0_oauth".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_supplier_refreshes_before_expiry() {
        let cloud = Arc::new(FakeCloud::new());
        let first_expiry = Utc::now() + TimeDelta::hours(2);
        cloud.push_token(Ok(Credential::new("t1.first", first_expiry)));
        cloud.push_token(Ok(Credential::new(
            "t1.second",
            Utc::now() + TimeDelta::hours(12),
        )));

        let (handle, _task) =
            CredentialSupplier::new(cloud.clone(), "y0_oauth".into(), policy()).spawn();
        handle.ready().await.unwrap();

        let mut rx = handle.rx.clone();
        rx.wait_for(|c| c.as_ref().is_some_and(|c| c.token() == "t1.second"))
            .await
            .unwrap();
        assert_eq!(handle.bearer(), "t1.second");
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_lived_credentials_do_not_flood_exchanges() {
        let cloud = Arc::new(FakeCloud::new());
        for i in 0..50 {
            cloud.push_token(Ok(Credential::new(
                format!("t1.short{i}"),
                Utc::now() + TimeDelta::minutes(30),
            )));
        }

        let (handle, _task) =
            CredentialSupplier::new(cloud.clone(), "y0_oauth".into(), policy()).spawn();
        handle.ready().await.unwrap();

        // Each 30-minute credential outlives the 1 h margin by nothing, so
        // it is kept for 15 minutes: exchanges at 0, 15, 30 and 45 minutes.
        tokio::time::sleep(Duration::from_secs(50 * 60)).await;
        assert_eq!(cloud.oauth_tokens_seen().len(), 4);
        assert_eq!(handle.bearer(), "t1.short3");
    }

    #[tokio::test(start_paused = true)]
    async fn test_supplier_retries_transient_failures() {
        let cloud = Arc::new(FakeCloud::new());
        cloud.push_token(Err("503 unavailable".into()));
        cloud.push_token(Ok(Credential::new("t1.ok", Utc::now() + TimeDelta::hours(12))));

        let (handle, _task) =
            CredentialSupplier::new(cloud.clone(), "y0_oauth".into(), policy()).spawn();
        assert_eq!(handle.ready().await.unwrap().token(), "t1.ok");
        assert_eq!(cloud.oauth_tokens_seen().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_supplier_fails_loudly_when_budget_spent() {
        let cloud = Arc::new(FakeCloud::new());
        for _ in 0..3 {
            cloud.push_token(Err("401 bad oauth token".into()));
        }

        let (handle, task) =
            CredentialSupplier::new(cloud.clone(), "y0_oauth".into(), policy()).spawn();

        let result = task.await.unwrap();
        assert!(matches!(result, Err(CloudError::Auth(_))));
        assert!(handle.ready().await.is_err());
        assert_eq!(cloud.oauth_tokens_seen().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_credential_survives_failed_refresh() {
        let cloud = Arc::new(FakeCloud::new());
        cloud.push_token(Ok(Credential::new("t1.stale", Utc::now() + TimeDelta::hours(1))));
        for _ in 0..3 {
            cloud.push_token(Err("500".into()));
        }

        let (handle, task) =
            CredentialSupplier::new(cloud.clone(), "y0_oauth".into(), policy()).spawn();
        handle.ready().await.unwrap();

        assert!(task.await.unwrap().is_err());
        assert_eq!(handle.bearer(), "t1.stale");
    }
}
