//! Client-side access token renewal.
//!
//! A long-lived client keeps its 15 minute access token alive by calling the
//! renewal endpoint on a timer and when the user comes back to it. Renewals
//! are debounced, and at most one is ever in flight: a trigger that arrives
//! while a renewal is running is dropped, not queued.

use std::cell::Cell;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

/// Timing for the scheduler.
#[derive(Debug, Clone, Copy)]
pub struct RefreshSettings {
    /// Minimum time between two successful renewals.
    pub debounce: Duration,
    /// How often the background timer fires.
    pub check_interval: Duration,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(12 * 60),
            check_interval: Duration::from_secs(4 * 60),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RenewError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("refresh rejected with status {0}")]
    Rejected(u16),
}

/// Performs one renewal round trip.
#[async_trait]
pub trait SessionRenewer: Send + Sync {
    async fn renew(&self) -> Result<(), RenewError>;
}

/// Renews by POSTing to `{api_url}/refresh-token`. The client must keep
/// cookies so the refresh cookie set at login is sent back.
pub struct HttpRenewer {
    client: reqwest::Client,
    url: String,
}

impl HttpRenewer {
    /// Create a renewer with its own cookie-keeping client.
    pub fn new(api_url: &str) -> Result<Self, RenewError> {
        let client = reqwest::Client::builder().cookie_store(true).build()?;
        Ok(Self::with_client(client, api_url))
    }

    /// Share a client (and its cookie jar) with the rest of the application.
    pub fn with_client(client: reqwest::Client, api_url: &str) -> Self {
        Self {
            client,
            url: format!("{}/refresh-token", api_url.trim_end_matches('/')),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl SessionRenewer for HttpRenewer {
    async fn renew(&self) -> Result<(), RenewError> {
        let response = self.client.post(&self.url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RenewError::Rejected(status.as_u16()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    NotAuthenticated,
    Debounced,
    InFlight,
    Renewed,
    Failed,
}

/// Clears the in-flight flag however the renewal ends, including when the
/// tick future is dropped mid-request.
struct InFlightGuard<'a>(&'a Cell<bool>);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Single-threaded renewal scheduler. Create one per client lifetime.
pub struct RefreshScheduler<R> {
    renewer: R,
    settings: RefreshSettings,
    last_refresh: Cell<Option<Instant>>,
    in_flight: Cell<bool>,
    authenticated: Cell<bool>,
}

impl<R: SessionRenewer> RefreshScheduler<R> {
    /// Starts unauthenticated; call `set_authenticated(true)` after login.
    pub fn new(renewer: R, settings: RefreshSettings) -> Self {
        Self {
            renewer,
            settings,
            last_refresh: Cell::new(None),
            in_flight: Cell::new(false),
            authenticated: Cell::new(false),
        }
    }

    pub fn set_authenticated(&self, authenticated: bool) {
        self.authenticated.set(authenticated);
        if !authenticated {
            self.last_refresh.set(None);
        }
    }

    pub fn is_refreshing(&self) -> bool {
        self.in_flight.get()
    }

    pub fn last_refresh(&self) -> Option<Instant> {
        self.last_refresh.get()
    }

    /// One trigger (timer or focus).
    pub async fn tick(&self) -> TickOutcome {
        if !self.authenticated.get() {
            return TickOutcome::NotAuthenticated;
        }

        if let Some(last) = self.last_refresh.get() {
            if last.elapsed() < self.settings.debounce {
                return TickOutcome::Debounced;
            }
        }

        if self.in_flight.get() {
            return TickOutcome::InFlight;
        }

        // Set before the first await so concurrent ticks see it
        self.in_flight.set(true);
        let _guard = InFlightGuard(&self.in_flight);

        match self.renewer.renew().await {
            Ok(()) => {
                self.last_refresh.set(Some(Instant::now()));
                debug!("Access token renewed");
                TickOutcome::Renewed
            }
            Err(e) => {
                warn!(error = %e, "Access token renewal failed");
                TickOutcome::Failed
            }
        }
    }

    /// Drive `tick` from the check interval and from focus events until the
    /// focus channel closes. Ticks run concurrently so a trigger during a
    /// renewal observes it and is dropped.
    pub async fn run(&self, mut focus_events: mpsc::Receiver<()>) {
        let mut interval = tokio::time::interval(self.settings.check_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; the timer only fires after one period.
        interval.tick().await;

        let mut ticks = FuturesUnordered::new();

        loop {
            tokio::select! {
                _ = interval.tick() => ticks.push(self.tick()),
                event = focus_events.recv() => match event {
                    Some(()) => ticks.push(self.tick()),
                    None => break,
                },
                Some(outcome) = ticks.next(), if !ticks.is_empty() => {
                    trace!(?outcome, "Refresh tick finished");
                }
            }
        }

        while let Some(outcome) = ticks.next().await {
            trace!(?outcome, "Refresh tick finished");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Renewer that takes `delay` and counts calls.
    #[derive(Clone, Default)]
    struct CountingRenewer {
        calls: Arc<AtomicUsize>,
        fail: Arc<AtomicBool>,
        delay: Duration,
    }

    impl CountingRenewer {
        fn with_delay(delay: Duration) -> Self {
            Self {
                delay,
                ..Default::default()
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SessionRenewer for CountingRenewer {
        async fn renew(&self) -> Result<(), RenewError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                Err(RenewError::Rejected(401))
            } else {
                Ok(())
            }
        }
    }

    fn scheduler(renewer: CountingRenewer) -> RefreshScheduler<CountingRenewer> {
        let scheduler = RefreshScheduler::new(renewer, RefreshSettings::default());
        scheduler.set_authenticated(true);
        scheduler
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_authenticated_skips() {
        let renewer = CountingRenewer::default();
        let scheduler = RefreshScheduler::new(renewer.clone(), RefreshSettings::default());

        assert_eq!(scheduler.tick().await, TickOutcome::NotAuthenticated);
        assert_eq!(renewer.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_window() {
        let renewer = CountingRenewer::default();
        let scheduler = scheduler(renewer.clone());

        assert_eq!(scheduler.tick().await, TickOutcome::Renewed);
        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(scheduler.tick().await, TickOutcome::Debounced);
        assert_eq!(renewer.calls(), 1);

        tokio::time::advance(Duration::from_secs(11 * 60)).await;
        assert_eq!(scheduler.tick().await, TickOutcome::Renewed);
        assert_eq!(renewer.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_ticks_share_one_request() {
        let renewer = CountingRenewer::with_delay(Duration::from_secs(2));
        let scheduler = scheduler(renewer.clone());

        let (a, b) = tokio::join!(scheduler.tick(), scheduler.tick());

        assert_eq!(a, TickOutcome::Renewed);
        assert_eq!(b, TickOutcome::InFlight);
        assert_eq!(renewer.calls(), 1);
        assert!(!scheduler.is_refreshing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_keeps_last_refresh_and_clears_flag() {
        let renewer = CountingRenewer::default();
        renewer.fail.store(true, Ordering::SeqCst);
        let scheduler = scheduler(renewer.clone());

        assert_eq!(scheduler.tick().await, TickOutcome::Failed);
        assert!(scheduler.last_refresh().is_none());
        assert!(!scheduler.is_refreshing());

        // Not debounced after a failure
        renewer.fail.store(false, Ordering::SeqCst);
        assert_eq!(scheduler.tick().await, TickOutcome::Renewed);
        assert_eq!(renewer.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_tick_clears_flag() {
        let renewer = CountingRenewer::with_delay(Duration::from_secs(30));
        let scheduler = scheduler(renewer.clone());

        let timed_out = tokio::time::timeout(Duration::from_secs(1), scheduler.tick()).await;
        assert!(timed_out.is_err());
        assert!(!scheduler.is_refreshing());
        assert!(scheduler.last_refresh().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_resets_debounce() {
        let renewer = CountingRenewer::default();
        let scheduler = scheduler(renewer.clone());

        scheduler.tick().await;
        scheduler.set_authenticated(false);
        assert_eq!(scheduler.tick().await, TickOutcome::NotAuthenticated);

        scheduler.set_authenticated(true);
        assert_eq!(scheduler.tick().await, TickOutcome::Renewed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_fires_on_interval_and_focus() {
        let renewer = CountingRenewer::default();
        let scheduler = scheduler(renewer.clone());
        let (tx, rx) = mpsc::channel(8);

        let driver = async {
            // Focus right away renews
            tx.send(()).await.unwrap();
            tokio::time::sleep(Duration::from_secs(1)).await;
            assert_eq!(renewer.calls(), 1);

            // Timer fires at 4 and 8 minutes but both are inside the 12 minute window
            tokio::time::sleep(Duration::from_secs(9 * 60)).await;
            assert_eq!(renewer.calls(), 1);

            // 12 minute tick is past the window
            tokio::time::sleep(Duration::from_secs(3 * 60 + 30)).await;
            assert_eq!(renewer.calls(), 2);

            drop(tx);
        };

        tokio::join!(scheduler.run(rx), driver);
        assert_eq!(renewer.calls(), 2);
    }

    #[test]
    fn test_http_renewer_url() {
        let renewer = HttpRenewer::with_client(reqwest::Client::new(), "http://localhost:3000/");
        assert_eq!(renewer.url(), "http://localhost:3000/refresh-token");
    }
}
