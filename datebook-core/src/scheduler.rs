//! Background renewal of the access token.
//!
//! The scheduler keeps one timer armed at a time. Each fire refreshes the
//! token through a [`Refresher`] and re-arms for the next interval, measured
//! from the last successful refresh recorded in durable storage so a restart
//! picks up where the previous run left off. A failed refresh stops the cycle
//! until [`RefreshScheduler::start`] is called again.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::constants::LAST_REFRESH_KEY;
use crate::error::DatebookResult;
use crate::storage::Storage;

/// What the scheduler calls when its timer fires.
#[async_trait]
pub trait Refresher: Send + Sync {
    /// Whether there is a session worth refreshing.
    fn has_access_token(&self) -> bool;

    async fn refresh(&self) -> DatebookResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// No timer armed
    Idle,
    /// Timer armed, waiting to fire
    Scheduled,
    /// A refresh request is in flight
    Refreshing,
}

struct Inner {
    /// Current state, published to subscribers on every change
    state: watch::Sender<SchedulerState>,
    /// Bumped on every arm/disarm so a superseded task can't overwrite state
    generation: u64,
    task: Option<JoinHandle<()>>,
}

pub struct RefreshScheduler {
    refresher: Arc<dyn Refresher>,
    storage: Arc<dyn Storage>,
    interval: Duration,
    signed_in: Option<watch::Receiver<bool>>,
    inner: Arc<Mutex<Inner>>,
}

/// Time left until the next refresh is due.
///
/// No record means a refresh is due now. A record from the future (clock
/// moved backwards) waits at most one full interval.
pub fn next_delay(last_refresh: Option<DateTime<Utc>>, now: DateTime<Utc>, interval: Duration) -> Duration {
    let Some(last) = last_refresh else {
        return Duration::ZERO;
    };

    let elapsed = now - last;
    match elapsed.to_std() {
        Ok(elapsed) => interval.saturating_sub(elapsed),
        Err(_) => interval,
    }
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read_last_refresh(storage: &dyn Storage) -> DatebookResult<Option<DateTime<Utc>>> {
    let Some(raw) = storage.get(LAST_REFRESH_KEY)? else {
        return Ok(None);
    };

    match raw.trim().parse::<i64>() {
        Ok(millis) => Ok(DateTime::from_timestamp_millis(millis)),
        Err(_) => {
            tracing::warn!(value = %raw, "ignoring unreadable last refresh timestamp");
            Ok(None)
        }
    }
}

fn record_refresh(storage: &dyn Storage, at: DateTime<Utc>) -> DatebookResult<()> {
    storage.set(LAST_REFRESH_KEY, &at.timestamp_millis().to_string())
}

/// Delay before the next fire. When nothing has been recorded yet, now is
/// recorded as the start of the cycle.
fn compute_delay(storage: &dyn Storage, interval: Duration) -> DatebookResult<Duration> {
    let now = Utc::now();
    let last = read_last_refresh(storage)?;

    if last.is_none() {
        record_refresh(storage, now)?;
    }

    Ok(next_delay(last, now, interval))
}

impl RefreshScheduler {
    pub fn new(refresher: Arc<dyn Refresher>, storage: Arc<dyn Storage>, interval: Duration) -> Self {
        RefreshScheduler {
            refresher,
            storage,
            interval,
            signed_in: None,
            inner: Arc::new(Mutex::new(Inner {
                state: watch::Sender::new(SchedulerState::Idle),
                generation: 0,
                task: None,
            })),
        }
    }

    /// Stop the cycle (and forget the last refresh) as soon as `signed_in`
    /// turns false.
    pub fn stop_on_sign_out(mut self, signed_in: watch::Receiver<bool>) -> Self {
        self.signed_in = Some(signed_in);
        self
    }

    pub fn state(&self) -> SchedulerState {
        *lock(&self.inner).state.borrow()
    }

    /// Follow state changes as they happen.
    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        lock(&self.inner).state.subscribe()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Arm the timer. Any timer already armed is disarmed first. Does nothing
    /// when there is no session to refresh.
    pub fn start(&self) -> DatebookResult<()> {
        self.disarm();

        if !self.refresher.has_access_token() {
            tracing::debug!("no session, token refresh stays idle");
            return Ok(());
        }

        let delay = compute_delay(self.storage.as_ref(), self.interval)?;

        let mut inner = lock(&self.inner);
        inner.generation += 1;
        inner.state.send_replace(SchedulerState::Scheduled);

        let cycle = Cycle {
            refresher: self.refresher.clone(),
            storage: self.storage.clone(),
            interval: self.interval,
            signed_in: self.signed_in.clone(),
            inner: self.inner.clone(),
            generation: inner.generation,
        };
        inner.task = Some(tokio::spawn(cycle.run(delay)));

        tracing::debug!(delay_secs = delay.as_secs(), "token refresh scheduled");
        Ok(())
    }

    /// Disarm the timer and forget when the last refresh happened. The
    /// session itself is left alone.
    pub fn stop(&self) -> DatebookResult<()> {
        self.disarm();
        self.storage.remove(LAST_REFRESH_KEY)
    }

    /// Cancel the pending fire. A refresh already in flight still completes.
    fn disarm(&self) {
        let mut inner = lock(&self.inner);
        inner.generation += 1;
        inner.state.send_replace(SchedulerState::Idle);
        if let Some(task) = inner.task.take() {
            task.abort();
        }
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.disarm();
    }
}

/// One armed run of the scheduler, from arm until disarm or failure.
struct Cycle {
    refresher: Arc<dyn Refresher>,
    storage: Arc<dyn Storage>,
    interval: Duration,
    signed_in: Option<watch::Receiver<bool>>,
    inner: Arc<Mutex<Inner>>,
    generation: u64,
}

impl Cycle {
    /// Set the state if this cycle hasn't been superseded. Returns false when
    /// it has, in which case the cycle should end.
    fn transition(&self, state: SchedulerState) -> bool {
        let mut inner = lock(&self.inner);
        if inner.generation != self.generation {
            return false;
        }
        inner.state.send_replace(state);
        if state == SchedulerState::Idle {
            inner.task = None;
        }
        true
    }

    async fn run(mut self, mut delay: Duration) {
        loop {
            let signed_out = tokio::select! {
                _ = tokio::time::sleep(delay) => false,
                _ = wait_signed_out(self.signed_in.as_mut()) => true,
            };

            if signed_out {
                tracing::debug!("session cleared, stopping token refresh");
                if self.transition(SchedulerState::Idle) {
                    if let Err(e) = self.storage.remove(LAST_REFRESH_KEY) {
                        tracing::warn!(error = %e, "failed to clear last refresh timestamp");
                    }
                }
                return;
            }

            if !self.refresher.has_access_token() {
                tracing::debug!("no session at refresh time, stopping token refresh");
                self.transition(SchedulerState::Idle);
                return;
            }

            if !self.transition(SchedulerState::Refreshing) {
                return;
            }

            // Run the request on its own task so disarming mid-flight doesn't
            // drop it half done.
            let refresher = self.refresher.clone();
            let outcome = tokio::spawn(async move { refresher.refresh().await }).await;

            match outcome {
                Ok(Ok(())) => {
                    if let Err(e) = record_refresh(self.storage.as_ref(), Utc::now()) {
                        tracing::warn!(error = %e, "failed to record token refresh");
                    }
                    tracing::info!("access token refreshed");
                }
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "failed to refresh token");
                    self.transition(SchedulerState::Idle);
                    return;
                }
                Err(e) => {
                    tracing::error!(error = %e, "token refresh task panicked");
                    self.transition(SchedulerState::Idle);
                    return;
                }
            }

            delay = match compute_delay(self.storage.as_ref(), self.interval) {
                Ok(delay) => delay,
                Err(e) => {
                    tracing::error!(error = %e, "failed to read last refresh timestamp");
                    self.transition(SchedulerState::Idle);
                    return;
                }
            };

            if !self.transition(SchedulerState::Scheduled) {
                return;
            }
        }
    }
}

/// Resolves once the watched session is signed out (or gone). Never resolves
/// when nothing is watched.
async fn wait_signed_out(signed_in: Option<&mut watch::Receiver<bool>>) {
    match signed_in {
        Some(rx) => {
            let _ = rx.wait_for(|signed_in| !signed_in).await;
        }
        None => std::future::pending().await,
    }
}
