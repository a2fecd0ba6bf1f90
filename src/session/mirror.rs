//! Token Mirror: copies the provider's access token into the credential slot.
//!
//! The state machine is pure ([`MirrorState::on`]); [`TokenMirror`] drives it
//! from session changes and a wall-clock refresh timer.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use super::slot::CredentialSlot;
use super::state::SessionStore;
use super::traits::{IdentityProvider, TokenOptions};

/// Default re-sync period. Not tied to the token's real expiry.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorState {
    Idle,
    Syncing,
    Synced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorEvent {
    SessionChanged {
        is_loading: bool,
        is_authenticated: bool,
    },
    TimerFired,
    SyncSucceeded,
    SyncFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorAction {
    None,
    /// Fetch a token and write it; arm the refresh timer if it isn't.
    Sync,
    /// Authentication ended: cancel the refresh timer.
    Disarm,
}

impl MirrorState {
    #[must_use]
    pub fn on(self, event: MirrorEvent) -> (Self, MirrorAction) {
        use MirrorEvent::{SessionChanged, SyncFailed, SyncSucceeded, TimerFired};

        match (self, event) {
            (_, SessionChanged { is_loading: true, .. }) => (self, MirrorAction::None),
            (
                _,
                SessionChanged {
                    is_authenticated: false,
                    ..
                },
            ) => (Self::Idle, MirrorAction::Disarm),
            (Self::Idle, SessionChanged { .. }) => (Self::Syncing, MirrorAction::Sync),
            (_, SessionChanged { .. }) => (self, MirrorAction::None),
            (_, TimerFired) => (Self::Syncing, MirrorAction::Sync),
            (Self::Syncing, SyncSucceeded) => (Self::Synced, MirrorAction::None),
            (Self::Syncing, SyncFailed) => (Self::Idle, MirrorAction::None),
            (_, SyncSucceeded | SyncFailed) => (self, MirrorAction::None),
        }
    }
}

/// Drives [`MirrorState`] for one session store.
pub struct TokenMirror<P> {
    store: SessionStore<P>,
    slot: CredentialSlot,
    interval: Duration,
}

impl<P: IdentityProvider> TokenMirror<P> {
    #[must_use]
    pub fn new(store: SessionStore<P>, slot: CredentialSlot) -> Self {
        Self {
            store,
            slot,
            interval: DEFAULT_REFRESH_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Fetch a token and mirror it, retrying once with a forced refresh.
    ///
    /// Returns whether the slot was written. Never fails: errors are logged.
    pub async fn sync(&self) -> bool {
        let token = match self.store.get_token_silently(TokenOptions::default()).await {
            Ok(token) => token,
            Err(first) => {
                tracing::warn!(error = %first, "silent token retrieval failed, forcing refresh");
                match self
                    .store
                    .get_token_silently(TokenOptions::force_refresh())
                    .await
                {
                    Ok(token) => token,
                    Err(e) => {
                        tracing::error!(error = %e, "unable to mirror access token");
                        return false;
                    }
                }
            }
        };

        // Signed out while the token was in flight.
        if !self.store.session().is_authenticated {
            tracing::debug!("session ended during sync, discarding token");
            return false;
        }

        self.slot.store(&token);
        true
    }

    /// Run the mirror on the current runtime until the handle is dropped.
    #[must_use]
    pub fn spawn(self) -> MirrorHandle {
        let (state_tx, state_rx) = watch::channel(MirrorState::Idle);
        let task = tokio::spawn(self.run(state_tx));
        MirrorHandle {
            task,
            state: state_rx,
        }
    }

    async fn run(self, state_tx: watch::Sender<MirrorState>) {
        let mut session_rx = self.store.subscribe();
        let mut timer: Option<Interval> = None;

        let initial = session_changed(&session_rx.borrow_and_update());
        self.step(initial, &state_tx, &mut timer).await;

        loop {
            let event = tokio::select! {
                changed = session_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let event = session_changed(&session_rx.borrow_and_update());
                    event
                }
                () = tick(&mut timer) => MirrorEvent::TimerFired,
            };
            self.step(event, &state_tx, &mut timer).await;
        }
    }

    async fn step(
        &self,
        event: MirrorEvent,
        state_tx: &watch::Sender<MirrorState>,
        timer: &mut Option<Interval>,
    ) {
        let (next, action) = state_tx.borrow().on(event);
        state_tx.send_replace(next);

        match action {
            MirrorAction::None => {}
            MirrorAction::Disarm => {
                if timer.take().is_some() {
                    tracing::debug!("refresh timer cancelled");
                }
            }
            MirrorAction::Sync => {
                if timer.is_none() {
                    *timer = Some(refresh_timer(self.interval));
                }
                let outcome = if self.sync().await {
                    MirrorEvent::SyncSucceeded
                } else {
                    MirrorEvent::SyncFailed
                };
                let (next, _) = state_tx.borrow().on(outcome);
                state_tx.send_replace(next);
            }
        }
    }
}

fn session_changed(session: &super::state::Session) -> MirrorEvent {
    MirrorEvent::SessionChanged {
        is_loading: session.is_loading,
        is_authenticated: session.is_authenticated,
    }
}

fn refresh_timer(period: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn tick(timer: &mut Option<Interval>) {
    match timer {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// A running mirror. Dropping it (or calling [`teardown`](Self::teardown))
/// cancels the refresh timer; no writes follow.
pub struct MirrorHandle {
    task: JoinHandle<()>,
    state: watch::Receiver<MirrorState>,
}

impl MirrorHandle {
    #[must_use]
    pub fn state(&self) -> MirrorState {
        *self.state.borrow()
    }

    /// Receiver that sees every state change.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<MirrorState> {
        self.state.clone()
    }

    pub fn teardown(self) {
        drop(self);
    }
}

impl Drop for MirrorHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
