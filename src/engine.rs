//! The polling synchronization engine.
//!
//! [`SyncEngine`] keeps a [`RenderSink`](crate::render::RenderSink) in step
//! with the service's message feed.  One timer asks for everything after the
//! cursor, another refreshes presence.  Every tick runs as its own task, so
//! polls may overlap; the engine state and cursor live behind one lock that
//! is never held across an await, and a completed fetch only contributes
//! messages that are still ahead of the cursor when it lands.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::api::ChatApi;
use crate::config::SyncConfig;
use crate::cursor::Cursor;
use crate::error::{Error, Result};
use crate::observability::{
    SYNC_BATCH_SIZE, SYNC_MESSAGES_DISCARDED, SYNC_MESSAGES_RECEIVED, SYNC_POLL_ERRORS,
    SYNC_POLLS, SYNC_POLLS_SUPPRESSED, SYNC_SEND_ERRORS, SYNC_SENDS,
};
use crate::presence::PresencePoller;
use crate::render::{SharedSink, lock_sink};
use crate::session::SessionGuard;
use crate::types::{Message, SendMessageParams};
use crate::validation::validate_message;

/// Lifecycle of a [`SyncEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Created, nothing loaded yet.
    Uninitialized,
    /// The initial page is being fetched.
    Loading,
    /// Timers are running and results are applied.
    Live,
    /// The session was rejected.  A new login and [`SyncEngine::start`]
    /// bring the engine back.
    Suspended,
    /// Destroyed.  Nothing more happens.
    Terminated,
}

impl EngineState {
    /// Whether a failure in this state suspends the engine.
    fn can_suspend(self) -> bool {
        matches!(self, EngineState::Loading | EngineState::Live)
    }
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EngineState::Uninitialized => "uninitialized",
            EngineState::Loading => "loading",
            EngineState::Live => "live",
            EngineState::Suspended => "suspended",
            EngineState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
struct SyncState {
    state: EngineState,
    cursor: Cursor,
    suppress_next_poll: bool,
}

/// Keeps a sink synchronized with the service.
///
/// Share it in an `Arc`; [`start`](Self::start) needs one to spawn the
/// timers.  The timers hold only a weak reference, so dropping the last
/// `Arc` stops them as well.
pub struct SyncEngine {
    api: Arc<dyn ChatApi>,
    session: Arc<SessionGuard>,
    sink: SharedSink,
    presence: Arc<PresencePoller>,
    history_limit: u32,
    poll_interval: Duration,
    presence_interval: Duration,
    sync: Mutex<SyncState>,
    state_tx: watch::Sender<EngineState>,
    timers: Mutex<Vec<JoinHandle<()>>>,
}

impl SyncEngine {
    /// Create an engine.  Nothing is fetched until [`start`](Self::start) or
    /// [`initial_load`](Self::initial_load).
    pub fn new(
        api: Arc<dyn ChatApi>,
        session: Arc<SessionGuard>,
        sink: SharedSink,
        config: &SyncConfig,
    ) -> Self {
        let presence = Arc::new(PresencePoller::new(
            api.clone(),
            session.clone(),
            sink.clone(),
        ));
        let (state_tx, _) = watch::channel(EngineState::Uninitialized);
        Self {
            api,
            session,
            sink,
            presence,
            history_limit: config.history_limit,
            poll_interval: config.poll_interval,
            presence_interval: config.presence_interval,
            sync: Mutex::new(SyncState {
                state: EngineState::Uninitialized,
                cursor: Cursor::new(),
                suppress_next_poll: false,
            }),
            state_tx,
            timers: Mutex::new(Vec::new()),
        }
    }

    /// The current lifecycle state.
    pub fn state(&self) -> EngineState {
        self.lock_sync().state
    }

    /// A receiver that observes every state transition.
    pub fn subscribe(&self) -> watch::Receiver<EngineState> {
        self.state_tx.subscribe()
    }

    /// The id of the newest delivered message.
    pub fn cursor(&self) -> u64 {
        self.lock_sync().cursor.last_seen_id()
    }

    /// The presence poller driven by this engine's second timer.
    pub fn presence(&self) -> &Arc<PresencePoller> {
        &self.presence
    }

    /// The session this engine reads its token from.
    pub fn session(&self) -> &Arc<SessionGuard> {
        &self.session
    }

    /// Validate the session, load the feed, and start both timers.
    ///
    /// Works from `Uninitialized` and, after a fresh login, from `Suspended`.
    /// A zero timer period is rejected before any request.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if self.state() == EngineState::Terminated {
            return Err(Error::terminated("engine was destroyed"));
        }
        for (name, period) in [
            ("poll_interval", self.poll_interval),
            ("presence_interval", self.presence_interval),
        ] {
            if period.is_zero() {
                return Err(Error::validation(
                    format!("{name} must be greater than zero"),
                    Some(name.to_string()),
                ));
            }
        }
        let token = self.session.acquire().await?;
        let user = match self.api.current_user(&token).await {
            Ok(user) => user,
            Err(err) => {
                if err.is_authentication() {
                    self.session.expire(&token);
                }
                return Err(err);
            }
        };
        lock_sink(&self.sink).set_current_user(&user);
        self.initial_load().await?;
        self.presence.refresh().await;
        self.spawn_timers();
        tracing::info!(target: "pollchat::sync", login = %user.login, cursor = self.cursor(), "sync started");
        Ok(())
    }

    /// Replace the sink's feed with the latest page of history and set the
    /// cursor to its last message.
    pub async fn initial_load(&self) -> Result<()> {
        let previous = {
            let mut sync = self.lock_sync();
            if sync.state == EngineState::Terminated {
                return Err(Error::terminated("engine was destroyed"));
            }
            let previous = sync.state;
            self.transition(&mut sync, EngineState::Loading);
            previous
        };
        let token = match self.session.acquire().await {
            Ok(token) => token,
            Err(err) => return Err(self.fail(None, err)),
        };
        let messages = match self.api.history(&token, self.history_limit).await {
            Ok(messages) => messages,
            Err(err) if err.is_transient() => {
                tracing::warn!(target: "pollchat::sync", error = %err, "initial load failed");
                let mut sync = self.lock_sync();
                if sync.state == EngineState::Loading {
                    self.transition(&mut sync, previous);
                }
                return Err(err);
            }
            Err(err) => return Err(self.fail(Some(&token), err)),
        };

        let mut sync = self.lock_sync();
        if sync.state != EngineState::Loading {
            SYNC_MESSAGES_DISCARDED.count(messages.len() as u64);
            return match sync.state {
                EngineState::Terminated => Err(Error::terminated("engine was destroyed")),
                _ => Ok(()),
            };
        }
        if let Some(last) = messages.last() {
            sync.cursor.advance(last.id);
        }
        SYNC_MESSAGES_RECEIVED.count(messages.len() as u64);
        {
            let mut sink = lock_sink(&self.sink);
            sink.replace_all(&messages);
            if !messages.is_empty() && sink.is_scrolled_to_bottom() {
                sink.scroll_to_bottom();
            }
        }
        self.transition(&mut sync, EngineState::Live);
        tracing::debug!(target: "pollchat::sync", count = messages.len(), cursor = sync.cursor.last_seen_id(), "initial load");
        Ok(())
    }

    /// One timer-driven poll.
    ///
    /// Consumes the suppression flag instead of fetching if a send just
    /// fetched.  Returns the number of messages appended.  Transient failures
    /// are returned but leave the engine live; anything else suspends it.
    pub async fn poll_incremental(&self) -> Result<usize> {
        {
            let mut sync = self.lock_sync();
            if sync.state != EngineState::Live {
                return Ok(0);
            }
            if sync.suppress_next_poll {
                sync.suppress_next_poll = false;
                SYNC_POLLS_SUPPRESSED.click();
                return Ok(0);
            }
        }
        self.fetch_incremental().await
    }

    /// Submit a message, then fetch immediately so it shows up without
    /// waiting for the timer.
    ///
    /// Blank text is rejected before any request.  If the submission fails
    /// the error is returned and nothing changes; the caller still owns the
    /// text.  A failure of the follow-up fetch is handled like a poll failure
    /// and does not fail the send.
    pub async fn send(&self, text: &str) -> Result<()> {
        if !validate_message(text) {
            return Err(Error::validation(
                "message must not be empty",
                Some("message_text".to_string()),
            ));
        }
        match self.state() {
            EngineState::Terminated => return Err(Error::terminated("engine was destroyed")),
            EngineState::Uninitialized | EngineState::Suspended => {
                return Err(Error::authentication("not connected"));
            }
            EngineState::Loading | EngineState::Live => {}
        }
        let token = match self.session.acquire().await {
            Ok(token) => token,
            Err(err) => {
                SYNC_SEND_ERRORS.click();
                return Err(self.fail(None, err));
            }
        };
        let params = SendMessageParams::new(text.trim());
        if let Err(err) = self.api.send_message(&token, &params).await {
            SYNC_SEND_ERRORS.click();
            tracing::warn!(target: "pollchat::sync", error = %err, "send failed");
            if err.is_authentication() {
                return Err(self.fail(Some(&token), err));
            }
            return Err(err);
        }
        SYNC_SENDS.click();
        if self.fetch_incremental().await.is_ok() {
            let mut sync = self.lock_sync();
            if sync.state == EngineState::Live {
                sync.suppress_next_poll = true;
            }
        }
        Ok(())
    }

    /// Stop both timers and park the engine in `Suspended` without reporting
    /// an expired session, e.g. before logging out on purpose.  In-flight
    /// results are dropped and [`start`](Self::start) resumes after a new
    /// login.
    pub fn pause(&self) {
        self.stop_timers();
        let mut sync = self.lock_sync();
        if sync.state.can_suspend() {
            self.transition(&mut sync, EngineState::Suspended);
            sync.suppress_next_poll = false;
            tracing::debug!(target: "pollchat::sync", "paused");
        }
    }

    /// Stop both timers and terminate.  Safe to call repeatedly and before
    /// anything was started.  Requests already in flight finish, but their
    /// results are dropped.
    pub fn destroy(&self) {
        self.stop_timers();
        let mut sync = self.lock_sync();
        if sync.state != EngineState::Terminated {
            self.transition(&mut sync, EngineState::Terminated);
            sync.suppress_next_poll = false;
            tracing::debug!(target: "pollchat::sync", "destroyed");
        }
    }

    async fn fetch_incremental(&self) -> Result<usize> {
        SYNC_POLLS.click();
        let token = match self.session.acquire().await {
            Ok(token) => token,
            Err(err) => return Err(self.fail(None, err)),
        };
        let after = self.cursor();
        match self.api.messages_after(&token, after).await {
            Ok(messages) => Ok(self.apply_batch(messages)),
            Err(err) => Err(self.fail(Some(&token), err)),
        }
    }

    /// Append the part of `messages` still ahead of the cursor.
    ///
    /// Only a live engine applies batches.  While a load is in flight the
    /// batch is dropped without moving the cursor: the history page about to
    /// replace the feed may predate it, and the next poll fetches it again.
    fn apply_batch(&self, messages: Vec<Message>) -> usize {
        let mut sync = self.lock_sync();
        if sync.state != EngineState::Live {
            SYNC_MESSAGES_DISCARDED.count(messages.len() as u64);
            return 0;
        }
        let total = messages.len();
        let fresh: Vec<Message> = messages
            .into_iter()
            .filter(|m| sync.cursor.is_new(m.id))
            .collect();
        SYNC_MESSAGES_DISCARDED.count((total - fresh.len()) as u64);
        let Some(last) = fresh.last() else {
            return 0;
        };
        sync.cursor.advance(last.id);
        SYNC_MESSAGES_RECEIVED.count(fresh.len() as u64);
        SYNC_BATCH_SIZE.add(fresh.len() as f64);
        let mut sink = lock_sink(&self.sink);
        sink.append(&fresh);
        sink.notify_new_messages(fresh.len());
        if sink.is_scrolled_to_bottom() {
            sink.scroll_to_bottom();
        }
        tracing::trace!(target: "pollchat::sync", count = fresh.len(), cursor = sync.cursor.last_seen_id(), "appended batch");
        fresh.len()
    }

    fn fail(&self, token: Option<&str>, err: Error) -> Error {
        SYNC_POLL_ERRORS.click();
        if err.is_transient() {
            tracing::warn!(target: "pollchat::sync", error = %err, "fetch failed, will retry");
            return err;
        }
        if let Some(token) = token {
            self.session.expire(token);
        }
        self.suspend(&err.to_string());
        err
    }

    fn suspend(&self, reason: &str) {
        {
            let mut sync = self.lock_sync();
            if !sync.state.can_suspend() {
                return;
            }
            self.transition(&mut sync, EngineState::Suspended);
            sync.suppress_next_poll = false;
        }
        self.stop_timers();
        tracing::warn!(target: "pollchat::sync", reason, "session suspended");
        lock_sink(&self.sink).session_expired(reason);
    }

    fn transition(&self, sync: &mut SyncState, next: EngineState) {
        if sync.state != next {
            tracing::debug!(target: "pollchat::sync", from = %sync.state, to = %next, "state change");
            sync.state = next;
            self.state_tx.send_replace(next);
        }
    }

    fn spawn_timers(self: &Arc<Self>) {
        let mut timers = self.lock_timers();
        for timer in timers.drain(..) {
            timer.abort();
        }
        timers.push(tokio::spawn(run_message_timer(
            Arc::downgrade(self),
            self.poll_interval,
        )));
        timers.push(tokio::spawn(run_presence_timer(
            Arc::downgrade(self),
            self.presence_interval,
        )));
    }

    fn stop_timers(&self) {
        for timer in self.lock_timers().drain(..) {
            timer.abort();
        }
    }

    fn lock_sync(&self) -> MutexGuard<'_, SyncState> {
        self.sync.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_timers(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        self.stop_timers();
    }
}

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn run_message_timer(engine: Weak<SyncEngine>, period: Duration) {
    let mut interval = ticker(period);
    loop {
        interval.tick().await;
        let Some(engine) = engine.upgrade() else {
            break;
        };
        tokio::spawn(async move {
            let _ = engine.poll_incremental().await;
        });
    }
}

async fn run_presence_timer(engine: Weak<SyncEngine>, period: Duration) {
    let mut interval = ticker(period);
    loop {
        interval.tick().await;
        let Some(engine) = engine.upgrade() else {
            break;
        };
        if engine.state() != EngineState::Live {
            continue;
        }
        tokio::spawn(async move {
            engine.presence.refresh().await;
        });
    }
}
