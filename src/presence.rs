//! Best-effort polling of the online roster and the aggregate counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::api::ChatApi;
use crate::observability::{PRESENCE_ERRORS, PRESENCE_REFRESHES, PRESENCE_STALE};
use crate::render::{SharedSink, lock_sink};
use crate::session::SessionGuard;
use crate::types::{PresenceSnapshot, ServerStats};

#[derive(Debug, Default)]
struct PresenceState {
    snapshot: Option<PresenceSnapshot>,
    stats: ServerStats,
    roster_seq: u64,
    messages_seq: u64,
    users_seq: u64,
}

/// Keeps the sink's roster and counters roughly current.
///
/// Each of the three fetches may fail on its own; a failure is logged and
/// leaves the previous value in place.  Nothing here ever tears the session
/// down.  Every refresh is numbered when it is issued, and a result only
/// lands if no later refresh has already landed for the same field, so a
/// slow response cannot overwrite a newer one.
pub struct PresencePoller {
    api: Arc<dyn ChatApi>,
    session: Arc<SessionGuard>,
    sink: SharedSink,
    issued: AtomicU64,
    state: Mutex<PresenceState>,
}

impl PresencePoller {
    /// Create a poller that reads its token from `session` and reports to
    /// `sink`.  Nothing is fetched until [`refresh`](Self::refresh).
    pub fn new(api: Arc<dyn ChatApi>, session: Arc<SessionGuard>, sink: SharedSink) -> Self {
        Self {
            api,
            session,
            sink,
            issued: AtomicU64::new(0),
            state: Mutex::new(PresenceState::default()),
        }
    }

    /// Fetch the roster and both counters concurrently and apply whatever
    /// arrives.
    pub async fn refresh(&self) {
        PRESENCE_REFRESHES.click();
        let seq = self.issued.fetch_add(1, Ordering::Relaxed) + 1;
        let token = match self.session.acquire().await {
            Ok(token) => token,
            Err(err) => {
                PRESENCE_ERRORS.click();
                tracing::debug!(target: "pollchat::presence", error = %err, "skipping refresh");
                return;
            }
        };
        let (roster, messages, users) = futures::join!(
            self.api.online_users(&token),
            self.api.message_count(&token),
            self.api.user_count(&token),
        );

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match roster {
            Ok(snapshot) if seq > state.roster_seq => {
                state.roster_seq = seq;
                lock_sink(&self.sink).update_presence(&snapshot);
                state.snapshot = Some(snapshot);
            }
            Ok(_) => PRESENCE_STALE.click(),
            Err(err) => {
                PRESENCE_ERRORS.click();
                tracing::warn!(target: "pollchat::presence", error = %err, "roster fetch failed");
            }
        }

        let mut stats_changed = false;
        match messages {
            Ok(count) if seq > state.messages_seq => {
                state.messages_seq = seq;
                state.stats.total_messages = Some(count);
                stats_changed = true;
            }
            Ok(_) => PRESENCE_STALE.click(),
            Err(err) => {
                PRESENCE_ERRORS.click();
                tracing::warn!(target: "pollchat::presence", error = %err, "message count failed");
            }
        }
        match users {
            Ok(count) if seq > state.users_seq => {
                state.users_seq = seq;
                state.stats.total_users = Some(count);
                stats_changed = true;
            }
            Ok(_) => PRESENCE_STALE.click(),
            Err(err) => {
                PRESENCE_ERRORS.click();
                tracing::warn!(target: "pollchat::presence", error = %err, "user count failed");
            }
        }
        if stats_changed {
            lock_sink(&self.sink).update_stats(&state.stats);
        }
    }

    /// The last roster applied, if any.
    pub fn snapshot(&self) -> Option<PresenceSnapshot> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot
            .clone()
    }

    /// The last counters applied.
    pub fn stats(&self) -> ServerStats {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::render::shared;
    use crate::testing::{FakeChat, RecordingSink};
    use crate::token_store::MemoryTokenStore;
    use crate::types::User;

    fn poller(fake: &Arc<FakeChat>, sink: &RecordingSink) -> Arc<PresencePoller> {
        fake.accept_token("tok");
        let session = Arc::new(SessionGuard::new(
            fake.clone(),
            Arc::new(MemoryTokenStore::with_token("tok")),
        ));
        Arc::new(PresencePoller::new(fake.clone(), session, shared(sink.clone())))
    }

    fn roster(logins: &[&str]) -> PresenceSnapshot {
        let users = logins
            .iter()
            .enumerate()
            .map(|(i, login)| User::new(i as u64 + 1, *login, *login, ""))
            .collect::<Vec<_>>();
        let total = users.len() as u64;
        PresenceSnapshot::new(users, total)
    }

    #[test]
    fn new_poller_fetches_nothing() {
        let fake = Arc::new(FakeChat::new());
        let sink = RecordingSink::new();
        let poller = poller(&fake, &sink);
        assert_eq!(poller.snapshot(), None);
        assert_eq!(poller.stats(), ServerStats::default());
        assert_eq!(fake.calls("online_users"), 0);
        assert_eq!(sink.recorded.lock().unwrap().presence_updates, 0);
    }

    #[tokio::test]
    async fn refresh_applies_everything() {
        let fake = Arc::new(FakeChat::new());
        let sink = RecordingSink::new();
        let poller = poller(&fake, &sink);
        fake.add_account("ivan_p", "secret1");
        fake.post("one");
        fake.set_online(roster(&["ivan_p"]));

        poller.refresh().await;
        assert_eq!(poller.snapshot(), Some(roster(&["ivan_p"])));
        assert_eq!(
            poller.stats(),
            ServerStats {
                total_messages: Some(1),
                total_users: Some(1),
            }
        );
        let recorded = sink.recorded.lock().unwrap();
        assert_eq!(recorded.presence_updates, 1);
        assert_eq!(recorded.stats.total_messages, Some(1));
    }

    #[tokio::test]
    async fn failed_roster_keeps_previous_snapshot() {
        let fake = Arc::new(FakeChat::new());
        let sink = RecordingSink::new();
        let poller = poller(&fake, &sink);
        fake.set_online(roster(&["alice"]));
        poller.refresh().await;

        fake.set_online(roster(&["bob"]));
        fake.post("hello");
        fake.fail_next("online_users", Error::connection("refused", None));
        poller.refresh().await;

        assert_eq!(poller.snapshot(), Some(roster(&["alice"])));
        assert_eq!(poller.stats().total_messages, Some(1));
        assert_eq!(sink.recorded.lock().unwrap().presence_updates, 1);
    }

    #[tokio::test]
    async fn auth_failure_does_not_escalate() {
        let fake = Arc::new(FakeChat::new());
        let sink = RecordingSink::new();
        let poller = poller(&fake, &sink);
        fake.fail_next("user_count", Error::authentication("nope"));
        poller.refresh().await;
        assert!(sink.recorded.lock().unwrap().expired.is_empty());
        assert_eq!(poller.stats().total_users, None);
        assert_eq!(poller.stats().total_messages, Some(0));
    }

    #[tokio::test]
    async fn late_roster_does_not_overwrite_newer() {
        let fake = Arc::new(FakeChat::new());
        let sink = RecordingSink::new();
        let poller = poller(&fake, &sink);

        fake.set_online(roster(&["old"]));
        fake.pause("online_users");
        let slow = tokio::spawn({
            let poller = poller.clone();
            async move { poller.refresh().await }
        });
        while fake.calls("online_users") < 1 {
            tokio::task::yield_now().await;
        }

        fake.set_online(roster(&["new"]));
        fake.resume("online_users");
        poller.refresh().await;
        slow.await.unwrap();

        assert_eq!(poller.snapshot(), Some(roster(&["new"])));
        let recorded = sink.recorded.lock().unwrap();
        assert_eq!(recorded.presence, Some(roster(&["new"])));
    }
}
