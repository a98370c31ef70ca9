use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("pollchat.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("pollchat.client.request_errors");
pub(crate) static CLIENT_REQUEST_DURATION: Moments =
    Moments::new("pollchat.client.request_duration_seconds");

pub(crate) static SESSION_CHECKS: Counter = Counter::new("pollchat.session.checks");
pub(crate) static SESSION_REJECTIONS: Counter = Counter::new("pollchat.session.rejections");
pub(crate) static SESSION_LOGINS: Counter = Counter::new("pollchat.session.logins");
pub(crate) static SESSION_LOGOUTS: Counter = Counter::new("pollchat.session.logouts");

pub(crate) static SYNC_POLLS: Counter = Counter::new("pollchat.sync.polls");
pub(crate) static SYNC_POLLS_SUPPRESSED: Counter = Counter::new("pollchat.sync.polls_suppressed");
pub(crate) static SYNC_POLL_ERRORS: Counter = Counter::new("pollchat.sync.poll_errors");
pub(crate) static SYNC_MESSAGES_RECEIVED: Counter =
    Counter::new("pollchat.sync.messages_received");
pub(crate) static SYNC_MESSAGES_DISCARDED: Counter =
    Counter::new("pollchat.sync.messages_discarded");
pub(crate) static SYNC_SENDS: Counter = Counter::new("pollchat.sync.sends");
pub(crate) static SYNC_SEND_ERRORS: Counter = Counter::new("pollchat.sync.send_errors");
pub(crate) static SYNC_BATCH_SIZE: Moments = Moments::new("pollchat.sync.batch_size");

pub(crate) static PRESENCE_REFRESHES: Counter = Counter::new("pollchat.presence.refreshes");
pub(crate) static PRESENCE_ERRORS: Counter = Counter::new("pollchat.presence.errors");
pub(crate) static PRESENCE_STALE: Counter = Counter::new("pollchat.presence.stale_responses");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
    collector.register_moments(&CLIENT_REQUEST_DURATION);

    collector.register_counter(&SESSION_CHECKS);
    collector.register_counter(&SESSION_REJECTIONS);
    collector.register_counter(&SESSION_LOGINS);
    collector.register_counter(&SESSION_LOGOUTS);

    collector.register_counter(&SYNC_POLLS);
    collector.register_counter(&SYNC_POLLS_SUPPRESSED);
    collector.register_counter(&SYNC_POLL_ERRORS);
    collector.register_counter(&SYNC_MESSAGES_RECEIVED);
    collector.register_counter(&SYNC_MESSAGES_DISCARDED);
    collector.register_counter(&SYNC_SENDS);
    collector.register_counter(&SYNC_SEND_ERRORS);
    collector.register_moments(&SYNC_BATCH_SIZE);

    collector.register_counter(&PRESENCE_REFRESHES);
    collector.register_counter(&PRESENCE_ERRORS);
    collector.register_counter(&PRESENCE_STALE);
}
