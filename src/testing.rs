//! In-memory service and sink used by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use tokio::sync::Semaphore;

use crate::api::ChatApi;
use crate::error::{Error, Result};
use crate::render::RenderSink;
use crate::types::{
    LoginParams, LoginResponse, Message, PresenceSnapshot, RegisterParams, RegisterResponse,
    SendMessageParams, ServerStats, User,
};

#[derive(Default)]
struct FakeState {
    accounts: HashMap<String, (String, User)>,
    tokens: HashMap<String, User>,
    messages: Vec<Message>,
    online: PresenceSnapshot,
    user_count: u64,
    failures: HashMap<&'static str, VecDeque<Error>>,
    calls: HashMap<&'static str, usize>,
    gates: HashMap<&'static str, Arc<Semaphore>>,
    next_token: u64,
}

/// A scripted chat service.
///
/// Responses are computed when a call is issued; a paused operation then
/// waits for [`FakeChat::release`] before returning, which lets tests
/// complete overlapping requests in any order.
#[derive(Default)]
pub struct FakeChat {
    state: Mutex<FakeState>,
}

impl FakeChat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_account(&self, login: &str, password: &str) -> User {
        let mut state = self.state.lock().unwrap();
        let user = User::new(
            state.accounts.len() as u64 + 1,
            login,
            capitalize(login),
            "Tester",
        );
        state
            .accounts
            .insert(login.to_string(), (password.to_string(), user.clone()));
        state.user_count += 1;
        user
    }

    pub fn accept_token(&self, token: &str) {
        let mut state = self.state.lock().unwrap();
        let user = User::new(100, "holder", "Token", "Holder");
        state.tokens.insert(token.to_string(), user);
    }

    pub fn revoke_token(&self, token: &str) {
        self.state.lock().unwrap().tokens.remove(token);
    }

    /// Store a message as if another client had posted it.
    pub fn post(&self, text: &str) -> Message {
        let mut state = self.state.lock().unwrap();
        let id = state.messages.len() as u64 + 1;
        let message = Message::new(
            id,
            User::new(200, "other", "Other", "Person"),
            text,
            "2025-03-01 12:00:00",
        );
        state.messages.push(message.clone());
        message
    }

    pub fn set_online(&self, snapshot: PresenceSnapshot) {
        self.state.lock().unwrap().online = snapshot;
    }

    pub fn fail_next(&self, op: &'static str, err: Error) {
        self.state
            .lock()
            .unwrap()
            .failures
            .entry(op)
            .or_default()
            .push_back(err);
    }

    pub fn pause(&self, op: &'static str) {
        self.state
            .lock()
            .unwrap()
            .gates
            .insert(op, Arc::new(Semaphore::new(0)));
    }

    pub fn release(&self, op: &'static str, calls: usize) {
        if let Some(gate) = self.state.lock().unwrap().gates.get(op) {
            gate.add_permits(calls);
        }
    }

    pub fn resume(&self, op: &'static str) {
        if let Some(gate) = self.state.lock().unwrap().gates.remove(op) {
            gate.add_permits(Semaphore::MAX_PERMITS / 2);
        }
    }

    pub fn calls(&self, op: &'static str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .get(op)
            .copied()
            .unwrap_or(0)
    }

    fn begin(&self, op: &'static str) -> (Option<Error>, Option<Arc<Semaphore>>) {
        let mut state = self.state.lock().unwrap();
        *state.calls.entry(op).or_default() += 1;
        let failure = state.failures.get_mut(op).and_then(|q| q.pop_front());
        (failure, state.gates.get(op).cloned())
    }

    async fn respond<T>(
        &self,
        op: &'static str,
        compute: impl FnOnce(&mut FakeState) -> Result<T>,
    ) -> Result<T> {
        let (failure, gate) = self.begin(op);
        let result = match failure {
            Some(err) => Err(err),
            None => compute(&mut self.state.lock().unwrap()),
        };
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }
        result
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn user_for(state: &FakeState, token: &str) -> Result<User> {
    state
        .tokens
        .get(token)
        .cloned()
        .ok_or_else(|| Error::authentication("Invalid token"))
}

#[async_trait::async_trait]
impl ChatApi for FakeChat {
    async fn login(&self, params: &LoginParams) -> Result<LoginResponse> {
        let params = params.clone();
        self.respond("login", move |state| {
            match state.accounts.get(&params.login) {
                Some((password, user)) if *password == params.password => {
                    state.next_token += 1;
                    let token = format!("token-{}", state.next_token);
                    let user = user.clone();
                    state.tokens.insert(token.clone(), user);
                    Ok(LoginResponse {
                        status: Some("success".to_string()),
                        auth_token: Some(token),
                        ..LoginResponse::default()
                    })
                }
                _ => Ok(LoginResponse {
                    error: Some("not_found".to_string()),
                    message: Some("Invalid login or password".to_string()),
                    ..LoginResponse::default()
                }),
            }
        })
        .await
    }

    async fn register(&self, params: &RegisterParams) -> Result<RegisterResponse> {
        let params = params.clone();
        self.respond("register", move |state| {
            if state.accounts.contains_key(&params.login) {
                return Ok(RegisterResponse {
                    success: Some(false),
                    error: Some("User already exists".to_string()),
                    ..RegisterResponse::default()
                });
            }
            let user = User::new(
                state.accounts.len() as u64 + 1,
                params.login.clone(),
                params.first_name.clone(),
                params.last_name.clone(),
            );
            state
                .accounts
                .insert(params.login.clone(), (params.password.clone(), user));
            state.user_count += 1;
            Ok(RegisterResponse {
                status: Some("success".to_string()),
                ..RegisterResponse::default()
            })
        })
        .await
    }

    async fn logout(&self, token: &str) -> Result<()> {
        let token = token.to_string();
        self.respond("logout", move |state| {
            state.tokens.remove(&token);
            Ok(())
        })
        .await
    }

    async fn check_token(&self, token: &str) -> Result<bool> {
        let token = token.to_string();
        self.respond("check_token", move |state| Ok(state.tokens.contains_key(&token)))
            .await
    }

    async fn current_user(&self, token: &str) -> Result<User> {
        let token = token.to_string();
        self.respond("current_user", move |state| user_for(state, &token))
            .await
    }

    async fn history(&self, token: &str, limit: u32) -> Result<Vec<Message>> {
        let token = token.to_string();
        self.respond("history", move |state| {
            user_for(state, &token)?;
            let skip = state.messages.len().saturating_sub(limit as usize);
            Ok(state.messages[skip..].to_vec())
        })
        .await
    }

    async fn messages_after(&self, token: &str, after_id: u64) -> Result<Vec<Message>> {
        let token = token.to_string();
        self.respond("messages_after", move |state| {
            user_for(state, &token)?;
            Ok(state
                .messages
                .iter()
                .filter(|m| m.id > after_id)
                .cloned()
                .collect())
        })
        .await
    }

    async fn send_message(&self, token: &str, params: &SendMessageParams) -> Result<()> {
        let token = token.to_string();
        let text = params.message_text.clone();
        self.respond("send_message", move |state| {
            let user = user_for(state, &token)?;
            let id = state.messages.len() as u64 + 1;
            state
                .messages
                .push(Message::new(id, user, text, "2025-03-01 12:00:00"));
            Ok(())
        })
        .await
    }

    async fn online_users(&self, token: &str) -> Result<PresenceSnapshot> {
        let token = token.to_string();
        self.respond("online_users", move |state| {
            user_for(state, &token)?;
            Ok(state.online.clone())
        })
        .await
    }

    async fn message_count(&self, token: &str) -> Result<u64> {
        let token = token.to_string();
        self.respond("message_count", move |state| {
            user_for(state, &token)?;
            Ok(state.messages.len() as u64)
        })
        .await
    }

    async fn user_count(&self, token: &str) -> Result<u64> {
        let token = token.to_string();
        self.respond("user_count", move |state| {
            user_for(state, &token)?;
            Ok(state.user_count)
        })
        .await
    }
}

/// Everything a sink was asked to do, in order.
#[derive(Debug, Default)]
pub struct Recorded {
    pub feed: Vec<Message>,
    pub replace_calls: usize,
    pub append_calls: Vec<Vec<u64>>,
    pub presence: Option<PresenceSnapshot>,
    pub presence_updates: usize,
    pub stats: ServerStats,
    pub current_user: Option<User>,
    pub notified: usize,
    pub scrolled: usize,
    pub expired: Vec<String>,
    pub at_bottom: bool,
}

impl Recorded {
    pub fn ids(&self) -> Vec<u64> {
        self.feed.iter().map(|m| m.id).collect()
    }
}

/// A sink that records into shared state the test can inspect.
#[derive(Clone, Default)]
pub struct RecordingSink {
    pub recorded: Arc<Mutex<Recorded>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        let sink = Self::default();
        sink.recorded.lock().unwrap().at_bottom = true;
        sink
    }
}

impl RenderSink for RecordingSink {
    fn replace_all(&mut self, messages: &[Message]) {
        let mut recorded = self.recorded.lock().unwrap();
        recorded.feed = messages.to_vec();
        recorded.replace_calls += 1;
    }

    fn append(&mut self, messages: &[Message]) {
        let mut recorded = self.recorded.lock().unwrap();
        recorded.feed.extend_from_slice(messages);
        recorded
            .append_calls
            .push(messages.iter().map(|m| m.id).collect());
    }

    fn update_presence(&mut self, snapshot: &PresenceSnapshot) {
        let mut recorded = self.recorded.lock().unwrap();
        recorded.presence = Some(snapshot.clone());
        recorded.presence_updates += 1;
    }

    fn is_scrolled_to_bottom(&self) -> bool {
        self.recorded.lock().unwrap().at_bottom
    }

    fn set_current_user(&mut self, user: &User) {
        self.recorded.lock().unwrap().current_user = Some(user.clone());
    }

    fn update_stats(&mut self, stats: &ServerStats) {
        self.recorded.lock().unwrap().stats = *stats;
    }

    fn scroll_to_bottom(&mut self) {
        self.recorded.lock().unwrap().scrolled += 1;
    }

    fn notify_new_messages(&mut self, count: usize) {
        self.recorded.lock().unwrap().notified += count;
    }

    fn session_expired(&mut self, reason: &str) {
        self.recorded.lock().unwrap().expired.push(reason.to_string());
    }
}
