//! Output rendering for the synchronized feed.
//!
//! The engine never draws anything itself.  It hands ordered message batches
//! and presence snapshots to a [`RenderSink`], and asks the sink whether the
//! view is following the bottom of the feed.  [`TerminalSink`] is the
//! implementation used by the `pollchat` binary.

use std::collections::BTreeSet;
use std::io::{self, Stdout, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::types::{Message, PresenceSnapshot, ServerStats, User};

/// ANSI escape code for dim text (used for timestamps).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code for bold text (used for sender names).
const ANSI_BOLD: &str = "\x1b[1m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for cyan text (used for presence changes).
const ANSI_CYAN: &str = "\x1b[36m";

/// ANSI escape code for green text (used for our own messages).
const ANSI_GREEN: &str = "\x1b[32m";

/// ANSI escape code for red text (used for errors).
const ANSI_RED: &str = "\x1b[31m";

/// Terminal bell.
const BELL: &str = "\x07";

/// Placeholder shown when the initial load finds an empty feed.
pub const EMPTY_FEED_TEXT: &str = "No messages yet. Be the first!";

/// Consumer of synchronized state.
///
/// `replace_all`, `append`, `update_presence` and `is_scrolled_to_bottom`
/// are the contract the engine relies on; the remaining methods have no-op
/// defaults.
pub trait RenderSink: Send {
    /// Discard the current feed and show `messages` instead, in order.
    fn replace_all(&mut self, messages: &[Message]);

    /// Add `messages` after the current feed, in order.
    fn append(&mut self, messages: &[Message]);

    /// Show a new online roster, replacing the previous one.
    fn update_presence(&mut self, snapshot: &PresenceSnapshot);

    /// Whether the view currently follows the newest message.
    fn is_scrolled_to_bottom(&self) -> bool;

    /// The logged-in user, so their own messages can be told apart.
    fn set_current_user(&mut self, user: &User) {
        _ = user;
    }

    /// Show new aggregate counters.
    fn update_stats(&mut self, stats: &ServerStats) {
        _ = stats;
    }

    /// Bring the newest message into view.
    fn scroll_to_bottom(&mut self) {}

    /// Called once per non-empty incremental batch.
    fn notify_new_messages(&mut self, count: usize) {
        _ = count;
    }

    /// The session was torn down; the user must log in again.
    fn session_expired(&mut self, reason: &str) {
        _ = reason;
    }

    /// Print an informational line.
    fn print_info(&mut self, info: &str) {
        _ = info;
    }

    /// Print an error line.
    fn print_error(&mut self, error: &str) {
        _ = error;
    }
}

/// A sink shared between the engine, the presence poller and the caller.
pub type SharedSink = Arc<Mutex<dyn RenderSink>>;

/// Wrap a sink for sharing.
pub fn shared<S: RenderSink + 'static>(sink: S) -> SharedSink {
    Arc::new(Mutex::new(sink))
}

/// Lock a shared sink.  A panic inside a previous sink call does not stop
/// synchronization.
pub fn lock_sink(sink: &SharedSink) -> MutexGuard<'_, dyn RenderSink + 'static> {
    sink.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Line-oriented sink with optional ANSI styling.
///
/// A terminal always shows the latest output, so the view is always at the
/// bottom.  Presence is rendered as join/leave lines rather than a full
/// roster on every poll.
pub struct TerminalSink<W: Write + Send = Stdout> {
    out: W,
    use_color: bool,
    bell: bool,
    current_user: Option<User>,
    online: Option<BTreeSet<String>>,
    stats: ServerStats,
}

impl TerminalSink<Stdout> {
    /// Creates a sink on stdout with colors and bell enabled.
    pub fn new() -> Self {
        Self::with_writer(io::stdout())
    }

    /// Creates a sink on stdout with the given settings.
    pub fn with_options(use_color: bool, bell: bool) -> Self {
        Self::with_writer(io::stdout()).with_color(use_color).with_bell(bell)
    }
}

impl Default for TerminalSink<Stdout> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write + Send> TerminalSink<W> {
    /// Creates a sink on any writer with colors and bell enabled.
    pub fn with_writer(out: W) -> Self {
        Self {
            out,
            use_color: true,
            bell: true,
            current_user: None,
            online: None,
            stats: ServerStats::default(),
        }
    }

    /// Enables or disables ANSI styling.
    pub fn with_color(mut self, use_color: bool) -> Self {
        self.use_color = use_color;
        self
    }

    /// Enables or disables the new-message bell.
    pub fn with_bell(mut self, bell: bool) -> Self {
        self.bell = bell;
        self
    }

    /// The counters most recently shown.
    pub fn stats(&self) -> ServerStats {
        self.stats
    }

    /// The writer, for inspection.
    pub fn writer(&self) -> &W {
        &self.out
    }

    fn write_line(&mut self, line: &str) {
        let _ = writeln!(self.out, "{line}");
        let _ = self.out.flush();
    }

    fn style(&self, code: &str, text: &str) -> String {
        if self.use_color {
            format!("{code}{text}{ANSI_RESET}")
        } else {
            text.to_string()
        }
    }

    fn is_own(&self, message: &Message) -> bool {
        self.current_user
            .as_ref()
            .is_some_and(|me| me.id == message.user.id)
    }

    fn format_message(&self, message: &Message) -> String {
        let time = message
            .time_of_day()
            .unwrap_or_else(|| sanitize(&message.timestamp));
        let name = sanitize(&message.user.display_name());
        let name = if self.is_own(message) {
            self.style(ANSI_GREEN, &format!("{name} (you)"))
        } else {
            self.style(ANSI_BOLD, &name)
        };
        let text = sanitize(&message.message_text).replace('\n', "\n    ");
        format!("{} {name}: {text}", self.style(ANSI_DIM, &format!("[{time}]")))
    }
}

impl<W: Write + Send> RenderSink for TerminalSink<W> {
    fn replace_all(&mut self, messages: &[Message]) {
        if messages.is_empty() {
            let line = self.style(ANSI_DIM, EMPTY_FEED_TEXT);
            self.write_line(&line);
            return;
        }
        for message in messages {
            let line = self.format_message(message);
            self.write_line(&line);
        }
    }

    fn append(&mut self, messages: &[Message]) {
        for message in messages {
            let line = self.format_message(message);
            self.write_line(&line);
        }
    }

    fn update_presence(&mut self, snapshot: &PresenceSnapshot) {
        let now: BTreeSet<String> = snapshot
            .online_users
            .iter()
            .map(|u| sanitize(&u.login))
            .collect();
        match self.online.take() {
            None => {
                let names = now.iter().cloned().collect::<Vec<_>>().join(", ");
                let line = format!("Online ({}): {}", snapshot.total_online, names);
                let line = self.style(ANSI_CYAN, &line);
                self.write_line(&line);
            }
            Some(before) => {
                for login in now.difference(&before) {
                    let line = self.style(ANSI_CYAN, &format!("-> {login} is online"));
                    self.write_line(&line);
                }
                for login in before.difference(&now) {
                    let line = self.style(ANSI_CYAN, &format!("<- {login} went offline"));
                    self.write_line(&line);
                }
            }
        }
        self.online = Some(now);
    }

    fn is_scrolled_to_bottom(&self) -> bool {
        true
    }

    fn set_current_user(&mut self, user: &User) {
        self.current_user = Some(user.clone());
    }

    fn update_stats(&mut self, stats: &ServerStats) {
        self.stats = *stats;
    }

    fn notify_new_messages(&mut self, count: usize) {
        if self.bell && count > 0 {
            let _ = write!(self.out, "{BELL}");
            let _ = self.out.flush();
        }
    }

    fn session_expired(&mut self, reason: &str) {
        let line = self.style(
            ANSI_RED,
            &format!("Session ended ({reason}). Log in again to continue."),
        );
        self.write_line(&line);
    }

    fn print_info(&mut self, info: &str) {
        self.write_line(info);
    }

    fn print_error(&mut self, error: &str) {
        let line = self.style(ANSI_RED, &format!("Error: {error}"));
        self.write_line(&line);
    }
}

/// Strip control characters so message text cannot drive the terminal.
fn sanitize(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || *c == '\n')
        .collect()
}
