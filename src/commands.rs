//! Slash command parsing for the chat binary.
//!
//! Lines that start with `/` control the session and are never sent.  A
//! leading `//` escapes the slash so a message may start with one.

/// A parsed chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// Display help information.
    Help,

    /// Exit the chat application.
    Quit,

    /// End the session and ask for credentials again.
    Logout,

    /// Show the logged-in user.
    Whoami,

    /// Show who is online.
    Online,

    /// Show the message and user counters.
    Stats,

    /// Refresh presence and counters now instead of waiting for the timer.
    Refresh,

    /// Reload the whole feed from history.
    Reload,

    /// Show the current configuration.
    ShowConfig,

    /// Text that should be sent as a message, with the escaping slash removed.
    Literal(String),

    /// Report a parsing error back to the caller.
    Invalid(String),
}

/// Parses user input for slash commands.
///
/// Returns `Some(ChatCommand)` if the input is a command, or `None` if it
/// should be sent as a regular message.
///
/// # Examples
///
/// ```
/// # use pollchat::commands::parse_command;
/// assert!(parse_command("/quit").is_some());
/// assert!(parse_command("hello everyone").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();

    if let Some(escaped) = input.strip_prefix("//") {
        return Some(ChatCommand::Literal(format!("/{escaped}")));
    }
    let rest = input.strip_prefix('/')?;

    let mut parts = rest.splitn(2, ' ');
    let command = parts.next()?.to_lowercase();
    let argument = parts.next().map(|s| s.trim()).filter(|s| !s.is_empty());

    let result = match command.as_str() {
        "help" | "?" => no_argument(ChatCommand::Help, argument, "/help"),
        "quit" | "exit" | "q" => ChatCommand::Quit,
        "logout" => no_argument(ChatCommand::Logout, argument, "/logout"),
        "whoami" | "me" => no_argument(ChatCommand::Whoami, argument, "/whoami"),
        "online" | "who" => no_argument(ChatCommand::Online, argument, "/online"),
        "stats" | "status" => no_argument(ChatCommand::Stats, argument, "/stats"),
        "refresh" => no_argument(ChatCommand::Refresh, argument, "/refresh"),
        "reload" => no_argument(ChatCommand::Reload, argument, "/reload"),
        "config" => no_argument(ChatCommand::ShowConfig, argument, "/config"),
        "" => ChatCommand::Invalid("Empty command; try /help".to_string()),
        _ => ChatCommand::Invalid(format!("Unknown command: /{}", command)),
    };

    Some(result)
}

fn no_argument(command: ChatCommand, argument: Option<&str>, name: &str) -> ChatCommand {
    match argument {
        Some(_) => ChatCommand::Invalid(format!("{name} takes no arguments")),
        None => command,
    }
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"Available commands:
  /online                Show who is online
  /stats                 Show message and user counts
  /whoami                Show the logged-in user
  /refresh               Refresh presence and counts now
  /reload                Reload the message feed
  /config                Show current configuration
  /logout                End the session and log in again
  /help                  Show this help message
  /quit                  Exit the chat
Start a message with // to send text beginning with a slash."#
}
