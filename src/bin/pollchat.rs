//! Terminal client for the chat service.
//!
//! Logs in (or registers), loads recent history, and then keeps the feed and
//! the online roster current by polling while you type.
//!
//! # Usage
//!
//! ```bash
//! # Connect to a local service and prompt for credentials
//! pollchat
//!
//! # Another service, keeping the token between runs
//! pollchat --base-url https://chat.example.org/ --token-file ~/.pollchat-token
//!
//! # Create an account first
//! pollchat --register --login ivan_p
//! ```
//!
//! Set `POLLCHAT_PASSWORD` to skip the first password prompt and `RUST_LOG`
//! (e.g. `pollchat=debug`) to see diagnostics on stderr.
//!
//! # Commands
//!
//! - `/online` - Show who is online
//! - `/stats` - Show message and user counts
//! - `/logout` - End the session and log in again
//! - `/help` - Show available commands
//! - `/quit` - Exit the application

use std::sync::Arc;

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::{Notify, watch};
use tracing_subscriber::EnvFilter;

use pollchat::commands::{ChatCommand, help_text, parse_command};
use pollchat::render::{SharedSink, lock_sink, shared};
use pollchat::{
    ChatApi, ChatArgs, ChatClient, EngineState, Error, FileTokenStore, MemoryTokenStore,
    RegisterParams, SessionGuard, SyncConfig, SyncEngine, TerminalSink, TokenStore,
};

const PROMPT: &str = "> ";

/// Main entry point for the pollchat application.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let (args, _) = ChatArgs::from_command_line_relaxed("pollchat [OPTIONS]");
    let config = SyncConfig::from_args(&args)?;

    let client = Arc::new(ChatClient::from_config(&config)?);
    let store: Arc<dyn TokenStore> = match &config.token_file {
        Some(path) => Arc::new(FileTokenStore::new(path)),
        None => Arc::new(MemoryTokenStore::new()),
    };
    let session = Arc::new(SessionGuard::new(client.clone(), store));
    let sink = shared(TerminalSink::with_options(config.use_color, config.bell));
    let engine = Arc::new(SyncEngine::new(
        client.clone(),
        session.clone(),
        sink.clone(),
        &config,
    ));
    let mut states = engine.subscribe();
    let mut rl = DefaultEditor::new()?;

    // Ctrl+C outside the prompt abandons the request in flight.
    let interrupt = Arc::new(Notify::new());
    let interrupt_clone = interrupt.clone();
    ctrlc::set_handler(move || {
        interrupt_clone.notify_one();
    })?;

    println!("pollchat ({})", client.base_url());
    println!("Type /help for commands, /quit to exit\n");

    let mut prefill = args.login.clone();
    if args.register {
        match register(&mut rl, &session, prefill.take()).await {
            Ok(true) => {}
            Ok(false) => return Ok(()),
            Err(err) => {
                lock_sink(&sink).print_error(&err.to_string());
                return Ok(());
            }
        }
    }
    if !connect(&mut rl, &engine, &sink, prefill).await? {
        engine.destroy();
        return Ok(());
    }
    states.borrow_and_update();

    let mut restore: Option<String> = None;
    loop {
        if suspended(&mut states) && !connect(&mut rl, &engine, &sink, None).await? {
            break;
        }

        let readline = match restore.take() {
            Some(text) => read_line_with(&mut rl, PROMPT, &text),
            None => read_line(&mut rl, PROMPT),
        };
        let line = match readline {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                // Ctrl+C at prompt - soft interrupt
                println!();
                continue;
            }
            Err(ReadlineError::Eof) => {
                // Ctrl+D - exit
                println!("\nGoodbye!");
                break;
            }
            Err(err) => {
                lock_sink(&sink).print_error(&format!("Input error: {}", err));
                break;
            }
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(trimmed);

        let text = match parse_command(trimmed) {
            None => trimmed.to_string(),
            Some(ChatCommand::Literal(text)) => text,
            Some(ChatCommand::Quit) => {
                println!("Goodbye!");
                break;
            }
            Some(ChatCommand::Logout) => {
                // Stop polling first so no tick reports the session as expired.
                engine.pause();
                match session.logout().await {
                    Ok(()) => lock_sink(&sink).print_info("Logged out."),
                    Err(err) => lock_sink(&sink).print_error(&err.to_string()),
                }
                if !connect(&mut rl, &engine, &sink, None).await? {
                    break;
                }
                states.borrow_and_update();
                continue;
            }
            Some(command) => {
                run_command(command, &engine, client.as_ref(), &sink, &config).await;
                continue;
            }
        };

        tokio::select! {
            result = engine.send(&text) => {
                if let Err(err) = result {
                    lock_sink(&sink).print_error(&format!("Message not sent: {}", err));
                    restore = Some(line);
                }
            }
            _ = interrupt.notified() => {
                lock_sink(&sink).print_error(
                    "Send abandoned; the message may already have been delivered.",
                );
                restore = Some(line);
            }
        }
    }

    engine.destroy();
    Ok(())
}

/// Returns true once per transition into `Suspended`.
fn suspended(states: &mut watch::Receiver<EngineState>) -> bool {
    matches!(states.has_changed(), Ok(true)) && *states.borrow_and_update() == EngineState::Suspended
}

/// Log in if needed and start the engine.  Returns false if the user gave up.
async fn connect(
    rl: &mut DefaultEditor,
    engine: &Arc<SyncEngine>,
    sink: &SharedSink,
    mut login: Option<String>,
) -> Result<bool, Box<dyn std::error::Error>> {
    let mut first_attempt = true;
    loop {
        if !engine.session().is_authenticated().await {
            let allow_env = std::mem::take(&mut first_attempt);
            let Some((name, password)) = credentials(rl, login.take(), allow_env)? else {
                return Ok(false);
            };
            if let Err(err) = engine.session().login(&name, &password).await {
                lock_sink(sink).print_error(&err.to_string());
                continue;
            }
        }
        match engine.start().await {
            Ok(()) => return Ok(true),
            Err(err) if err.is_authentication() => {
                lock_sink(sink).print_error(&err.to_string());
            }
            Err(err) => return Err(err.into()),
        }
    }
}

/// Prompt for a new account and create it.  Returns false if the user gave up.
async fn register(
    rl: &mut DefaultEditor,
    session: &SessionGuard,
    login: Option<String>,
) -> Result<bool, Error> {
    let login = match login {
        Some(login) => login,
        None => match ask(rl, "Login: ")? {
            Some(login) => login,
            None => return Ok(false),
        },
    };
    let Some(first_name) = ask(rl, "First name: ")? else {
        return Ok(false);
    };
    let Some(last_name) = ask(rl, "Last name: ")? else {
        return Ok(false);
    };
    let Some(password) = ask(rl, "Password: ")? else {
        return Ok(false);
    };
    let Some(confirm) = ask(rl, "Confirm password: ")? else {
        return Ok(false);
    };
    let params = RegisterParams::new(login, password, first_name, last_name);
    session.register(&params, &confirm).await?;
    println!("Account created for {}.", params.login);
    Ok(true)
}

fn credentials(
    rl: &mut DefaultEditor,
    login: Option<String>,
    allow_env: bool,
) -> Result<Option<(String, String)>, Error> {
    let login = match login {
        Some(login) => login,
        None => match ask(rl, "Login: ")? {
            Some(login) => login,
            None => return Ok(None),
        },
    };
    let from_env = allow_env
        .then(|| std::env::var("POLLCHAT_PASSWORD").ok())
        .flatten();
    let password = match from_env {
        Some(password) => password,
        None => match ask(rl, "Password: ")? {
            Some(password) => password,
            None => return Ok(None),
        },
    };
    Ok(Some((login, password)))
}

/// Read one answer.  `None` means the user pressed Ctrl+C or Ctrl+D.
fn ask(rl: &mut DefaultEditor, prompt: &str) -> Result<Option<String>, Error> {
    match read_line(rl, prompt) {
        Ok(line) => Ok(Some(line.trim().to_string())),
        Err(ReadlineError::Interrupted | ReadlineError::Eof) => Ok(None),
        Err(err) => Err(Error::unknown(format!("Input error: {}", err))),
    }
}

fn read_line(rl: &mut DefaultEditor, prompt: &str) -> Result<String, ReadlineError> {
    tokio::task::block_in_place(|| rl.readline(prompt))
}

fn read_line_with(
    rl: &mut DefaultEditor,
    prompt: &str,
    text: &str,
) -> Result<String, ReadlineError> {
    tokio::task::block_in_place(|| rl.readline_with_initial(prompt, (text, "")))
}

async fn run_command(
    command: ChatCommand,
    engine: &Arc<SyncEngine>,
    client: &ChatClient,
    sink: &SharedSink,
    config: &SyncConfig,
) {
    match command {
        ChatCommand::Help => {
            for line in help_text().lines() {
                println!("    {}", line);
            }
        }
        ChatCommand::Whoami => {
            let user = match engine.session().acquire().await {
                Ok(token) => client.current_user(&token).await,
                Err(err) => Err(err),
            };
            match user {
                Ok(user) => {
                    lock_sink(sink).print_info(&format!("{} ({})", user.display_name(), user.login))
                }
                Err(err) => lock_sink(sink).print_error(&err.to_string()),
            }
        }
        ChatCommand::Online => print_online(engine, sink),
        ChatCommand::Stats => print_stats(engine),
        ChatCommand::Refresh => {
            engine.presence().refresh().await;
            print_stats(engine);
        }
        ChatCommand::Reload => {
            if let Err(err) = engine.initial_load().await {
                lock_sink(sink).print_error(&err.to_string());
            }
        }
        ChatCommand::ShowConfig => print_config(config),
        ChatCommand::Invalid(message) => lock_sink(sink).print_error(&message),
        ChatCommand::Quit | ChatCommand::Logout | ChatCommand::Literal(_) => {}
    }
}

fn print_online(engine: &SyncEngine, sink: &SharedSink) {
    match engine.presence().snapshot() {
        Some(snapshot) => {
            let names = snapshot
                .online_users
                .iter()
                .map(|u| format!("{} ({})", u.display_name(), u.login))
                .collect::<Vec<_>>();
            println!("    Online ({}):", snapshot.total_online);
            for name in names {
                println!("      {}", name);
            }
        }
        None => lock_sink(sink).print_info("No presence data yet; try /refresh."),
    }
}

fn print_stats(engine: &SyncEngine) {
    let stats = engine.presence().stats();
    println!("    Session Statistics:");
    println!("      State: {}", engine.state());
    println!("      Last seen message: {}", engine.cursor());
    println!("      Total messages: {}", describe_count(stats.total_messages));
    println!("      Total users: {}", describe_count(stats.total_users));
}

fn print_config(config: &SyncConfig) {
    println!("    Current Configuration:");
    println!("      Base URL: {}", config.base_url);
    match &config.auth_header.scheme {
        Some(scheme) => println!(
            "      Token header: {}: {} <token>",
            config.auth_header.name, scheme
        ),
        None => println!("      Token header: {}", config.auth_header.name),
    }
    println!("      History: {} messages", config.history_limit);
    println!("      Message poll: {} ms", config.poll_interval.as_millis());
    println!("      Presence poll: {} ms", config.presence_interval.as_millis());
    println!("      Timeout: {} s", config.timeout.as_secs());
    match &config.token_file {
        Some(path) => println!("      Token file: {}", path.display()),
        None => println!("      Token file: (memory only)"),
    }
}

fn describe_count(value: Option<u64>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
