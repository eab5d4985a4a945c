//! jobmatch - command-line client for the jobmatch API.
//!
//! Signs in, registers accounts and shows who is signed in. The bearer
//! token is persisted between runs; every invocation restores the session
//! from it before running the command.

use std::io::{self, BufRead, Write};

use anyhow::{anyhow, bail, Result};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use jobmatch_core::models::ProfileUpdate;
use jobmatch_core::{Config, SessionError, SessionManager, SessionPhase};

// ============================================================================
// Constants
// ============================================================================

/// Directory for rolling log files; file logging is off when unset
const ENV_LOG_DIR: &str = "JOBMATCH_LOG_DIR";

const LOG_FILE_PREFIX: &str = "jobmatch.log";

const USAGE: &str = "\
Usage: jobmatch <command>

Commands:
  login [identifier]          Sign in (prompts for the password)
  register <username> <email> Create an account and sign in
  logout                      Sign out and forget the stored token
  whoami                      Show the signed-in user
  bio <text>                  Update your profile bio
";

/// Initialize the tracing subscriber for logging
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var(ENV_LOG_DIR) {
        Ok(dir) if !dir.trim().is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    let _log_guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match args.first().map(String::as_str) {
        None | Some("help" | "--help" | "-h") => {
            print!("{}", USAGE);
            return Ok(());
        }
        Some(command) => command,
    };

    let mut config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "Failed to load config, using defaults");
            Config::default()
        }
    };

    let session = config.open_session()?;
    let phase = session.restore().await;
    info!(?phase, api = %config.api_base_url, "Session restored");

    let result = match command {
        "login" => login(&session, &mut config, args.get(1).cloned()).await,
        "register" => match (args.get(1), args.get(2)) {
            (Some(username), Some(email)) => register(&session, &mut config, username, email).await,
            _ => Err(anyhow!("register needs a username and an email\n\n{}", USAGE)),
        },
        "logout" => {
            session.logout();
            println!("Signed out.");
            Ok(())
        }
        "whoami" => {
            whoami(&session);
            Ok(())
        }
        "bio" => update_bio(&session, &args[1..].join(" ")).await,
        other => Err(anyhow!("Unknown command: {}\n\n{}", other, USAGE)),
    };

    session.dispose();
    result
}

async fn login(session: &SessionManager, config: &mut Config, identifier: Option<String>) -> Result<()> {
    let identifier = match identifier.or_else(|| config.last_identifier.clone()) {
        Some(identifier) => identifier,
        None => prompt("Email: ")?,
    };
    let password = rpassword::prompt_password("Password: ")?;

    if identifier.is_empty() || password.is_empty() {
        bail!("Email and password required");
    }

    let user = session
        .login(&identifier, &password)
        .await
        .map_err(|e| anyhow!(describe_failure(&e)))?;
    remember_identifier(config, &identifier);

    println!("Signed in as {}", user.display_name());
    Ok(())
}

async fn register(session: &SessionManager, config: &mut Config, username: &str, email: &str) -> Result<()> {
    let password = rpassword::prompt_password("Choose a password: ")?;
    let confirm = rpassword::prompt_password("Repeat password: ")?;
    if password != confirm {
        bail!("Passwords do not match");
    }

    match session.register(username, email, &password).await {
        Ok(user) => {
            remember_identifier(config, email);
            println!("Account created. Signed in as {}", user.display_name());
            Ok(())
        }
        Err(e @ SessionError::AutoLogin(_)) => {
            remember_identifier(config, email);
            Err(anyhow!(
                "{}\nYour account was created; try `jobmatch login {}`.",
                describe_failure(&e),
                email
            ))
        }
        Err(e) => Err(anyhow!(describe_failure(&e))),
    }
}

fn whoami(session: &SessionManager) {
    let state = session.state();
    match (state.phase, state.user()) {
        (SessionPhase::Authenticated, Some(user)) => {
            println!("{}", user.display_name());
            if let Some(bio) = user.bio.as_deref().filter(|b| !b.is_empty()) {
                println!("  {}", bio);
            }
            if let Some(at) = state.authenticated_at {
                println!(
                    "  session verified {}",
                    at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M")
                );
            }
        }
        _ => println!("Not signed in."),
    }
}

async fn update_bio(session: &SessionManager, bio: &str) -> Result<()> {
    if !session.state().is_authenticated() {
        bail!("Not signed in. Run `jobmatch login` first.");
    }

    let update = ProfileUpdate {
        bio: Some(bio.trim().to_string()),
        ..ProfileUpdate::default()
    };
    session.client().update_profile(&update).await?;

    // Pick up the edited profile wholesale
    if session.restore().await != SessionPhase::Authenticated {
        bail!("Profile updated, but the session could not be refreshed. Please sign in again.");
    }
    whoami(session);
    Ok(())
}

/// User-facing message for a failed session operation
fn describe_failure(err: &SessionError) -> String {
    if err.is_unauthorized() {
        match err {
            SessionError::Registration(_) => "Registration was rejected by the server".to_string(),
            _ => "Invalid email or password".to_string(),
        }
    } else if err.is_transient() {
        "Unable to reach the jobmatch server. Check your connection and try again.".to_string()
    } else {
        err.to_string()
    }
}

fn remember_identifier(config: &mut Config, identifier: &str) {
    if let Err(e) = config.remember_identifier(identifier) {
        warn!(error = %e, "Failed to save config");
    }
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}
