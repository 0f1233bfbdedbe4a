//! graphdesk - read mail, send mail and create calendar events through
//! Microsoft Graph from the terminal, signing in with a device code.

mod app;
mod format;

use std::io;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use graphdesk_core::auth::TokenStore;
use graphdesk_core::config::parse_scopes;
use graphdesk_core::models::{AttendeeType, DateTimeTimeZone, ItemBody, NewEvent};
use graphdesk_core::Config;

use app::App;
use format::{parse_attendee, parse_date_time};

#[derive(Parser)]
#[command(name = "graphdesk", version, about = "Microsoft Graph mail and calendar from the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive menu (default)
    Menu,
    /// Print an access token for the configured scopes
    Token,
    /// Show the signed-in user and unread mail count
    Me,
    /// List the 25 most recent inbox messages
    Inbox,
    /// Send a plain-text message
    Send {
        /// Recipient address; defaults to the signed-in user
        #[arg(long)]
        to: Option<String>,
        #[arg(long)]
        subject: String,
        #[arg(long, default_value = "")]
        body: String,
    },
    /// Calendar events
    Event {
        #[command(subcommand)]
        action: EventCommand,
    },
    /// Show or change the saved configuration
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
    /// Forget the refresh token kept in the OS keychain
    Logout,
}

#[derive(Subcommand)]
enum EventCommand {
    /// Create an event in the default calendar
    Create {
        #[arg(long)]
        subject: String,
        /// Start time, e.g. 2024-05-02T12:00
        #[arg(long, value_parser = parse_date_time)]
        start: NaiveDateTime,
        /// End time, e.g. 2024-05-02T14:00
        #[arg(long, value_parser = parse_date_time)]
        end: NaiveDateTime,
        /// Windows or IANA time zone name
        #[arg(long, default_value = "UTC")]
        time_zone: String,
        #[arg(long)]
        location: Option<String>,
        /// Required attendee as address[:Display Name]; repeatable
        #[arg(long = "attendee")]
        attendees: Vec<String>,
        /// Optional attendee as address[:Display Name]; repeatable
        #[arg(long = "optional")]
        optional: Vec<String>,
        #[arg(long)]
        body: Option<String>,
        /// Treat the body as HTML
        #[arg(long)]
        html: bool,
        /// Do not let attendees propose a new time
        #[arg(long)]
        no_proposals: bool,
        /// Idempotency token; generated when omitted
        #[arg(long)]
        transaction_id: Option<String>,
    },
    /// Create a lunch invitation for tomorrow
    Demo,
}

#[derive(Subcommand)]
enum ConfigCommand {
    Show,
    Set {
        #[arg(long)]
        client_id: Option<String>,
        #[arg(long)]
        tenant_id: Option<String>,
        /// Comma or space separated scopes
        #[arg(long)]
        scopes: Option<String>,
        #[arg(long)]
        remember_login: Option<bool>,
    },
}

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr and to a daily file under the cache directory. The
/// returned guard must live until exit so buffered file output is flushed.
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let file = Config::cache_dir().ok().and_then(|dir| {
        RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix("graphdesk")
            .filename_suffix("log")
            .build(dir.join("logs"))
            .ok()
    });
    let (file_layer, guard) = match file {
        Some(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .init();

    guard
}

#[allow(clippy::too_many_arguments)]
fn build_event(
    subject: String,
    start: NaiveDateTime,
    end: NaiveDateTime,
    time_zone: &str,
    location: Option<String>,
    attendees: &[String],
    optional: &[String],
    body: Option<String>,
    html: bool,
    allow_new_time_proposals: bool,
    transaction_id: Option<String>,
) -> NewEvent {
    let mut event = NewEvent::new(
        &subject,
        DateTimeTimeZone::new(start, time_zone),
        DateTimeTimeZone::new(end, time_zone),
    )
    .allow_new_time_proposals(allow_new_time_proposals);

    if let Some(body) = body {
        event = event.with_body(if html { ItemBody::html(&body) } else { ItemBody::text(&body) });
    }
    if let Some(location) = location {
        event = event.at(&location);
    }
    for (list, attendee_type) in [(attendees, AttendeeType::Required), (optional, AttendeeType::Optional)] {
        for raw in list {
            let (address, name) = parse_attendee(raw);
            event = event.with_attendee(&address, name.as_deref(), attendee_type);
        }
    }
    if let Some(id) = transaction_id {
        event = event.with_transaction_id(&id);
    }
    event
}

fn run_config(mut config: Config, action: ConfigCommand) -> Result<()> {
    match action {
        ConfigCommand::Show => {
            println!("Config file: {}", Config::config_path()?.display());
            println!("{}", serde_json::to_string_pretty(&config)?);
            match config.settings() {
                Some(settings) => println!("Effective settings: {}", serde_json::to_string(&settings)?),
                None => println!("Effective settings: none (client id missing)"),
            }
        }
        ConfigCommand::Set {
            client_id,
            tenant_id,
            scopes,
            remember_login,
        } => {
            if let Some(client_id) = client_id {
                config.client_id = Some(client_id);
            }
            if let Some(tenant_id) = tenant_id {
                config.tenant_id = Some(tenant_id);
            }
            if let Some(scopes) = scopes {
                config.graph_user_scopes = Some(parse_scopes(&scopes));
            }
            if let Some(remember_login) = remember_login {
                config.remember_login = remember_login;
            }
            config.save().context("Failed to save config")?;
            println!("Saved {}", Config::config_path()?.display());
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _guard = init_tracing();
    info!("graphdesk starting");

    let file_config = Config::load().context("Failed to load config")?;

    // Config edits apply to the file only, without environment overrides
    if let Some(Command::Config { action }) = cli.command {
        return run_config(file_config, action);
    }

    let mut config = file_config;
    config.apply_env();

    if let Some(Command::Logout) = cli.command {
        let settings = config.settings().context("No app registration configured")?;
        TokenStore::for_settings(&settings).clear()?;
        println!("Signed out.");
        return Ok(());
    }

    let mut app = App::new(config)?;

    match cli.command.unwrap_or(Command::Menu) {
        Command::Menu => app.run_menu().await?,
        Command::Token => app.display_access_token().await?,
        Command::Me => app.show_me().await?,
        Command::Inbox => app.list_inbox().await?,
        Command::Send { to, subject, body } => app.send_mail(to, &subject, &body).await?,
        Command::Event { action } => match action {
            EventCommand::Create {
                subject,
                start,
                end,
                time_zone,
                location,
                attendees,
                optional,
                body,
                html,
                no_proposals,
                transaction_id,
            } => {
                let event = build_event(
                    subject,
                    start,
                    end,
                    &time_zone,
                    location,
                    &attendees,
                    &optional,
                    body,
                    html,
                    !no_proposals,
                    transaction_id,
                );
                app.create_event(event).await?
            }
            EventCommand::Demo => app.create_demo_event().await?,
        },
        Command::Config { .. } | Command::Logout => {}
    }

    info!("graphdesk shutting down");
    Ok(())
}
