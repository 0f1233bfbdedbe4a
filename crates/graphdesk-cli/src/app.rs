//! Application state for the graphdesk command line client.
//!
//! `App` owns the loaded configuration and an initialized `GraphSession`,
//! and implements each command plus the interactive menu on top of them.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Duration, Local, NaiveTime};
use tracing::{info, warn};

use graphdesk_core::auth::{DeviceCodeCredential, DeviceCodeInfo, DeviceCodePrompt, TokenStore};
use graphdesk_core::models::{AttendeeType, DateTimeTimeZone, ItemBody, MessageSummary, NewEvent, UserProfile};
use graphdesk_core::{Config, GraphSession, Settings};

use crate::format::{format_optional, format_received, truncate_string};

// ============================================================================
// Constants
// ============================================================================

/// Width of the subject column in inbox listings
const SUBJECT_COLUMN_WIDTH: usize = 60;

/// Time zone used for the demo event
const DEMO_TIME_ZONE: &str = "UTC";

/// Show the identity provider's sign-in instructions
pub fn device_code_prompt() -> DeviceCodePrompt {
    Arc::new(|info: &DeviceCodeInfo| {
        println!("{}", info.message);
    })
}

pub struct App {
    config: Config,
    session: GraphSession,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        let settings = Settings::require(config.settings())
            .context("No app registration configured. Run `graphdesk config set --client-id <id>` or set GRAPHDESK_CLIENT_ID")?;

        let session = GraphSession::new();
        if config.remember_login {
            let credential =
                DeviceCodeCredential::new(&settings.client_id, &settings.tenant_id, device_code_prompt())?
                    .with_token_store(TokenStore::for_settings(&settings));
            session.initialize_with_credential(settings, Arc::new(credential))?;
        } else {
            session.initialize(settings, device_code_prompt())?;
        }

        Ok(Self { config, session })
    }

    // =========================================================================
    // Commands
    // =========================================================================

    pub async fn greet_user(&self) -> Result<UserProfile> {
        let user = self
            .session
            .get_current_user_profile()
            .await
            .context("Failed to fetch user profile")?;
        println!("Hello, {}!", format_optional(user.display_name.as_deref(), "there"));
        println!("Email: {}", format_optional(user.email(), "NONE"));
        Ok(user)
    }

    pub async fn display_access_token(&self) -> Result<()> {
        let token = self
            .session
            .get_current_user_token()
            .await
            .context("Failed to get user token")?;
        println!("User token: {}", token);
        Ok(())
    }

    /// Profile and inbox fetched side by side
    pub async fn show_me(&self) -> Result<()> {
        let (user, inbox) = futures::try_join!(
            self.session.get_current_user_profile(),
            self.session.get_inbox_messages()
        )
        .context("Failed to fetch account overview")?;

        let unread = inbox.value.iter().filter(|m| m.is_unread()).count();
        println!("Name:  {}", format_optional(user.display_name.as_deref(), "NONE"));
        println!("Email: {}", format_optional(user.email(), "NONE"));
        println!("UPN:   {}", format_optional(user.user_principal_name.as_deref(), "NONE"));
        println!(
            "Unread: {} of the {}{} most recent messages",
            unread,
            inbox.value.len(),
            if inbox.has_more() { "" } else { " (all)" }
        );
        Ok(())
    }

    pub async fn list_inbox(&self) -> Result<()> {
        let page = self
            .session
            .get_inbox_messages()
            .await
            .context("Failed to get user's inbox")?;

        if page.value.is_empty() {
            println!("Inbox is empty.");
            return Ok(());
        }

        for message in &page.value {
            print_message(message);
        }
        println!("\nMore messages available? {}", page.has_more());
        Ok(())
    }

    pub async fn send_mail(&mut self, to: Option<String>, subject: &str, body: &str) -> Result<()> {
        let recipient = match to {
            Some(to) => to,
            None => self.own_address().await?,
        };

        self.session
            .send_mail(subject, body, &recipient)
            .await
            .with_context(|| format!("Failed to send mail to {}", recipient))?;
        println!("Mail sent to {}.", recipient);

        self.config.last_recipient = Some(recipient);
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Failed to save config");
        }
        Ok(())
    }

    pub async fn create_event(&self, event: NewEvent) -> Result<()> {
        let created = self.session.create_event(&event).await?;
        println!("Event created successfully.");
        if let Some(link) = created.web_link {
            println!("Open in Outlook: {}", link);
        }
        Ok(())
    }

    /// Lunch tomorrow, inviting the signed-in user
    pub async fn create_demo_event(&self) -> Result<()> {
        let me = self.own_address().await?;
        let event = demo_event(&me);
        self.create_event(event).await
    }

    async fn own_address(&self) -> Result<String> {
        let user = self
            .session
            .get_current_user_profile()
            .await
            .context("Failed to fetch user profile")?;
        user.email()
            .map(str::to_string)
            .context("Signed-in user has no email address")
    }

    // =========================================================================
    // Interactive Menu
    // =========================================================================

    pub async fn run_menu(&mut self) -> Result<()> {
        println!("graphdesk\n");
        self.greet_user().await?;

        loop {
            println!("\nPlease choose one of the following options:");
            println!("0. Exit");
            println!("1. Display access token");
            println!("2. List my inbox");
            println!("3. Send mail");
            println!("4. Create a calendar event");

            let Some(choice) = prompt_line("Choice: ")? else {
                break;
            };

            let result = match choice.as_str() {
                "0" => break,
                "1" => self.display_access_token().await,
                "2" => self.list_inbox().await,
                "3" => self.send_mail_interactive().await,
                "4" => self.create_demo_event().await,
                other => {
                    println!("Invalid choice '{}'! Please try again.", other);
                    Ok(())
                }
            };

            // Keep the menu alive after a failed call
            if let Err(e) = result {
                eprintln!("Error: {:#}", e);
            }
        }

        info!("Menu closed");
        println!("Goodbye...");
        Ok(())
    }

    async fn send_mail_interactive(&mut self) -> Result<()> {
        let default_recipient = match self.config.last_recipient.clone() {
            Some(last) => last,
            None => self.own_address().await?,
        };

        let recipient = prompt_line(&format!("Recipient [{}]: ", default_recipient))?
            .filter(|r| !r.is_empty())
            .unwrap_or(default_recipient);
        let subject = prompt_line("Subject [Testing Microsoft Graph]: ")?
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "Testing Microsoft Graph".to_string());
        let body = prompt_line("Body [Hello world!]: ")?
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| "Hello world!".to_string());

        self.send_mail(Some(recipient), &subject, &body).await
    }
}

/// Fixed lunch invitation used by `event demo` and menu option 4
pub fn demo_event(attendee: &str) -> NewEvent {
    let day = Local::now().date_naive() + Duration::days(1);
    let start = day.and_time(NaiveTime::from_hms_opt(12, 0, 0).unwrap_or_default());
    let end = start + Duration::hours(2);

    NewEvent::new(
        "Let's go for lunch",
        DateTimeTimeZone::new(start, DEMO_TIME_ZONE),
        DateTimeTimeZone::new(end, DEMO_TIME_ZONE),
    )
    .with_body(ItemBody::html("Does noon work for you?"))
    .at("Harry's Bar")
    .with_attendee(attendee, None, AttendeeType::Required)
    .allow_new_time_proposals(true)
}

fn print_message(message: &MessageSummary) {
    println!(
        "{} {:<17} {:<30} {}",
        if message.is_unread() { "*" } else { " " },
        format_received(message.received_date_time),
        truncate_string(message.sender(), 30),
        truncate_string(
            &format_optional(message.subject.as_deref(), "(no subject)"),
            SUBJECT_COLUMN_WIDTH
        ),
    );
}

/// Read one trimmed line, `None` at end of input
fn prompt_line(prompt: &str) -> Result<Option<String>> {
    print!("{}", prompt);
    io::stdout().flush()?;

    let mut input = String::new();
    if io::stdin().read_line(&mut input)? == 0 {
        return Ok(None);
    }
    Ok(Some(input.trim().to_string()))
}
