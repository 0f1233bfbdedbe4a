//! Data models for Microsoft Graph resources.
//!
//! - `UserProfile`: the signed-in user's identity fields
//! - `MessageSummary`, `Message`: inbox listings and outbound mail
//! - `NewEvent`, `CreatedEvent`: calendar event creation
//! - `Collection`: Graph's `{ "value": [...] }` envelope

pub mod event;
pub mod mail;
pub mod user;

use serde::{Deserialize, Serialize};

pub use event::{Attendee, AttendeeType, CreatedEvent, DateTimeTimeZone, Location, NewEvent};
pub use mail::{BodyType, EmailAddress, ItemBody, Message, MessageSummary, Recipient, SendMailRequest};
pub use user::UserProfile;

/// A page of results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection<T> {
    // `default` alone would demand `T: Default`
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
    /// Present when the server has more results than were returned
    #[serde(rename = "@odata.nextLink", default, skip_serializing_if = "Option::is_none")]
    pub next_link: Option<String>,
}

impl<T> Collection<T> {
    pub fn has_more(&self) -> bool {
        self.next_link.is_some()
    }
}
