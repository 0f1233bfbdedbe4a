use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{EmailAddress, ItemBody};

/// Graph's wall-clock format for `dateTimeTimeZone` values
const GRAPH_DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateTimeTimeZone {
    #[serde(rename = "dateTime")]
    pub date_time: String,
    #[serde(rename = "timeZone")]
    pub time_zone: String,
}

impl DateTimeTimeZone {
    pub fn new(date_time: NaiveDateTime, time_zone: &str) -> Self {
        Self {
            date_time: date_time.format(GRAPH_DATE_TIME_FORMAT).to_string(),
            time_zone: time_zone.to_string(),
        }
    }

    pub fn naive(&self) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(&self.date_time, GRAPH_DATE_TIME_FORMAT).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    #[serde(rename = "displayName")]
    pub display_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendeeType {
    Required,
    Optional,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendee {
    #[serde(rename = "emailAddress")]
    pub email_address: EmailAddress,
    #[serde(rename = "type")]
    pub attendee_type: AttendeeType,
}

/// Payload of `POST /me/events`.
///
/// `transaction_id` lets Graph drop duplicate submissions of the same event;
/// [`NewEvent::new`] generates a fresh one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEvent {
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<ItemBody>,
    pub start: DateTimeTimeZone,
    pub end: DateTimeTimeZone,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default)]
    pub attendees: Vec<Attendee>,
    #[serde(rename = "allowNewTimeProposals", default)]
    pub allow_new_time_proposals: bool,
    #[serde(rename = "transactionId")]
    pub transaction_id: String,
}

impl NewEvent {
    pub fn new(subject: &str, start: DateTimeTimeZone, end: DateTimeTimeZone) -> Self {
        Self {
            subject: subject.to_string(),
            body: None,
            start,
            end,
            location: None,
            attendees: Vec::new(),
            allow_new_time_proposals: true,
            transaction_id: Uuid::new_v4().to_string().to_uppercase(),
        }
    }

    pub fn with_body(mut self, body: ItemBody) -> Self {
        self.body = Some(body);
        self
    }

    pub fn at(mut self, location: &str) -> Self {
        self.location = Some(Location {
            display_name: location.to_string(),
        });
        self
    }

    pub fn with_attendee(mut self, address: &str, name: Option<&str>, attendee_type: AttendeeType) -> Self {
        self.attendees.push(Attendee {
            email_address: EmailAddress {
                address: address.to_string(),
                name: name.map(str::to_string),
            },
            attendee_type,
        });
        self
    }

    pub fn allow_new_time_proposals(mut self, allow: bool) -> Self {
        self.allow_new_time_proposals = allow;
        self
    }

    pub fn with_transaction_id(mut self, transaction_id: &str) -> Self {
        self.transaction_id = transaction_id.to_string();
        self
    }

    /// Reject events Graph would refuse or misplace
    pub fn validate(&self) -> Result<(), String> {
        if self.subject.trim().is_empty() {
            return Err("Event subject cannot be empty".to_string());
        }
        if self.transaction_id.trim().is_empty() {
            return Err("Event transaction id cannot be empty".to_string());
        }
        if self.start.time_zone == self.end.time_zone {
            if let (Some(start), Some(end)) = (self.start.naive(), self.end.naive()) {
                if end <= start {
                    return Err("Event must end after it starts".to_string());
                }
            }
        }
        Ok(())
    }
}

/// The parts of the created event Graph echoes back that callers care about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedEvent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "webLink", default)]
    pub web_link: Option<String>,
}
