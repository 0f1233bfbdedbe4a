use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyType {
    #[serde(rename = "text", alias = "Text", alias = "TEXT")]
    Text,
    #[serde(rename = "html", alias = "HTML", alias = "Html")]
    Html,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemBody {
    #[serde(rename = "contentType")]
    pub content_type: BodyType,
    pub content: String,
}

impl ItemBody {
    pub fn text(content: &str) -> Self {
        Self {
            content_type: BodyType::Text,
            content: content.to_string(),
        }
    }

    pub fn html(content: &str) -> Self {
        Self {
            content_type: BodyType::Html,
            content: content.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailAddress {
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    #[serde(rename = "emailAddress")]
    pub email_address: EmailAddress,
}

impl Recipient {
    pub fn new(address: &str) -> Self {
        Self {
            email_address: EmailAddress {
                address: address.to_string(),
                name: None,
            },
        }
    }

    /// Name when known, otherwise the address
    pub fn display(&self) -> &str {
        self.email_address
            .name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.email_address.address)
    }
}

/// Outbound mail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub subject: String,
    pub body: ItemBody,
    #[serde(rename = "toRecipients")]
    pub to_recipients: Vec<Recipient>,
}

impl Message {
    /// Plain-text message to a single recipient
    pub fn text(subject: &str, body: &str, recipient: &str) -> Self {
        Self {
            subject: subject.to_string(),
            body: ItemBody::text(body),
            to_recipients: vec![Recipient::new(recipient)],
        }
    }
}

/// Payload of `POST /me/sendMail`
#[derive(Debug, Clone, Serialize)]
pub struct SendMailRequest {
    pub message: Message,
    #[serde(rename = "saveToSentItems", skip_serializing_if = "Option::is_none")]
    pub save_to_sent_items: Option<bool>,
}

impl From<Message> for SendMailRequest {
    fn from(message: Message) -> Self {
        Self {
            message,
            save_to_sent_items: None,
        }
    }
}

/// Inbox listing entry, restricted to the selected fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSummary {
    #[serde(default)]
    pub from: Option<Recipient>,
    #[serde(rename = "isRead", default)]
    pub is_read: Option<bool>,
    #[serde(rename = "receivedDateTime", default)]
    pub received_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub subject: Option<String>,
}

impl MessageSummary {
    pub fn sender(&self) -> &str {
        self.from.as_ref().map(Recipient::display).unwrap_or("NONE")
    }

    pub fn is_unread(&self) -> bool {
        !self.is_read.unwrap_or(false)
    }
}
