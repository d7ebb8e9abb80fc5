//! Mailbox of the signed-in user: sending, folders, messages.

mod message;
mod transport;


pub use message::{Attachment, OutgoingMessage};
pub use transport::{GraphMailTransport, MailTransport};

use crate::model::{EmailAddress, ItemBody, Recipient};
use chrono::DateTime;
use graph_bridge::{CallDescriptor, Dispatcher, GraphError, GraphResponse};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

/// Fields requested for folder listings
const SUMMARY_FIELDS: &str =
    "Id,ReceivedDateTime,Subject,Sender,ToRecipients,From,Body,HasAttachments,InternetMessageHeaders";

/// Fields requested for a single message
const MESSAGE_FIELDS: &str =
    "Id,ReceivedDateTime,createdDateTime,Subject,Sender,ToRecipients,From,HasAttachments,InternetMessageHeaders";

/// Header naming the envelope recipient
const RCPT_TO_HEADER: &str = "X-Rcpt-To";

/// Flattened view of a received message
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MailSummary {
    pub id: String,
    /// Received time as `dd-mm-YYYY HH:MM`
    pub date: String,
    pub subject: String,
    pub from: Option<EmailAddress>,
    /// `X-Rcpt-To` header when present, else the first recipient
    pub to: Option<String>,
    pub has_attachments: bool,
    pub body: String,
}

#[derive(Deserialize)]
struct MessageHeader {
    name: String,
    value: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceivedMessage {
    id: String,
    #[serde(default)]
    received_date_time: Option<String>,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    from: Option<Recipient>,
    #[serde(default)]
    to_recipients: Vec<Recipient>,
    #[serde(default)]
    has_attachments: bool,
    #[serde(default)]
    body: Option<ItemBody>,
    #[serde(default)]
    internet_message_headers: Vec<MessageHeader>,
}

impl From<ReceivedMessage> for MailSummary {
    fn from(message: ReceivedMessage) -> Self {
        let rcpt_to = message
            .internet_message_headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(RCPT_TO_HEADER))
            .map(|h| h.value.trim().to_string())
            .filter(|v| !v.is_empty());

        let to = rcpt_to.or_else(|| {
            message
                .to_recipients
                .first()
                .map(|r| r.email_address.address.clone())
        });

        Self {
            id: message.id,
            date: message
                .received_date_time
                .as_deref()
                .map(format_received)
                .unwrap_or_default(),
            subject: message.subject.unwrap_or_default(),
            from: message.from.map(|r| r.email_address),
            to,
            has_attachments: message.has_attachments,
            body: message.body.map(|b| b.content).unwrap_or_default(),
        }
    }
}

/// `2024-03-05T14:07:00Z` → `05-03-2024 14:07`. Unparseable input is returned unchanged.
fn format_received(raw: &str) -> String {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.format("%d-%m-%Y %H:%M").to_string())
        .unwrap_or_else(|_| raw.to_string())
}

/// Mail operations for one session
#[derive(Clone)]
pub struct Mail {
    graph: Arc<Dispatcher>,
}

impl Mail {
    pub fn new(graph: Arc<Dispatcher>) -> Self {
        Self { graph }
    }

    /// `POST /me/sendMail`
    pub async fn send_mail(&self, message: &OutgoingMessage) -> Result<(), GraphError> {
        debug!(
            session = %self.graph.session(),
            recipients = message.to.len() + message.cc.len() + message.bcc.len(),
            attachments = message.attachments.len(),
            "Sending mail"
        );
        self.graph.post("/me/sendMail", message.to_payload()).await?;
        Ok(())
    }

    pub async fn mail_folders(&self) -> Result<Vec<Value>, GraphError> {
        Ok(self.graph.get("/me/mailfolders").await?.into_list())
    }

    pub async fn sub_folders(&self, folder_id: &str) -> Result<Vec<Value>, GraphError> {
        let path = format!("/me/mailfolders/{}/childFolders", folder_id);
        Ok(self.graph.get(&path).await?.into_list())
    }

    /// Messages in `folder` (e.g. `inbox`), newest page first.
    ///
    /// # Arguments
    /// * `include_read` - `false` keeps only unread messages
    /// * `skip` / `limit` - paging (`$skip` / `$top`)
    pub async fn messages_in_folder(
        &self,
        folder: &str,
        include_read: bool,
        skip: u32,
        limit: u32,
    ) -> Result<Vec<MailSummary>, GraphError> {
        let mut path = format!(
            "/me/mailfolders/{}/messages?$select={}&$skip={}&$top={}",
            folder, SUMMARY_FIELDS, skip, limit
        );
        if !include_read {
            path.push_str("&$filter=isRead ne true");
        }

        let messages = self
            .graph
            .call_as::<ReceivedMessage>(CallDescriptor::get(path))
            .await?
            .into_vec();

        Ok(messages.into_iter().map(MailSummary::from).collect())
    }

    /// `PATCH /me/messages/{id}` with the given changes (e.g. `{"isRead": true}`).
    pub async fn update_message(&self, id: &str, changes: Value) -> Result<GraphResponse, GraphError> {
        self.graph.patch(&format!("/me/messages/{}", id), changes).await
    }

    pub async fn move_message(&self, id: &str, destination_id: &str) -> Result<GraphResponse, GraphError> {
        let path = format!("/me/messages/{}/move", id);
        self.graph
            .post(&path, json!({ "destinationId": destination_id }))
            .await
    }

    pub async fn message(&self, id: &str) -> Result<Value, GraphError> {
        let path = format!("/me/messages/{}?$select={}", id, MESSAGE_FIELDS);
        Ok(self.graph.get(&path).await?.into_value())
    }

    pub async fn message_attachments(&self, id: &str) -> Result<Vec<Value>, GraphError> {
        let path = format!("/me/messages/{}/attachments", id);
        Ok(self.graph.get(&path).await?.into_list())
    }
}
