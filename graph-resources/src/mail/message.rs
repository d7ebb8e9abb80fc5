//! Outgoing message model and its `sendMail` payload.

use crate::model::{EmailAddress, ItemBody, Recipient};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde_json::{json, Map, Value};

/// File attached to an outgoing message
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
    /// Referenced from the HTML body as `cid:<content_id>`
    pub content_id: Option<String>,
    pub is_inline: bool,
}

impl Attachment {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            bytes,
            content_id: None,
            is_inline: false,
        }
    }

    pub fn inline(mut self, content_id: impl Into<String>) -> Self {
        self.content_id = Some(content_id.into());
        self.is_inline = true;
        self
    }

    fn to_json(&self) -> Value {
        let mut attachment = json!({
            "@odata.type": "#microsoft.graph.fileAttachment",
            "name": self.name,
            "contentType": self.content_type,
            "contentBytes": BASE64.encode(&self.bytes),
            "size": self.bytes.len(),
            "isInline": self.is_inline,
        });
        if let Some(content_id) = &self.content_id {
            attachment["contentId"] = json!(content_id);
        }
        attachment
    }
}

/// A message to send as the signed-in user
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub subject: String,
    /// Used for both `sender` and `from`
    pub from: Option<EmailAddress>,
    pub reply_to: Vec<EmailAddress>,
    pub to: Vec<EmailAddress>,
    pub cc: Vec<EmailAddress>,
    pub bcc: Vec<EmailAddress>,
    pub html_body: String,
    pub attachments: Vec<Attachment>,
}

impl OutgoingMessage {
    pub fn new(subject: impl Into<String>, html_body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            html_body: html_body.into(),
            ..Self::default()
        }
    }

    pub fn from(mut self, address: EmailAddress) -> Self {
        self.from = Some(address);
        self
    }

    pub fn to(mut self, address: EmailAddress) -> Self {
        self.to.push(address);
        self
    }

    pub fn cc(mut self, address: EmailAddress) -> Self {
        self.cc.push(address);
        self
    }

    pub fn bcc(mut self, address: EmailAddress) -> Self {
        self.bcc.push(address);
        self
    }

    pub fn reply_to(mut self, address: EmailAddress) -> Self {
        self.reply_to.push(address);
        self
    }

    pub fn attach(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// `POST /me/sendMail` body. Empty recipient lists and attachments are left out.
    pub fn to_payload(&self) -> Value {
        let mut message = Map::new();
        message.insert("subject".to_string(), json!(self.subject));

        if let Some(from) = &self.from {
            let from = json!(Recipient::from(from.clone()));
            message.insert("sender".to_string(), from.clone());
            message.insert("from".to_string(), from);
        }

        let lists = [
            ("replyTo", &self.reply_to),
            ("toRecipients", &self.to),
            ("ccRecipients", &self.cc),
            ("bccRecipients", &self.bcc),
        ];
        for (field, addresses) in lists {
            if !addresses.is_empty() {
                message.insert(field.to_string(), recipients(addresses));
            }
        }

        message.insert("body".to_string(), json!(ItemBody::html(self.html_body.clone())));

        if !self.attachments.is_empty() {
            let attachments = self.attachments.iter().map(Attachment::to_json).collect();
            message.insert("attachments".to_string(), Value::Array(attachments));
        }

        json!({ "message": message })
    }
}

fn recipients(addresses: &[EmailAddress]) -> Value {
    addresses
        .iter()
        .cloned()
        .map(|address| json!(Recipient::from(address)))
        .collect()
}
