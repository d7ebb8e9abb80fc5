//! Value types shared by several resources.

use serde::{Deserialize, Serialize};

/// `emailAddress` object
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailAddress {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub address: String,
}

impl EmailAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            name: None,
            address: address.into(),
        }
    }

    pub fn named(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            address: address.into(),
        }
    }
}

/// `recipient` object (`{"emailAddress": {...}}`)
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    pub email_address: EmailAddress,
}

impl From<EmailAddress> for Recipient {
    fn from(email_address: EmailAddress) -> Self {
        Self { email_address }
    }
}

/// `itemBody` object
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemBody {
    /// `html` or `text`
    pub content_type: String,
    #[serde(default)]
    pub content: String,
}

impl ItemBody {
    pub fn html(content: impl Into<String>) -> Self {
        Self {
            content_type: "html".to_string(),
            content: content.into(),
        }
    }
}
