//! Personal contacts of the signed-in user.

use crate::model::EmailAddress;
use graph_bridge::{CallDescriptor, Dispatcher, GraphError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

/// A contact. Unmodelled fields round-trip through `extra`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surname: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub email_addresses: Vec<EmailAddress>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub business_phones: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mobile_phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_title: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Contact {
    pub fn new(given_name: impl Into<String>, surname: impl Into<String>) -> Self {
        let given_name = given_name.into();
        let surname = surname.into();
        Self {
            display_name: Some(format!("{} {}", given_name, surname).trim().to_string()),
            given_name: Some(given_name),
            surname: Some(surname),
            ..Self::default()
        }
    }

    pub fn email(mut self, address: EmailAddress) -> Self {
        self.email_addresses.push(address);
        self
    }

    /// Body for create/update: everything except the server-assigned id.
    fn to_body(&self) -> Result<Value, GraphError> {
        let mut body = serde_json::to_value(self).map_err(|e| GraphError::UnexpectedResponse {
            status: 0,
            message: format!("Contact is not serializable: {}", e),
        })?;
        if let Value::Object(fields) = &mut body {
            fields.remove("id");
        }
        Ok(body)
    }
}

#[derive(Clone)]
pub struct Contacts {
    graph: Arc<Dispatcher>,
}

impl Contacts {
    pub fn new(graph: Arc<Dispatcher>) -> Self {
        Self { graph }
    }

    pub async fn contacts(&self) -> Result<Vec<Contact>, GraphError> {
        Ok(self
            .graph
            .call_as(CallDescriptor::get("/me/contacts"))
            .await?
            .into_vec())
    }

    pub async fn contact(&self, id: &str) -> Result<Contact, GraphError> {
        self.graph
            .call_as(CallDescriptor::get(format!("/me/contacts/{}", id)))
            .await?
            .into_one()
            .ok_or_else(|| not_a_contact(id))
    }

    /// Creates `contact` and returns it with its new id.
    pub async fn store_contact(&self, contact: &Contact) -> Result<Contact, GraphError> {
        let created: Contact = self
            .graph
            .call_as(CallDescriptor::post("/me/contacts", contact.to_body()?))
            .await?
            .into_one()
            .ok_or_else(|| not_a_contact("new"))?;

        debug!(session = %self.graph.session(), contact = ?created.id, "Contact created");
        Ok(created)
    }

    /// Replaces the fields of contact `id` with those of `contact`.
    pub async fn update_contact(&self, id: &str, contact: &Contact) -> Result<Contact, GraphError> {
        self.graph
            .call_as(CallDescriptor::patch(format!("/me/contacts/{}", id), contact.to_body()?))
            .await?
            .into_one()
            .ok_or_else(|| not_a_contact(id))
    }

    pub async fn delete_contact(&self, id: &str) -> Result<(), GraphError> {
        self.graph.delete(&format!("/me/contacts/{}", id)).await?;
        debug!(session = %self.graph.session(), contact = id, "Contact deleted");
        Ok(())
    }
}

fn not_a_contact(id: &str) -> GraphError {
    GraphError::UnexpectedResponse {
        status: 200,
        message: format!("Expected a single contact for '{}', got a list", id),
    }
}
