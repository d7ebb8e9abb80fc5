//! Teams, channels and chats.

use crate::model::ItemBody;
use graph_bridge::{CallDescriptor, Dispatcher, GraphError};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub membership_type: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: String,
    #[serde(default)]
    pub topic: Option<String>,
    /// `oneOnOne`, `group` or `meeting`
    #[serde(default)]
    pub chat_type: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMember {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    #[serde(default)]
    pub created_date_time: Option<String>,
    pub body: ItemBody,
}

#[derive(Clone)]
pub struct Teams {
    graph: Arc<Dispatcher>,
}

impl Teams {
    pub fn new(graph: Arc<Dispatcher>) -> Self {
        Self { graph }
    }

    pub async fn joined_teams(&self) -> Result<Vec<Team>, GraphError> {
        self.list("/me/joinedTeams".to_string()).await
    }

    pub async fn channels(&self, team_id: &str) -> Result<Vec<Channel>, GraphError> {
        self.list(format!("/teams/{}/channels", team_id)).await
    }

    pub async fn chats(&self) -> Result<Vec<Chat>, GraphError> {
        self.list("/chats".to_string()).await
    }

    pub async fn chat_members(&self, chat_id: &str) -> Result<Vec<ChatMember>, GraphError> {
        self.list(format!("/chats/{}/members", chat_id)).await
    }

    /// Posts an HTML message into a chat.
    pub async fn send(&self, chat_id: &str, html: &str) -> Result<ChatMessage, GraphError> {
        let body = json!({ "body": ItemBody::html(html) });
        self.graph
            .call_as(CallDescriptor::post(format!("/chats/{}/messages", chat_id), body))
            .await?
            .into_one()
            .ok_or_else(|| GraphError::UnexpectedResponse {
                status: 201,
                message: "Chat message creation returned a list".to_string(),
            })
    }

    async fn list<T: serde::de::DeserializeOwned>(&self, path: String) -> Result<Vec<T>, GraphError> {
        Ok(self.graph.call_as(CallDescriptor::get(path)).await?.into_vec())
    }
}
