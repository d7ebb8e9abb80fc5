//! Calendars and events.

use crate::model::{EmailAddress, ItemBody};
use graph_bridge::config::CalendarConfig;
use graph_bridge::{CallDescriptor, Dispatcher, GraphError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

/// A calendar of the signed-in user
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Calendar {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub can_edit: bool,
    #[serde(default)]
    pub is_default_calendar: bool,
    #[serde(default)]
    pub owner: Option<EmailAddress>,
}

/// `dateTimeTimeZone` object
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateTimeTimeZone {
    /// Local time, e.g. `2024-05-02T09:30:00`
    pub date_time: String,
    /// Windows or IANA zone name
    pub time_zone: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendee {
    pub email_address: EmailAddress,
    /// `required`, `optional` or `resource`
    #[serde(rename = "type", default = "required")]
    pub kind: String,
}

fn required() -> String {
    "required".to_string()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub display_name: String,
}

/// Calendar event. Unmodelled fields are kept in `extra`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<ItemBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTimeTimeZone>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTimeTimeZone>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attendees: Vec<Attendee>,
    #[serde(default)]
    pub is_online_meeting: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Builds an [`Event`] with the configured defaults.
///
/// ```no_run
/// use graph_bridge::config::CalendarConfig;
/// use graph_resources::calendar::EventBuilder;
///
/// let event = EventBuilder::new(&CalendarConfig::default(), "Design review")
///     .between("2024-05-02T09:30:00", "2024-05-02T10:30:00", "Europe/Brussels")
///     .body("<p>Agenda in the doc</p>")
///     .attendee("adele@contoso.com")
///     .build();
/// assert!(!event.is_online_meeting);
/// ```
pub struct EventBuilder {
    event: Event,
    content_type: String,
}

impl EventBuilder {
    pub fn new(defaults: &CalendarConfig, subject: impl Into<String>) -> Self {
        Self {
            event: Event {
                subject: subject.into(),
                is_online_meeting: defaults.online_meeting,
                ..Event::default()
            },
            content_type: defaults.body_content_type.clone(),
        }
    }

    /// Start and end in the same time zone.
    pub fn between(mut self, start: &str, end: &str, time_zone: &str) -> Self {
        self.event.start = Some(DateTimeTimeZone {
            date_time: start.to_string(),
            time_zone: time_zone.to_string(),
        });
        self.event.end = Some(DateTimeTimeZone {
            date_time: end.to_string(),
            time_zone: time_zone.to_string(),
        });
        self
    }

    pub fn body(mut self, content: impl Into<String>) -> Self {
        self.event.body = Some(ItemBody {
            content_type: self.content_type.clone(),
            content: content.into(),
        });
        self
    }

    pub fn attendee(mut self, address: impl Into<String>) -> Self {
        self.event.attendees.push(Attendee {
            email_address: EmailAddress::new(address),
            kind: required(),
        });
        self
    }

    pub fn location(mut self, display_name: impl Into<String>) -> Self {
        self.event.location = Some(Location {
            display_name: display_name.into(),
        });
        self
    }

    pub fn online_meeting(mut self, online: bool) -> Self {
        self.event.is_online_meeting = online;
        self
    }

    pub fn build(self) -> Event {
        self.event
    }
}

/// Calendar operations for one session
#[derive(Clone)]
pub struct Calendars {
    graph: Arc<Dispatcher>,
    defaults: CalendarConfig,
}

impl Calendars {
    pub fn new(graph: Arc<Dispatcher>, defaults: CalendarConfig) -> Self {
        Self { graph, defaults }
    }

    /// Starts an event using this client's defaults.
    pub fn event(&self, subject: impl Into<String>) -> EventBuilder {
        EventBuilder::new(&self.defaults, subject)
    }

    pub async fn calendars(&self) -> Result<Vec<Calendar>, GraphError> {
        Ok(self
            .graph
            .call_as(CallDescriptor::get("/me/calendars"))
            .await?
            .into_vec())
    }

    pub async fn calendar_events(&self, calendar_id: &str) -> Result<Vec<Event>, GraphError> {
        let path = format!("/me/calendars/{}/events", calendar_id);
        Ok(self.graph.call_as(CallDescriptor::get(path)).await?.into_vec())
    }

    /// Creates `event` in the default calendar.
    pub async fn save_event(&self, event: &Event) -> Result<Event, GraphError> {
        self.create("/me/events".to_string(), event).await
    }

    /// Creates `event` in a specific calendar.
    pub async fn save_event_to(&self, calendar_id: &str, event: &Event) -> Result<Event, GraphError> {
        self.create(format!("/me/calendars/{}/events", calendar_id), event).await
    }

    async fn create(&self, path: String, event: &Event) -> Result<Event, GraphError> {
        let body = serde_json::to_value(event).map_err(|e| GraphError::UnexpectedResponse {
            status: 0,
            message: format!("Event is not serializable: {}", e),
        })?;

        self.graph
            .call_as(CallDescriptor::post(path, body))
            .await?
            .into_one()
            .ok_or_else(|| GraphError::UnexpectedResponse {
                status: 201,
                message: "Event creation returned an empty list".to_string(),
            })
    }
}
