//! Graph Resources - typed wrappers over the Microsoft Graph resources a
//! host application uses on behalf of a signed-in user.
//!
//! Every wrapper holds one shared [`graph_bridge::Dispatcher`]; tokens are
//! resolved (and refreshed when expired) per call by the dispatcher's
//! token manager, so wrappers never see credentials.
//!
//! # Architecture
//!
//! ```text
//!   Mail   Calendars   Contacts   Teams   Workbook   OneDrive
//!     └────────┴──────────┼─────────┴────────┴──────────┘
//!                         ↓
//! ┌─────────────────────────────────────────┐
//! │     Dispatcher (graph-bridge)            │
//! │  - Valid access token per call           │
//! │  - Unwraps {"value": [...]} envelopes    │
//! └─────────────────────────────────────────┘
//!                         ↓
//!              Microsoft Graph v1.0
//! ```
//!
//! # Core Types
//!
//! - [`Mail`] / [`MailTransport`] - Sending and reading mail
//! - [`Calendars`] / [`EventBuilder`] - Calendars and events
//! - [`Contacts`] - Personal contacts
//! - [`Teams`] - Teams, channels and chats
//! - [`Workbook`] - Excel ranges inside a workbook session
//! - [`OneDrive`] - File storage adapter
//!
//! # Example
//!
//! ```no_run
//! use graph_bridge::{Dispatcher, TokenManager};
//! use graph_resources::{Contacts, OneDrive};
//! use std::sync::Arc;
//!
//! # async fn run(tokens: Arc<TokenManager>) -> Result<(), graph_bridge::GraphError> {
//! let graph = Arc::new(Dispatcher::new(tokens, "default"));
//!
//! for contact in Contacts::new(graph.clone()).contacts().await? {
//!     println!("{:?}", contact.display_name);
//! }
//!
//! let drive = OneDrive::new(graph, "root:/Apps/bridge", true);
//! drive.write("hello.txt", b"hi".to_vec(), "text/plain").await?;
//! # Ok(())
//! # }
//! ```

pub mod calendar;
pub mod contacts;
pub mod excel;
pub mod mail;
pub mod model;
pub mod onedrive;
pub mod teams;

#[cfg(test)]
mod test_support;

pub use calendar::{Calendars, Event, EventBuilder};
pub use contacts::{Contact, Contacts};
pub use excel::{ClearTarget, Workbook};
pub use mail::{GraphMailTransport, Mail, MailSummary, MailTransport, OutgoingMessage};
pub use model::{EmailAddress, ItemBody, Recipient};
pub use onedrive::{OneDrive, StorageEntry};
pub use teams::Teams;
