use super::{Mail, OutgoingMessage};
use async_trait::async_trait;
use graph_bridge::config::MailConfig;
use graph_bridge::{Dispatcher, GraphError};
use std::sync::Arc;

/// Outbound mail transport a host can register under a name.
///
/// # Example
/// ```no_run
/// use graph_resources::mail::{MailTransport, OutgoingMessage};
/// use graph_resources::model::EmailAddress;
///
/// # async fn notify(transport: &dyn MailTransport) -> Result<(), graph_bridge::GraphError> {
/// let message = OutgoingMessage::new("Build finished", "<p>All green.</p>")
///     .to(EmailAddress::new("team@contoso.com"));
/// transport.send(&message).await?;
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Registration name (e.g. `microsoftgraph`)
    fn name(&self) -> &str;

    async fn send(&self, message: &OutgoingMessage) -> Result<(), GraphError>;
}

/// Sends through `POST /me/sendMail` as the session's user.
pub struct GraphMailTransport {
    name: String,
    mail: Mail,
}

impl GraphMailTransport {
    pub fn new(name: impl Into<String>, graph: Arc<Dispatcher>) -> Self {
        Self {
            name: name.into(),
            mail: Mail::new(graph),
        }
    }

    /// `None` when mail is disabled in configuration.
    pub fn from_config(config: &MailConfig, graph: Arc<Dispatcher>) -> Option<Self> {
        config
            .enabled
            .then(|| Self::new(config.transport.clone(), graph))
    }
}

#[async_trait]
impl MailTransport for GraphMailTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, message: &OutgoingMessage) -> Result<(), GraphError> {
        self.mail.send_mail(message).await
    }
}
