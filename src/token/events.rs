//! Authentication outcomes published to external listeners.

use crate::credentials::SealedPayload;
use tokio::sync::broadcast;

/// Capacity of the outcome channel. Slow listeners see `Lagged` beyond this.
const CHANNEL_CAPACITY: usize = 64;

/// Result of an authorization or refresh, as seen by listeners.
///
/// Payloads are sealed: listeners that need the contents open them with the
/// same [`crate::credentials::Sealer`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthOutcome {
    /// A token bundle was issued or refreshed for `session`.
    Succeeded {
        session: String,
        bundle: SealedPayload,
    },
    /// Sealed [`crate::credentials::ErrorPayload`]. `session` is unknown when
    /// the provider reported the error without a recognisable `state`.
    Failed {
        session: Option<String>,
        error: SealedPayload,
    },
}

impl AuthOutcome {
    pub fn session(&self) -> Option<&str> {
        match self {
            AuthOutcome::Succeeded { session, .. } => Some(session),
            AuthOutcome::Failed { session, .. } => session.as_deref(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AuthOutcome::Succeeded { .. })
    }
}

/// Fan-out of [`AuthOutcome`]s to any number of subscribers.
#[derive(Clone)]
pub(crate) struct OutcomeBus {
    tx: broadcast::Sender<AuthOutcome>,
}

impl OutcomeBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthOutcome> {
        self.tx.subscribe()
    }

    /// Publishing with no subscriber is fine.
    pub fn publish(&self, outcome: AuthOutcome) {
        let delivered = self.tx.send(outcome).unwrap_or(0);
        tracing::debug!(listeners = delivered, "Published authentication outcome");
    }
}
