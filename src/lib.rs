// Error taxonomy
pub mod error;

// Configuration (TOML + environment)
pub mod config;

// Token bundle model and sealing
pub mod credentials;

// Stores for sealed sessions
pub mod session;

// OAuth token lifecycle
pub mod token;

// Authenticated REST calls
pub mod dispatch;

// Session key resolution for inbound requests
pub mod auth;

// HTTP endpoints
pub mod api;

pub use config::{load_config, BridgeConfig};
pub use dispatch::{CallDescriptor, Dispatcher, GraphResponse, Shaped};
pub use error::GraphError;
pub use token::{AuthOutcome, TokenManager};
