//! WebhookRelay - Local forwarding relay for the webhook inspector
//!
//! Lets a page-context front-end reach a private webhook backend without
//! exposing the backend's address:
//! - Forwards everything under a reserved prefix (`/api` by default) to the upstream origin
//! - Falls back across a configured port range when the preferred port is taken
//! - Publishes its effective endpoint on a watch channel
//! - Health check endpoint, independent of upstream reachability
//! - Probe client the UI side uses to rediscover the relay

pub mod config;
pub mod discovery;
pub mod error;
pub mod forward;
pub mod listener;
pub mod relay;
pub mod response;
pub mod state;
pub mod webhook;

pub use config::{PortRange, RelayConfig};
pub use discovery::{Discovery, RelayProbe};
pub use error::{ForwardError, RelayError};
pub use relay::RelayServer;
pub use state::{wait_for_endpoint, RelayEndpoint, RelayState};
pub use webhook::{WebhookClient, WebhookToken};
