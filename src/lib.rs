//! Client connectivity core for the soundboard service.
//!
//! Two channels share one auth state: request/response HTTP calls against
//! `{endpoint}/api/v1`, and a long-lived push socket at `{endpoint}/ws` that
//! authenticates with the same access token and reconnects on its own.
//!
//! ```no_run
//! # async fn demo() -> Result<(), soundboard_client::ClientError> {
//! use soundboard_client::{ApiRequest, ClientConfig, SessionClient};
//!
//! let config = ClientConfig::from_env()?;
//! let client = SessionClient::new_lazy(config)?;
//! let mut events = client.push_events();
//! client.socket().connect();
//! let sounds: serde_json::Value = client.request(ApiRequest::get("sounds")).await?;
//! while let Some(event) = events.recv().await {
//!     println!("{} {sounds}", event.tag());
//! }
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod events;
pub mod executor;
pub mod models;
pub mod paths;
pub mod projection;
pub mod router;
pub mod session;
pub mod socket;
pub mod token;

#[cfg(test)]
mod test_support;

pub use auth::AuthCoordinator;
pub use config::{ClientConfig, ReconnectPolicy, Timeouts};
pub use error::ClientError;
pub use events::{EventKind, PushEvent};
pub use executor::{ApiRequest, RequestBody, RequestExecutor};
pub use models::LoginProvider;
pub use projection::{SessionProjection, SessionState};
pub use router::EventRouter;
pub use session::SessionClient;
pub use socket::{CloseReason, ConnectionState, SocketConnection, StaticToken, TokenSource};
pub use token::{AccessToken, TokenStore};
