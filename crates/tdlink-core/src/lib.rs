//! tdlink Core - client core for a message-oriented remote engine.
//!
//! The engine speaks JSON messages tagged with an `@type` discriminant. This
//! crate provides the plumbing every client of such an engine needs:
//!
//! - **Correlation**: requests carry an `@extra` id and each caller is woken with
//!   exactly the response that echoes its id
//! - **Admission control**: outbound requests pass an adaptive rate limiter that
//!   winds up while the engine is happy and backs off on penalty notices
//! - **Login handshake**: a state machine driving the engine's authorization
//!   states with interactive, bot-token or QR-link handlers
//!
//! # Example
//!
//! ```rust,ignore
//! use tdlink_core::auth::{authorize_with, BotAuthorizer};
//! use tdlink_core::transport::TcpTransport;
//! use tdlink_core::Client;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let (transport, inbound, diagnostics) = TcpTransport::connect("127.0.0.1:7010".parse()?).await?;
//!     let client = Client::builder(parameters)
//!         .with_diagnostics(diagnostics)
//!         .start(Arc::new(transport), inbound)?;
//!
//!     let mut bot = BotAuthorizer::new("123456:token");
//!     authorize_with(&client, &mut bot).await?;
//!     println!("Admission rate: {:.2}/s", client.rate_limiter().current_rate());
//!
//!     client.close().await?;
//!     Ok(())
//! }
//! ```

pub mod admission;
pub mod auth;
pub mod cancel;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod transport;
pub mod types;

mod client;

// Re-export commonly used types
pub use admission::{AdmissionStrategy, LogMessage, RateLimiter, Unthrottled, WindUp, WindUpConfig};
pub use auth::{authorize, authorize_with, AuthorizationStateHandler};
pub use cancel::CancellationToken;
pub use client::{Client, ClientBuilder};
pub use dispatcher::{CallbackResultHandler, ExtraGenerator, ResultHandler};
pub use error::{Result, TdError};
pub use types::{AuthorizationState, Envelope, Function, Object, Request};
