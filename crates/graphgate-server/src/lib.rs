//! GraphGate Server library.
//!
//! Command-line configuration, caller authentication, the request handler
//! and the stdio transport around a [`graphgate_core::Engine`].

pub mod auth;
pub mod config;
pub mod error;
pub mod handler;
pub mod statements;
pub mod transport;

pub use auth::{AnonymousAuthenticator, Authenticator, Identity, JwtAuthenticator};
pub use config::{Args, Command, ServerConfig};
pub use error::Error;
pub use handler::RequestHandler;
pub use transport::{StdioTransport, TransportMetrics};
