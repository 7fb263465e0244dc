//! HTTP front end.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request id, tracing, body limit)
//!     → GatewayRouter::handle (match → pipeline → dispatch)
//!     → Send to client
//! ```

pub mod server;

pub use server::HttpServer;
