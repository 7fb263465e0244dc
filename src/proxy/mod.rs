//! Request forwarding.
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → context.rs (RequestContext: id, headers, body, attributes)
//!     → dispatcher.rs (request phase → target selection → forward)
//!     → headers.rs (hop-by-hop stripping, X-Forwarded-*)
//!     → upstream response streamed back through the response phase
//! ```

pub mod context;
pub mod dispatcher;
pub mod headers;

pub use context::{RequestContext, X_REQUEST_ID};
pub use dispatcher::ProxyDispatcher;
