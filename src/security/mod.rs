//! Security modules for the Token Metrics MCP server.
//!
//! Provides the Host/Origin policy that guards the HTTP transports against
//! DNS rebinding.

pub mod origin;

pub use origin::{OriginPolicy, is_request_allowed};
