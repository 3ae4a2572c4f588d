//! MCP gateway: dispatcher, sessions and the HTTP transports

pub mod dispatcher;
pub mod perimeter;
mod router;
mod server;
pub mod session;
pub mod streaming;

pub use dispatcher::Dispatcher;
pub use router::{AppState, create_router};
pub use server::{Gateway, shutdown_signal};
pub use session::{SessionGuard, SessionManager};
