//! Non-HTTP transports

mod stdio;

pub use self::stdio::StdioServer;
