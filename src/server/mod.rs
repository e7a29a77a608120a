//! The server half: connection handling, session/tree/open bookkeeping,
//! NTLM authentication, and the per-command dispatcher.

pub mod config;
pub mod connection;
pub mod dispatch;
pub mod ntlm;
pub mod open;
pub mod session;
pub mod share;
pub mod spnego;
pub mod stats;

pub use config::ServerConfig;
pub use connection::Server;
pub use stats::{ServerStats, ServerStatsSnapshot};
