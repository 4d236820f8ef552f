// High-concurrency TCP server engine
//
// `server` owns the listener lifecycle, admission and the per-connection
// drivers; `observer` is how callers hear about what happens there.

pub mod api;
pub mod config;
pub mod error;
pub mod logger;
pub mod observer;
pub mod server;

pub use error::{ErrorContext, ServerError};
pub use observer::{Observer, ServerEvent};
pub use server::{ConnectionId, Server, ServerOptions, ServerState};
