//! remoted: a framed TCP command server with tiered login and chunked file
//! transfer, plus a client for driving it.

pub mod client;
pub mod config;
pub mod context;
pub mod crypto;
pub mod handlers;
pub mod protocol;
pub mod router;
pub mod server;
pub mod session;
pub mod utils;

pub use client::Client;
pub use config::ServerConfig;
pub use context::ServerContext;
