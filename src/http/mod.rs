//! HTTP server startup and graceful shutdown.

pub mod server;
pub mod shutdown;

pub use server::start_server;
