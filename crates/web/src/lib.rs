//! guacpool web API
//!
//! HTTP surface for administering the address pool and its groups.

pub mod config;
pub mod error;
pub mod routes;
pub mod server;

pub use config::ServerConfig;
pub use error::{ApiError, ApiResult};
pub use routes::AppState;
pub use server::{router, serve};
