//! guacpool common library
//!
//! Storage, IPv4 arithmetic and the bulk address allocator shared by the
//! guacpool services.

pub mod addresses;
pub mod allocator;
pub mod db;
pub mod error;
pub mod groups;
pub mod ipv4;
pub mod types;

// Re-export commonly used types
pub use allocator::{AddressStore, AllocationPlan, MAX_ALLOCATION_TOTAL};
pub use db::Database;
pub use error::{Error, Result};
pub use groups::validate_group_name;
pub use types::*;

/// guacpool version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default state directory
pub fn default_store_path() -> std::path::PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".guacpool")
}

/// Default database path
pub fn default_db_path() -> std::path::PathBuf {
    default_store_path().join("guacpool.db")
}

/// Home directory helper
mod dirs {
    pub fn home_dir() -> Option<std::path::PathBuf> {
        std::env::var_os("HOME").map(std::path::PathBuf::from)
    }
}
