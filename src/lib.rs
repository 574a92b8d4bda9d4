pub mod blockchain;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod programs;
pub mod state;

#[cfg(test)]
pub mod tests;

// Re-export specific items for convenience if desired
pub use db::connection;
pub use db::migration;
pub use error::IndexerError;
pub use state::AppState;
