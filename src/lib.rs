// Core modules
pub mod api;
pub mod config;
pub mod error;
pub mod execution;
pub mod logging;
pub mod models;
pub mod notifications;
pub mod persistence;
pub mod risk;
pub mod strategy;
pub mod trader;

// Re-export commonly used types
pub use config::BotConfig;
pub use error::BotError;
pub use models::*;
pub use strategy::Strategy;
pub use trader::{StartupOutcome, TickOutcome, Trader};

// Error handling
pub type Result<T> = std::result::Result<T, BotError>;
