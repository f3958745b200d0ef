// Risk management module
pub mod watchdog;

pub use watchdog::Watchdog;
