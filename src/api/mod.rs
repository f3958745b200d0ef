pub mod binance;
pub mod retry;
pub mod telegram;

pub use binance::BinanceClient;
pub use retry::RetryPolicy;
pub use telegram::TelegramNotifier;
