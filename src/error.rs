use thiserror::Error;

/// Errors surfaced by the trading agent and its collaborators
#[derive(Error, Debug)]
pub enum BotError {
    /// Invalid or missing configuration. Fatal at startup, never raised in the loop.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Market data could not be fetched after the bounded retries
    #[error("Market data unavailable: {0}")]
    DataUnavailable(String),

    #[error("Rate limited by exchange: {0}")]
    RateLimited(String),

    /// The exchange refused an order (e.g. below minimum notional)
    #[error("Order rejected (code {code}): {msg}")]
    OrderRejected { code: i64, msg: String },

    #[error("Exchange error: {0}")]
    Exchange(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("HTTP error: {source}")]
    Http {
        #[from]
        source: reqwest::Error,
    },

    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    #[error("Decimal conversion error: {source}")]
    Decimal {
        #[from]
        source: rust_decimal::Error,
    },
}

impl BotError {
    /// Whether the bounded retry utility should try again after this error
    pub fn is_retryable(&self) -> bool {
        matches!(self, BotError::RateLimited(_))
    }
}

impl From<config::ConfigError> for BotError {
    fn from(err: config::ConfigError) -> Self {
        BotError::Config(err.to_string())
    }
}

impl From<redis::RedisError> for BotError {
    fn from(err: redis::RedisError) -> Self {
        BotError::Persistence(err.to_string())
    }
}

impl From<std::io::Error> for BotError {
    fn from(err: std::io::Error) -> Self {
        BotError::Persistence(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_rate_limit_is_retryable() {
        assert!(BotError::RateLimited("429".to_string()).is_retryable());
        assert!(!BotError::DataUnavailable("down".to_string()).is_retryable());
        assert!(!BotError::OrderRejected {
            code: -1013,
            msg: "Filter failure: NOTIONAL".to_string()
        }
        .is_retryable());
    }

    #[test]
    fn test_order_rejected_message() {
        let err = BotError::OrderRejected {
            code: -2010,
            msg: "Account has insufficient balance".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Order rejected (code -2010): Account has insufficient balance"
        );
    }
}
