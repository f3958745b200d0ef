// Operator notifications
pub mod messages;

/// Fire-and-forget operator channel
///
/// Delivery failures are logged by the implementation and reported as
/// `false`; they never reach the trading loop as errors.
#[allow(async_fn_in_trait)]
pub trait Notifier {
    async fn notify(&self, text: &str) -> bool;
}
