//! Log-only notifier.

use crate::{NotifierInterface, NotifyError};
use async_trait::async_trait;
use tracing::info;

use market_types::AcceptanceNotice;

/// Notifier that records acceptances in the service log.
///
/// Default channel when no external consumer is configured; useful in
/// development and as a last-resort sink.
pub struct LogNotifier;

#[async_trait]
impl NotifierInterface for LogNotifier {
	async fn worker_accepted(&self, notice: &AcceptanceNotice) -> Result<(), NotifyError> {
		info!(
			order_id = notice.order_id,
			worker_id = notice.worker_id,
			price = notice.price,
			category = %notice.service_category,
			"worker accepted for order"
		);
		Ok(())
	}
}

/// Factory function to create a log notifier from configuration.
///
/// The log backend takes no configuration parameters.
pub fn create_log_notifier(
	_config: &toml::Value,
) -> Result<Box<dyn NotifierInterface>, NotifyError> {
	Ok(Box::new(LogNotifier))
}
