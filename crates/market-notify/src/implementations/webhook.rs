//! Webhook notifier.

use crate::{NotifierInterface, NotifyError};
use async_trait::async_trait;
use std::time::Duration;

use market_types::AcceptanceNotice;

/// Notifier that POSTs the acceptance notice as JSON to a configured
/// endpoint, typically the chat-bot bridge that messages the worker.
pub struct WebhookNotifier {
	client: reqwest::Client,
	url: String,
}

impl WebhookNotifier {
	pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, NotifyError> {
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| NotifyError::Config(e.to_string()))?;
		Ok(Self {
			client,
			url: url.into(),
		})
	}
}

#[async_trait]
impl NotifierInterface for WebhookNotifier {
	async fn worker_accepted(&self, notice: &AcceptanceNotice) -> Result<(), NotifyError> {
		let response = self
			.client
			.post(&self.url)
			.json(notice)
			.send()
			.await
			.map_err(|e| NotifyError::Delivery(e.to_string()))?;

		response
			.error_for_status()
			.map_err(|e| NotifyError::Delivery(e.to_string()))?;
		Ok(())
	}
}

/// Factory function to create a notifier backend from configuration.
///
/// Configuration parameters:
/// - `url`: endpoint to POST notices to (required)
/// - `timeout_seconds`: request timeout (default: 10)
pub fn create_webhook_notifier(
	config: &toml::Value,
) -> Result<Box<dyn NotifierInterface>, NotifyError> {
	let url = config
		.get("url")
		.and_then(|v| v.as_str())
		.ok_or_else(|| NotifyError::Config("webhook notifier requires a url".into()))?
		.to_string();
	let timeout = config
		.get("timeout_seconds")
		.and_then(|v| v.as_integer())
		.unwrap_or(10);

	Ok(Box::new(WebhookNotifier::new(
		url,
		Duration::from_secs(timeout as u64),
	)?))
}
