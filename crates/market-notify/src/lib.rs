//! Acceptance notifications to external consumers.
//!
//! After a customer accepts an application, the accepted worker is told
//! through whatever channel is configured (the chat bot, a webhook, or
//! just the log). Delivery is strictly fire-and-forget: a notifier
//! failure is logged and never rolls back or delays the acceptance.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

use market_types::AcceptanceNotice;

/// Re-export implementations
pub mod implementations {
	pub mod log;
	pub mod webhook;
}

/// Errors that can occur while delivering a notification.
#[derive(Debug, Error)]
pub enum NotifyError {
	#[error("delivery failed: {0}")]
	Delivery(String),
	#[error("invalid notifier config: {0}")]
	Config(String),
}

/// Trait implemented by notification channels.
#[async_trait]
pub trait NotifierInterface: Send + Sync {
	/// Informs the accepted worker about the match.
	async fn worker_accepted(&self, notice: &AcceptanceNotice) -> Result<(), NotifyError>;
}

/// Dispatches notices to the configured channel without blocking the
/// caller.
pub struct NotifierService {
	backend: Arc<dyn NotifierInterface>,
}

impl NotifierService {
	pub fn new(backend: Box<dyn NotifierInterface>) -> Self {
		Self {
			backend: Arc::from(backend),
		}
	}

	/// Sends the notice on a detached task. Failures are logged at warn
	/// level and otherwise dropped.
	pub fn dispatch(&self, notice: AcceptanceNotice) {
		let backend = self.backend.clone();
		tokio::spawn(async move {
			if let Err(e) = backend.worker_accepted(&notice).await {
				warn!(
					order_id = notice.order_id,
					worker_id = notice.worker_id,
					"failed to notify accepted worker: {}",
					e
				);
			}
		});
	}

	/// Sends the notice and waits for the outcome. Used by channels that
	/// want to surface delivery errors, and by tests.
	pub async fn send(&self, notice: &AcceptanceNotice) -> Result<(), NotifyError> {
		self.backend.worker_accepted(notice).await
	}
}
