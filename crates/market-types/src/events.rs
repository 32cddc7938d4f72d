//! Events exchanged with external collaborators.

use serde::{Deserialize, Serialize};

use crate::common::{AccountId, OrderId};

/// Side-channel event emitted after an application is accepted.
///
/// Consumed by an external notifier to inform the accepted worker.
/// Delivery failures must not roll back or block the acceptance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptanceNotice {
	pub order_id: OrderId,
	pub worker_id: AccountId,
	/// Final agreed price after acceptance.
	pub price: i64,
	pub service_category: String,
}
