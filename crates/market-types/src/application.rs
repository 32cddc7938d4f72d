//! Application (order response) types.

use serde::{Deserialize, Serialize};

use crate::common::{AccountId, ApplicationId, OrderId, Timestamp};

/// A worker's one-time decision on one order.
///
/// At most one application exists per (order, worker) pair; the store
/// enforces this. Rows are write-once: no edits, no deletes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
	pub id: ApplicationId,
	pub order_id: OrderId,
	pub worker_id: AccountId,
	/// Price the worker offered instead of the order's budget, if any.
	pub proposed_price: Option<i64>,
	pub message: Option<String>,
	/// True when the worker passed on the order instead of applying.
	pub skipped: bool,
	pub created_at: Timestamp,
}

/// Payload for recording a worker decision.
#[derive(Debug, Clone)]
pub struct NewApplication {
	pub order_id: OrderId,
	pub worker_id: AccountId,
	pub proposed_price: Option<i64>,
	pub message: Option<String>,
	pub skipped: bool,
}
