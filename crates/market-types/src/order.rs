//! Order types and the order status machine.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::common::{AccountId, OrderId, Timestamp};
use crate::geo::GeoPoint;

/// Lifecycle status of an order.
///
/// The only legal paths are `Searching -> InProgress -> Completed` and
/// `Searching -> Canceled`. Both `Completed` and `Canceled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
	Searching,
	InProgress,
	Completed,
	Canceled,
}

impl OrderStatus {
	/// Whether no further transition out of this status is legal.
	pub fn is_terminal(&self) -> bool {
		matches!(self, OrderStatus::Completed | OrderStatus::Canceled)
	}
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			OrderStatus::Searching => "searching",
			OrderStatus::InProgress => "in_progress",
			OrderStatus::Completed => "completed",
			OrderStatus::Canceled => "canceled",
		};
		write!(f, "{}", s)
	}
}

/// A posted service request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
	pub id: OrderId,
	/// Owning customer. Holds all mutation rights except that acceptance
	/// writes the worker id.
	pub customer_id: AccountId,
	/// Assigned worker. Non-null iff status is `InProgress` or `Completed`.
	pub worker_id: Option<AccountId>,
	pub service_category: String,
	/// Agreed budget. Overwritten once, at acceptance, when the accepted
	/// application proposed a different price.
	pub price: i64,
	/// Free-form duration descriptor, e.g. "2 hours".
	pub duration: String,
	pub comment: Option<String>,
	pub address: String,
	pub location: GeoPoint,
	/// Storage keys of attached photos. Upload itself is external.
	pub photos: Vec<String>,
	pub status: OrderStatus,
	pub created_at: Timestamp,
}

/// Customer-supplied order details, before validation.
#[derive(Debug, Clone)]
pub struct OrderDraft {
	pub service_category: String,
	pub price: i64,
	pub duration: String,
	pub comment: Option<String>,
	pub address: String,
	pub location: GeoPoint,
	pub photos: Vec<String>,
}

/// Validated payload for inserting a new order row.
#[derive(Debug, Clone)]
pub struct NewOrder {
	pub customer_id: AccountId,
	pub service_category: String,
	pub price: i64,
	pub duration: String,
	pub comment: Option<String>,
	pub address: String,
	pub location: GeoPoint,
	pub photos: Vec<String>,
}
