//! Storage layer for the marketplace system.
//!
//! This crate defines the persistence contract the rest of the system is
//! written against, supporting different backend implementations. Two
//! guarantees are part of the contract, not of the callers:
//!
//! * order status transitions are compare-and-set operations — the
//!   precondition check and the write happen in one atomic unit, so two
//!   concurrent conflicting transitions yield exactly one success;
//! * the (order id, worker id) pair on applications is unique — a
//!   duplicate decision reports the existing row instead of inserting a
//!   second one.

use async_trait::async_trait;
use thiserror::Error;

use market_types::{
	Account, AccountId, Application, ApplicationId, ExternalId, NewAccount, NewApplication,
	NewOrder, Order, OrderId, OrderStatus,
};

/// Re-export implementations
pub mod implementations {
	pub mod memory;
}

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// A referenced row does not exist.
	#[error("not found")]
	NotFound,
	/// Error in the storage backend.
	#[error("backend error: {0}")]
	Backend(String),
}

/// A conditional order mutation, applied only if the current status
/// matches `expected`.
#[derive(Debug, Clone)]
pub struct OrderTransition {
	/// Status the order must currently be in.
	pub expected: OrderStatus,
	/// Status to move the order to.
	pub next: OrderStatus,
	/// Worker to assign, for the acceptance transition.
	pub assign_worker: Option<AccountId>,
	/// Replacement price, when the accepted application proposed one.
	pub new_price: Option<i64>,
}

impl OrderTransition {
	/// A plain status change with no field updates.
	pub fn status_only(expected: OrderStatus, next: OrderStatus) -> Self {
		Self {
			expected,
			next,
			assign_worker: None,
			new_price: None,
		}
	}
}

/// Result of a conditional order transition.
#[derive(Debug, Clone)]
pub enum TransitionOutcome {
	/// The precondition held and the order was updated.
	Applied(Order),
	/// The order was in a different status; nothing was written.
	Conflict {
		/// Status actually found at the time of the attempt.
		actual: OrderStatus,
	},
}

/// Result of recording a worker decision.
#[derive(Debug, Clone)]
pub enum DecisionOutcome {
	/// No decision existed yet; a new application row was created.
	Created(Application),
	/// The worker had already decided on this order; the existing row is
	/// returned and nothing was written.
	Duplicate(Application),
}

/// Persistence contract for accounts, orders and applications.
///
/// Backends must provide at least read-committed isolation plus the
/// compare-and-set and uniqueness semantics documented on the individual
/// methods; multiple service instances may share one backend, so the
/// discipline lives here rather than in process-local locks.
#[async_trait]
pub trait MarketStore: Send + Sync {
	// --- accounts ---

	/// Creates the account for an external identity, or updates its
	/// profile fields if one exists. The external id and internal id are
	/// never changed by an update. Atomic per external id.
	async fn upsert_account(&self, new: NewAccount) -> Result<Account, StorageError>;

	/// Looks up an account by internal id.
	async fn account_by_id(&self, id: AccountId) -> Result<Account, StorageError>;

	/// Looks up an account by external identity id.
	async fn account_by_external_id(
		&self,
		external_id: ExternalId,
	) -> Result<Option<Account>, StorageError>;

	// --- orders ---

	/// Inserts a new order in `Searching` status with no worker assigned.
	async fn insert_order(&self, new: NewOrder) -> Result<Order, StorageError>;

	/// Looks up an order by id.
	async fn order_by_id(&self, id: OrderId) -> Result<Order, StorageError>;

	/// Atomically applies `transition` if the order's current status
	/// matches the expected one. The status read, the check and the write
	/// form one atomic unit.
	async fn transition_order(
		&self,
		id: OrderId,
		transition: OrderTransition,
	) -> Result<TransitionOutcome, StorageError>;

	// --- applications ---

	/// Looks up an application by id.
	async fn application_by_id(&self, id: ApplicationId) -> Result<Application, StorageError>;

	/// Records a worker decision, enforcing at most one row per
	/// (order id, worker id). The existence check and the insert form one
	/// atomic unit; a concurrent duplicate resolves to
	/// [`DecisionOutcome::Duplicate`] for exactly one of the callers.
	async fn record_decision(&self, new: NewApplication) -> Result<DecisionOutcome, StorageError>;

	/// All applications recorded for an order, in creation order.
	async fn applications_for_order(
		&self,
		order_id: OrderId,
	) -> Result<Vec<Application>, StorageError>;

	// --- feed ---

	/// Orders in `Searching` status within `category` that `worker` has
	/// not decided on yet, oldest first, at most `limit` rows.
	async fn unseen_searching_orders(
		&self,
		worker: AccountId,
		category: &str,
		limit: usize,
	) -> Result<Vec<Order>, StorageError>;
}
