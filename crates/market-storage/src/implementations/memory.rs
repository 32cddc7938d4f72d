//! In-memory storage backend.
//!
//! Reference implementation of [`MarketStore`] backed by process memory.
//! A single mutex around the tables makes every method a critical
//! section, which is exactly the atomicity the trait contract asks for;
//! a database-backed implementation would use transactions and a unique
//! index instead.

use crate::{
	DecisionOutcome, MarketStore, OrderTransition, StorageError, TransitionOutcome,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

use market_types::{
	Account, AccountId, Application, ApplicationId, ExternalId, NewAccount, NewApplication,
	NewOrder, Order, OrderId, OrderStatus, Timestamp,
};

fn now_unix() -> Timestamp {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.unwrap_or_default()
		.as_secs()
}

#[derive(Default)]
struct Tables {
	accounts: HashMap<AccountId, Account>,
	account_ids_by_external: HashMap<ExternalId, AccountId>,
	// BTreeMap keyed by monotonically assigned ids keeps iteration in
	// creation order, which the feed query relies on.
	orders: BTreeMap<OrderId, Order>,
	applications: BTreeMap<ApplicationId, Application>,
	decisions: HashMap<(OrderId, AccountId), ApplicationId>,
	next_account_id: AccountId,
	next_order_id: OrderId,
	next_application_id: ApplicationId,
}

/// Memory-backed storage implementation.
pub struct MemoryStorage {
	inner: Mutex<Tables>,
}

impl MemoryStorage {
	pub fn new() -> Self {
		Self {
			inner: Mutex::new(Tables::default()),
		}
	}
}

impl Default for MemoryStorage {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl MarketStore for MemoryStorage {
	async fn upsert_account(&self, new: NewAccount) -> Result<Account, StorageError> {
		let mut tables = self.inner.lock().await;

		let existing = tables.account_ids_by_external.get(&new.external_id).copied();
		if let Some(id) = existing {
			let account = tables
				.accounts
				.get_mut(&id)
				.ok_or_else(|| StorageError::Backend("dangling external id index".into()))?;
			account.display_name = new.display_name;
			account.role = new.role;
			account.service_category = new.service_category;
			return Ok(account.clone());
		}

		tables.next_account_id += 1;
		let account = Account {
			id: tables.next_account_id,
			external_id: new.external_id,
			display_name: new.display_name,
			role: new.role,
			service_category: new.service_category,
		};
		tables.accounts.insert(account.id, account.clone());
		tables
			.account_ids_by_external
			.insert(account.external_id, account.id);
		Ok(account)
	}

	async fn account_by_id(&self, id: AccountId) -> Result<Account, StorageError> {
		let tables = self.inner.lock().await;
		tables.accounts.get(&id).cloned().ok_or(StorageError::NotFound)
	}

	async fn account_by_external_id(
		&self,
		external_id: ExternalId,
	) -> Result<Option<Account>, StorageError> {
		let tables = self.inner.lock().await;
		Ok(tables
			.account_ids_by_external
			.get(&external_id)
			.and_then(|id| tables.accounts.get(id))
			.cloned())
	}

	async fn insert_order(&self, new: NewOrder) -> Result<Order, StorageError> {
		let mut tables = self.inner.lock().await;

		if !tables.accounts.contains_key(&new.customer_id) {
			return Err(StorageError::NotFound);
		}

		tables.next_order_id += 1;
		let order = Order {
			id: tables.next_order_id,
			customer_id: new.customer_id,
			worker_id: None,
			service_category: new.service_category,
			price: new.price,
			duration: new.duration,
			comment: new.comment,
			address: new.address,
			location: new.location,
			photos: new.photos,
			status: OrderStatus::Searching,
			created_at: now_unix(),
		};
		tables.orders.insert(order.id, order.clone());
		Ok(order)
	}

	async fn order_by_id(&self, id: OrderId) -> Result<Order, StorageError> {
		let tables = self.inner.lock().await;
		tables.orders.get(&id).cloned().ok_or(StorageError::NotFound)
	}

	async fn transition_order(
		&self,
		id: OrderId,
		transition: OrderTransition,
	) -> Result<TransitionOutcome, StorageError> {
		let mut tables = self.inner.lock().await;
		let order = tables.orders.get_mut(&id).ok_or(StorageError::NotFound)?;

		if order.status != transition.expected {
			return Ok(TransitionOutcome::Conflict {
				actual: order.status,
			});
		}

		order.status = transition.next;
		if let Some(worker) = transition.assign_worker {
			order.worker_id = Some(worker);
		}
		if let Some(price) = transition.new_price {
			order.price = price;
		}

		debug_assert_eq!(
			order.worker_id.is_some(),
			matches!(
				order.status,
				OrderStatus::InProgress | OrderStatus::Completed
			),
			"worker assignment must track the status machine",
		);

		Ok(TransitionOutcome::Applied(order.clone()))
	}

	async fn application_by_id(&self, id: ApplicationId) -> Result<Application, StorageError> {
		let tables = self.inner.lock().await;
		tables
			.applications
			.get(&id)
			.cloned()
			.ok_or(StorageError::NotFound)
	}

	async fn record_decision(&self, new: NewApplication) -> Result<DecisionOutcome, StorageError> {
		let mut tables = self.inner.lock().await;

		if !tables.orders.contains_key(&new.order_id) {
			return Err(StorageError::NotFound);
		}
		if !tables.accounts.contains_key(&new.worker_id) {
			return Err(StorageError::NotFound);
		}

		let key = (new.order_id, new.worker_id);
		if let Some(existing_id) = tables.decisions.get(&key) {
			let existing = tables
				.applications
				.get(existing_id)
				.cloned()
				.ok_or_else(|| StorageError::Backend("dangling decision index".into()))?;
			return Ok(DecisionOutcome::Duplicate(existing));
		}

		tables.next_application_id += 1;
		let application = Application {
			id: tables.next_application_id,
			order_id: new.order_id,
			worker_id: new.worker_id,
			proposed_price: new.proposed_price,
			message: new.message,
			skipped: new.skipped,
			created_at: now_unix(),
		};
		tables
			.applications
			.insert(application.id, application.clone());
		tables.decisions.insert(key, application.id);
		Ok(DecisionOutcome::Created(application))
	}

	async fn applications_for_order(
		&self,
		order_id: OrderId,
	) -> Result<Vec<Application>, StorageError> {
		let tables = self.inner.lock().await;
		Ok(tables
			.applications
			.values()
			.filter(|a| a.order_id == order_id)
			.cloned()
			.collect())
	}

	async fn unseen_searching_orders(
		&self,
		worker: AccountId,
		category: &str,
		limit: usize,
	) -> Result<Vec<Order>, StorageError> {
		let tables = self.inner.lock().await;
		Ok(tables
			.orders
			.values()
			.filter(|o| {
				o.status == OrderStatus::Searching
					&& o.service_category == category
					&& !tables.decisions.contains_key(&(o.id, worker))
			})
			.take(limit)
			.cloned()
			.collect())
	}
}

/// Factory function to create a storage backend from configuration.
///
/// The memory backend takes no configuration parameters; the table is
/// accepted for parity with other backends.
pub fn create_storage(_config: &toml::Value) -> Box<dyn MarketStore> {
	Box::new(MemoryStorage::new())
}
