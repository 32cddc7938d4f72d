//! Worker-facing matching feed.
//!
//! Produces the next batch of unseen, eligible orders for a worker and
//! records apply/skip decisions. A decision is write-once per
//! (order, worker); retries and double-taps resolve to
//! [`ApplyOutcome::AlreadyDecided`] instead of an error, so clients can
//! repeat a request safely.
//!
//! The feed is recomputed fresh from current state on every call rather
//! than kept as a cursor. Orders are returned oldest first: a request
//! that has been waiting longest surfaces before fresher ones, and an
//! order judged between two calls simply stops appearing.

use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use market_storage::{DecisionOutcome, MarketStore, StorageError};
use market_types::{Account, Application, NewApplication, Order, OrderId};

/// Errors that can occur during feed operations.
///
/// Business-level duplicates are not errors; only the store can fail
/// here.
#[derive(Debug, Error)]
pub enum MatchError {
	#[error(transparent)]
	Storage(#[from] StorageError),
}

/// Result of an apply or skip call.
#[derive(Debug, Clone)]
pub enum ApplyOutcome {
	/// The decision was recorded.
	Recorded(Application),
	/// The worker had already decided on this order; nothing was written.
	AlreadyDecided,
}

/// Service producing per-worker order feeds and recording decisions.
pub struct MatchingFeed {
	store: Arc<dyn MarketStore>,
}

impl MatchingFeed {
	pub fn new(store: Arc<dyn MarketStore>) -> Self {
		Self { store }
	}

	/// Up to `limit` orders the worker has not decided on: status
	/// `Searching`, category equal to the worker's, oldest first.
	///
	/// A worker without a service category matches nothing and gets an
	/// empty batch.
	pub async fn next_batch(
		&self,
		worker: &Account,
		limit: usize,
	) -> Result<Vec<Order>, MatchError> {
		let Some(category) = worker.service_category.as_deref() else {
			debug!(worker_id = worker.id, "feed requested without a category");
			return Ok(Vec::new());
		};

		let batch = self
			.store
			.unseen_searching_orders(worker.id, category, limit)
			.await?;
		debug!(
			worker_id = worker.id,
			category,
			batch_len = batch.len(),
			"feed batch computed"
		);
		Ok(batch)
	}

	/// Records an application on `order_id`, optionally with a price the
	/// worker wants instead of the budget. Idempotent per (order, worker).
	pub async fn apply(
		&self,
		worker: &Account,
		order_id: OrderId,
		proposed_price: Option<i64>,
		message: Option<String>,
	) -> Result<ApplyOutcome, MatchError> {
		self.decide(NewApplication {
			order_id,
			worker_id: worker.id,
			proposed_price,
			message,
			skipped: false,
		})
		.await
	}

	/// Records a pass on `order_id` so it never reappears in this
	/// worker's feed. Idempotent per (order, worker).
	pub async fn skip(
		&self,
		worker: &Account,
		order_id: OrderId,
	) -> Result<ApplyOutcome, MatchError> {
		self.decide(NewApplication {
			order_id,
			worker_id: worker.id,
			proposed_price: None,
			message: None,
			skipped: true,
		})
		.await
	}

	async fn decide(&self, decision: NewApplication) -> Result<ApplyOutcome, MatchError> {
		// The store's uniqueness constraint is authoritative; a lost race
		// against a concurrent decision surfaces as Duplicate here.
		match self.store.record_decision(decision).await? {
			DecisionOutcome::Created(application) => Ok(ApplyOutcome::Recorded(application)),
			DecisionOutcome::Duplicate(_) => Ok(ApplyOutcome::AlreadyDecided),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use market_storage::implementations::memory::MemoryStorage;
	use market_types::{GeoPoint, NewAccount, NewOrder, Role};

	struct Fixture {
		store: Arc<MemoryStorage>,
		feed: MatchingFeed,
		worker: Account,
		customer: Account,
	}

	async fn fixture() -> Fixture {
		let store = Arc::new(MemoryStorage::new());
		let feed = MatchingFeed::new(store.clone());

		let customer = store
			.upsert_account(NewAccount {
				external_id: 1,
				display_name: None,
				role: Role::Customer,
				service_category: None,
			})
			.await
			.unwrap();
		let worker = store
			.upsert_account(NewAccount {
				external_id: 2,
				display_name: None,
				role: Role::Worker,
				service_category: Some("plumber".into()),
			})
			.await
			.unwrap();

		Fixture {
			store,
			feed,
			worker,
			customer,
		}
	}

	async fn post_order(fx: &Fixture, category: &str) -> Order {
		fx.store
			.insert_order(NewOrder {
				customer_id: fx.customer.id,
				service_category: category.into(),
				price: 500,
				duration: "2 hours".into(),
				comment: None,
				address: "Main St 1".into(),
				location: GeoPoint {
					latitude: 48.45,
					longitude: 35.05,
				},
				photos: vec![],
			})
			.await
			.unwrap()
	}

	#[tokio::test]
	async fn test_apply_is_idempotent() {
		let fx = fixture().await;
		let order = post_order(&fx, "plumber").await;

		let first = fx
			.feed
			.apply(&fx.worker, order.id, Some(600), Some("hi".into()))
			.await
			.unwrap();
		assert!(matches!(first, ApplyOutcome::Recorded(_)));

		let second = fx
			.feed
			.apply(&fx.worker, order.id, Some(600), Some("hi".into()))
			.await
			.unwrap();
		assert!(matches!(second, ApplyOutcome::AlreadyDecided));

		let rows = fx.store.applications_for_order(order.id).await.unwrap();
		assert_eq!(rows.len(), 1);
	}

	#[tokio::test]
	async fn test_skip_then_apply_already_decided() {
		let fx = fixture().await;
		let order = post_order(&fx, "plumber").await;

		fx.feed.skip(&fx.worker, order.id).await.unwrap();
		let outcome = fx.feed.apply(&fx.worker, order.id, None, None).await.unwrap();
		assert!(matches!(outcome, ApplyOutcome::AlreadyDecided));

		// The skip is what stands.
		let rows = fx.store.applications_for_order(order.id).await.unwrap();
		assert_eq!(rows.len(), 1);
		assert!(rows[0].skipped);
	}

	#[tokio::test]
	async fn test_batch_excludes_judged_orders() {
		let fx = fixture().await;
		let skipped = post_order(&fx, "plumber").await;
		let applied = post_order(&fx, "plumber").await;
		let fresh = post_order(&fx, "plumber").await;

		fx.feed.skip(&fx.worker, skipped.id).await.unwrap();
		fx.feed.apply(&fx.worker, applied.id, None, None).await.unwrap();

		let batch = fx.feed.next_batch(&fx.worker, 10).await.unwrap();
		let ids: Vec<_> = batch.iter().map(|o| o.id).collect();
		assert_eq!(ids, vec![fresh.id]);
	}

	#[tokio::test]
	async fn test_batch_is_oldest_first_and_limited() {
		let fx = fixture().await;
		let oldest = post_order(&fx, "plumber").await;
		let middle = post_order(&fx, "plumber").await;
		let newest = post_order(&fx, "plumber").await;

		let batch = fx.feed.next_batch(&fx.worker, 2).await.unwrap();
		let ids: Vec<_> = batch.iter().map(|o| o.id).collect();
		assert_eq!(ids, vec![oldest.id, middle.id]);

		let rest = fx.feed.next_batch(&fx.worker, 10).await.unwrap();
		assert!(rest.iter().any(|o| o.id == newest.id));
	}

	#[tokio::test]
	async fn test_batch_respects_category() {
		let fx = fixture().await;
		post_order(&fx, "electrician").await;
		let matching = post_order(&fx, "plumber").await;

		let batch = fx.feed.next_batch(&fx.worker, 10).await.unwrap();
		let ids: Vec<_> = batch.iter().map(|o| o.id).collect();
		assert_eq!(ids, vec![matching.id]);
	}

	#[tokio::test]
	async fn test_no_category_empty_batch() {
		let fx = fixture().await;
		post_order(&fx, "plumber").await;

		let uncategorized = fx
			.store
			.upsert_account(NewAccount {
				external_id: 3,
				display_name: None,
				role: Role::Worker,
				service_category: None,
			})
			.await
			.unwrap();

		let batch = fx.feed.next_batch(&uncategorized, 10).await.unwrap();
		assert!(batch.is_empty());
	}

	#[tokio::test]
	async fn test_apply_to_missing_order_is_storage_error() {
		let fx = fixture().await;
		let result = fx.feed.apply(&fx.worker, 999, None, None).await;
		assert!(matches!(
			result,
			Err(MatchError::Storage(StorageError::NotFound))
		));
	}
}
