//! Order lifecycle for the marketplace system.
//!
//! Owns the state machine of a single order: creation, cancellation,
//! acceptance of a worker's application, completion. Transition
//! authority is checked here; transition atomicity is delegated to the
//! store's compare-and-set so that concurrent conflicting calls resolve
//! to exactly one winner even across service instances.

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use market_notify::NotifierService;
use market_storage::{
	MarketStore, OrderTransition, StorageError, TransitionOutcome,
};
use market_types::{
	AcceptanceNotice, Account, AccountId, Application, ApplicationId, NewOrder, Order, OrderDraft,
	OrderId, OrderStatus,
};

/// Rejections of customer-supplied order details.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
	#[error("service category must not be empty")]
	EmptyServiceCategory,
	#[error("price must be positive, got {0}")]
	NonPositivePrice(i64),
	#[error("latitude out of range: {0}")]
	InvalidLatitude(f64),
	#[error("longitude out of range: {0}")]
	InvalidLongitude(f64),
}

/// Errors that can occur during lifecycle operations.
///
/// Ownership failures and status failures are distinct variants so the
/// request layer can tell the caller which precondition failed.
#[derive(Debug, Error)]
pub enum LifecycleError {
	#[error(transparent)]
	Validation(#[from] ValidationError),
	/// The requesting account does not own the order.
	#[error("account {account} does not own order {order}")]
	Forbidden {
		order: OrderId,
		account: AccountId,
	},
	/// The order is not in the status the operation requires.
	#[error("order {order} is {found}, expected {expected}")]
	InvalidTransition {
		order: OrderId,
		found: OrderStatus,
		expected: OrderStatus,
	},
	/// The application belongs to a different order.
	#[error("application {application} does not belong to order {order}")]
	ApplicationMismatch {
		order: OrderId,
		application: ApplicationId,
	},
	/// A skip records disinterest; it cannot be accepted.
	#[error("application {0} is a skip and cannot be accepted")]
	SkippedApplication(ApplicationId),
	#[error(transparent)]
	Storage(#[from] StorageError),
}

fn validate(draft: &OrderDraft) -> Result<(), ValidationError> {
	if draft.service_category.trim().is_empty() {
		return Err(ValidationError::EmptyServiceCategory);
	}
	if draft.price <= 0 {
		return Err(ValidationError::NonPositivePrice(draft.price));
	}
	let point = draft.location;
	if !point.latitude.is_finite() || !(-90.0..=90.0).contains(&point.latitude) {
		return Err(ValidationError::InvalidLatitude(point.latitude));
	}
	if !point.longitude.is_finite() || !(-180.0..=180.0).contains(&point.longitude) {
		return Err(ValidationError::InvalidLongitude(point.longitude));
	}
	Ok(())
}

/// Service owning order state transitions.
pub struct OrderLifecycle {
	store: Arc<dyn MarketStore>,
	notifier: Arc<NotifierService>,
}

impl OrderLifecycle {
	pub fn new(store: Arc<dyn MarketStore>, notifier: Arc<NotifierService>) -> Self {
		Self { store, notifier }
	}

	/// Creates a new order for `customer`. Every order starts in
	/// `Searching` with no worker assigned.
	pub async fn create(
		&self,
		customer: &Account,
		draft: OrderDraft,
	) -> Result<Order, LifecycleError> {
		validate(&draft)?;

		let order = self
			.store
			.insert_order(NewOrder {
				customer_id: customer.id,
				service_category: draft.service_category,
				price: draft.price,
				duration: draft.duration,
				comment: draft.comment,
				address: draft.address,
				location: draft.location,
				photos: draft.photos,
			})
			.await?;

		info!(
			order_id = order.id,
			customer_id = customer.id,
			category = %order.service_category,
			"order created"
		);
		Ok(order)
	}

	/// Cancels a `Searching` order. Owner only; `Canceled` is terminal.
	pub async fn cancel(
		&self,
		order_id: OrderId,
		requester: &Account,
	) -> Result<Order, LifecycleError> {
		let order = self.owned_order(order_id, requester).await?;

		let outcome = self
			.store
			.transition_order(
				order.id,
				OrderTransition::status_only(OrderStatus::Searching, OrderStatus::Canceled),
			)
			.await?;

		let order = self.require_applied(order_id, OrderStatus::Searching, outcome)?;
		info!(order_id = order.id, "order canceled");
		Ok(order)
	}

	/// Accepts a worker's application on a `Searching` order.
	///
	/// Assigns the application's worker and, when the application
	/// proposed a price, replaces the order's price with it. Only one
	/// application can ever be accepted per order: a second attempt finds
	/// the order `InProgress` and fails the compare-and-set.
	pub async fn accept_application(
		&self,
		order_id: OrderId,
		application_id: ApplicationId,
		requester: &Account,
	) -> Result<Order, LifecycleError> {
		let order = self.owned_order(order_id, requester).await?;
		let application = self.store.application_by_id(application_id).await?;

		if application.order_id != order.id {
			return Err(LifecycleError::ApplicationMismatch {
				order: order.id,
				application: application.id,
			});
		}
		if application.skipped {
			return Err(LifecycleError::SkippedApplication(application.id));
		}

		let outcome = self
			.store
			.transition_order(
				order.id,
				OrderTransition {
					expected: OrderStatus::Searching,
					next: OrderStatus::InProgress,
					assign_worker: Some(application.worker_id),
					new_price: application.proposed_price,
				},
			)
			.await?;

		let order = self.require_applied(order_id, OrderStatus::Searching, outcome)?;
		info!(
			order_id = order.id,
			worker_id = application.worker_id,
			price = order.price,
			"application accepted"
		);

		// Fire-and-forget: the acceptance is already committed, so the
		// notifier cannot fail it.
		self.notifier.dispatch(AcceptanceNotice {
			order_id: order.id,
			worker_id: application.worker_id,
			price: order.price,
			service_category: order.service_category.clone(),
		});

		Ok(order)
	}

	/// Marks an `InProgress` order as done. Owner only.
	pub async fn complete(
		&self,
		order_id: OrderId,
		requester: &Account,
	) -> Result<Order, LifecycleError> {
		let order = self.owned_order(order_id, requester).await?;

		let outcome = self
			.store
			.transition_order(
				order.id,
				OrderTransition::status_only(OrderStatus::InProgress, OrderStatus::Completed),
			)
			.await?;

		let order = self.require_applied(order_id, OrderStatus::InProgress, outcome)?;
		info!(order_id = order.id, "order completed");
		Ok(order)
	}

	/// Applications recorded on an order, skips filtered out. Owner only.
	pub async fn applications(
		&self,
		order_id: OrderId,
		requester: &Account,
	) -> Result<Vec<Application>, LifecycleError> {
		let order = self.owned_order(order_id, requester).await?;
		let mut applications = self.store.applications_for_order(order.id).await?;
		applications.retain(|a| !a.skipped);
		Ok(applications)
	}

	/// Loads the order and checks the requester owns it. Ownership never
	/// changes after creation, so checking it outside the compare-and-set
	/// is race-free; the status check is not, and stays inside the store.
	async fn owned_order(
		&self,
		order_id: OrderId,
		requester: &Account,
	) -> Result<Order, LifecycleError> {
		let order = self.store.order_by_id(order_id).await?;
		if order.customer_id != requester.id {
			debug!(
				order_id,
				account_id = requester.id,
				"rejected lifecycle call from non-owner"
			);
			return Err(LifecycleError::Forbidden {
				order: order_id,
				account: requester.id,
			});
		}
		Ok(order)
	}

	fn require_applied(
		&self,
		order_id: OrderId,
		expected: OrderStatus,
		outcome: TransitionOutcome,
	) -> Result<Order, LifecycleError> {
		match outcome {
			TransitionOutcome::Applied(order) => Ok(order),
			TransitionOutcome::Conflict { actual } => Err(LifecycleError::InvalidTransition {
				order: order_id,
				found: actual,
				expected,
			}),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use market_notify::{NotifierInterface, NotifyError};
	use market_storage::implementations::memory::MemoryStorage;
	use market_storage::DecisionOutcome;
	use market_types::{GeoPoint, NewAccount, NewApplication, Role};
	use tokio::sync::mpsc;

	struct ChannelNotifier {
		tx: mpsc::UnboundedSender<AcceptanceNotice>,
	}

	#[async_trait]
	impl NotifierInterface for ChannelNotifier {
		async fn worker_accepted(&self, notice: &AcceptanceNotice) -> Result<(), NotifyError> {
			self.tx
				.send(notice.clone())
				.map_err(|e| NotifyError::Delivery(e.to_string()))
		}
	}

	struct FailingNotifier;

	#[async_trait]
	impl NotifierInterface for FailingNotifier {
		async fn worker_accepted(&self, _notice: &AcceptanceNotice) -> Result<(), NotifyError> {
			Err(NotifyError::Delivery("consumer is down".into()))
		}
	}

	struct Fixture {
		store: Arc<MemoryStorage>,
		lifecycle: OrderLifecycle,
		notices: mpsc::UnboundedReceiver<AcceptanceNotice>,
		customer: Account,
		worker: Account,
	}

	async fn fixture() -> Fixture {
		let store = Arc::new(MemoryStorage::new());
		let (tx, notices) = mpsc::unbounded_channel();
		let notifier = Arc::new(NotifierService::new(Box::new(ChannelNotifier { tx })));
		let lifecycle = OrderLifecycle::new(store.clone(), notifier);

		let customer = store
			.upsert_account(NewAccount {
				external_id: 1,
				display_name: Some("Olena".into()),
				role: Role::Customer,
				service_category: None,
			})
			.await
			.unwrap();
		let worker = store
			.upsert_account(NewAccount {
				external_id: 2,
				display_name: Some("Max".into()),
				role: Role::Worker,
				service_category: Some("plumber".into()),
			})
			.await
			.unwrap();

		Fixture {
			store,
			lifecycle,
			notices,
			customer,
			worker,
		}
	}

	fn draft() -> OrderDraft {
		OrderDraft {
			service_category: "plumber".into(),
			price: 500,
			duration: "2 hours".into(),
			comment: Some("leaking sink".into()),
			address: "Main St 1".into(),
			location: GeoPoint {
				latitude: 48.45,
				longitude: 35.05,
			},
			photos: vec![],
		}
	}

	async fn apply(
		fx: &Fixture,
		order: OrderId,
		proposed_price: Option<i64>,
	) -> Application {
		match fx
			.store
			.record_decision(NewApplication {
				order_id: order,
				worker_id: fx.worker.id,
				proposed_price,
				message: Some("can be there in 15".into()),
				skipped: false,
			})
			.await
			.unwrap()
		{
			DecisionOutcome::Created(app) => app,
			other => panic!("expected created, got {:?}", other),
		}
	}

	#[tokio::test]
	async fn test_create_starts_searching() {
		let fx = fixture().await;
		let order = fx.lifecycle.create(&fx.customer, draft()).await.unwrap();
		assert_eq!(order.status, OrderStatus::Searching);
		assert_eq!(order.worker_id, None);
		assert_eq!(order.price, 500);
	}

	#[tokio::test]
	async fn test_create_validation() {
		let fx = fixture().await;

		let mut bad = draft();
		bad.service_category = "  ".into();
		assert!(matches!(
			fx.lifecycle.create(&fx.customer, bad).await,
			Err(LifecycleError::Validation(
				ValidationError::EmptyServiceCategory
			))
		));

		let mut bad = draft();
		bad.price = 0;
		assert!(matches!(
			fx.lifecycle.create(&fx.customer, bad).await,
			Err(LifecycleError::Validation(
				ValidationError::NonPositivePrice(0)
			))
		));

		let mut bad = draft();
		bad.location.latitude = 91.0;
		assert!(matches!(
			fx.lifecycle.create(&fx.customer, bad).await,
			Err(LifecycleError::Validation(ValidationError::InvalidLatitude(_)))
		));

		let mut bad = draft();
		bad.location.longitude = f64::INFINITY;
		assert!(matches!(
			fx.lifecycle.create(&fx.customer, bad).await,
			Err(LifecycleError::Validation(
				ValidationError::InvalidLongitude(_)
			))
		));
	}

	#[tokio::test]
	async fn test_cancel_owner_only() {
		let fx = fixture().await;
		let order = fx.lifecycle.create(&fx.customer, draft()).await.unwrap();

		let denied = fx.lifecycle.cancel(order.id, &fx.worker).await;
		assert!(matches!(denied, Err(LifecycleError::Forbidden { .. })));

		let canceled = fx.lifecycle.cancel(order.id, &fx.customer).await.unwrap();
		assert_eq!(canceled.status, OrderStatus::Canceled);
	}

	#[tokio::test]
	async fn test_accept_takes_proposed_price() {
		let mut fx = fixture().await;
		let order = fx.lifecycle.create(&fx.customer, draft()).await.unwrap();
		let application = apply(&fx, order.id, Some(600)).await;

		let accepted = fx
			.lifecycle
			.accept_application(order.id, application.id, &fx.customer)
			.await
			.unwrap();
		assert_eq!(accepted.status, OrderStatus::InProgress);
		assert_eq!(accepted.worker_id, Some(fx.worker.id));
		assert_eq!(accepted.price, 600);

		let notice = fx.notices.recv().await.unwrap();
		assert_eq!(notice.order_id, order.id);
		assert_eq!(notice.worker_id, fx.worker.id);
		assert_eq!(notice.price, 600);
	}

	#[tokio::test]
	async fn test_accept_keeps_price_without_proposal() {
		let fx = fixture().await;
		let order = fx.lifecycle.create(&fx.customer, draft()).await.unwrap();
		let application = apply(&fx, order.id, None).await;

		let accepted = fx
			.lifecycle
			.accept_application(order.id, application.id, &fx.customer)
			.await
			.unwrap();
		assert_eq!(accepted.price, 500);
	}

	#[tokio::test]
	async fn test_second_accept_is_invalid_transition() {
		let fx = fixture().await;
		let order = fx.lifecycle.create(&fx.customer, draft()).await.unwrap();
		let application = apply(&fx, order.id, Some(600)).await;

		fx.lifecycle
			.accept_application(order.id, application.id, &fx.customer)
			.await
			.unwrap();

		let again = fx
			.lifecycle
			.accept_application(order.id, application.id, &fx.customer)
			.await;
		match again {
			Err(LifecycleError::InvalidTransition { found, expected, .. }) => {
				assert_eq!(found, OrderStatus::InProgress);
				assert_eq!(expected, OrderStatus::Searching);
			}
			other => panic!("expected invalid transition, got {:?}", other),
		}
	}

	#[tokio::test]
	async fn test_accept_rejects_foreign_application() {
		let fx = fixture().await;
		let first = fx.lifecycle.create(&fx.customer, draft()).await.unwrap();
		let second = fx.lifecycle.create(&fx.customer, draft()).await.unwrap();
		let application = apply(&fx, first.id, None).await;

		let result = fx
			.lifecycle
			.accept_application(second.id, application.id, &fx.customer)
			.await;
		assert!(matches!(
			result,
			Err(LifecycleError::ApplicationMismatch { .. })
		));
	}

	#[tokio::test]
	async fn test_accept_rejects_skip() {
		let fx = fixture().await;
		let order = fx.lifecycle.create(&fx.customer, draft()).await.unwrap();
		let skip = match fx
			.store
			.record_decision(NewApplication {
				order_id: order.id,
				worker_id: fx.worker.id,
				proposed_price: None,
				message: None,
				skipped: true,
			})
			.await
			.unwrap()
		{
			DecisionOutcome::Created(app) => app,
			other => panic!("expected created, got {:?}", other),
		};

		let result = fx
			.lifecycle
			.accept_application(order.id, skip.id, &fx.customer)
			.await;
		assert!(matches!(
			result,
			Err(LifecycleError::SkippedApplication(_))
		));
	}

	#[tokio::test]
	async fn test_complete_requires_in_progress() {
		let fx = fixture().await;
		let order = fx.lifecycle.create(&fx.customer, draft()).await.unwrap();

		let early = fx.lifecycle.complete(order.id, &fx.customer).await;
		assert!(matches!(
			early,
			Err(LifecycleError::InvalidTransition { .. })
		));

		let application = apply(&fx, order.id, None).await;
		fx.lifecycle
			.accept_application(order.id, application.id, &fx.customer)
			.await
			.unwrap();

		let completed = fx.lifecycle.complete(order.id, &fx.customer).await.unwrap();
		assert_eq!(completed.status, OrderStatus::Completed);
	}

	#[tokio::test]
	async fn test_complete_after_cancel_is_invalid() {
		let fx = fixture().await;
		let order = fx.lifecycle.create(&fx.customer, draft()).await.unwrap();
		fx.lifecycle.cancel(order.id, &fx.customer).await.unwrap();

		let result = fx.lifecycle.complete(order.id, &fx.customer).await;
		match result {
			Err(LifecycleError::InvalidTransition { found, .. }) => {
				assert_eq!(found, OrderStatus::Canceled);
			}
			other => panic!("expected invalid transition, got {:?}", other),
		}
	}

	#[tokio::test]
	async fn test_notifier_failure_does_not_fail_acceptance() {
		let store = Arc::new(MemoryStorage::new());
		let notifier = Arc::new(NotifierService::new(Box::new(FailingNotifier)));
		let lifecycle = OrderLifecycle::new(store.clone(), notifier);

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

		let order = lifecycle.create(&customer, draft()).await.unwrap();
		let application = match store
			.record_decision(NewApplication {
				order_id: order.id,
				worker_id: worker.id,
				proposed_price: None,
				message: None,
				skipped: false,
			})
			.await
			.unwrap()
		{
			DecisionOutcome::Created(app) => app,
			other => panic!("expected created, got {:?}", other),
		};

		let accepted = lifecycle
			.accept_application(order.id, application.id, &customer)
			.await
			.unwrap();
		assert_eq!(accepted.status, OrderStatus::InProgress);
	}

	#[tokio::test]
	async fn test_applications_listing_owner_only() {
		let fx = fixture().await;
		let order = fx.lifecycle.create(&fx.customer, draft()).await.unwrap();
		apply(&fx, order.id, Some(600)).await;

		let listed = fx
			.lifecycle
			.applications(order.id, &fx.customer)
			.await
			.unwrap();
		assert_eq!(listed.len(), 1);

		let denied = fx.lifecycle.applications(order.id, &fx.worker).await;
		assert!(matches!(denied, Err(LifecycleError::Forbidden { .. })));
	}
}
