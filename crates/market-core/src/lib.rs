//! Wiring of the marketplace core services.
//!
//! Everything is constructed once per process with its dependencies
//! passed explicitly: the payload verifier gets the shared secret, the
//! identity resolver, order lifecycle and matching feed get the store,
//! the lifecycle additionally gets the notifier. No module-level
//! globals. Pluggable backends (storage, notifier) are produced by
//! factories registered on the builder and selected by name from
//! configuration, so the binary decides what is available and the
//! config decides what runs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use market_auth::PayloadVerifier;
use market_config::MarketConfig;
use market_feed::MatchingFeed;
use market_identity::IdentityResolver;
use market_notify::{NotifierInterface, NotifierService, NotifyError};
use market_orders::OrderLifecycle;
use market_storage::MarketStore;

#[derive(Debug, Error)]
pub enum MarketError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Service error: {0}")]
	Service(String),
}

/// The assembled marketplace core.
///
/// Hands the request layer one entry point per concern; the request
/// layer itself stays thin glue.
pub struct Marketplace {
	config: MarketConfig,
	verifier: Arc<PayloadVerifier>,
	identity: Arc<IdentityResolver>,
	lifecycle: Arc<OrderLifecycle>,
	feed: Arc<MatchingFeed>,
}

impl Marketplace {
	pub fn config(&self) -> &MarketConfig {
		&self.config
	}

	pub fn verifier(&self) -> &PayloadVerifier {
		&self.verifier
	}

	pub fn identity(&self) -> &IdentityResolver {
		&self.identity
	}

	pub fn lifecycle(&self) -> &OrderLifecycle {
		&self.lifecycle
	}

	pub fn feed(&self) -> &MatchingFeed {
		&self.feed
	}
}

// Type aliases for factory functions
type StorageFactory = Box<dyn Fn(&toml::Value) -> Box<dyn MarketStore> + Send>;
type NotifierFactory =
	Box<dyn Fn(&toml::Value) -> Result<Box<dyn NotifierInterface>, NotifyError> + Send>;

/// Factory pattern for creating the marketplace from config.
pub struct MarketplaceBuilder {
	config: MarketConfig,
	storage_factories: HashMap<String, StorageFactory>,
	notifier_factories: HashMap<String, NotifierFactory>,
}

impl MarketplaceBuilder {
	pub fn new(config: MarketConfig) -> Self {
		Self {
			config,
			storage_factories: HashMap::new(),
			notifier_factories: HashMap::new(),
		}
	}

	pub fn with_storage_factory<F>(mut self, name: &str, factory: F) -> Self
	where
		F: Fn(&toml::Value) -> Box<dyn MarketStore> + Send + 'static,
	{
		self.storage_factories
			.insert(name.to_string(), Box::new(factory));
		self
	}

	pub fn with_notifier_factory<F>(mut self, name: &str, factory: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<Box<dyn NotifierInterface>, NotifyError> + Send + 'static,
	{
		self.notifier_factories
			.insert(name.to_string(), Box::new(factory));
		self
	}

	pub fn build(self) -> Result<Marketplace, MarketError> {
		// Create the storage backend
		let storage_factory = self
			.storage_factories
			.get(&self.config.storage.backend)
			.ok_or_else(|| {
				MarketError::Config(format!(
					"Unknown storage backend: {}",
					self.config.storage.backend
				))
			})?;
		let store: Arc<dyn MarketStore> =
			Arc::from(storage_factory(&self.config.storage.config));

		// Create the notifier channel
		let notifier_factory = self
			.notifier_factories
			.get(&self.config.notifier.backend)
			.ok_or_else(|| {
				MarketError::Config(format!(
					"Unknown notifier backend: {}",
					self.config.notifier.backend
				))
			})?;
		let notifier_backend = notifier_factory(&self.config.notifier.config)
			.map_err(|e| MarketError::Config(e.to_string()))?;
		let notifier = Arc::new(NotifierService::new(notifier_backend));

		// Assemble the core services
		let verifier = Arc::new(PayloadVerifier::new(
			self.config.auth.secret.clone(),
			Duration::from_secs(self.config.auth.max_age_seconds),
		));
		let identity = Arc::new(IdentityResolver::new(store.clone()));
		let lifecycle = Arc::new(OrderLifecycle::new(store.clone(), notifier));
		let feed = Arc::new(MatchingFeed::new(store));

		Ok(Marketplace {
			config: self.config,
			verifier,
			identity,
			lifecycle,
			feed,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use market_auth::VerifiedIdentity;
	use market_config::ConfigLoader;
	use market_feed::ApplyOutcome;
	use market_identity::{RegistrationProfile, ResolveError};
	use market_orders::LifecycleError;
	use market_storage::implementations::memory::create_storage;
	use market_types::{GeoPoint, OrderDraft, OrderStatus, Role};

	const CONFIG: &str = r#"
[service]
name = "market-service"

[auth]
secret = "123456:TEST-bot-token"

[storage]
backend = "memory"
"#;

	fn marketplace() -> Marketplace {
		let config = ConfigLoader::new().load_from_str(CONFIG).unwrap();
		MarketplaceBuilder::new(config)
			.with_storage_factory("memory", create_storage)
			.with_notifier_factory(
				"log",
				market_notify::implementations::log::create_log_notifier,
			)
			.build()
			.unwrap()
	}

	fn identity_for(external_id: i64, name: &str) -> VerifiedIdentity {
		VerifiedIdentity {
			external_id,
			username: None,
			first_name: Some(name.into()),
			last_name: None,
		}
	}

	fn draft(price: i64) -> OrderDraft {
		OrderDraft {
			service_category: "plumber".into(),
			price,
			duration: "2 hours".into(),
			comment: None,
			address: "Main St 1".into(),
			location: GeoPoint {
				latitude: 48.45,
				longitude: 35.05,
			},
			photos: vec![],
		}
	}

	#[test]
	fn test_unknown_backend_rejected() {
		let config = ConfigLoader::new()
			.load_from_str(&CONFIG.replace("memory", "postgres"))
			.unwrap();
		let result = MarketplaceBuilder::new(config)
			.with_storage_factory("memory", create_storage)
			.with_notifier_factory(
				"log",
				market_notify::implementations::log::create_log_notifier,
			)
			.build();
		assert!(matches!(result, Err(MarketError::Config(_))));
	}

	#[tokio::test]
	async fn test_unresolved_identity_requires_onboarding() {
		let market = marketplace();
		let result = market.identity().resolve(&identity_for(404, "Ghost")).await;
		assert!(matches!(result, Err(ResolveError::NotFound(404))));
	}

	#[tokio::test]
	async fn test_full_match_scenario() {
		let market = marketplace();

		// Onboarding happens through the single registration path.
		let customer = market
			.identity()
			.register(
				&identity_for(1, "Olena"),
				RegistrationProfile {
					display_name: None,
					role: Role::Customer,
					service_category: None,
				},
			)
			.await
			.unwrap();
		let worker = market
			.identity()
			.register(
				&identity_for(2, "Max"),
				RegistrationProfile {
					display_name: None,
					role: Role::Worker,
					service_category: Some("plumber".into()),
				},
			)
			.await
			.unwrap();

		// Customer posts an order with a 500 budget.
		let order = market
			.lifecycle()
			.create(&customer, draft(500))
			.await
			.unwrap();

		// The worker sees it in the feed and applies at 600.
		let batch = market.feed().next_batch(&worker, 10).await.unwrap();
		assert_eq!(batch.len(), 1);
		assert_eq!(batch[0].id, order.id);

		let outcome = market
			.feed()
			.apply(&worker, order.id, Some(600), Some("on my way".into()))
			.await
			.unwrap();
		let application = match outcome {
			ApplyOutcome::Recorded(app) => app,
			other => panic!("expected recorded, got {:?}", other),
		};

		// The order no longer shows up for this worker.
		assert!(market.feed().next_batch(&worker, 10).await.unwrap().is_empty());

		// Customer reviews and accepts; the proposed price wins.
		let listed = market
			.lifecycle()
			.applications(order.id, &customer)
			.await
			.unwrap();
		assert_eq!(listed.len(), 1);

		let accepted = market
			.lifecycle()
			.accept_application(order.id, application.id, &customer)
			.await
			.unwrap();
		assert_eq!(accepted.status, OrderStatus::InProgress);
		assert_eq!(accepted.worker_id, Some(worker.id));
		assert_eq!(accepted.price, 600);

		// A second acceptance attempt loses the compare-and-set.
		let again = market
			.lifecycle()
			.accept_application(order.id, application.id, &customer)
			.await;
		assert!(matches!(
			again,
			Err(LifecycleError::InvalidTransition { .. })
		));

		// Work done.
		let completed = market
			.lifecycle()
			.complete(order.id, &customer)
			.await
			.unwrap();
		assert_eq!(completed.status, OrderStatus::Completed);
	}

	#[tokio::test]
	async fn test_cancel_scenario() {
		let market = marketplace();
		let customer = market
			.identity()
			.register(
				&identity_for(1, "Olena"),
				RegistrationProfile {
					display_name: None,
					role: Role::Customer,
					service_category: None,
				},
			)
			.await
			.unwrap();

		let order = market
			.lifecycle()
			.create(&customer, draft(500))
			.await
			.unwrap();
		let canceled = market.lifecycle().cancel(order.id, &customer).await.unwrap();
		assert_eq!(canceled.status, OrderStatus::Canceled);

		// Terminal: completing a canceled order is an invalid transition.
		let result = market.lifecycle().complete(order.id, &customer).await;
		assert!(matches!(
			result,
			Err(LifecycleError::InvalidTransition { .. })
		));
	}
}
