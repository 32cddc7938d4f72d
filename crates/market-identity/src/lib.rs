//! Mapping from verified external identities to internal accounts.
//!
//! Resolution is deliberately read-only: an API request from an identity
//! without an account fails with [`ResolveError::NotFound`] and the
//! caller tells the client to complete onboarding. Account creation has
//! exactly one code path, [`IdentityResolver::register`], driven by the
//! external onboarding flow — never by API request handling. The
//! asymmetry keeps registration invariants in one place.

use std::sync::Arc;
use thiserror::Error;

use market_auth::VerifiedIdentity;
use market_storage::{MarketStore, StorageError};
use market_types::{Account, AccountId, NewAccount, Role};

/// Errors that can occur while resolving an identity.
#[derive(Debug, Error)]
pub enum ResolveError {
	/// No account exists for the external identity; the client must go
	/// through onboarding first.
	#[error("no account for external identity {0}")]
	NotFound(i64),
	#[error(transparent)]
	Storage(#[from] StorageError),
}

/// Profile fields collected by the onboarding flow.
#[derive(Debug, Clone)]
pub struct RegistrationProfile {
	pub display_name: Option<String>,
	pub role: Role,
	pub service_category: Option<String>,
}

/// Resolves verified identities to internal accounts.
pub struct IdentityResolver {
	store: Arc<dyn MarketStore>,
}

impl IdentityResolver {
	pub fn new(store: Arc<dyn MarketStore>) -> Self {
		Self { store }
	}

	/// Looks up the account for a verified identity. Read-only.
	pub async fn resolve(&self, identity: &VerifiedIdentity) -> Result<Account, ResolveError> {
		self.store
			.account_by_external_id(identity.external_id)
			.await?
			.ok_or(ResolveError::NotFound(identity.external_id))
	}

	/// Creates or updates the account for a verified identity.
	///
	/// Used by the onboarding flow only. The external id is immutable:
	/// registering an identity that already has an account updates the
	/// profile fields and leaves both ids untouched. Falls back to the
	/// identity's first name when the profile carries no display name.
	pub async fn register(
		&self,
		identity: &VerifiedIdentity,
		profile: RegistrationProfile,
	) -> Result<Account, ResolveError> {
		let display_name = profile
			.display_name
			.or_else(|| identity.first_name.clone());

		let account = self
			.store
			.upsert_account(NewAccount {
				external_id: identity.external_id,
				display_name,
				role: profile.role,
				service_category: profile.service_category,
			})
			.await?;
		Ok(account)
	}

	/// Looks up an account by internal id.
	pub async fn account(&self, id: AccountId) -> Result<Account, ResolveError> {
		Ok(self.store.account_by_id(id).await?)
	}
}
