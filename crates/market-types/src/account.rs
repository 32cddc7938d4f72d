//! Account types.

use serde::{Deserialize, Serialize};

use crate::common::{AccountId, ExternalId};

/// Role an account acts in.
///
/// Roles are mutually exclusive per account at any given time; switching
/// roles is a profile mutation, not a second account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
	Customer,
	Worker,
}

/// Internal identity record for a user of the marketplace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
	/// Internal identifier, assigned by the store.
	pub id: AccountId,
	/// Stable external identity id. Unique, immutable once created.
	pub external_id: ExternalId,
	/// Display name shown to the other side of a match.
	pub display_name: Option<String>,
	/// Current role of this account.
	pub role: Role,
	/// Service category the account works in. Meaningful only for the
	/// `Worker` role; a worker without a category matches no orders.
	pub service_category: Option<String>,
}

/// Payload for creating or updating an account record.
///
/// Only the onboarding flow produces these; API request handling never
/// creates accounts.
#[derive(Debug, Clone)]
pub struct NewAccount {
	pub external_id: ExternalId,
	pub display_name: Option<String>,
	pub role: Role,
	pub service_category: Option<String>,
}
