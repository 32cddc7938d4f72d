//! Identifier and time aliases used throughout the system.

/// Internal account identifier, assigned by the store.
pub type AccountId = i64;

/// Order identifier, assigned by the store.
pub type OrderId = i64;

/// Application identifier, assigned by the store.
pub type ApplicationId = i64;

/// Stable identity id asserted by the upstream client platform.
///
/// Unique and immutable once an account has been created for it.
pub type ExternalId = i64;

/// Timestamp (Unix seconds)
pub type Timestamp = u64;
