//! Shared domain types for the marketplace system.
//!
//! This crate defines the entities every other crate operates on: accounts,
//! orders, applications and the events exchanged with external collaborators.
//! Relationships between entities are expressed as explicit foreign-key
//! fields; all traversal is query-based through the storage layer.

pub mod account;
pub mod application;
pub mod common;
pub mod events;
pub mod geo;
pub mod order;

pub use account::{Account, NewAccount, Role};
pub use application::{Application, NewApplication};
pub use common::{AccountId, ApplicationId, ExternalId, OrderId, Timestamp};
pub use events::AcceptanceNotice;
pub use geo::GeoPoint;
pub use order::{NewOrder, Order, OrderDraft, OrderStatus};
