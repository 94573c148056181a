//! Core business logic - framework-agnostic roster, coupon and gate operations.
//!
//! Every function here takes a database connection explicitly and returns
//! [`Result`](crate::errors::Result). Workflows that need a privilege take the
//! caller's [`Session`](auth::Session) and re-validate it against the store.

pub mod auth;
pub mod coupon;
pub mod import;
pub mod issuance;
pub mod redemption;
pub mod roster;
pub mod student;

/// Generates a store id: 32 lowercase hex characters, never containing a hyphen,
/// so ids can be joined into a coupon payload unambiguously.
pub(crate) fn new_record_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
