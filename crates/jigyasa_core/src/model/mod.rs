//! Domain model for accounts, the survey catalog and the CSV analyzer.
//!
//! # Responsibility
//! - Define canonical data structures used by core business logic.
//! - Validate drafts before they reach persistence.
//!
//! # Invariants
//! - Every record is identified by a storage-assigned `i64` id; ascending id
//!   order equals creation order.
//! - Surveys are tombstoned, never hard-deleted.

pub mod account;
pub mod analysis;
pub mod survey;

use serde::{Deserialize, Deserializer};

/// Deserializes a field that distinguishes "absent" from "explicit null".
///
/// Use together with `#[serde(default)]`: absent → `None`, `null` →
/// `Some(None)`, value → `Some(Some(value))`.
pub(crate) fn explicit_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
