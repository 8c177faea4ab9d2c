//! Pure authorization predicates.
//!
//! # Responsibility
//! - Decide whether a viewer may read or answer a survey.
//! - Decide whether a viewer may manage a survey.
//!
//! # Invariants
//! - Predicates never touch storage; callers pass fully loaded records.

pub mod access;
