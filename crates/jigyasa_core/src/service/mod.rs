//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls, access policy and validation into
//!   use-case level APIs.
//! - Keep the HTTP layer decoupled from storage details.
//!
//! # Invariants
//! - Every service method takes the resolved `Viewer` explicitly; no ambient
//!   request state.
//! - Failures leave this layer as `ServiceError` only.

pub mod analyzer_service;
pub mod auth_service;
pub mod error;
pub mod organization_service;
pub mod response_service;
pub mod response_validator;
pub mod survey_service;
