//! # API Shared
//!
//! Shared utilities and definitions for IPD APIs.
//!
//! Contains:
//! - Request and response types (`dto` module) with OpenAPI schemas
//! - Shared services like `HealthService`
//! - Actor extraction from gateway-supplied identity headers
//!
//! Used by `api-rest` and the `ipd` CLI.

pub mod auth;
pub mod dto;
pub mod health;

pub use auth::{actor_from_parts, AuthError, ACTOR_ID_HEADER, ACTOR_ROLE_HEADER};
pub use health::{HealthRes, HealthService};
