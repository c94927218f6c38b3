//! Caller identity as supplied by the upstream gateway.
//!
//! Authentication happens before a request reaches this service. The gateway forwards the
//! authenticated actor id and role as headers; this module only checks they are present and
//! that the role is one we know.

use ipd_core::{ActorContext, Role};

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing {0} header")]
    MissingHeader(&'static str),
    #[error("unknown role: {0}")]
    UnknownRole(String),
}

/// Build an [`ActorContext`] from raw header values.
pub fn actor_from_parts(id: Option<&str>, role: Option<&str>) -> Result<ActorContext, AuthError> {
    let id = id
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(AuthError::MissingHeader(ACTOR_ID_HEADER))?;
    let role = role
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(AuthError::MissingHeader(ACTOR_ROLE_HEADER))?;
    let role: Role = role
        .parse()
        .map_err(|_| AuthError::UnknownRole(role.to_string()))?;
    Ok(ActorContext::new(id, role))
}
