//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod access;
mod credential;
mod grant;
mod target;
mod variables;

pub use access::{AccessRequest, DEFAULT_DURATION_MINUTES, RequestId};
pub use credential::Credential;
pub use grant::{AccessGrant, GrantState};
pub use target::TargetDefinition;
pub use variables::{MANAGED_BY_TAG, ResourceTags, TeardownPayload, VariablesDocument};
