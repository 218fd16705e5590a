//! `companyhub-auth`: identity tokens and declarative authorization rules.
//!
//! This crate is intentionally decoupled from HTTP and storage: rules compile to
//! probes, and an [`IdentityStore`] supplied by the caller executes them.

pub mod claims;
pub mod operation;
pub mod password;
pub mod rule;
pub mod store;
pub mod token;
pub mod user;
pub mod validator;

pub use claims::{validate_claims, Claims, SubjectKind, TokenValidationError};
pub use operation::OperationKind;
pub use password::{hash_password, verify_password, PasswordError};
pub use rule::{
    active_user, AuthorizationRule, BoundCondition, ClaimField, Comparator, Condition,
    ConditionGroup, EntityQuery, Operand, Probe, SubjectPolicy, Value,
};
pub use store::{IdentityStore, ProbeError};
pub use token::{TokenCodec, TokenError, DEFAULT_SESSION_TTL_HOURS};
pub use user::User;
pub use validator::{AuthError, Validator};
