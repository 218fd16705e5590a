//! `companyhub-core`: domain building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod company;
pub mod error;
pub mod id;

pub use company::{Company, CompanyFilters, CompanyKind, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT};
pub use error::{DomainError, DomainResult};
pub use id::CompanyId;
