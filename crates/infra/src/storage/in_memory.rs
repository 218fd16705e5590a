//! In-memory storage for tests/dev.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use companyhub_auth::{IdentityStore, Probe, ProbeError, User, Value};
use companyhub_core::{Company, CompanyFilters, CompanyId};

use super::{CompanyStore, StoreError, UserStore};

const POISONED: &str = "in-memory store lock poisoned";

/// Process-local store.
///
/// - No IO
/// - Enforces the same uniqueness rules as the SQL schema (company name,
///   username)
/// - Evaluates authorization probes against the `user` rows
#[derive(Debug, Default)]
pub struct InMemoryStore {
    companies: RwLock<HashMap<CompanyId, Company>>,
    users: RwLock<Vec<User>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Backend(POISONED.to_string())
}

#[async_trait]
impl CompanyStore for InMemoryStore {
    async fn create_company(&self, company: &Company) -> Result<(), StoreError> {
        let mut companies = self.companies.write().map_err(poisoned)?;
        if companies.contains_key(&company.id) {
            return Err(StoreError::AlreadyExists(company.id.to_string()));
        }
        if companies.values().any(|c| c.name == company.name) {
            return Err(StoreError::AlreadyExists(company.name.clone()));
        }
        companies.insert(company.id, company.clone());
        Ok(())
    }

    async fn get_company(&self, id: CompanyId) -> Result<Company, StoreError> {
        let companies = self.companies.read().map_err(poisoned)?;
        companies.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    async fn update_company(&self, company: &Company) -> Result<(), StoreError> {
        let mut companies = self.companies.write().map_err(poisoned)?;
        if companies
            .values()
            .any(|c| c.id != company.id && c.name == company.name)
        {
            return Err(StoreError::AlreadyExists(company.name.clone()));
        }
        let existing = companies.get_mut(&company.id).ok_or(StoreError::NotFound)?;
        *existing = Company {
            created_at: existing.created_at,
            updated_at: Utc::now(),
            ..company.clone()
        };
        Ok(())
    }

    async fn delete_company(&self, id: CompanyId) -> Result<(), StoreError> {
        let mut companies = self.companies.write().map_err(poisoned)?;
        companies.remove(&id).map(|_| ()).ok_or(StoreError::NotFound)
    }

    async fn list_companies(&self, filters: &CompanyFilters) -> Result<Vec<Company>, StoreError> {
        let companies = self.companies.read().map_err(poisoned)?;
        let mut matched: Vec<Company> = companies
            .values()
            .filter(|c| filters.matches(c))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(matched
            .into_iter()
            .skip(filters.offset as usize)
            .take(filters.effective_limit() as usize)
            .collect())
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        is_admin: bool,
        session_ttl_hours: i32,
    ) -> Result<User, StoreError> {
        let mut users = self.users.write().map_err(poisoned)?;
        if users.iter().any(|u| u.username == username) {
            return Err(StoreError::AlreadyExists(username.to_string()));
        }
        let now = Utc::now();
        let user = User {
            id: users.iter().map(|u| u.id).max().unwrap_or(0) + 1,
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            is_admin,
            session_ttl_hours,
            created_at: now,
            updated_at: now,
        };
        users.push(user.clone());
        Ok(user)
    }

    async fn get_user_by_username(&self, username: &str) -> Result<User, StoreError> {
        let users = self.users.read().map_err(poisoned)?;
        users
            .iter()
            .find(|u| u.username == username)
            .cloned()
            .ok_or(StoreError::NotFound)
    }
}

fn user_column(user: &User, column: &str) -> Result<Value, ProbeError> {
    match column {
        "id" => Ok(Value::Int(user.id)),
        "username" => Ok(Value::Text(user.username.clone())),
        "is_admin" => Ok(Value::Bool(user.is_admin)),
        "session_ttl" => Ok(Value::Int(i64::from(user.session_ttl_hours))),
        other => Err(ProbeError::Unsupported(format!("user has no column '{other}'"))),
    }
}

fn row_matches(user: &User, probe: &Probe<'_>) -> Result<bool, ProbeError> {
    for group in &probe.groups {
        let mut all = true;
        for cond in group {
            if !cond.comparator.holds(&user_column(user, cond.column)?, &cond.value) {
                all = false;
                break;
            }
        }
        if all {
            return Ok(true);
        }
    }
    Ok(false)
}

#[async_trait]
impl IdentityStore for InMemoryStore {
    async fn probe(&self, probe: &Probe<'_>) -> Result<bool, ProbeError> {
        if probe.entity.table != "user" {
            return Err(ProbeError::Unsupported(format!(
                "unknown entity '{}'",
                probe.entity.table
            )));
        }
        let users = self
            .users
            .read()
            .map_err(|_| ProbeError::Backend(POISONED.to_string()))?;
        for user in users.iter() {
            if row_matches(user, probe)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
