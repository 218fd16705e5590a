//! Company record and its validation rules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::id::CompanyId;

pub const MAX_NAME_CHARS: usize = 15;
pub const MAX_DESCRIPTION_CHARS: usize = 3000;

/// Page size used when a list request leaves `limit` at zero.
pub const DEFAULT_LIST_LIMIT: u32 = 50;
/// Upper bound applied to any requested page size.
pub const MAX_LIST_LIMIT: u32 = 1000;

/// Legal form of a company.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompanyKind {
    Corporation,
    NonProfit,
    Cooperative,
    SoleProprietorship,
}

impl CompanyKind {
    pub const ALL: [CompanyKind; 4] = [
        CompanyKind::Corporation,
        CompanyKind::NonProfit,
        CompanyKind::Cooperative,
        CompanyKind::SoleProprietorship,
    ];

    /// Storage representation (also used as the SQL enum label).
    pub fn as_str(&self) -> &'static str {
        match self {
            CompanyKind::Corporation => "corporation",
            CompanyKind::NonProfit => "non_profit",
            CompanyKind::Cooperative => "cooperative",
            CompanyKind::SoleProprietorship => "sole_proprietorship",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown company type: {s}")))
    }
}

impl core::fmt::Display for CompanyKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub id: CompanyId,
    pub name: String,
    pub description: String,
    pub employees_count: u32,
    pub registered: bool,
    pub kind: CompanyKind,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Company {
    /// Build a new, validated company stamped with `now`.
    pub fn new(
        id: CompanyId,
        name: impl Into<String>,
        description: impl Into<String>,
        employees_count: u32,
        registered: bool,
        kind: CompanyKind,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let company = Self {
            id,
            name: name.into(),
            description: description.into(),
            employees_count,
            registered,
            kind,
            created_at: now,
            updated_at: now,
        };
        company.validate()?;
        Ok(company)
    }

    pub fn validate(&self) -> DomainResult<()> {
        let name_len = self.name.chars().count();
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("name is required"));
        }
        if name_len > MAX_NAME_CHARS {
            return Err(DomainError::validation(format!(
                "name must be at most {MAX_NAME_CHARS} characters"
            )));
        }
        if self.description.chars().count() > MAX_DESCRIPTION_CHARS {
            return Err(DomainError::validation(format!(
                "description must be at most {MAX_DESCRIPTION_CHARS} characters"
            )));
        }
        if self.employees_count == 0 {
            return Err(DomainError::validation("employees count must be positive"));
        }
        Ok(())
    }
}

/// Equality filters and paging for listing companies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompanyFilters {
    pub name: Option<String>,
    pub kind: Option<CompanyKind>,
    pub registered: Option<bool>,
    pub limit: u32,
    pub offset: u32,
}

impl CompanyFilters {
    /// Page size after defaulting and clamping.
    pub fn effective_limit(&self) -> u32 {
        match self.limit {
            0 => DEFAULT_LIST_LIMIT,
            n => n.min(MAX_LIST_LIMIT),
        }
    }

    pub fn matches(&self, company: &Company) -> bool {
        self.name.as_deref().is_none_or(|n| n == company.name)
            && self.kind.is_none_or(|k| k == company.kind)
            && self.registered.is_none_or(|r| r == company.registered)
    }
}
