//! Declarative authorization rules.
//!
//! A rule names a base entity and, per subject kind, either denies outright or
//! holds a disjunction of condition groups:
//!
//! ```text
//! (g1c1 AND g1c2 ...) OR (g2c1 ...) OR ...
//! ```
//!
//! The SQL probe for each subject kind is compiled once when the rule is built.
//! Evaluating a rule only binds claim values into a [`Probe`], which an
//! [`crate::IdentityStore`] executes.

use std::fmt::Write as _;
use std::sync::LazyLock;

use crate::claims::{Claims, SubjectKind};

// ─────────────────────────────────────────────────────────────────────────────
// Building blocks
// ─────────────────────────────────────────────────────────────────────────────

/// Scalar bound into a probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Text(String),
    Int(i64),
    Bool(bool),
}

/// Claim field that a condition compares against.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ClaimField {
    Username,
    UserId,
}

impl ClaimField {
    fn extract(&self, claims: &Claims) -> Value {
        match self {
            ClaimField::Username => Value::Text(claims.username.clone()),
            ClaimField::UserId => Value::Int(claims.id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Claim(ClaimField),
    Literal(Value),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Comparator {
    Eq,
    NotEq,
}

impl Comparator {
    pub fn sql(&self) -> &'static str {
        match self {
            Comparator::Eq => "=",
            Comparator::NotEq => "<>",
        }
    }

    pub fn holds(&self, lhs: &Value, rhs: &Value) -> bool {
        match self {
            Comparator::Eq => lhs == rhs,
            Comparator::NotEq => lhs != rhs,
        }
    }
}

/// `<entity alias>.<column> <comparator> <operand>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub column: String,
    pub comparator: Comparator,
    pub operand: Operand,
}

impl Condition {
    pub fn new(column: impl Into<String>, comparator: Comparator, operand: Operand) -> Self {
        Self {
            column: column.into(),
            comparator,
            operand,
        }
    }

    /// `column = <claim>`
    pub fn claim_eq(column: impl Into<String>, field: ClaimField) -> Self {
        Self::new(column, Comparator::Eq, Operand::Claim(field))
    }

    /// `column = <literal>`
    pub fn literal_eq(column: impl Into<String>, value: Value) -> Self {
        Self::new(column, Comparator::Eq, Operand::Literal(value))
    }
}

/// Conjunction of conditions.
pub type ConditionGroup = Vec<Condition>;

/// Base entity a rule probes (`SELECT 1 FROM "<table>" <alias>`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityQuery {
    pub table: String,
    pub alias: String,
}

impl EntityQuery {
    pub fn new(table: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            alias: alias.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Compilation
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledClause {
    groups: Vec<ConditionGroup>,
    sql: String,
}

impl CompiledClause {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn groups(&self) -> &[ConditionGroup] {
        &self.groups
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectPolicy {
    Deny,
    Match(CompiledClause),
}

static DENY: SubjectPolicy = SubjectPolicy::Deny;

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn compile(entity: &EntityQuery, groups: Vec<ConditionGroup>) -> SubjectPolicy {
    if groups.is_empty() {
        return SubjectPolicy::Deny;
    }

    let alias = quote_ident(&entity.alias);
    let mut placeholder = 0usize;
    let mut ors = Vec::with_capacity(groups.len());
    for group in &groups {
        if group.is_empty() {
            ors.push("(TRUE)".to_string());
            continue;
        }
        let ands: Vec<String> = group
            .iter()
            .map(|c| {
                placeholder += 1;
                format!(
                    "({alias}.{} {} ${placeholder})",
                    quote_ident(&c.column),
                    c.comparator.sql()
                )
            })
            .collect();
        ors.push(format!("({})", ands.join(" AND ")));
    }

    let mut sql = String::new();
    let _ = write!(
        sql,
        "SELECT count(*) FROM (SELECT 1 FROM {} AS {alias} WHERE {} LIMIT 1) AS probe",
        quote_ident(&entity.table),
        ors.join(" OR ")
    );

    SubjectPolicy::Match(CompiledClause { groups, sql })
}

// ─────────────────────────────────────────────────────────────────────────────
// Rules and probes
// ─────────────────────────────────────────────────────────────────────────────

/// A named, reusable authorization predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRule {
    name: String,
    entity: EntityQuery,
    user: SubjectPolicy,
    api_key: SubjectPolicy,
}

impl AuthorizationRule {
    /// Start a rule that denies every subject kind until told otherwise.
    pub fn new(name: impl Into<String>, entity: EntityQuery) -> Self {
        Self {
            name: name.into(),
            entity,
            user: SubjectPolicy::Deny,
            api_key: SubjectPolicy::Deny,
        }
    }

    /// Allow `subject` when any of `groups` matches a row of the entity.
    ///
    /// [`SubjectKind::Other`] cannot be allowed; the call is ignored for it.
    pub fn allow(mut self, subject: SubjectKind, groups: Vec<ConditionGroup>) -> Self {
        let policy = compile(&self.entity, groups);
        match subject {
            SubjectKind::User => self.user = policy,
            SubjectKind::ApiKey => self.api_key = policy,
            SubjectKind::Other => {}
        }
        self
    }

    /// Deny `subject` outright.
    pub fn deny(mut self, subject: SubjectKind) -> Self {
        match subject {
            SubjectKind::User => self.user = SubjectPolicy::Deny,
            SubjectKind::ApiKey => self.api_key = SubjectPolicy::Deny,
            SubjectKind::Other => {}
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entity(&self) -> &EntityQuery {
        &self.entity
    }

    pub fn policy(&self, subject: SubjectKind) -> &SubjectPolicy {
        match subject {
            SubjectKind::User => &self.user,
            SubjectKind::ApiKey => &self.api_key,
            SubjectKind::Other => &DENY,
        }
    }

    /// Bind claim values for the claims' subject kind.
    ///
    /// `None` means the subject is denied without touching the store.
    pub fn bind(&self, claims: &Claims) -> Option<Probe<'_>> {
        let SubjectPolicy::Match(clause) = self.policy(claims.sub) else {
            return None;
        };

        let groups = clause
            .groups
            .iter()
            .map(|group| {
                group
                    .iter()
                    .map(|c| BoundCondition {
                        column: &c.column,
                        comparator: c.comparator,
                        value: match &c.operand {
                            Operand::Claim(field) => field.extract(claims),
                            Operand::Literal(v) => v.clone(),
                        },
                    })
                    .collect()
            })
            .collect();

        Some(Probe {
            rule: &self.name,
            entity: &self.entity,
            sql: &clause.sql,
            groups,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundCondition<'a> {
    pub column: &'a str,
    pub comparator: Comparator,
    pub value: Value,
}

/// A rule bound to one request's claims, ready for the identity store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe<'a> {
    pub rule: &'a str,
    pub entity: &'a EntityQuery,
    /// Compiled `SELECT count(*) ...` with `$1..$n` placeholders.
    pub sql: &'a str,
    pub groups: Vec<Vec<BoundCondition<'a>>>,
}

impl<'a> Probe<'a> {
    /// Positional arguments in placeholder order.
    pub fn args(&self) -> impl Iterator<Item = &Value> {
        self.groups.iter().flatten().map(|c| &c.value)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Built-in rules
// ─────────────────────────────────────────────────────────────────────────────

static ACTIVE_USER: LazyLock<AuthorizationRule> = LazyLock::new(|| {
    AuthorizationRule::new("active_user", EntityQuery::new("user", "u"))
        .allow(
            SubjectKind::User,
            vec![
                vec![Condition::claim_eq("username", ClaimField::Username)],
                vec![Condition::claim_eq("id", ClaimField::UserId)],
            ],
        )
        .deny(SubjectKind::ApiKey)
});

/// The token's user still exists (matched by username or id).
///
/// API keys and unknown subjects are denied.
pub fn active_user() -> &'static AuthorizationRule {
    &ACTIVE_USER
}
