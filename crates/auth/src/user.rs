//! Local user accounts (login identities).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    /// Encoded PBKDF2 hash, see [`crate::password`].
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_admin: bool,
    /// Session lifetime in hours; zero or negative means the service default.
    pub session_ttl_hours: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn session_ttl(&self) -> Option<Duration> {
        (self.session_ttl_hours > 0).then(|| Duration::hours(i64::from(self.session_ttl_hours)))
    }
}
