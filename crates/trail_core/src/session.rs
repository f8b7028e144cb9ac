//! Session identity and the auth-token seam.
//!
//! The auth layer owns tokens; the engine only asks for the current one.
//! A missing or empty token means sync is disabled, not an error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::RwLock;
use uuid::Uuid;

/// Supplies the current bearer token
pub trait SessionProvider: Send + Sync {
    fn auth_token(&self) -> Option<String>;
}

/// Token holder the auth layer writes into on login, refresh and logout
#[derive(Debug, Default)]
pub struct StaticTokenProvider {
    token: RwLock<Option<String>>,
}

impl StaticTokenProvider {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: RwLock::new(token),
        }
    }

    pub fn set(&self, token: impl Into<String>) {
        let mut guard = self.token.write().unwrap_or_else(|p| p.into_inner());
        *guard = Some(token.into());
    }

    pub fn clear(&self) {
        let mut guard = self.token.write().unwrap_or_else(|p| p.into_inner());
        *guard = None;
    }
}

impl SessionProvider for StaticTokenProvider {
    fn auth_token(&self) -> Option<String> {
        let guard = self.token.read().unwrap_or_else(|p| p.into_inner());
        guard.as_ref().filter(|t| !t.trim().is_empty()).cloned()
    }
}

/// Totals carried on the login profile
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub xp: Option<u64>,
    #[serde(default)]
    pub level: Option<u32>,
}

/// One login session. Sync results are only applied to the session that
/// produced them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: Uuid,
    pub user_id: String,
    pub started_at: DateTime<Utc>,
}

impl Session {
    pub fn new(user_id: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            started_at: Utc::now(),
        }
    }
}
