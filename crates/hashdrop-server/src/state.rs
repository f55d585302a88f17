use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use hashdrop_core::Vault;

use crate::config::ServerSection;

/// Shared application state, wrapped in Arc for axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub inner: Arc<AppStateInner>,
}

pub struct AppStateInner {
    pub config: ServerSection,
    pub vault: Arc<Vault>,
    pub start_time: std::time::Instant,

    /// Live login sessions: token -> SessionInfo
    pub sessions: RwLock<HashMap<String, SessionInfo>>,
}

#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub created_at: DateTime<Utc>,
    pub ttl_seconds: u64,
}

impl SessionInfo {
    pub fn is_expired(&self) -> bool {
        let elapsed = Utc::now()
            .signed_duration_since(self.created_at)
            .num_seconds();
        let ttl_i64 = i64::try_from(self.ttl_seconds).unwrap_or(i64::MAX);
        elapsed > ttl_i64
    }
}

pub(crate) fn read_unpoisoned<'a, T>(
    lock: &'a RwLock<T>,
    lock_name: &'static str,
) -> RwLockReadGuard<'a, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::error!(
                lock = lock_name,
                "rwlock poisoned; continuing with inner state"
            );
            poisoned.into_inner()
        }
    }
}

pub(crate) fn write_unpoisoned<'a, T>(
    lock: &'a RwLock<T>,
    lock_name: &'static str,
) -> RwLockWriteGuard<'a, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::error!(
                lock = lock_name,
                "rwlock poisoned; continuing with inner state"
            );
            poisoned.into_inner()
        }
    }
}

impl AppState {
    pub fn new(config: ServerSection, vault: Vault) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                vault: Arc::new(vault),
                start_time: std::time::Instant::now(),
                sessions: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn vault(&self) -> &Vault {
        &self.inner.vault
    }

    /// Issue a fresh session token.
    pub fn create_session(&self) -> String {
        let token = format!(
            "{:032x}{:032x}",
            rand::random::<u128>(),
            rand::random::<u128>()
        );
        let info = SessionInfo {
            created_at: Utc::now(),
            ttl_seconds: self.inner.config.session_ttl_seconds,
        };
        write_unpoisoned(&self.inner.sessions, "sessions").insert(token.clone(), info);
        token
    }

    /// True if `token` names a session that has not expired.
    pub fn session_valid(&self, token: &str) -> bool {
        read_unpoisoned(&self.inner.sessions, "sessions")
            .get(token)
            .is_some_and(|info| !info.is_expired())
    }

    pub fn revoke_session(&self, token: &str) {
        write_unpoisoned(&self.inner.sessions, "sessions").remove(token);
    }

    /// Drop expired sessions and return how many were removed.
    pub fn reap_sessions(&self) -> usize {
        let mut sessions = write_unpoisoned(&self.inner.sessions, "sessions");
        let before = sessions.len();
        sessions.retain(|_token, info| !info.is_expired());
        before - sessions.len()
    }

    pub fn session_count(&self) -> usize {
        read_unpoisoned(&self.inner.sessions, "sessions").len()
    }
}
