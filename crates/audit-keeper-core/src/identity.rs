//! # Clock and Identity Providers
//!
//! Leaf collaborators of the ledger: a source of UTC time and a source of the
//! hashed actor identity. Both are traits so tests can pin them.

use crate::Timestamp;
use sha2::{Digest, Sha256};
use std::sync::{Mutex, PoisonError};

/// Source of the current UTC instant
pub trait Clock: Send + Sync {
    /// Current time
    fn now(&self) -> Timestamp;
}

/// Clock backed by the system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// Manually driven clock for deterministic tests and replays
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<Timestamp>,
}

impl FixedClock {
    /// Create clock frozen at `now`
    pub fn new(now: Timestamp) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Move the clock to `now`
    pub fn set(&self, now: Timestamp) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }

    /// Move the clock forward by whole days
    pub fn advance_days(&self, days: u32) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now = now.add_days(days);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Source of the acting identity, already hashed
///
/// Implementations must never return the raw identity.
pub trait IdentityProvider: Send + Sync {
    /// 64 hex character SHA-256 digest of the actor identity
    fn actor_id(&self) -> String;
}

/// Hash an actor identity into its stored form
pub fn hash_actor(identity: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(identity.as_bytes());
    hex::encode(hasher.finalize())
}

/// Identity of the operating-system user running the process
///
/// Reads `USERDOMAIN`/`USERNAME` (Windows) or `USER`/`LOGNAME` (Unix) once at
/// construction and keeps only the digest.
#[derive(Debug, Clone)]
pub struct OsIdentityProvider {
    actor_id: String,
}

impl OsIdentityProvider {
    /// Resolve and hash the current OS user
    pub fn new() -> Self {
        let user = ["USERNAME", "USER", "LOGNAME"]
            .iter()
            .find_map(|key| std::env::var(key).ok().filter(|v| !v.is_empty()))
            .unwrap_or_else(|| "unknown".to_string());

        let identity = match std::env::var("USERDOMAIN") {
            Ok(domain) if !domain.is_empty() => format!("{}\\{}", domain, user),
            _ => user,
        };

        Self {
            actor_id: hash_actor(&identity),
        }
    }
}

impl Default for OsIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityProvider for OsIdentityProvider {
    fn actor_id(&self) -> String {
        self.actor_id.clone()
    }
}

/// Fixed identity, hashed on construction
#[derive(Debug, Clone)]
pub struct StaticIdentityProvider {
    actor_id: String,
}

impl StaticIdentityProvider {
    /// Create provider for the given raw identity
    pub fn new(identity: &str) -> Self {
        Self {
            actor_id: hash_actor(identity),
        }
    }
}

impl IdentityProvider for StaticIdentityProvider {
    fn actor_id(&self) -> String {
        self.actor_id.clone()
    }
}

#[cfg(test)]
#[path = "identity_tests.rs"]
mod tests;
