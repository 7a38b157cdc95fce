//! Expiring cache for the single active credential set.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::credentials::CredentialSet;
use super::storage::{SessionStore, StorageError};

/// Lifetime of a saved session when the caller does not choose one.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Suggested lifetime for externally supplied credential sets.
pub const EXTENDED_SESSION_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Stored form of the active session. Times are Unix seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Loose account key the record was saved under.
    pub account_id: String,
    /// The credential set.
    pub cookies: CredentialSet,
    /// When the record was saved.
    pub issued_at: u64,
    /// Last second at which the record is still valid.
    pub expires_at: u64,
}

impl SessionRecord {
    /// True when `now` is strictly after the expiry.
    #[must_use]
    pub fn is_expired_at(&self, now: u64) -> bool {
        now > self.expires_at
    }
}

/// Loads, saves and clears the one active session record.
#[derive(Clone)]
pub struct SessionCache {
    store: Arc<dyn SessionStore>,
}

impl std::fmt::Debug for SessionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCache").finish_non_exhaustive()
    }
}

impl SessionCache {
    /// Creates a cache over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    /// Returns the stored credential set unless absent or expired.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the store cannot be read or the record is corrupt.
    pub fn load(&self) -> Result<Option<CredentialSet>, StorageError> {
        self.load_at(unix_now())
    }

    /// [`load`](Self::load) evaluated at an explicit time.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the store cannot be read or the record is corrupt.
    pub fn load_at(&self, now: u64) -> Result<Option<CredentialSet>, StorageError> {
        Ok(self.load_record_at(now)?.map(|record| record.cookies))
    }

    /// The stored record unless absent or expired.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the store cannot be read or the record is corrupt.
    pub fn load_record(&self) -> Result<Option<SessionRecord>, StorageError> {
        self.load_record_at(unix_now())
    }

    /// [`load_record`](Self::load_record) evaluated at an explicit time.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the store cannot be read or the record is corrupt.
    #[instrument(level = "debug", skip(self))]
    pub fn load_record_at(&self, now: u64) -> Result<Option<SessionRecord>, StorageError> {
        Ok(self.record()?.and_then(|record| {
            if record.is_expired_at(now) {
                info!(expires_at = record.expires_at, "cached session expired");
                None
            } else {
                debug!(account = %record.account_id, "cached session loaded");
                Some(record)
            }
        }))
    }

    /// Raw stored record, expired or not.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the store cannot be read or the record is corrupt.
    pub fn record(&self) -> Result<Option<SessionRecord>, StorageError> {
        match self.store.read()? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Saves `credentials`, overwriting any previous record.
    ///
    /// `ttl` defaults to [`DEFAULT_SESSION_TTL`].
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the store cannot be written.
    pub fn save(
        &self,
        account_id: &str,
        credentials: &CredentialSet,
        ttl: Option<Duration>,
    ) -> Result<SessionRecord, StorageError> {
        self.save_at(account_id, credentials, ttl, unix_now())
    }

    /// [`save`](Self::save) evaluated at an explicit time.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the store cannot be written.
    #[instrument(level = "debug", skip(self, credentials))]
    pub fn save_at(
        &self,
        account_id: &str,
        credentials: &CredentialSet,
        ttl: Option<Duration>,
        now: u64,
    ) -> Result<SessionRecord, StorageError> {
        let ttl = ttl.unwrap_or(DEFAULT_SESSION_TTL);
        let record = SessionRecord {
            account_id: account_id.to_string(),
            cookies: credentials.clone(),
            issued_at: now,
            expires_at: now.saturating_add(ttl.as_secs()),
        };
        self.store.write(&serde_json::to_vec(&record)?)?;
        info!(account = %account_id, expires_at = record.expires_at, "session saved");
        Ok(record)
    }

    /// Replaces the cookies of `record` and writes it back.
    ///
    /// Account key, issue time and expiry are kept, so cookie rotation never
    /// extends the session's lifetime.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the store cannot be written.
    #[instrument(level = "debug", skip_all, fields(account = %record.account_id))]
    pub fn update_cookies(
        &self,
        record: &SessionRecord,
        credentials: &CredentialSet,
    ) -> Result<SessionRecord, StorageError> {
        let updated = SessionRecord {
            cookies: credentials.clone(),
            ..record.clone()
        };
        self.store.write(&serde_json::to_vec(&updated)?)?;
        debug!(expires_at = updated.expires_at, "session cookies updated");
        Ok(updated)
    }

    /// Removes the record; returns `true` if one existed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when removal fails.
    pub fn clear(&self) -> Result<bool, StorageError> {
        let removed = self.store.remove()?;
        if removed {
            info!("session cleared");
        }
        Ok(removed)
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}
