//! Credential sets, the live session, and the expiring session cache.
//!
//! The live [`Session`] is created once per process and passed explicitly to
//! the request pipeline. [`SessionCache`] persists one record through a
//! [`SessionStore`] so the credentials survive restarts.

mod cache;
mod credentials;
mod storage;

pub use cache::{DEFAULT_SESSION_TTL, EXTENDED_SESSION_TTL, SessionCache, SessionRecord};
pub use credentials::{ANTI_FORGERY_COOKIE, CredentialSet, SESSION_TOKEN_COOKIE, Session};
pub use storage::{
    EncryptedFileStore, MASTER_KEY_ENV, MemorySessionStore, SessionStore, StorageError,
    default_config_dir, default_session_path,
};
