#![warn(missing_docs)]
//! # deepscan-auth
//!
//! ## Purpose
//! Exposes the session mode (guest or secure) to the scan core.
//!
//! ## Responsibilities
//! - Read the persisted login flag once at start-up.
//! - Provide a read-only [`SessionModeGate`] the core consults at decision points.
//! - Record sign-in/sign-out by writing the flag for the next start-up.
//!
//! ## Data flow
//! Login form (external) -> [`record_sign_in`] writes the flag -> next start-up
//! [`StoredSessionMode::load`] reads it -> scan core asks
//! [`SessionModeGate::mode`] before persisting.
//!
//! ## Error model
//! An unreadable store degrades to [`SessionMode::Guest`]; persistence is the
//! only thing the mode gates, so the safe default is to refuse it.
//!
//! ## Example
//! ```rust
//! use deepscan_auth::{SessionModeGate, StoredSessionMode};
//! use deepscan_core::SessionMode;
//! use deepscan_store::{MemoryStore, LOGIN_FLAG_KEY};
//!
//! let store = MemoryStore::with_values([(LOGIN_FLAG_KEY, "true")]);
//! assert_eq!(StoredSessionMode::load(&store).mode(), SessionMode::Secure);
//! ```

use deepscan_core::SessionMode;
use deepscan_store::{KeyValueStore, LOGIN_FLAG_KEY, StoreError};
use tracing::{info, warn};

/// Read-only source of the current session mode.
pub trait SessionModeGate: Send + Sync {
    /// Returns the mode captured for this run.
    fn mode(&self) -> SessionMode;
}

/// Mode read from the persisted login flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredSessionMode {
    mode: SessionMode,
}

impl StoredSessionMode {
    /// Reads the login flag once. Later flag changes are not observed.
    pub fn load(store: &dyn KeyValueStore) -> Self {
        let mode = match store.get(LOGIN_FLAG_KEY) {
            Ok(flag) => SessionMode::from_flag(flag.as_deref()),
            Err(error) => {
                warn!(%error, "login flag unreadable; continuing as guest");
                SessionMode::Guest
            }
        };

        info!(mode = mode.label(), "session mode loaded");
        Self { mode }
    }
}

impl SessionModeGate for StoredSessionMode {
    fn mode(&self) -> SessionMode {
        self.mode
    }
}

/// Mode fixed at construction, for tests and embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedSessionMode(pub SessionMode);

impl SessionModeGate for FixedSessionMode {
    fn mode(&self) -> SessionMode {
        self.0
    }
}

/// Persists a successful sign-in for subsequent runs.
///
/// # Errors
/// Propagates [`StoreError`] from the backing store.
pub fn record_sign_in(store: &dyn KeyValueStore) -> Result<(), StoreError> {
    store.set(LOGIN_FLAG_KEY, "true")
}

/// Persists a sign-out for subsequent runs.
///
/// # Errors
/// Propagates [`StoreError`] from the backing store.
pub fn record_sign_out(store: &dyn KeyValueStore) -> Result<(), StoreError> {
    store.set(LOGIN_FLAG_KEY, "false")
}
