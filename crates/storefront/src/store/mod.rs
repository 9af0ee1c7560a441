//! Persisted session storage.
//!
//! The session mirror is two slots: the bearer credential and the serialized
//! user profile. Both are written together on login and cleared together on
//! logout, eviction, or corruption. The stored values are a derived copy of
//! the session; the in-memory [`SessionManager`](crate::services::SessionManager)
//! state is the source of truth.
//!
//! The store is an injected capability shared by the
//! [`Gateway`](crate::api::Gateway) (credential reads, eviction) and the
//! session manager (login, restore, logout).

mod file;
mod memory;

pub use file::FileSessionStore;
pub use memory::MemorySessionStore;

use thiserror::Error;

/// Errors that can occur when reading or writing the session mirror.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying storage could not be read or written.
    #[error("session storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored data is not in the expected format.
    #[error("session storage format error: {0}")]
    Format(#[from] serde_json::Error),
}

/// A slot in the persisted session mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionSlot {
    /// Bearer credential presented to the API.
    Credential,
    /// JSON-serialized [`User`](shopkeep_core::User) profile.
    Profile,
}

impl SessionSlot {
    /// Both slots, in write order.
    pub const ALL: [Self; 2] = [Self::Credential, Self::Profile];

    /// Storage key for this slot.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Credential => "authToken",
            Self::Profile => "user",
        }
    }
}

/// Key-value storage for the session mirror.
///
/// Implementations must be safe to share between the gateway and the session
/// manager. `clear` removes both slots; implementations that can do so in a
/// single write should override it.
pub trait SessionStore: Send + Sync {
    /// Read a slot.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the underlying storage cannot be read.
    fn get(&self, slot: SessionSlot) -> Result<Option<String>, StoreError>;

    /// Write a slot.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the underlying storage cannot be written.
    fn set(&self, slot: SessionSlot, value: &str) -> Result<(), StoreError>;

    /// Remove a slot. Removing an absent slot is not an error.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the underlying storage cannot be written.
    fn remove(&self, slot: SessionSlot) -> Result<(), StoreError>;

    /// Remove both slots.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the underlying storage cannot be written.
    fn clear(&self) -> Result<(), StoreError> {
        for slot in SessionSlot::ALL {
            self.remove(slot)?;
        }
        Ok(())
    }
}
