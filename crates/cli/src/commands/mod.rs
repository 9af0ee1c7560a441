//! Command implementations.
//!
//! Each command drives one storefront manager and prints the result to
//! stdout. Failures carry the manager's user-facing error message.

pub mod auth;
pub mod cart;
pub mod orders;
pub mod products;

use shopkeep_storefront::ClientError;
use shopkeep_storefront::state::StorefrontState;
use thiserror::Error;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// A storefront operation failed.
    #[error("{message}")]
    Failed {
        message: String,
        #[source]
        source: ClientError,
    },

    /// The command needs a session and none is stored.
    #[error("Not signed in. Run `shopkeep login` first.")]
    NotSignedIn,

    /// Output could not be rendered.
    #[error("Failed to render output: {0}")]
    Render(#[from] serde_json::Error),
}

/// Wrap `source` with the message the manager recorded for it.
pub fn failure(message: Option<String>, source: ClientError) -> CommandError {
    CommandError::Failed {
        message: message.unwrap_or_else(|| source.to_string()),
        source,
    }
}

/// Fail unless a session was restored or established.
pub fn require_session(state: &StorefrontState) -> Result<(), CommandError> {
    if state.session().is_authenticated() {
        Ok(())
    } else {
        Err(CommandError::NotSignedIn)
    }
}
