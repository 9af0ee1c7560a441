//! Account and session commands.
//!
//! # Usage
//!
//! ```bash
//! shopkeep register -u alice -p hunter22
//! shopkeep login -u alice -p hunter22
//! shopkeep whoami
//! shopkeep logout
//! ```

use shopkeep_core::{Credentials, NewAccount};
use shopkeep_storefront::state::StorefrontState;

use super::{CommandError, failure, require_session};

/// Create an account and sign in with it.
///
/// # Errors
///
/// Returns an error if registration or the follow-up login fails.
#[allow(clippy::print_stdout)]
pub async fn register(
    state: &StorefrontState,
    username: &str,
    password: &str,
) -> Result<(), CommandError> {
    let session = state.session();
    let user = session
        .register(&NewAccount::new(username, password))
        .await
        .map_err(|e| failure(session.error(), e))?;

    println!("Registered and signed in as {} (#{})", user.username, user.id);
    Ok(())
}

/// Sign in and persist the session.
///
/// # Errors
///
/// Returns an error if the credentials are rejected or the profile cannot be
/// loaded.
#[allow(clippy::print_stdout)]
pub async fn login(
    state: &StorefrontState,
    username: &str,
    password: &str,
) -> Result<(), CommandError> {
    let session = state.session();
    let user = session
        .login(&Credentials::new(username, password))
        .await
        .map_err(|e| failure(session.error(), e))?;

    println!("Signed in as {} (#{})", user.username, user.id);
    Ok(())
}

/// Forget the stored session. Never contacts the API.
#[allow(clippy::print_stdout)]
pub fn logout(state: &StorefrontState) {
    state.session().logout();
    println!("Signed out");
}

/// Re-fetch and print the signed-in user.
///
/// A failed refresh ends the session.
///
/// # Errors
///
/// Returns an error if no session is stored or the profile fetch fails.
#[allow(clippy::print_stdout)]
pub async fn whoami(state: &StorefrontState) -> Result<(), CommandError> {
    require_session(state)?;

    let session = state.session();
    let user = session
        .fetch_current_user()
        .await
        .map_err(|e| failure(session.error(), e))?
        .ok_or(CommandError::NotSignedIn)?;

    println!("{} (#{})", user.username, user.id);
    Ok(())
}
