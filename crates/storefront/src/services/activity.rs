//! Loading and error flags shared by every manager.

use std::future::Future;
use std::sync::{Mutex, PoisonError};

use tracing::debug;

use crate::error::ClientError;

#[derive(Debug, Default)]
struct Flags {
    in_flight: usize,
    error: Option<String>,
}

/// Busy flag plus the most recent user-facing error of one manager.
///
/// The error is cleared when an operation starts and replaced when one
/// fails; only the latest failure is retained.
#[derive(Debug, Default)]
pub struct Activity {
    flags: Mutex<Flags>,
}

impl Activity {
    /// Create an idle activity with no error.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any tracked operation is in flight.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.lock().in_flight > 0
    }

    /// The most recent error message, if the last failure was not cleared.
    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.lock().error.clone()
    }

    /// Forget the current error.
    pub fn clear_error(&self) {
        self.lock().error = None;
    }

    #[cfg(test)]
    pub fn fail(&self, message: impl Into<String>) {
        self.lock().error = Some(message.into());
    }

    /// Run `operation` with the loading flag raised.
    ///
    /// Clears the error before starting. On failure the error becomes the
    /// server-supplied message, or `fallback` when the server sent none.
    /// The loading flag is lowered even if the returned future is dropped
    /// before it completes.
    ///
    /// # Errors
    ///
    /// Returns the error produced by `operation` unchanged.
    pub async fn track<T, F>(&self, fallback: &str, operation: F) -> Result<T, ClientError>
    where
        F: Future<Output = Result<T, ClientError>>,
    {
        let busy = self.begin();
        let result = operation.await;

        if let Err(e) = &result {
            debug!(error = %e, fallback, "Tracked operation failed");
            self.lock().error = Some(e.user_message(fallback));
        }
        drop(busy);

        result
    }

    fn begin(&self) -> Busy<'_> {
        let mut flags = self.lock();
        flags.in_flight += 1;
        flags.error = None;
        drop(flags);
        Busy { activity: self }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Flags> {
        self.flags.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Holds one unit of the in-flight count until dropped.
struct Busy<'a> {
    activity: &'a Activity,
}

impl Drop for Busy<'_> {
    fn drop(&mut self) {
        let mut flags = self.activity.lock();
        flags.in_flight = flags.in_flight.saturating_sub(1);
    }
}
