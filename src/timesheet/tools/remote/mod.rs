//! The portal capability consumed by the export orchestrator.
//!
//! The orchestrator never sees pages or locators. It only calls the five
//! operations of [`RemoteSession`] and branches on their results; a concrete
//! driver lives in [`webdriver`].

pub mod webdriver;

use tracing::warn;

use crate::timesheet::tools::error::Result;
use crate::timesheet::tools::model::{Credentials, DateRange};

/// One isolated browser session against the portal.
///
/// Every method may fail; a failure means the capability itself broke, never
/// "no data". Negative answers are reported through the boolean queries.
pub trait RemoteSession {
    /// Logs in. Must be called first.
    fn authenticate(&mut self, credentials: &Credentials) -> Result<()>;

    /// Selects the client scope. Returns `false` when the portal does not list
    /// a scope with that name.
    fn select_scope(&mut self, name: &str) -> Result<bool>;

    /// Applies the date window and runs the search.
    fn set_date_range(&mut self, range: &DateRange) -> Result<()>;

    /// Reports whether the last search produced at least one result row.
    fn has_result_rows(&mut self) -> Result<bool>;

    /// Starts the export. Completion is only observable on disk.
    fn trigger_export(&mut self) -> Result<()>;

    /// Releases the session. Called exactly once, by [`SessionGuard`].
    fn close(&mut self) -> Result<()>;
}

/// Opens fresh sessions, one per client.
pub trait SessionFactory {
    fn open(&self) -> Result<Box<dyn RemoteSession>>;
}

/// Owns a session and releases it when dropped, on every exit path.
///
/// Release failures are logged and swallowed; they never change the outcome
/// already recorded for the client.
pub struct SessionGuard {
    session: Box<dyn RemoteSession>,
    label: String,
}

impl SessionGuard {
    pub fn new(session: Box<dyn RemoteSession>, label: impl Into<String>) -> Self {
        Self {
            session,
            label: label.into(),
        }
    }

    pub fn session(&mut self) -> &mut dyn RemoteSession {
        self.session.as_mut()
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Err(error) = self.session.close() {
            warn!(client = %self.label, %error, "failed to release remote session");
        }
    }
}
