//! Per-client batch export.
//!
//! Each client runs through the same short state machine on its own fresh
//! [`RemoteSession`]: authenticate, select the scope, search the date range,
//! export, then wait for the file on disk. Whatever happens to one client is
//! recorded as its [`StatusCode`] and the batch moves on.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use tracing::{error, info, info_span, warn};

use crate::timesheet::tools::error::Result;
use crate::timesheet::tools::model::{ClientRecord, Credentials, DateRange, StatusCode};
use crate::timesheet::tools::remote::{RemoteSession, SessionFactory, SessionGuard};
use crate::timesheet::tools::watch::{self, WatchOutcome};

/// How clients are scheduled. Only one client is ever in flight; the ledger is
/// mutated without locks, which a parallel mode would have to change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConcurrencyMode {
    #[default]
    Sequential,
}

/// Settings shared by every client of a run.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub date_range: DateRange,
    pub credentials: Credentials,
    /// Where the browser saves exports.
    pub download_dir: PathBuf,
    /// Where claimed artifacts are moved to.
    pub artifact_dir: PathBuf,
    /// Artifact extension without the dot.
    pub extension: String,
    pub export_timeout: Duration,
    pub poll_interval: Duration,
    /// Pause between two clients.
    pub inter_client_delay: Duration,
    pub concurrency: ConcurrencyMode,
}

impl ExportOptions {
    pub fn new(date_range: DateRange, credentials: Credentials, download_dir: PathBuf) -> Self {
        Self {
            date_range,
            credentials,
            artifact_dir: download_dir.clone(),
            download_dir,
            extension: "xlsx".to_string(),
            export_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(1),
            inter_client_delay: Duration::from_secs(1),
            concurrency: ConcurrencyMode::Sequential,
        }
    }
}

/// Outcome of one roster entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub name: String,
    pub status: StatusCode,
    /// Claimed artifact, set only for [`StatusCode::Downloaded`].
    pub artifact: Option<PathBuf>,
}

/// Outcomes of a run, in roster order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    entries: Vec<LedgerEntry>,
}

impl Ledger {
    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries whose status carries the given ledger tag.
    pub fn count(&self, tag: &str) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.status.tag() == tag)
            .count()
    }

    pub fn artifacts(&self) -> impl Iterator<Item = &PathBuf> {
        self.entries.iter().filter_map(|entry| entry.artifact.as_ref())
    }
}

/// Drives one session per client and records the results.
pub struct ExportOrchestrator<F> {
    factory: F,
    options: ExportOptions,
}

impl<F: SessionFactory> ExportOrchestrator<F> {
    pub fn new(factory: F, options: ExportOptions) -> Self {
        Self { factory, options }
    }

    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    /// Processes every client in order.
    pub fn run(&self, clients: &mut [ClientRecord]) -> Ledger {
        self.run_with_progress(clients, |_, _, _| {})
    }

    /// Like [`run`](Self::run), calling `progress(done, total, client)` after
    /// each client reaches its terminal status.
    pub fn run_with_progress(
        &self,
        clients: &mut [ClientRecord],
        mut progress: impl FnMut(usize, usize, &ClientRecord),
    ) -> Ledger {
        let total = clients.len();
        info!(total, mode = ?self.options.concurrency, "starting export run");
        let mut ledger = Ledger::default();

        for (index, client) in clients.iter_mut().enumerate() {
            if index > 0 && !self.options.inter_client_delay.is_zero() {
                thread::sleep(self.options.inter_client_delay);
            }

            let span = info_span!("client", index = index + 1, total, name = %client.name);
            let _entered = span.enter();
            info!("processing client");

            let (status, artifact) = self.process(&client.name);
            report(&status, artifact.as_ref());
            client.status = status.clone();
            ledger.entries.push(LedgerEntry {
                name: client.name.clone(),
                status,
                artifact,
            });
            progress(index + 1, total, &*client);
        }

        info!(
            total,
            downloaded = ledger.count("Downloaded"),
            not_found = ledger.count("NotFound"),
            no_data = ledger.count("NoData"),
            timed_out = ledger.count("DLFail"),
            failed = ledger.count("Error"),
            "export run finished"
        );
        ledger
    }

    fn process(&self, name: &str) -> (StatusCode, Option<PathBuf>) {
        let session = match self.factory.open() {
            Ok(session) => session,
            Err(error) => return (StatusCode::Error(error.to_string()), None),
        };
        // Dropping the guard releases the session on every path below.
        let mut guard = SessionGuard::new(session, name);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.drive(guard.session(), name)));
        match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(error)) => (StatusCode::Error(error.to_string()), None),
            Err(payload) => (StatusCode::Error(panic_message(payload)), None),
        }
    }

    fn drive(
        &self,
        session: &mut dyn RemoteSession,
        name: &str,
    ) -> Result<(StatusCode, Option<PathBuf>)> {
        let options = &self.options;

        session.authenticate(&options.credentials)?;
        if !session.select_scope(name)? {
            return Ok((StatusCode::NotFound, None));
        }

        session.set_date_range(&options.date_range)?;
        if !session.has_result_rows()? {
            return Ok((StatusCode::NoData, None));
        }

        let before = watch::snapshot(&options.download_dir, &options.extension)?;
        session.trigger_export()?;
        let outcome = watch::await_new_artifact(
            &options.download_dir,
            &options.extension,
            &before,
            options.export_timeout,
            options.poll_interval,
        )?;

        match outcome {
            WatchOutcome::Found(path) => {
                let claimed =
                    watch::claim_artifact(&path, &options.artifact_dir, name, &options.extension)?;
                Ok((StatusCode::Downloaded, Some(claimed)))
            }
            WatchOutcome::Timeout => Ok((StatusCode::DownloadTimeout, None)),
        }
    }
}

fn report(status: &StatusCode, artifact: Option<&PathBuf>) {
    match status {
        StatusCode::Downloaded => {
            let path = artifact.map(|path| path.display().to_string()).unwrap_or_default();
            info!(%path, "downloaded");
        }
        StatusCode::NotFound => warn!("client not found in portal"),
        StatusCode::NoData => warn!("no data for date range, skipping"),
        StatusCode::DownloadTimeout => warn!("export did not appear before timeout"),
        StatusCode::Error(reason) => error!(%reason, "client failed"),
        StatusCode::Pending => {}
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panic: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panic: {message}")
    } else {
        "panic in remote session".to_string()
    }
}
