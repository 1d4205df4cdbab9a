use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, instrument};

use crate::timesheet::tools::consolidate::{self, Consolidation};
use crate::timesheet::tools::error::Result;
use crate::timesheet::tools::export::{ExportOrchestrator, Ledger};
use crate::timesheet::tools::io::excel_write;
use crate::timesheet::tools::io::roster::Roster;
use crate::timesheet::tools::model::ClientRecord;
use crate::timesheet::tools::remote::SessionFactory;
use crate::timesheet::tools::watch;

/// File name of the status ledger inside the report directory.
pub const STATUS_FILE: &str = "clients_with_status.csv";
/// Default file name of the consolidated workbook.
pub const SUMMARY_FILE: &str = "Consolidated_Summary.xlsx";

/// What a download run produced.
#[derive(Debug, Clone)]
pub struct DownloadReport {
    pub clients: Vec<ClientRecord>,
    pub ledger: Ledger,
    pub status_file: PathBuf,
}

/// Exports every client of the roster and writes the status ledger once the
/// whole batch is done.
#[instrument(
    level = "info",
    skip_all,
    fields(roster = %roster.source().display(), report_dir = %report_dir.display())
)]
pub fn download_timesheets<F: SessionFactory>(
    roster: &Roster,
    report_dir: &Path,
    orchestrator: &ExportOrchestrator<F>,
) -> Result<DownloadReport> {
    fs::create_dir_all(report_dir)?;
    fs::create_dir_all(&orchestrator.options().download_dir)?;
    fs::create_dir_all(&orchestrator.options().artifact_dir)?;

    let mut clients = roster.clients();
    info!(client_count = clients.len(), "loaded roster");

    let ledger = orchestrator.run_with_progress(&mut clients, |done, total, client| {
        info!(done, total, client = %client.name, status = %client.status, "progress");
    });

    let status_file = report_dir.join(STATUS_FILE);
    roster.write_with_status(&status_file, &clients)?;
    info!(path = %status_file.display(), "status ledger written");

    Ok(DownloadReport {
        clients,
        ledger,
        status_file,
    })
}

/// Consolidates the given workbooks (directories expand to the `.xlsx` files
/// they contain) into one styled summary at `output`.
///
/// Nothing is written when every input is rejected.
#[instrument(level = "info", skip_all, fields(output = %output.display()))]
pub fn consolidate_reports(
    inputs: &[PathBuf],
    output: &Path,
    header_offset: usize,
) -> Result<Consolidation> {
    let paths = expand_inputs(inputs)?;
    info!(file_count = paths.len(), "consolidating timesheets");

    let (tables, unreadable) = consolidate::read_artifacts(&paths, header_offset);
    let consolidation = consolidate::consolidate_with(&tables, unreadable)?;

    if let Some(parent) = output.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    excel_write::write_report(output, &consolidation.to_table())?;
    info!(
        rows = consolidation.rows.len(),
        skipped = consolidation.rejected.len(),
        "summary written"
    );
    Ok(consolidation)
}

fn expand_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for input in inputs {
        if input.is_dir() {
            paths.extend(
                watch::snapshot(input, "xlsx")?
                    .into_iter()
                    .filter(|path| !is_lock_file(path)),
            );
        } else {
            paths.push(input.clone());
        }
    }
    Ok(paths)
}

/// Excel keeps `~$name.xlsx` owner files next to open workbooks.
fn is_lock_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with("~$"))
}
