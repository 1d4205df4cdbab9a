//! Aggregation of exported timesheets into one summary.
//!
//! Each artifact is validated on its own; a bad file is recorded as a
//! [`Rejection`] and the rest are still summed. Durations are normalised to
//! canonical minutes before grouping, so `"2:30"` and `"2.5"` add up.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::timesheet::tools::duration::{format_duration, parse_duration};
use crate::timesheet::tools::error::{Result, ToolError};
use crate::timesheet::tools::io::excel_read::{self, ArtifactTable};
use crate::timesheet::tools::io::excel_write::SheetTable;
use crate::timesheet::tools::model::{SummaryKey, SummaryRow, TimesheetRow};

pub const EMPLOYEE_COLUMN: &str = "Employee";
pub const PROCESS_COLUMN: &str = "Process Name";
pub const WORK_TYPE_COLUMN: &str = "Work Type";
/// Label of the formatted total in the summary.
pub const TOTAL_TIME_COLUMN: &str = "Total Time Worked";
pub const SUMMARY_SHEET: &str = "Summary";

/// Why an artifact was left out of the summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// One or more of the key columns is absent.
    MissingColumns(Vec<String>),
    /// No label identifies a duration column unambiguously.
    MissingDurationColumn,
    /// The file could not be opened or parsed.
    Unreadable(String),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::MissingColumns(columns) => {
                write!(f, "missing required columns: {}", columns.join(", "))
            }
            RejectReason::MissingDurationColumn => f.write_str("no duration column found"),
            RejectReason::Unreadable(reason) => write!(f, "unreadable: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub source: String,
    pub reason: RejectReason,
}

/// Result of a consolidation with at least one accepted artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Consolidation {
    pub rows: Vec<SummaryRow>,
    pub rejected: Vec<Rejection>,
    pub accepted: usize,
}

impl Consolidation {
    /// Display table with the formatted total; raw minutes are not included.
    pub fn to_table(&self) -> SheetTable {
        let columns = [
            EMPLOYEE_COLUMN,
            PROCESS_COLUMN,
            WORK_TYPE_COLUMN,
            TOTAL_TIME_COLUMN,
        ]
        .into_iter()
        .map(String::from)
        .collect();

        let rows = self
            .rows
            .iter()
            .map(|row| {
                vec![
                    row.employee.clone(),
                    row.process_name.clone(),
                    row.work_type.clone(),
                    format_duration(row.total_duration_minutes),
                ]
            })
            .collect();

        SheetTable {
            sheet_name: SUMMARY_SHEET.to_string(),
            columns,
            rows,
        }
    }
}

/// Reads every file, turning read failures into rejections.
pub fn read_artifacts(
    paths: &[PathBuf],
    header_offset: usize,
) -> (Vec<ArtifactTable>, Vec<Rejection>) {
    let mut tables = Vec::new();
    let mut rejected = Vec::new();

    for path in paths {
        match excel_read::read_artifact(path, header_offset) {
            Ok(table) => tables.push(table),
            Err(error) => {
                let source = display_name(path);
                warn!(%source, %error, "skipping unreadable artifact");
                rejected.push(Rejection {
                    source,
                    reason: RejectReason::Unreadable(error.to_string()),
                });
            }
        }
    }

    (tables, rejected)
}

/// Validates, parses and groups the artifacts.
///
/// Fails with [`ToolError::AllRejected`] when no artifact is usable.
pub fn consolidate(artifacts: &[ArtifactTable]) -> Result<Consolidation> {
    consolidate_with(artifacts, Vec::new())
}

/// Like [`consolidate`], folding in rejections that happened earlier (for
/// example files that could not be read).
pub fn consolidate_with(
    artifacts: &[ArtifactTable],
    mut rejected: Vec<Rejection>,
) -> Result<Consolidation> {
    let mut totals: BTreeMap<SummaryKey, i64> = BTreeMap::new();
    let mut accepted = 0;

    for artifact in artifacts {
        match ingest(artifact) {
            Ok(rows) => {
                debug!(source = %artifact.source, rows = rows.len(), "artifact accepted");
                accepted += 1;
                for row in rows {
                    let total = totals.entry(row.key()).or_insert(0);
                    match total.checked_add(row.duration_minutes) {
                        Some(sum) => *total = sum,
                        None => {
                            warn!(
                                source = %artifact.source,
                                employee = %row.employee,
                                "duration total out of range, saturating"
                            );
                            *total = total.saturating_add(row.duration_minutes);
                        }
                    }
                }
            }
            Err(reason) => {
                warn!(source = %artifact.source, %reason, "skipping artifact");
                rejected.push(Rejection {
                    source: artifact.source.clone(),
                    reason,
                });
            }
        }
    }

    if accepted == 0 {
        return Err(ToolError::AllRejected {
            rejected: rejected.len(),
        });
    }

    let rows: Vec<SummaryRow> = totals
        .into_iter()
        .map(|(key, total)| SummaryRow::from_key(key, total))
        .collect();
    info!(
        accepted,
        rejected = rejected.len(),
        groups = rows.len(),
        "timesheets consolidated"
    );

    Ok(Consolidation {
        rows,
        rejected,
        accepted,
    })
}

/// Turns one artifact into timesheet rows, or explains why it cannot.
fn ingest(artifact: &ArtifactTable) -> std::result::Result<Vec<TimesheetRow>, RejectReason> {
    let labels: Vec<String> = artifact
        .headers
        .iter()
        .map(|label| label.trim().to_string())
        .collect();

    let position = |name: &str| labels.iter().position(|label| label == name);
    let (employee_col, process_col, work_type_col) = match (
        position(EMPLOYEE_COLUMN),
        position(PROCESS_COLUMN),
        position(WORK_TYPE_COLUMN),
    ) {
        (Some(employee), Some(process), Some(work_type)) => (employee, process, work_type),
        _ => {
            let missing = [EMPLOYEE_COLUMN, PROCESS_COLUMN, WORK_TYPE_COLUMN]
                .into_iter()
                .filter(|name| position(*name).is_none())
                .map(String::from)
                .collect();
            return Err(RejectReason::MissingColumns(missing));
        }
    };
    let duration_col =
        find_duration_column(&labels).ok_or(RejectReason::MissingDurationColumn)?;
    debug!(source = %artifact.source, column = %labels[duration_col], "duration column");

    Ok(artifact
        .rows
        .iter()
        .filter_map(|row| {
            let employee = cell_text(row, employee_col);
            let process_name = cell_text(row, process_col);
            let work_type = cell_text(row, work_type_col);
            if employee.is_empty() && process_name.is_empty() && work_type.is_empty() {
                return None;
            }
            Some(TimesheetRow {
                employee,
                process_name,
                work_type,
                duration_minutes: parse_duration(&cell_text(row, duration_col)),
            })
        })
        .collect())
}

/// Picks the duration column among trimmed labels.
///
/// Candidates mention "time" or "duration". A single candidate is taken as
/// is; among several, the first that also mentions "hrs" or "hour" wins, and
/// without one the choice is ambiguous.
pub fn find_duration_column(labels: &[String]) -> Option<usize> {
    let candidates: Vec<(usize, String)> = labels
        .iter()
        .enumerate()
        .map(|(index, label)| (index, label.to_lowercase()))
        .filter(|(_, label)| label.contains("time") || label.contains("duration"))
        .collect();

    match candidates.as_slice() {
        [] => None,
        [(index, _)] => Some(*index),
        many => many
            .iter()
            .find(|(_, label)| label.contains("hrs") || label.contains("hour"))
            .map(|(index, _)| *index),
    }
}

fn cell_text(row: &[String], index: usize) -> String {
    row.get(index)
        .map(|value| value.trim().to_string())
        .unwrap_or_default()
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
