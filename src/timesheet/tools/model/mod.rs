use std::fmt;

use chrono::NaiveDate;

use crate::timesheet::tools::error::{Result, ToolError};

/// Date format used by the portal and on the command line.
pub const DATE_FORMAT: &str = "%d/%m/%Y";

/// Outcome of processing one client during an export run.
///
/// Every record starts as [`StatusCode::Pending`] and is moved exactly once to
/// one of the terminal variants.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StatusCode {
    /// Not processed yet.
    #[default]
    Pending,
    /// The export was detected and claimed under the client's name.
    Downloaded,
    /// The client does not exist in the portal's scope list.
    NotFound,
    /// The search for the date range returned no rows.
    NoData,
    /// The export was triggered but no file appeared in time.
    DownloadTimeout,
    /// Any other failure while driving the portal.
    Error(String),
}

impl StatusCode {
    /// Short tag written to the status ledger.
    pub fn tag(&self) -> &'static str {
        match self {
            StatusCode::Pending => "",
            StatusCode::Downloaded => "Downloaded",
            StatusCode::NotFound => "NotFound",
            StatusCode::NoData => "NoData",
            StatusCode::DownloadTimeout => "DLFail",
            StatusCode::Error(_) => "Error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, StatusCode::Pending)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusCode::Error(reason) => write!(f, "Error ({reason})"),
            other => f.write_str(other.tag()),
        }
    }
}

/// One unit of work loaded from the roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRecord {
    pub name: String,
    pub status: StatusCode,
}

impl ClientRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: StatusCode::Pending,
        }
    }
}

/// Inclusive date window passed to the portal search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    from: NaiveDate,
    to: NaiveDate,
}

impl DateRange {
    /// Builds a range, rejecting windows that end before they start.
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self> {
        if from > to {
            return Err(ToolError::InvalidDateRange {
                from: from.format(DATE_FORMAT).to_string(),
                to: to.format(DATE_FORMAT).to_string(),
            });
        }
        Ok(Self { from, to })
    }

    /// Parses both ends from `DD/MM/YYYY` strings.
    pub fn parse(from: &str, to: &str) -> Result<Self> {
        Self::new(parse_date(from)?, parse_date(to)?)
    }

    pub fn from(&self) -> NaiveDate {
        self.from
    }

    pub fn to(&self) -> NaiveDate {
        self.to
    }

    /// Start of the window as the portal expects it.
    pub fn from_text(&self) -> String {
        self.from.format(DATE_FORMAT).to_string()
    }

    /// End of the window as the portal expects it.
    pub fn to_text(&self) -> String {
        self.to.format(DATE_FORMAT).to_string()
    }
}

fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|_| ToolError::InvalidDate(value.to_string()))
}

/// Portal login.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// One ingested row of an exported timesheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimesheetRow {
    pub employee: String,
    pub process_name: String,
    pub work_type: String,
    pub duration_minutes: i64,
}

impl TimesheetRow {
    pub fn key(&self) -> SummaryKey {
        SummaryKey {
            employee: self.employee.clone(),
            process_name: self.process_name.clone(),
            work_type: self.work_type.clone(),
        }
    }
}

/// Aggregation key of the consolidated summary.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SummaryKey {
    pub employee: String,
    pub process_name: String,
    pub work_type: String,
}

/// Total time for one `(employee, process, work type)` combination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRow {
    pub employee: String,
    pub process_name: String,
    pub work_type: String,
    pub total_duration_minutes: i64,
}

impl SummaryRow {
    pub fn from_key(key: SummaryKey, total_duration_minutes: i64) -> Self {
        Self {
            employee: key.employee,
            process_name: key.process_name,
            work_type: key.work_type,
            total_duration_minutes,
        }
    }
}
