use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord, Writer};

use crate::timesheet::tools::error::{Result, ToolError};
use crate::timesheet::tools::model::ClientRecord;

/// Column holding the client name in the input roster.
pub const CLIENT_COLUMN: &str = "Client";
/// Column populated with the outcome tag in the written ledger.
pub const STATUS_COLUMN: &str = "Status";

/// The client roster as loaded from CSV.
///
/// All columns are kept so the ledger can be written back with the same
/// layout plus a `Status` column. Rows with an empty client cell are carried
/// along but never processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roster {
    source: PathBuf,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    client_index: usize,
}

impl Roster {
    /// Loads a roster, failing when the file is missing or has no `Client`
    /// column.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ToolError::MissingInput(path.to_path_buf()));
        }

        let mut reader = ReaderBuilder::new().flexible(true).from_path(path)?;
        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|header| header.trim_start_matches('\u{feff}').trim().to_string())
            .collect();
        let client_index = headers
            .iter()
            .position(|header| header == CLIENT_COLUMN)
            .ok_or_else(|| ToolError::MissingClientColumn(path.to_path_buf()))?;

        let mut rows = Vec::new();
        for record in reader.records() {
            let record: StringRecord = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(Self {
            source: path.to_path_buf(),
            headers,
            rows,
            client_index,
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Pending records for every row with a non-empty client name, in file
    /// order.
    pub fn clients(&self) -> Vec<ClientRecord> {
        self.rows
            .iter()
            .filter_map(|row| self.client_name(row))
            .map(ClientRecord::new)
            .collect()
    }

    /// Writes the roster with a `Status` column filled from `clients`.
    ///
    /// `clients` must be the records returned by [`clients`](Self::clients),
    /// in the same order. An existing `Status` column is overwritten. Rows
    /// wider than the header line get blank header cells for their extra
    /// fields, so the status never lands on user data.
    pub fn write_with_status(&self, path: &Path, clients: &[ClientRecord]) -> Result<()> {
        let width = self
            .rows
            .iter()
            .map(Vec::len)
            .fold(self.headers.len(), usize::max);
        let mut headers = self.headers.clone();
        headers.resize(width, String::new());
        let status_index = match headers.iter().position(|header| header == STATUS_COLUMN) {
            Some(index) => index,
            None => {
                headers.push(STATUS_COLUMN.to_string());
                headers.len() - 1
            }
        };

        let mut writer = Writer::from_path(path)?;
        writer.write_record(&headers)?;

        let mut statuses = clients.iter().map(|client| client.status.tag());
        for row in &self.rows {
            let mut cells = row.clone();
            cells.resize(headers.len(), String::new());
            cells[status_index] = match self.client_name(row) {
                Some(_) => statuses.next().unwrap_or_default().to_string(),
                None => String::new(),
            };
            writer.write_record(&cells)?;
        }

        writer.flush()?;
        Ok(())
    }

    fn client_name(&self, row: &[String]) -> Option<String> {
        row.get(self.client_index)
            .map(|cell| cell.trim())
            .filter(|cell| !cell.is_empty())
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timesheet::tools::model::StatusCode;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn loads_clients_and_skips_blank_names() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("clients.csv");
        fs::write(&path, "Region,Client\nEU,Acme\nUS,\nEU, Globex \n").unwrap();

        let roster = Roster::load(&path).unwrap();
        let names: Vec<_> = roster.clients().into_iter().map(|c| c.name).collect();

        assert_eq!(names, vec!["Acme", "Globex"]);
    }

    #[test]
    fn missing_client_column_is_fatal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("clients.csv");
        fs::write(&path, "Name\nAcme\n").unwrap();

        assert!(matches!(
            Roster::load(&path),
            Err(ToolError::MissingClientColumn(_))
        ));
        assert!(matches!(
            Roster::load(&dir.path().join("absent.csv")),
            Err(ToolError::MissingInput(_))
        ));
    }

    #[test]
    fn writes_status_column() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("clients.csv");
        fs::write(&input, "Client,Owner\nAcme,ann\n,bob\nGlobex,cat\n").unwrap();
        let roster = Roster::load(&input).unwrap();

        let mut clients = roster.clients();
        clients[0].status = StatusCode::Downloaded;
        clients[1].status = StatusCode::DownloadTimeout;

        let output = dir.path().join("clients_with_status.csv");
        roster.write_with_status(&output, &clients).unwrap();

        let written = fs::read_to_string(&output).unwrap();
        assert_eq!(
            written,
            "Client,Owner,Status\nAcme,ann,Downloaded\n,bob,\nGlobex,cat,DLFail\n"
        );
    }

    #[test]
    fn ragged_rows_keep_their_extra_fields() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("clients.csv");
        fs::write(&input, "Client,Owner\nAcme,ann,note\nGlobex,bob\nInitech,x,y,z\n").unwrap();
        let roster = Roster::load(&input).unwrap();

        let mut clients = roster.clients();
        clients[0].status = StatusCode::Downloaded;
        clients[1].status = StatusCode::NoData;
        clients[2].status = StatusCode::NotFound;

        let output = dir.path().join("clients_with_status.csv");
        roster.write_with_status(&output, &clients).unwrap();

        assert_eq!(
            fs::read_to_string(&output).unwrap(),
            "Client,Owner,,,Status\n\
             Acme,ann,note,,Downloaded\n\
             Globex,bob,,,NoData\n\
             Initech,x,y,z,NotFound\n"
        );
    }

    #[test]
    fn overwrites_existing_status_column() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("clients.csv");
        fs::write(&input, "Client,Status\nAcme,Error\n").unwrap();
        let roster = Roster::load(&input).unwrap();

        let mut clients = roster.clients();
        clients[0].status = StatusCode::NoData;
        let output = dir.path().join("out.csv");
        roster.write_with_status(&output, &clients).unwrap();

        assert_eq!(fs::read_to_string(&output).unwrap(), "Client,Status\nAcme,NoData\n");
    }
}
