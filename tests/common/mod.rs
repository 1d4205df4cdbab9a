#![allow(dead_code)]

use std::cell::Cell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use rust_xlsxwriter::Workbook;
use timesheet_tools::model::{Credentials, DateRange};
use timesheet_tools::remote::{RemoteSession, SessionFactory};
use timesheet_tools::{Result, ToolError};

pub const HEADERS: [&str; 4] = ["Employee", "Process Name", "Work Type", "Time (Hrs)"];

/// Writes a workbook laid out like a portal export: three title rows, the
/// labels on row 4, data below. Numeric-looking cells are stored as numbers.
pub fn write_export(path: &Path, headers: &[&str], rows: &[&[&str]]) {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.write_string(0, 0, "Timesheet Report").expect("title");
    sheet.write_string(1, 0, "Generated by portal").expect("subtitle");

    for (col, header) in headers.iter().enumerate() {
        sheet.write_string(3, col as u16, *header).expect("header");
    }
    for (row_idx, row) in rows.iter().enumerate() {
        let sheet_row = (row_idx + 4) as u32;
        for (col, cell) in row.iter().enumerate() {
            let written = match cell.parse::<f64>() {
                Ok(number) => sheet.write_number(sheet_row, col as u16, number),
                Err(_) => sheet.write_string(sheet_row, col as u16, *cell),
            };
            written.expect("cell");
        }
    }
    workbook.save(path).expect("export saved");
}

/// How the fake portal answers for one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    /// Scope exists, rows exist, export lands on disk.
    Export,
    /// Scope is not listed.
    Missing,
    /// Scope exists, search returns nothing.
    Empty,
    /// Rows exist but the export never appears.
    Silent,
}

/// Hands out scripted sessions and counts how many were opened and closed.
pub struct ScriptedFactory {
    scripts: Rc<HashMap<String, Script>>,
    download_dir: PathBuf,
    pub opened: Rc<Cell<usize>>,
    pub closed: Rc<Cell<usize>>,
    exports: Rc<Cell<usize>>,
}

impl ScriptedFactory {
    pub fn new(download_dir: &Path, scripts: &[(&str, Script)]) -> Self {
        Self {
            scripts: Rc::new(
                scripts
                    .iter()
                    .map(|(name, script)| (name.to_string(), *script))
                    .collect(),
            ),
            download_dir: download_dir.to_path_buf(),
            opened: Rc::new(Cell::new(0)),
            closed: Rc::new(Cell::new(0)),
            exports: Rc::new(Cell::new(0)),
        }
    }
}

impl SessionFactory for ScriptedFactory {
    fn open(&self) -> Result<Box<dyn RemoteSession>> {
        self.opened.set(self.opened.get() + 1);
        Ok(Box::new(ScriptedSession {
            scripts: Rc::clone(&self.scripts),
            download_dir: self.download_dir.clone(),
            closed: Rc::clone(&self.closed),
            exports: Rc::clone(&self.exports),
            authenticated: false,
            current: None,
        }))
    }
}

struct ScriptedSession {
    scripts: Rc<HashMap<String, Script>>,
    download_dir: PathBuf,
    closed: Rc<Cell<usize>>,
    exports: Rc<Cell<usize>>,
    authenticated: bool,
    current: Option<(String, Script)>,
}

impl RemoteSession for ScriptedSession {
    fn authenticate(&mut self, credentials: &Credentials) -> Result<()> {
        if credentials.password != "secret" {
            return Err(ToolError::Remote("login rejected".into()));
        }
        self.authenticated = true;
        Ok(())
    }

    fn select_scope(&mut self, name: &str) -> Result<bool> {
        assert!(self.authenticated, "scope selected before login");
        match self.scripts.get(name) {
            Some(Script::Missing) | None => Ok(false),
            Some(script) => {
                self.current = Some((name.to_string(), *script));
                Ok(true)
            }
        }
    }

    fn set_date_range(&mut self, range: &DateRange) -> Result<()> {
        assert!(range.from() <= range.to());
        Ok(())
    }

    fn has_result_rows(&mut self) -> Result<bool> {
        Ok(!matches!(self.current, Some((_, Script::Empty))))
    }

    fn trigger_export(&mut self) -> Result<()> {
        if let Some((name, Script::Export)) = &self.current {
            let index = self.exports.get() + 1;
            self.exports.set(index);
            let path = self.download_dir.join(format!("TimesheetExport ({index}).xlsx"));
            write_export(
                &path,
                &HEADERS,
                &[&[name.as_str(), "Payroll", "Production", "1.5"]],
            );
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closed.set(self.closed.get() + 1);
        Ok(())
    }
}
