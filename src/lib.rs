//! Core library for the timesheet-tools command line application.
//!
//! The library exposes the orchestration helpers that power the command-line
//! interface as well as the integration tests. Responsibilities are kept
//! narrow: duration handling lives in [`timesheet::tools::duration`], the
//! remote portal capability in [`timesheet::tools::remote`], download
//! detection in [`timesheet::tools::watch`], the per-client batch in
//! [`timesheet::tools::export`], spreadsheet aggregation in
//! [`timesheet::tools::consolidate`], file adapters under
//! [`timesheet::tools::io`], and the file-level entry points in
//! [`timesheet::tools::workflow`].

pub mod timesheet;

pub use timesheet::tools::{
    Result, ToolError, consolidate, duration, error, export, io, model, remote, watch, workflow,
};
