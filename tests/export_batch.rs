mod common;

use std::fs;
use std::time::Duration;

use common::{Script, ScriptedFactory};
use tempfile::tempdir;
use timesheet_tools::export::{ExportOptions, ExportOrchestrator};
use timesheet_tools::io::roster::Roster;
use timesheet_tools::model::{ClientRecord, Credentials, DateRange, StatusCode};
use timesheet_tools::watch;
use timesheet_tools::workflow;

fn fast_options(download_dir: &std::path::Path, password: &str) -> ExportOptions {
    let range = DateRange::parse("01/04/2024", "30/04/2024").expect("date range");
    let mut options = ExportOptions::new(
        range,
        Credentials::new("robot", password),
        download_dir.to_path_buf(),
    );
    options.export_timeout = Duration::from_millis(200);
    options.poll_interval = Duration::from_millis(20);
    options.inter_client_delay = Duration::ZERO;
    options
}

#[test]
fn mixed_outcomes_are_isolated_per_client() {
    let temp_dir = tempdir().expect("temporary directory");
    let downloads = temp_dir.path().join("downloads");
    fs::create_dir_all(&downloads).expect("download dir");
    fs::write(downloads.join("A.xlsx"), b"previous run").expect("pre-existing artifact");

    let factory = ScriptedFactory::new(
        &downloads,
        &[
            ("A", Script::Export),
            ("B", Script::Missing),
            ("C", Script::Silent),
        ],
    );
    let opened = factory.opened.clone();
    let closed = factory.closed.clone();
    let orchestrator = ExportOrchestrator::new(factory, fast_options(&downloads, "secret"));

    let mut clients = vec![
        ClientRecord::new("A"),
        ClientRecord::new("B"),
        ClientRecord::new("C"),
    ];
    let ledger = orchestrator.run(&mut clients);

    assert_eq!(ledger.count("Downloaded"), 1);
    assert_eq!(ledger.count("NotFound"), 1);
    assert_eq!(ledger.count("DLFail"), 1);
    assert_eq!(clients[0].status, StatusCode::Downloaded);
    assert_eq!(clients[1].status, StatusCode::NotFound);
    assert_eq!(clients[2].status, StatusCode::DownloadTimeout);

    // One session per client, each released.
    assert_eq!(opened.get(), 3);
    assert_eq!(closed.get(), 3);

    let claimed = downloads.join("A_1.xlsx");
    assert_eq!(ledger.entries()[0].artifact.as_ref(), Some(&claimed));
    assert_eq!(
        fs::read(downloads.join("A.xlsx")).expect("pre-existing artifact kept"),
        b"previous run"
    );

    let on_disk = watch::snapshot(&downloads, "xlsx").expect("listing");
    assert_eq!(on_disk.len(), 2);
    assert!(on_disk.contains(&claimed));
}

#[test]
fn no_data_and_login_failures_do_not_stop_the_batch() {
    let temp_dir = tempdir().expect("temporary directory");
    let downloads = temp_dir.path().to_path_buf();

    let factory = ScriptedFactory::new(&downloads, &[("Empty Co", Script::Empty)]);
    let orchestrator = ExportOrchestrator::new(factory, fast_options(&downloads, "secret"));
    let mut clients = vec![ClientRecord::new("Empty Co")];
    orchestrator.run(&mut clients);
    assert_eq!(clients[0].status, StatusCode::NoData);

    let factory = ScriptedFactory::new(&downloads, &[("Acme", Script::Export)]);
    let closed = factory.closed.clone();
    let orchestrator = ExportOrchestrator::new(factory, fast_options(&downloads, "wrong"));
    let mut clients = vec![ClientRecord::new("Acme"), ClientRecord::new("Acme")];
    let ledger = orchestrator.run(&mut clients);

    assert_eq!(ledger.count("Error"), 2);
    assert!(
        matches!(&clients[1].status, StatusCode::Error(reason) if reason.contains("login rejected"))
    );
    assert_eq!(closed.get(), 2);
    assert!(watch::snapshot(&downloads, "xlsx").expect("listing").is_empty());
}

#[test]
fn download_workflow_writes_status_ledger_after_the_batch() {
    let temp_dir = tempdir().expect("temporary directory");
    let downloads = temp_dir.path().join("downloads_temp");
    let reports = temp_dir.path().join("consolidated_reports");
    let roster_path = temp_dir.path().join("clients_list.csv");
    fs::write(
        &roster_path,
        "Client,Manager\nGlobex,Hank\nInitech,Bill\n,Nobody\nUmbrella,Alice\n",
    )
    .expect("roster written");

    let roster = Roster::load(&roster_path).expect("roster loaded");
    let factory = ScriptedFactory::new(
        &downloads,
        &[
            ("Globex", Script::Export),
            ("Initech", Script::Empty),
            ("Umbrella", Script::Export),
        ],
    );
    let orchestrator = ExportOrchestrator::new(factory, fast_options(&downloads, "secret"));

    let report =
        workflow::download_timesheets(&roster, &reports, &orchestrator).expect("download run");

    assert_eq!(report.status_file, reports.join(workflow::STATUS_FILE));
    let ledger = fs::read_to_string(&report.status_file).expect("ledger read");
    assert_eq!(
        ledger,
        "Client,Manager,Status\n\
         Globex,Hank,Downloaded\n\
         Initech,Bill,NoData\n\
         ,Nobody,\n\
         Umbrella,Alice,Downloaded\n"
    );
    assert!(downloads.join("Globex.xlsx").exists());
    assert!(downloads.join("Umbrella.xlsx").exists());

    // The claimed exports feed straight into consolidation.
    let summary_path = reports.join(workflow::SUMMARY_FILE);
    let consolidation =
        workflow::consolidate_reports(&[downloads.clone()], &summary_path, 3)
            .expect("consolidation");
    assert_eq!(consolidation.accepted, 2);
    assert_eq!(consolidation.rows.len(), 2);
    assert!(consolidation.rows.iter().all(|row| row.total_duration_minutes == 90));
    assert!(summary_path.exists());
}
