use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use timesheet_tools::export::{ExportOptions, ExportOrchestrator};
use timesheet_tools::io::excel_read::EXPORT_HEADER_OFFSET;
use timesheet_tools::io::roster::Roster;
use timesheet_tools::model::{Credentials, DateRange};
use timesheet_tools::remote::webdriver::{PortalProfile, WebDriverFactory};
use timesheet_tools::workflow;
use timesheet_tools::{Result, ToolError};
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    if let Err(error) = init_logging(cli.verbose).and_then(|()| run(cli)) {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| ToolError::Logging(error.to_string()))
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Download(args) => execute_download(args),
        Command::Consolidate(args) => execute_consolidate(args),
    }
}

fn execute_download(args: DownloadArgs) -> Result<()> {
    // Everything that can abort the batch is checked before any client runs.
    let date_range = DateRange::parse(&args.from, &args.to)?;
    let roster = Roster::load(&args.roster)?;
    let mut profile = PortalProfile::load(&args.profile)?;
    if args.headed {
        profile.browser.headless = false;
    }

    fs::create_dir_all(&args.download_dir)?;
    let download_dir = fs::canonicalize(&args.download_dir)?;
    let factory = WebDriverFactory::new(
        args.webdriver_url,
        profile,
        download_dir.clone(),
        Duration::from_secs(args.results_timeout),
    )?;

    let mut options = ExportOptions::new(
        date_range,
        Credentials::new(args.username, args.password),
        download_dir,
    );
    options.export_timeout = Duration::from_secs(args.export_timeout);
    options.inter_client_delay = Duration::from_millis(args.delay_ms);

    let orchestrator = ExportOrchestrator::new(factory, options);
    let report = workflow::download_timesheets(&roster, &args.report_dir, &orchestrator)?;

    for entry in report.ledger.entries() {
        println!("{:<12} {}", entry.status.tag(), entry.name);
    }
    println!(
        "{} of {} client(s) downloaded; status written to {}",
        report.ledger.count("Downloaded"),
        report.ledger.len(),
        report.status_file.display()
    );
    Ok(())
}

fn execute_consolidate(args: ConsolidateArgs) -> Result<()> {
    let output = args
        .output
        .unwrap_or_else(|| args.report_dir.join(workflow::SUMMARY_FILE));
    let consolidation = workflow::consolidate_reports(&args.inputs, &output, args.header_offset)?;

    for rejection in &consolidation.rejected {
        println!("skipped {}: {}", rejection.source, rejection.reason);
    }
    println!(
        "{} summary row(s) from {} file(s) written to {}",
        consolidation.rows.len(),
        consolidation.accepted,
        output.display()
    );
    Ok(())
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Download per-client timesheet exports and consolidate them."
)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Export every client of the roster from the portal.
    Download(DownloadArgs),
    /// Merge exported workbooks into one summary.
    Consolidate(ConsolidateArgs),
}

#[derive(clap::Args)]
struct DownloadArgs {
    /// CSV roster with a `Client` column.
    #[arg(long, default_value = "clients_list.csv")]
    roster: PathBuf,

    /// First day of the range, DD/MM/YYYY.
    #[arg(long)]
    from: String,

    /// Last day of the range, DD/MM/YYYY.
    #[arg(long)]
    to: String,

    /// JSON portal profile (URL, element locators, browser options).
    #[arg(long)]
    profile: PathBuf,

    #[arg(long, env = "TIMESHEET_USERNAME")]
    username: String,

    #[arg(long, env = "TIMESHEET_PASSWORD", hide_env_values = true)]
    password: String,

    /// WebDriver endpoint (msedgedriver, chromedriver or a Selenium grid).
    #[arg(long, default_value = "http://localhost:9515")]
    webdriver_url: String,

    /// Directory the browser downloads into; artifacts are claimed here.
    #[arg(long, default_value = "downloads_temp")]
    download_dir: PathBuf,

    /// Directory receiving the status ledger.
    #[arg(long, default_value = "consolidated_reports")]
    report_dir: PathBuf,

    /// Seconds to wait for an export to land on disk.
    #[arg(long, default_value_t = 30)]
    export_timeout: u64,

    /// Seconds to wait for search results before treating a client as empty.
    #[arg(long, default_value_t = 5)]
    results_timeout: u64,

    /// Pause between clients, in milliseconds.
    #[arg(long, default_value_t = 1000)]
    delay_ms: u64,

    /// Show the browser window even if the profile asks for headless mode.
    #[arg(long)]
    headed: bool,
}

#[derive(clap::Args)]
struct ConsolidateArgs {
    /// Exported workbooks, or directories containing them.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Summary workbook path [default: <report-dir>/Consolidated_Summary.xlsx].
    #[arg(long)]
    output: Option<PathBuf>,

    #[arg(long, default_value = "consolidated_reports")]
    report_dir: PathBuf,

    /// Sheet rows above the column labels in each export.
    #[arg(long, default_value_t = EXPORT_HEADER_OFFSET)]
    header_offset: usize,
}
