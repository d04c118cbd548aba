use anyhow::Context;
use clap::Parser;
use log::{error, info};
use savepointdb::harness::{CaseReport, MatrixCase, TestDb};
use savepointdb::ConnectionConfig;

/// Run the updater x checker consistency matrix against a fresh database
#[derive(Parser, Debug)]
#[command(name = "savepointdb-probe", version, about)]
struct Cli {
    /// Print case ids and exit
    #[arg(long)]
    list: bool,

    /// Only run cases whose id contains this text
    #[arg(long, value_name = "SUBSTR")]
    filter: Option<String>,

    /// Log every statement and scope end
    #[arg(long)]
    echo: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        log::LevelFilter::Debug
    } else if cli.echo {
        log::LevelFilter::Info
    } else {
        log::LevelFilter::Warn
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    let cases: Vec<MatrixCase> = MatrixCase::all()
        .into_iter()
        .filter(|case| cli.filter.as_deref().is_none_or(|f| case.id().contains(f)))
        .collect();

    if cli.list {
        for case in &cases {
            println!("{}", case.id());
        }
        return Ok(());
    }

    let config = ConnectionConfig::new("probe").echo(cli.echo);
    let db = TestDb::setup(config).context("failed to set up the probe database")?;
    info!("running {} case(s)", cases.len());

    let reports: Vec<CaseReport> = cases.iter().map(|case| case.report(&db)).collect();
    db.teardown().context("failed to tear down the probe database")?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for report in &reports {
            match &report.error {
                None => println!("PASS  {}", report.id),
                Some(err) => println!("FAIL  {}  {}", report.id, err),
            }
        }
    }

    let failed = reports.iter().filter(|r| !r.passed).count();
    if failed > 0 {
        error!("{} of {} case(s) failed", failed, reports.len());
        std::process::exit(1);
    }
    Ok(())
}
