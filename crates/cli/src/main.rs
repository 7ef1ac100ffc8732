use anyhow::{bail, Context};
use bids_core::{BidsFixer, CoreConfig, IntendedForPolicy, Operation, RunMode, RunOutcome};
use bids_dicom::DicomHeaderReader;
use bids_types::Label;
use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "makebids")]
#[command(about = "Point fixes for BIDS-like neuroimaging datasets")]
struct Cli {
    /// BIDS-like dataset directory
    datadir: PathBuf,

    /// Substring a bare subject directory name must contain to be prefixed
    #[arg(short = 'p', long = "prefix", env = "MAKEBIDS_SUBJECT_FILTER", default_value = "")]
    prefix: String,

    /// DICOM directory used to date the scans tables
    #[arg(short = 'd', long = "dicoms", env = "MAKEBIDS_DICOM_DIR")]
    dicoms: Option<PathBuf>,

    /// Only patch TaskName for this task
    #[arg(short = 't', long = "taskname", env = "MAKEBIDS_TASK")]
    task: Option<Label>,

    /// Apply changes instead of listing them
    #[arg(long, visible_alias = "notest")]
    live: bool,

    /// Run every operation in order
    #[arg(long, conflicts_with = "operation")]
    all: bool,

    /// Operation to run, by menu number or name
    #[arg(short = 'o', long = "operation")]
    operation: Option<Operation>,

    /// List only the closest tagged image in each fieldmap's IntendedFor
    #[arg(long)]
    best_match: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.verbose) {
        eprintln!("failed to initialise logging: {e}");
        return ExitCode::FAILURE;
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Installs the global subscriber. `RUST_LOG` adds to the level chosen with `-v`.
fn init_tracing(verbosity: u8) -> anyhow::Result<()> {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("makebids={level}").parse()?)
                .add_directive(format!("bids_core={level}").parse()?)
                .add_directive(format!("bids_dicom={level}").parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .try_init()?;
    Ok(())
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let run_mode = if cli.live {
        RunMode::Live
    } else {
        RunMode::DryRun
    };
    let policy = if cli.best_match {
        IntendedForPolicy::BestMatch
    } else {
        IntendedForPolicy::All
    };

    let cfg = CoreConfig::new(&cli.datadir)
        .with_context(|| format!("invalid dataset path {}", cli.datadir.display()))?
        .with_subject_filter(cli.prefix)?
        .with_dicom_dir(cli.dicoms)
        .with_task_filter(cli.task)
        .with_run_mode(run_mode)
        .with_intended_for(policy);

    tracing::info!(
        "dataset {} ({})",
        cfg.dataset_root().display(),
        if run_mode.is_live() { "live" } else { "dry run" }
    );

    let cfg = Arc::new(cfg);
    let mut fixer = BidsFixer::new(cfg.clone(), Box::new(DicomHeaderReader::new()))?;

    if cli.all {
        for outcome in fixer.run_all()? {
            print_outcome(&outcome, run_mode);
        }
        return Ok(());
    }

    let operation = match cli.operation {
        Some(operation) => operation,
        None => prompt_operation()?,
    };

    if operation == Operation::ScanTables && cfg.dicom_dir().is_none() {
        bail!("Specify dicom directory with -d");
    }

    let outcome = fixer.run(operation)?;
    print_outcome(&outcome, run_mode);
    Ok(())
}

/// Prints the menu and reads one selection from stdin.
fn prompt_operation() -> anyhow::Result<Operation> {
    let mut stdout = io::stdout().lock();
    write!(stdout, "{}> ", Operation::menu())?;
    stdout.flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.parse::<Operation>()?)
}

fn print_outcome(outcome: &RunOutcome, run_mode: RunMode) {
    let plan = &outcome.plan;
    for change in plan.changes() {
        println!("{change}");
    }

    match outcome.report {
        Some(report) => tracing::info!(
            "{}: {} renamed, {} tables written, {} sidecars updated, {} unchanged",
            plan.operation(),
            report.renamed,
            report.tables_written,
            report.sidecars_updated,
            report.sidecars_unchanged
        ),
        None if !run_mode.is_live() && !plan.is_empty() => tracing::info!(
            "{}: {} planned changes for {}; rerun with --live to apply",
            plan.operation(),
            plan.changes().len(),
            plan.affected().join(", ")
        ),
        None => tracing::info!("{}: nothing to do", plan.operation()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_notest_is_an_alias_for_live() {
        let cli = Cli::try_parse_from(["makebids", "/data", "--notest"]).unwrap();
        assert!(cli.live);
    }

    #[test]
    fn test_operation_by_number_or_name() {
        let cli = Cli::try_parse_from(["makebids", "/data", "-o", "3"]).unwrap();
        assert_eq!(cli.operation, Some(Operation::ScanTables));

        let cli = Cli::try_parse_from(["makebids", "/data", "-o", "fieldmaps"]).unwrap();
        assert_eq!(cli.operation, Some(Operation::Fieldmaps));
    }

    #[test]
    fn test_all_conflicts_with_operation() {
        assert!(Cli::try_parse_from(["makebids", "/data", "--all", "-o", "1"]).is_err());
    }

    #[test]
    fn test_invalid_task_label_rejected() {
        assert!(Cli::try_parse_from(["makebids", "/data", "-t", "rest-state"]).is_err());
    }

    #[test]
    fn test_scans_without_dicom_dir_fails() {
        let temp = tempfile::TempDir::new().unwrap();
        let datadir = temp.path().to_str().unwrap();
        let cli = Cli::try_parse_from(["makebids", datadir, "-o", "3"]).unwrap();
        let err = run(Cli { dicoms: None, ..cli }).unwrap_err();
        assert!(err.to_string().contains("Specify dicom directory with -d"));
    }

    #[test]
    fn test_missing_dataset_fails() {
        let temp = tempfile::TempDir::new().unwrap();
        let missing = temp.path().join("missing");
        let cli =
            Cli::try_parse_from(["makebids", missing.to_str().unwrap(), "--all"]).unwrap();
        assert!(run(cli).is_err());
    }
}
