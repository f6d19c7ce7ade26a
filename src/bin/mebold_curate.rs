use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use mebold_curate::app::{AllResult, App};
use mebold_curate::archive::ExpandResult;
use mebold_curate::config::ConfigLoader;
use mebold_curate::error::CurateError;
use mebold_curate::layout::FixResult;
use mebold_curate::output::{ConsoleOutput, JsonOutput, OutputMode};
use mebold_curate::sidecar::PruneResult;

#[derive(Parser)]
#[command(name = "mebold-curate")]
#[command(about = "Post-conversion curation for the multi-echo BOLD BIDS dataset")]
#[command(version, author)]
struct Cli {
    /// JSON configuration file (defaults to ./mebold-curate.json when present)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Overrides dataset_root from the configuration
    #[arg(long, global = true)]
    dataset_root: Option<Utf8PathBuf>,

    /// Overrides sourcedata_root from the configuration
    #[arg(long, global = true)]
    sourcedata_root: Option<Utf8PathBuf>,

    /// Print the stage result as JSON instead of progress lines
    #[arg(long, global = true)]
    non_interactive: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Expand DICOM zip archives in place and delete them")]
    Unzip,
    #[command(about = "Fix file naming, split noise scans and rewrite scans.tsv files")]
    Fix,
    #[command(about = "Drop unneeded fields from JSON sidecars")]
    Clean,
    #[command(about = "Run unzip, fix and clean in order")]
    All,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<CurateError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &CurateError) -> u8 {
    match error {
        CurateError::MissingDatasetRoot
        | CurateError::MissingSourcedataRoot
        | CurateError::ConfigRead(_)
        | CurateError::ConfigParse(_)
        | CurateError::InvalidConfig(_) => 2,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let mut config = ConfigLoader::resolve(cli.config.as_deref())?;
    if let Some(root) = cli.dataset_root {
        config.dataset_root = Some(root);
    }
    if let Some(root) = cli.sourcedata_root {
        config.sourcedata_root = Some(root);
    }
    let app = App::new(config);

    match (cli.command, output_mode) {
        (Commands::Unzip, OutputMode::Interactive) => {
            print_unzip_summary(&app.expand_archives(&ConsoleOutput)?);
        }
        (Commands::Unzip, OutputMode::NonInteractive) => {
            JsonOutput::print_unzip(&app.expand_archives(&JsonOutput)?).into_diagnostic()?;
        }
        (Commands::Fix, OutputMode::Interactive) => {
            print_fix_summary(&app.fix_layout(&ConsoleOutput)?);
        }
        (Commands::Fix, OutputMode::NonInteractive) => {
            JsonOutput::print_fix(&app.fix_layout(&JsonOutput)?).into_diagnostic()?;
        }
        (Commands::Clean, OutputMode::Interactive) => {
            print_clean_summary(&app.prune_sidecars(&ConsoleOutput)?);
        }
        (Commands::Clean, OutputMode::NonInteractive) => {
            JsonOutput::print_clean(&app.prune_sidecars(&JsonOutput)?).into_diagnostic()?;
        }
        (Commands::All, OutputMode::Interactive) => {
            print_all_summary(&app.run_all(&ConsoleOutput)?);
        }
        (Commands::All, OutputMode::NonInteractive) => {
            JsonOutput::print_all(&app.run_all(&JsonOutput)?).into_diagnostic()?;
        }
    }
    Ok(())
}

const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const RESET: &str = "\x1b[0m";

fn print_unzip_summary(result: &ExpandResult) {
    println!("{CYAN}unzip summary{RESET}");
    let entries: usize = result.archives.iter().map(|archive| archive.entries).sum();
    println!(
        "{GREEN}expanded archives: {} ({entries} files){RESET}",
        result.archives.len()
    );
}

fn print_fix_summary(result: &FixResult) {
    println!("{CYAN}fix summary{RESET}");
    let changed = result.sessions.iter().filter(|s| s.changed()).count();
    println!(
        "{GREEN}sessions: {} ({changed} changed){RESET}",
        result.sessions.len()
    );
    for session in &result.sessions {
        if !session.changed() && session.partial.is_empty() && session.unindexed.is_empty() {
            continue;
        }
        println!(
            "{GREEN}{}/{}: {} renamed, {} split, {} field maps, {} rows added{RESET}",
            session.subject,
            session.session,
            session.renamed.len(),
            session.split.len(),
            session.fieldmaps.len(),
            session.rows_added
        );
        for partial in &session.partial {
            println!("{YELLOW}   partial scan left whole: {partial}{RESET}");
        }
        for entry in &session.unindexed {
            println!("{YELLOW}   not listed in scans.tsv: {entry}{RESET}");
        }
    }
}

fn print_clean_summary(result: &PruneResult) {
    println!("{CYAN}clean summary{RESET}");
    println!(
        "{GREEN}sidecars: {} scanned, {} rewritten, {} keys removed{RESET}",
        result.scanned, result.rewritten, result.keys_removed
    );
}

fn print_all_summary(result: &AllResult) {
    print_unzip_summary(&result.unzip);
    print_fix_summary(&result.fix);
    print_clean_summary(&result.clean);
}
