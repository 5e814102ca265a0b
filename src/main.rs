use anyhow::{Context, Result};
use clap::Parser;
use relval::cli::{Cli, Command, InspectArgs, RelValArgs};
use relval::columnar::JsonContainer;
use relval::config::RelValConfig;
use relval::orchestrator::{InputMode, Orchestrator, RunReport};
use relval::verdict::Verdict;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for progress and warnings
fn init_tracing(debug: bool, quiet: bool) {
    let level = if debug {
        tracing::Level::DEBUG
    } else if quiet {
        tracing::Level::WARN
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn print_run_report(report: &RunReport) {
    if let Some(audit) = &report.size_audit {
        println!("{}", audit.to_table_string());
    }

    if report.mode == InputMode::SimDirs {
        println!("=== Summary ===");
        for category in &report.categories {
            let key = category.summary_key();
            let flagged = report.summary.get(key).map_or(0, <[_]>::len);
            println!("{:<10} {} flagged", key, flagged);
        }
    }

    if !report.failures.is_empty() {
        println!();
        println!("Failed comparisons ({}):", report.failures.len());
        for failure in &report.failures {
            println!("  - {}: {}", failure.group, failure.error);
        }
    }
}

fn run_rel_val(args: RelValArgs, mut config: RelValConfig) -> Result<ExitCode> {
    args.apply_to(&mut config);
    let request = args.to_request()?;
    let orchestrator = Orchestrator::new(&config, JsonContainer)?;

    let report = orchestrator.run(&request)?;
    print_run_report(&report);

    Ok(match report.mode {
        InputMode::Files => ExitCode::from(u8::try_from(report.exit_code).unwrap_or(1)),
        InputMode::SimDirs => ExitCode::SUCCESS,
    })
}

/// Exit status 1 when the verdict lists items for any requested severity
fn run_inspect(args: InspectArgs) -> Result<ExitCode> {
    let verdict = Verdict::from_file(&args.file)?;
    let flagged = verdict.flagged(&args.severity);

    for (severity, items) in &flagged {
        println!("Items for severity {}:", severity);
        for item in *items {
            println!("    {}", item);
        }
    }

    Ok(if flagged.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    init_tracing(cli.debug, cli.quiet);

    let config = RelValConfig::load(cli.config.as_deref()).with_context(|| {
        format!(
            "Cannot load configuration{}",
            cli.config
                .as_ref()
                .map(|p| format!(" from {}", p.display()))
                .unwrap_or_default()
        )
    })?;

    match cli.command {
        Command::RelVal(args) => run_rel_val(args, config),
        Command::Inspect(args) => run_inspect(args),
    }
}
