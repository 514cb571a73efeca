//! orgdisk CLI - bulk export and cleanup of organization cloud disks

use clap::Parser;
use orgdisk::auth::{StaticToken, TokenExchange, TokenProvider};
use orgdisk::batch::{write_usage_report, BatchReport, BatchRunner, DiskApiFactory};
use orgdisk::config::{CliArgs, Commands, OutputFormat, RunConfig};
use orgdisk::core::Shutdown;
use orgdisk::error::{IoResultExt, OrgDiskError, Result};
use orgdisk::storage::DiskApiConfig;
use orgdisk::users::load_users;
use std::io::Write;
use std::sync::Mutex;
use tracing::warn;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();

    if let Err(e) = init_logging(&args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    match run(args).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn init_logging(args: &CliArgs) -> Result<()> {
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // stdout is reserved for summaries
    let console = if args.log_json {
        fmt::layer()
            .json()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let file = match &args.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_path(path)?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file))
                    .boxed(),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .init();
    Ok(())
}

fn token_provider(args: &CliArgs) -> Result<Box<dyn TokenProvider>> {
    if let Some(token) = &args.token {
        return Ok(Box::new(StaticToken::new(token.clone())));
    }

    match (&args.client_id, &args.client_secret) {
        (Some(id), Some(secret)) => Ok(Box::new(
            TokenExchange::new(reqwest::Client::new(), id.clone(), secret.clone(), args.subject_kind)
                .with_endpoint(args.oauth_url.clone()),
        )),
        _ => Err(OrgDiskError::config(
            "either --token or both --client-id and --client-secret are required",
        )),
    }
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [y/N] ", prompt);
    std::io::stdout().flush()?;

    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn print_report(report: &BatchReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => report.print_summary(),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
    }
    Ok(())
}

async fn run(args: CliArgs) -> Result<bool> {
    let users = load_users(&args.users)?;
    if users.is_empty() {
        warn!("No users found in {}", args.users.display());
    }

    let tokens = token_provider(&args)?;
    let stores = DiskApiFactory::new(DiskApiConfig {
        base_url: args.api_url.clone(),
        ..Default::default()
    })?;

    let shutdown = Shutdown::shared();
    shutdown.install_ctrl_c();

    let runner = BatchRunner::new(tokens.as_ref(), &stores)
        .with_subject(args.subject_kind)
        .with_shutdown(shutdown);

    match &args.command {
        Commands::Download(download) => {
            let config = RunConfig::from_download_args(download)?;
            let report = runner.download(&users, &config).await;

            if !args.quiet {
                if config.format == OutputFormat::Text {
                    for summary in report.users.iter().filter_map(|u| u.summary.as_ref()) {
                        summary.print_summary();
                    }
                }
                print_report(&report, config.format)?;
            }
            if let Some(path) = &download.report {
                report.write_json(path)?;
            }

            let complete = report
                .users
                .iter()
                .all(|u| u.summary.as_ref().is_some_and(|s| s.is_complete()));
            Ok(report.failed() == 0 && complete)
        }

        Commands::Info { report: path } => {
            let (rows, report) = runner.info(&users).await;
            write_usage_report(path, &rows)?;

            if !args.quiet {
                report.print_summary();
                println!("Usage report written to {}", path.display());
            }
            Ok(report.failed() == 0)
        }

        Commands::Purge { permanent, yes } => {
            let target = if *permanent { "permanently delete" } else { "move to trash" };
            let prompt = format!("This will {} all files of {} users. Continue?", target, users.len());
            if !*yes && !confirm(&prompt)? {
                println!("Aborted");
                return Ok(true);
            }

            let report = runner.purge(&users, *permanent).await;
            if !args.quiet {
                report.print_summary();
            }
            Ok(report.failed() == 0)
        }
    }
}
