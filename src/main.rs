use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use trialsift::ai::PromptKind;
use trialsift::cli::commands::extract::ExtractOptions;
use trialsift::cli::Output;

#[derive(Parser)]
#[command(name = "trialsift")]
#[command(
    version,
    about = "Extract structured clinical-trial data through a hosted model gateway"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long)]
    verbose: bool,

    #[arg(long, short)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract structured records from plain-text documents
    Extract {
        #[arg(help = "What to extract: criteria, visit-schedule, medications, subject-number, subject-visit-dates, subject-visit-items")]
        kind: PromptKind,
        #[arg(help = "Input text files (stdin when omitted or '-')")]
        files: Vec<PathBuf>,
        #[arg(long, help = "Subject identifier for subject-level extractions")]
        subject: Option<String>,
        #[arg(long = "visit", help = "Visit name to look for (repeatable)")]
        visits: Vec<String>,
        #[arg(long, help = "Model override")]
        model: Option<String>,
        #[arg(long, short, help = "Write the JSON report to a file instead of stdout")]
        output: Option<PathBuf>,
        #[arg(long, default_value = "4", help = "Documents extracted concurrently")]
        concurrency: usize,
    },

    /// Validate configuration and API credentials
    Check {
        #[arg(long, help = "Send one small request to verify the endpoint")]
        live: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration (merged from all sources)
    Show {
        #[arg(
            short = 'f',
            long,
            default_value = "toml",
            help = "Output format: toml, json"
        )]
        format: String,
    },
    /// Show configuration file paths
    Path,
    /// Initialize configuration
    Init {
        #[arg(long, short, help = "Initialize global config")]
        global: bool,
        #[arg(long, help = "Overwrite existing config")]
        force: bool,
    },
}

/// Set up panic handler for graceful error reporting
fn setup_panic_handler() {
    let default_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |panic_info| {
        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("\n\x1b[1;31m━━━ PANIC ━━━\x1b[0m");
        eprintln!("\x1b[31mTrialSift encountered an unexpected error:\x1b[0m");
        eprintln!("  {}", message);

        if let Some(location) = panic_info.location() {
            eprintln!(
                "\x1b[90mLocation: {}:{}:{}\x1b[0m",
                location.file(),
                location.line(),
                location.column()
            );
        }
        eprintln!();

        // Backtrace when RUST_BACKTRACE=1
        default_hook(panic_info);
    }));
}

fn main() -> ExitCode {
    setup_panic_handler();

    match run_cli() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("\x1b[31mError:\x1b[0m {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Returns `false` when the command ran but did not fully succeed
fn run_cli() -> anyhow::Result<bool> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let out = if cli.quiet {
        Output::quiet()
    } else {
        Output::new()
    };

    let ok = match cli.command {
        Commands::Extract {
            kind,
            files,
            subject,
            visits,
            model,
            output,
            concurrency,
        } => trialsift::cli::commands::extract::run(
            ExtractOptions {
                kind,
                inputs: files,
                subject,
                visits,
                model,
                output,
                concurrency,
            },
            &out,
        )?,
        Commands::Check { live } => trialsift::cli::commands::check::run(live, &out)?,
        Commands::Config { action } => {
            match action {
                ConfigAction::Show { format } => {
                    trialsift::cli::commands::config::show(&format)?;
                }
                ConfigAction::Path => {
                    trialsift::cli::commands::config::path(&out)?;
                }
                ConfigAction::Init { global, force } => {
                    trialsift::cli::commands::config::init(global, force, &out)?;
                }
            }
            true
        }
    };

    Ok(ok)
}
