mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "grader-cli")]
#[command(about = "Grader CLI - Validate, run and grade Python submissions locally", long_about = None)]
struct Cli {
    /// Path to a grader config file (defaults to GRADER_CONFIG or config/grader.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a source file against the import/call denylist
    Validate {
        /// Python source file
        file: PathBuf,
    },

    /// List the available problem slugs
    Problems,

    /// Print the number of test cases declared for a problem
    Cases {
        /// Problem slug (e.g., two_sum)
        slug: String,
    },

    /// Print a problem's solution template
    Template {
        /// Problem slug
        slug: String,
    },

    /// Run a submission against one test case
    Run {
        /// Problem slug
        slug: String,

        /// Python source file
        file: PathBuf,

        /// Zero-based test case index
        #[arg(long, default_value = "0")]
        case: usize,
    },

    /// Run a submission against the full test suite
    Submit {
        /// Problem slug
        slug: String,

        /// Python source file
        file: PathBuf,
    },
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = commands::load_config(cli.config.as_deref())?;

    let passed = match cli.command {
        Commands::Validate { file } => commands::validate(config, &file).await?,
        Commands::Problems => commands::list_problems(&config).await?,
        Commands::Cases { slug } => commands::case_count(config, &slug).await?,
        Commands::Template { slug } => commands::template(&config, &slug).await?,
        Commands::Run { slug, file, case } => commands::run(config, &slug, &file, case).await?,
        Commands::Submit { slug, file } => commands::submit(config, &slug, &file).await?,
    };

    if !passed {
        std::process::exit(1);
    }
    Ok(())
}
