//! carestep CLI — the user-facing command-line interface.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "carestep",
    version,
    about = "Assessment and progression engine for care-staff training"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Grade submissions against their stage rubric
    Grade {
        /// Path to a submission file (.toml/.json) or directory
        #[arg(long)]
        submission: PathBuf,

        /// Only grade submissions of this stage (step1..step4)
        #[arg(long)]
        stage: Option<String>,

        /// Judge backend to use instead of the configured default
        #[arg(long)]
        provider: Option<String>,

        /// Model to ask
        #[arg(long)]
        model: Option<String>,

        /// Grade with local rules only, never calling a remote judge
        #[arg(long)]
        local: bool,

        /// Staff id for submissions that carry none
        #[arg(long)]
        staff: Option<String>,

        /// Output format: text, json
        #[arg(long, default_value = "text")]
        format: String,

        /// Write a graded record per submission into this directory
        #[arg(long)]
        output: Option<PathBuf>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Show the monthly cycle for a date
    Cycle {
        /// Reference date (YYYY-MM-DD), default today
        #[arg(long)]
        date: Option<String>,

        /// Reference time (HH:MM), default now or 00:00 with --date
        #[arg(long)]
        time: Option<String>,

        /// Output format: text, json
        #[arg(long, default_value = "text")]
        format: String,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Evaluate a score against a staff member's progression state
    Progress {
        /// Progression state JSON file
        #[arg(long, required_unless_present = "init")]
        state: Option<PathBuf>,

        /// Create a new state file at this path
        #[arg(long, conflicts_with = "state")]
        init: Option<PathBuf>,

        /// Staff id for --init
        #[arg(long, requires = "init")]
        staff: Option<String>,

        /// Starting stage for --init
        #[arg(long, requires = "init")]
        stage: Option<String>,

        /// Score of the graded attempt (0-100)
        #[arg(long, value_parser = clap::value_parser!(u32).range(0..=100))]
        score: Option<u32>,

        /// Write the decision back to the state file
        #[arg(long)]
        apply: bool,

        /// Count one more month in the current stage
        #[arg(long)]
        new_month: bool,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Show the level band for a score
    Level {
        #[arg(long, value_parser = clap::value_parser!(u32).range(0..=100))]
        score: u32,
    },

    /// Build a monthly report from graded records
    Report {
        /// Graded records (JSON array file or directory)
        #[arg(long)]
        records: PathBuf,

        /// Progression state JSON file
        #[arg(long)]
        state: PathBuf,

        /// Cycle month (YYYY-MM), default the current cycle
        #[arg(long)]
        month: Option<String>,

        /// Work pattern: day, night, night_once
        #[arg(long)]
        work_type: Option<String>,

        /// Output format: text, json, markdown
        #[arg(long, default_value = "text")]
        format: String,

        /// Save the report JSON to this file
        #[arg(long)]
        output: Option<PathBuf>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Validate submission files
    Validate {
        /// Path to a submission file or directory
        #[arg(long)]
        submission: PathBuf,
    },

    /// List available models
    ListModels {
        /// Filter to specific provider
        #[arg(long)]
        provider: Option<String>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Create starter config and example submissions
    Init,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("carestep=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Grade {
            submission,
            stage,
            provider,
            model,
            local,
            staff,
            format,
            output,
            config,
        } => {
            commands::grade::execute(commands::grade::GradeArgs {
                submission,
                stage,
                provider,
                model,
                local,
                staff,
                format,
                output,
                config,
            })
            .await
        }
        Commands::Cycle {
            date,
            time,
            format,
            config,
        } => commands::cycle::execute(date, time, format, config),
        Commands::Progress {
            state,
            init,
            staff,
            stage,
            score,
            apply,
            new_month,
            config,
        } => commands::progress::execute(commands::progress::ProgressArgs {
            state,
            init,
            staff,
            stage,
            score,
            apply,
            new_month,
            config,
        }),
        Commands::Level { score } => commands::level::execute(score),
        Commands::Report {
            records,
            state,
            month,
            work_type,
            format,
            output,
            config,
        } => commands::report::execute(commands::report::ReportArgs {
            records,
            state,
            month,
            work_type,
            format,
            output,
            config,
        }),
        Commands::Validate { submission } => commands::validate::execute(submission),
        Commands::ListModels { provider, config } => {
            commands::list_models::execute(provider, config)
        }
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
