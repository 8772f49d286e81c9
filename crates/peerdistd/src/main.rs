//! peerdistd: the peerdist daemon.
//!
//! Single binary that owns the state store and runs peer review
//! distribution, either on a timer or once on demand:
//! - State store (redb)
//! - File roster source (LMS exports)
//! - Distributor loop
//! - Admin commands for prompts and distribution status
//!
//! # Usage
//!
//! ```text
//! peerdistd run --config /etc/peerdist/peerdist.toml
//! peerdistd cycle --as-of 1735689600
//! peerdistd prompt add --id 12 --course 3 --title "Essay 1" --due 1735603200
//! peerdistd status --prompt 12
//! ```

mod admin;
mod daemon;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use peerdist_core::{CourseId, PeerdistConfig, PromptId};

const DEFAULT_LOG_FILTER: &str = "info,peerdistd=debug,peerdist=debug";

#[derive(Parser)]
#[command(name = "peerdistd", about = "peerdist daemon")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Default)]
struct GlobalArgs {
    /// Path to peerdist.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory for persistent state. Overrides `store.path`.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Directory of LMS roster exports. Overrides `roster.dir`.
    #[arg(long, global = true)]
    roster_dir: Option<PathBuf>,

    /// Reviews per student when a prompt does not set its own.
    #[arg(long, global = true)]
    reviews: Option<u32>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Distribute reviews on a fixed interval until interrupted.
    Run {
        /// Seconds between cycles. Overrides `distribution.interval_secs`.
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Run a single distribution cycle and print its report.
    Cycle {
        /// Treat this unix time as "now".
        #[arg(long)]
        as_of: Option<u64>,
    },

    /// Manage prompts.
    Prompt {
        #[command(subcommand)]
        command: PromptCommand,
    },

    /// Show the distribution of one prompt.
    Status {
        #[arg(long)]
        prompt: PromptId,
    },
}

#[derive(Subcommand)]
enum PromptCommand {
    /// Register or update a prompt.
    Add {
        #[arg(long)]
        id: PromptId,

        #[arg(long)]
        course: CourseId,

        #[arg(long, default_value = "")]
        title: String,

        /// Due date as a unix timestamp.
        #[arg(long)]
        due: Option<u64>,

        /// Reviews per student for this prompt only.
        #[arg(long)]
        reviews: Option<u32>,

        /// Only pair students who share a section.
        #[arg(long)]
        by_section: bool,
    },

    /// List every known prompt.
    List,
}

/// Merge the config file with command-line overrides.
fn resolve_config(args: &GlobalArgs) -> anyhow::Result<PeerdistConfig> {
    let mut config = match &args.config {
        Some(path) => PeerdistConfig::from_file(path)
            .map_err(|e| anyhow::anyhow!("load {}: {e:#}", path.display()))?,
        None => PeerdistConfig::default(),
    };
    if let Some(dir) = &args.data_dir {
        config.store.path = dir.join("peerdist.redb");
    }
    if let Some(dir) = &args.roster_dir {
        config.roster.dir = dir.clone();
    }
    if let Some(n) = args.reviews {
        config.distribution.reviews_per_student = n;
    }
    config.validate()?;
    Ok(config)
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.global.log_json);

    let mut config = resolve_config(&cli.global)?;

    match cli.command {
        Command::Run { interval } => {
            if let Some(secs) = interval {
                config.distribution.interval_secs = secs;
                config.validate()?;
            }
            daemon::run(config).await
        }
        Command::Cycle { as_of } => admin::run_cycle(&config, as_of),
        Command::Prompt { command } => match command {
            PromptCommand::Add {
                id,
                course,
                title,
                due,
                reviews,
                by_section,
            } => admin::add_prompt(
                &config,
                peerdist_core::Prompt {
                    id,
                    course_id: course,
                    title,
                    due_date: due,
                    reviews_per_student: reviews,
                    distribute_by_section: by_section,
                },
            ),
            PromptCommand::List => admin::list_prompts(&config),
        },
        Command::Status { prompt } => admin::status(&config, prompt),
    }
}
