//! Stepwise CLI: the main entry point.
//!
//! Commands:
//! - `run`: Drive a run with a replayed model transcript
//! - `actions`: Print the action catalog the model sees
//! - `config`: Print the effective or default configuration

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use stepwise_config::{ActionFormatKind, AppConfig};

mod commands;

#[derive(Parser)]
#[command(
    name = "stepwise",
    about = "Stepwise: step-loop agent execution engine",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Config file to use instead of ~/.stepwise/config.toml
    #[arg(short, long, global = true, env = "STEPWISE_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Json,
    FlexibleJson,
}

impl From<FormatArg> for ActionFormatKind {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Json => Self::Json,
            FormatArg::FlexibleJson => Self::FlexibleJson,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent on an objective
    Run {
        /// What the agent should accomplish
        #[arg(short, long)]
        objective: String,

        /// Transcript of model responses, separated by `---` lines
        #[arg(short, long)]
        responses: PathBuf,

        /// Override agent.max_steps
        #[arg(long)]
        max_steps: Option<usize>,

        /// Override agent.action_format
        #[arg(long, value_enum)]
        format: Option<FormatArg>,

        /// Override tools.workspace_root
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Do not print steps as they happen
        #[arg(short, long)]
        quiet: bool,

        /// Print the finished run as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the action catalog
    Actions {
        /// Override agent.action_format
        #[arg(long, value_enum)]
        format: Option<FormatArg>,
    },

    /// Print configuration
    Config {
        /// Print built-in defaults instead of the effective configuration
        #[arg(long)]
        default: bool,

        /// Print the config file path only
        #[arg(long, conflicts_with = "default")]
        path: bool,
    },
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose { "debug" } else { "warn" };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => {
            let mut config = AppConfig::load_from(path)?;
            config.apply_env(|key| std::env::var(key).ok());
            config.validate()?;
            config
        }
        None => AppConfig::load()?,
    };
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json_logs);

    match cli.command {
        Commands::Run {
            objective,
            responses,
            max_steps,
            format,
            workspace,
            quiet,
            json,
        } => {
            let config = load_config(cli.config.as_ref())?;
            commands::run::run(
                config,
                commands::run::RunArgs {
                    objective,
                    responses,
                    max_steps,
                    format: format.map(Into::into),
                    workspace,
                    quiet,
                    json,
                },
            )
            .await?
        }
        Commands::Actions { format } => {
            let config = load_config(cli.config.as_ref())?;
            commands::actions::run(&config, format.map(Into::into))?
        }
        Commands::Config { default, path } => {
            if path {
                commands::config_cmd::path(cli.config.as_ref());
            } else if default {
                commands::config_cmd::show_default();
            } else {
                let config = load_config(cli.config.as_ref())?;
                commands::config_cmd::show(&config)?;
            }
        }
    }

    Ok(())
}
