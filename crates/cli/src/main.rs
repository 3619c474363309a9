mod commands;
mod config;
mod serve;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::{load_config, resolve, ServeFlags};

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Praxis entity status workflow engine.
#[derive(Parser)]
#[command(name = "praxis", version, about = "Praxis entity status workflow engine")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Port to listen on (default 8080)
        #[arg(long)]
        port: Option<u16>,
        /// Workflow definition file (JSON or TOML); built-in workflow if omitted
        #[arg(long)]
        workflow: Option<PathBuf>,
        /// Config file (default: ./praxis.toml when present)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Validate a workflow definition file
    Validate {
        /// Path to the workflow definition (JSON or TOML)
        file: PathBuf,
    },

    /// Print the transition rule table
    Rules {
        /// Only show this entity type
        entity_type: Option<String>,
        /// Workflow definition file; built-in workflow if omitted
        #[arg(long)]
        workflow: Option<PathBuf>,
    },

    /// Replay a list of actions against a fresh entity
    Simulate {
        /// Entity type to create
        #[arg(long = "type")]
        entity_type: String,
        /// JSON file with the steps to replay
        #[arg(long)]
        actions: PathBuf,
        /// Workflow definition file; built-in workflow if omitted
        #[arg(long)]
        workflow: Option<PathBuf>,
    },
}

/// Install the global tracing subscriber. `RUST_LOG` overrides `default`.
fn init_tracing(default: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            port,
            workflow,
            config,
        } => {
            init_tracing("praxis=info,tower_http=info");
            let settings = load_config(config.as_deref()).and_then(|file| {
                resolve(
                    file,
                    |k| std::env::var(k).ok(),
                    ServeFlags { port, workflow },
                )
            });
            let settings = match settings {
                Ok(s) => s,
                Err(msg) => {
                    report_error(&msg, cli.output, cli.quiet);
                    process::exit(1);
                }
            };
            let workflow = match commands::load_workflow(settings.workflow.as_deref()) {
                Ok(w) => w,
                Err(msg) => {
                    report_error(&msg, cli.output, cli.quiet);
                    process::exit(1);
                }
            };
            let rt = match tokio::runtime::Runtime::new() {
                Ok(rt) => rt,
                Err(e) => {
                    report_error(
                        &format!("failed to create tokio runtime: {}", e),
                        cli.output,
                        cli.quiet,
                    );
                    process::exit(1);
                }
            };
            if let Err(e) = rt.block_on(serve::start_server(workflow, settings)) {
                report_error(&format!("server error: {}", e), cli.output, cli.quiet);
                process::exit(1);
            }
        }
        Commands::Validate { file } => {
            commands::validate::cmd_validate(&file, cli.output, cli.quiet);
        }
        Commands::Rules {
            entity_type,
            workflow,
        } => {
            commands::rules::cmd_rules(
                workflow.as_deref(),
                entity_type.as_deref(),
                cli.output,
                cli.quiet,
            );
        }
        Commands::Simulate {
            entity_type,
            actions,
            workflow,
        } => {
            init_tracing("praxis=warn");
            commands::simulate::cmd_simulate(
                &entity_type,
                &actions,
                workflow.as_deref(),
                cli.output,
                cli.quiet,
            );
        }
    }
}

pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("error: {}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}
