use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use paperflow::config::PaperflowConfig;
use paperflow::events::{PromptChoice, Transport};
use paperflow::machine::WorkflowEngine;
use paperflow::operation::{Operation, OperationError, OperationOutput, OperationRequest};
use paperflow::registry::SessionRegistry;
use paperflow::session::SessionId;
use paperflow::storage::{FsStorage, OutputRef};
use paperflow::telemetry::init_telemetry;

#[derive(Parser)]
#[command(name = "paperflow")]
#[command(about = "Session workflow engine for staged file batch operations")]
#[command(
    long_about = "Paperflow tracks per-user sessions through a multi-step staging \
                  workflow: collect files, reorder/delete/insert them, then hand the \
                  confirmed ordered batch to an operation backend. Transports and \
                  operation backends are injected; this binary wires filesystem \
                  staging with logging stand-ins."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine until interrupted
    Run,
    /// Print the resolved configuration
    CheckConfig,
    /// Write a default paperflow.toml next to the binary
    InitConfig {
        /// Overwrite an existing paperflow.toml
        #[arg(long)]
        force: bool,
    },
}

/// Transport stand-in that writes outbound notifications to the log. Real
/// deployments inject a messaging transport instead.
struct LoggingTransport;

#[async_trait::async_trait]
impl Transport for LoggingTransport {
    async fn status(&self, session: &SessionId, text: &str) -> Result<()> {
        info!(session = %session, text, "outbound status");
        Ok(())
    }

    async fn prompt(
        &self,
        session: &SessionId,
        text: &str,
        choices: &[PromptChoice],
    ) -> Result<()> {
        info!(session = %session, text, choices = choices.len(), "outbound prompt");
        Ok(())
    }

    async fn deliver(&self, session: &SessionId, output: &OutputRef, caption: &str) -> Result<()> {
        info!(session = %session, output = %output, caption, "outbound artifact");
        Ok(())
    }
}

/// Operation stand-in for deployments that haven't wired a backend yet.
struct UnconfiguredOperation;

#[async_trait::async_trait]
impl Operation for UnconfiguredOperation {
    async fn execute(&self, request: &OperationRequest) -> Result<OperationOutput, OperationError> {
        Err(OperationError::Rejected(format!(
            "No backend is configured for the {} operation.",
            request.kind
        )))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    PaperflowConfig::load_env_file()?;
    let config = PaperflowConfig::load()?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            init_telemetry(&config.observability.log_level)?;
            run(config).await
        }
        Commands::CheckConfig => {
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        Commands::InitConfig { force } => {
            if std::path::Path::new("paperflow.toml").exists() && !force {
                anyhow::bail!("paperflow.toml already exists (use --force to overwrite)");
            }
            PaperflowConfig::default().save_to_file("paperflow.toml")?;
            println!("Wrote paperflow.toml");
            Ok(())
        }
    }
}

async fn run(config: PaperflowConfig) -> Result<()> {
    let storage = Arc::new(FsStorage::new(
        &config.storage.input_root,
        &config.storage.output_root,
    ));
    let engine = Arc::new(WorkflowEngine::new(
        storage,
        Arc::new(LoggingTransport),
        Arc::new(UnconfiguredOperation),
        config.storage.position_prefix_width,
    ));
    let registry = SessionRegistry::new(
        engine,
        config.engine.session_queue_depth,
        Duration::from_secs(config.engine.session_idle_secs),
    );

    info!(
        input_root = %config.storage.input_root,
        output_root = %config.storage.output_root,
        "paperflow engine running, press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c().await?;
    info!(sessions = registry.active_sessions().await, "shutting down");
    registry.shutdown().await;
    Ok(())
}
