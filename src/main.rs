//! deckhand: supervisor daemon and thin management CLI.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use tracing_subscriber::EnvFilter;

use deckhand::{Config, DockerRuntime, Extension, ExtensionSupervisor, JsonFileStore};

#[derive(Parser)]
#[command(name = "deckhand", version, about = "Supervise container-packaged extensions")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the reconciliation loop until interrupted (default)
    Run,
    /// List running containers
    List,
    /// Show the installed extension list
    Installed,
    /// Install an extension and stream the image pull
    Install {
        /// Catalog identifier (registry/repository)
        identifier: String,
        /// Logical extension name
        name: String,
        /// Image tag
        tag: String,
        /// Engine-level container configuration as a JSON object
        #[arg(long)]
        permissions: Option<String>,
        /// Install without enabling
        #[arg(long)]
        disabled: bool,
    },
    /// Uninstall an extension by name
    Uninstall {
        /// Logical extension name
        name: String,
    },
    /// Print a container's combined stdout/stderr log
    Logs {
        /// Container name
        name: String,
    },
    /// Print per-container CPU and memory percentages
    Stats,
    /// Fetch and print the extension catalog
    Manifest,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("deckhand=info")),
        )
        .init();

    let config = Config::from_env()?;
    let runtime = Arc::new(DockerRuntime::new());
    let store = Arc::new(JsonFileStore::new(config.settings_path.clone()));
    let supervisor = Arc::new(ExtensionSupervisor::new(runtime, store, &config).await?);

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            let looper = supervisor.clone();
            let loop_handle = tokio::spawn(async move { looper.run().await });

            tokio::signal::ctrl_c().await?;
            tracing::info!("shutting down");
            supervisor.stop();
            // The stop flag is observed at the next tick boundary.
            loop_handle.await?;
        }
        Command::List => {
            for container in supervisor.list_containers().await? {
                println!("{}\t{}", container.name, container.image);
            }
        }
        Command::Installed => {
            let installed = supervisor.installed_extensions().await;
            println!("{}", serde_json::to_string_pretty(&installed)?);
        }
        Command::Install {
            identifier,
            name,
            tag,
            permissions,
            disabled,
        } => {
            let permissions = match permissions {
                Some(raw) => serde_json::from_str(&raw)?,
                None => serde_json::Value::Null,
            };
            let extension = Extension {
                identifier,
                name,
                tag,
                permissions,
                enabled: !disabled,
            };
            let mut progress = supervisor.install_extension(extension).await?;
            while let Some(line) = progress.next().await {
                println!("{}", line?);
            }
        }
        Command::Uninstall { name } => {
            supervisor.uninstall_extension(&name).await?;
        }
        Command::Logs { name } => {
            for line in supervisor.load_logs(&name).await? {
                println!("{line}");
            }
        }
        Command::Stats => {
            let stats = supervisor.load_stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Manifest => {
            let manifest = supervisor.fetch_manifest().await?;
            println!("{}", serde_json::to_string_pretty(&manifest)?);
        }
    }

    Ok(())
}
