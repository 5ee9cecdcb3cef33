use clap::{Parser, Subcommand};
use morocco_rag::Result;
use morocco_rag::commands::{ask, build_index, run_chat, search, show_status};
use morocco_rag::config::{run_interactive_config, show_config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "morocco-rag")]
#[command(about = "A retrieval-augmented assistant for Morocco tourism questions")]
#[command(version)]
struct Cli {
    /// Directory holding morocco-rag.toml; relative dataset and index paths resolve against it
    #[arg(long, global = true, default_value = ".")]
    base_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama connection and generation settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Embed the dataset and rebuild the vector index
    Build {
        /// Dataset file to index instead of the configured one
        #[arg(long)]
        dataset: Option<PathBuf>,
    },
    /// Chat with the assistant in the terminal
    Chat,
    /// Answer a single question
    Ask {
        question: String,
        /// Append the retrieved entries to the answer
        #[arg(long)]
        sources: bool,
    },
    /// Show the entries closest to a query
    Search {
        query: String,
        /// Number of entries to show
        #[arg(short, long)]
        k: Option<usize>,
    },
    /// Show the state of the index and the model server
    Status,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let base_dir = cli.base_dir.as_path();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(base_dir)?;
            } else {
                run_interactive_config(base_dir)?;
            }
        }
        Commands::Build { dataset } => {
            build_index(base_dir, dataset).await?;
        }
        Commands::Chat => {
            run_chat(base_dir).await?;
        }
        Commands::Ask { question, sources } => {
            ask(base_dir, &question, sources).await?;
        }
        Commands::Search { query, k } => {
            search(base_dir, &query, k).await?;
        }
        Commands::Status => {
            show_status(base_dir).await?;
        }
    }

    Ok(())
}
