mod cmd;

use clap::{Parser, Subcommand};
use std::process;
use tracing_subscriber::EnvFilter;

/// Used when `RUST_LOG` is unset. Only names targets this binary logs under.
const DEFAULT_LOG_FILTER: &str = "dhanvantri=info";

#[derive(Parser)]
#[command(name = "dhanvantri")]
#[command(version)]
#[command(about = "Symptom analysis and chat relay for a local Ollama engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Analyze a symptom description and print the result as JSON
    Analyze {
        #[arg(trailing_var_arg = true, required = true)]
        symptoms: Vec<String>,
    },
    /// Stream a chat reply to stdout
    Chat {
        #[arg(trailing_var_arg = true, required = true)]
        prompt: Vec<String>,
    },
    Version,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve { host, port } => cmd::serve(host, port).await,
        Commands::Analyze { symptoms } => cmd::analyze(&symptoms.join(" ")).await,
        Commands::Chat { prompt } => cmd::chat(&prompt.join(" ")).await,
        Commands::Version => cmd::version().await,
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}
