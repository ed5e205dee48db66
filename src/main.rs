use clap::{Parser, Subcommand};
use std::path::PathBuf;
use ticket_search::Result;
use ticket_search::commands::{
    FilterArgs, embed_dataset, filter_tickets, list_tickets, run_query, semantic_search,
    serve_mcp, show_status,
};
use ticket_search::config::{run_interactive_config, show_config};

#[derive(Parser)]
#[command(name = "ticket-search")]
#[command(about = "Hybrid keyword and semantic search over support tickets")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama connection and retrieval settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Answer a free-text query, filtering or searching semantically based on its intent
    Query {
        /// Query text, e.g. "urgent payment problem"
        query: String,
        /// Print the full outcome as JSON
        #[arg(long)]
        json: bool,
    },
    /// Semantic similarity search, ignoring keyword intent
    Search {
        /// Query text
        query: String,
        /// Number of results (defaults to the configured top_k)
        #[arg(long, short = 'k')]
        top_k: Option<usize>,
        /// Print the full outcome as JSON
        #[arg(long)]
        json: bool,
    },
    /// Filter tickets by exact attributes
    Filter {
        /// Category, e.g. Payment
        #[arg(long)]
        category: Option<String>,
        /// Priority: High, Medium or Low
        #[arg(long)]
        priority: Option<String>,
        /// Status: Open, Closed or Resolved
        #[arg(long)]
        status: Option<String>,
        /// Earliest creation time (ISO 8601)
        #[arg(long)]
        since: Option<String>,
        /// Latest creation time (ISO 8601)
        #[arg(long)]
        until: Option<String>,
        /// Print the full outcome as JSON
        #[arg(long)]
        json: bool,
    },
    /// List all tickets in the dataset
    List,
    /// Compute embeddings for the dataset with Ollama
    Embed {
        /// Dataset to read (defaults to the configured dataset)
        #[arg(long)]
        input: Option<PathBuf>,
        /// Where to write the embedded dataset (defaults to the configured dataset)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Start MCP server on stdio
    Serve,
    /// Show dataset and Ollama status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config()?;
            } else {
                run_interactive_config()?;
            }
        }
        Commands::Query { query, json } => {
            run_query(&query, json).await?;
        }
        Commands::Search { query, top_k, json } => {
            semantic_search(&query, top_k, json).await?;
        }
        Commands::Filter {
            category,
            priority,
            status,
            since,
            until,
            json,
        } => {
            let args = FilterArgs {
                category,
                priority,
                status,
                since,
                until,
            };
            filter_tickets(args, json)?;
        }
        Commands::List => {
            list_tickets()?;
        }
        Commands::Embed { input, output } => {
            embed_dataset(input, output).await?;
        }
        Commands::Serve => {
            serve_mcp().await?;
        }
        Commands::Status => {
            show_status()?;
        }
    }

    Ok(())
}
