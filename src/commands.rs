use anyhow::{Context, Result, bail};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::embeddings::EmbeddingProvider;
use crate::embeddings::ollama::OllamaClient;
use crate::engine::{Engine, QueryOutcome};
use crate::filter::PredicateSet;
use crate::mcp::McpServer;
use crate::mcp::tools::register_ticket_tools;
use crate::records::{RecordStore, parse_timestamp};

/// Attribute filters given on the command line
#[derive(Debug, Clone, Default)]
pub struct FilterArgs {
    pub category: Option<String>,
    pub priority: Option<String>,
    pub status: Option<String>,
    pub since: Option<String>,
    pub until: Option<String>,
}

impl FilterArgs {
    fn into_predicates(self) -> Result<PredicateSet> {
        let parse = |raw: Option<String>, name: &str| {
            raw.map(|value| {
                parse_timestamp(&value).map_err(|e| anyhow::anyhow!("Invalid --{}: {}", name, e))
            })
            .transpose()
        };

        Ok(PredicateSet {
            category: self.category,
            priority: self.priority,
            status: self.status,
            start_date: parse(self.since, "since")?,
            end_date: parse(self.until, "until")?,
        })
    }
}

/// Ollama-backed provider, or `None` when the client cannot be built
fn build_provider(config: &Config) -> Option<Arc<dyn EmbeddingProvider>> {
    match OllamaClient::new(config) {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            warn!("Embedding provider unavailable: {:#}", e);
            None
        }
    }
}

fn load_engine(config: &Config) -> Result<Engine> {
    let dataset = config.dataset_path();
    Engine::load(config, build_provider(config)).with_context(|| {
        format!(
            "Failed to load ticket dataset from {} (run 'ticket-search embed' if it has no embeddings yet)",
            dataset.display()
        )
    })
}

/// Route a free-text query and print the outcome
#[inline]
pub async fn run_query(query: &str, json: bool) -> Result<()> {
    let config = Config::load_default().context("Failed to load configuration")?;
    let engine = load_engine(&config)?;

    let outcome = engine.route(query).await?;
    print_outcome(&outcome, json)
}

/// Semantic search with an optional result count override
#[inline]
pub async fn semantic_search(query: &str, top_k: Option<usize>, json: bool) -> Result<()> {
    let config = Config::load_default().context("Failed to load configuration")?;
    let engine = load_engine(&config)?;

    let top_k = top_k.unwrap_or(config.retrieval.top_k);
    let outcome = engine.semantic_search(query, top_k).await?;
    print_outcome(&outcome, json)
}

/// Apply explicit attribute filters
#[inline]
pub fn filter_tickets(args: FilterArgs, json: bool) -> Result<()> {
    let config = Config::load_default().context("Failed to load configuration")?;
    let engine = load_engine(&config)?;

    let outcome = engine.filter(args.into_predicates()?)?;
    print_outcome(&outcome, json)
}

/// List every ticket in the dataset
#[inline]
pub fn list_tickets() -> Result<()> {
    let config = Config::load_default().context("Failed to load configuration")?;
    let store = RecordStore::load(config.dataset_path())?;

    if store.is_empty() {
        println!("No tickets in {}", config.dataset_path().display());
        return Ok(());
    }

    println!("Support Tickets ({} total):", store.len());
    println!();

    for record in store.iter() {
        println!("🎫 #{} {}", record.id, record.title);
        println!(
            "   {} | {} | {} | {}",
            record.category,
            record.priority,
            record.status,
            record.created_at.format("%Y-%m-%d %H:%M")
        );
        if record.embedding.is_empty() {
            println!("   ⚠️  Not embedded");
        }
    }

    Ok(())
}

/// Compute embeddings for every ticket and write the enriched dataset
#[inline]
pub async fn embed_dataset(input: Option<PathBuf>, output: Option<PathBuf>) -> Result<()> {
    let config = Config::load_default().context("Failed to load configuration")?;
    let input = input.unwrap_or_else(|| config.dataset_path());
    let output = output.unwrap_or_else(|| config.dataset_path());
    let dimension = config.ollama.embedding_dimension as usize;

    let store = RecordStore::load(&input)?;
    if store.is_empty() {
        println!("No tickets to embed in {}", input.display());
        return Ok(());
    }

    let client = OllamaClient::new(&config).context("Failed to create Ollama client")?;
    let records = store.into_records();
    let total = records.len();

    info!("Embedding {} tickets from {}", total, input.display());

    let bar = ProgressBar::new(total as u64).with_style(
        ProgressStyle::with_template("{spinner} [{pos}/{len}] Embedding tickets {wide_bar}")
            .context("Invalid progress template")?,
    );

    let progress = bar.clone();
    let records = tokio::task::spawn_blocking(move || -> Result<_> {
        let mut records = records;
        let batch_size = client.batch_size() as usize;

        for batch in records.chunks_mut(batch_size) {
            let texts: Vec<String> = batch.iter().map(|record| record.embedding_text()).collect();
            let embeddings = client.generate_embeddings_batch(&texts)?;

            for (record, result) in batch.iter_mut().zip(embeddings) {
                if result.embedding.len() != dimension {
                    bail!(
                        "Model returned {} dimensions for ticket {}, expected {}. Update 'embedding_dimension' with 'ticket-search config'.",
                        result.embedding.len(),
                        record.id,
                        dimension
                    );
                }
                record.embedding = result.embedding;
            }
            progress.inc(batch.len() as u64);
        }

        Ok(records)
    })
    .await
    .context("Embedding task failed")??;

    bar.finish_and_clear();

    RecordStore::from_records(records)?.save(&output)?;

    println!("✅ Embedded {} tickets", total);
    println!("   Written to {}", output.display());
    Ok(())
}

/// Show dataset and embedding provider status
#[inline]
pub fn show_status() -> Result<()> {
    let config = Config::load_default().unwrap_or_default();

    println!("📊 Ticket Search Status Report");
    println!("{}", "=".repeat(50));
    println!();

    println!("🗂️  Dataset Status:");
    let dataset = config.dataset_path();
    match RecordStore::load(&dataset) {
        Ok(store) => {
            let embedded = store.iter().filter(|r| !r.embedding.is_empty()).count();
            println!("   ✅ Loaded {}", dataset.display());
            println!("   🎫 Tickets: {}", store.len());
            println!("   🧮 Embedded: {}/{}", embedded, store.len());
            if embedded < store.len() {
                println!("   ⚠️  Run 'ticket-search embed' before semantic search");
            }
        }
        Err(e) => {
            println!("   ❌ Dataset unavailable - {}", e);
        }
    }

    println!();
    println!("🤖 Ollama Status:");
    match OllamaClient::new(&config) {
        Ok(client) => match client.health_check() {
            Ok(()) => {
                println!(
                    "   ✅ Ollama: Connected ({}:{})",
                    config.ollama.host, config.ollama.port
                );
                println!("   📋 Model: {}", config.ollama.model);
                println!(
                    "   🔢 Embedding Dimension: {}",
                    config.ollama.embedding_dimension
                );
            }
            Err(e) => {
                println!("   ⚠️  Ollama: Unhealthy - {:#}", e);
            }
        },
        Err(e) => {
            println!("   ❌ Ollama: Failed to create client - {}", e);
        }
    }

    println!();
    println!("🔎 Retrieval Settings:");
    println!(
        "   top_k={} filter_limit={} recent_window_days={} title_preview_chars={}",
        config.retrieval.top_k,
        config.retrieval.filter_limit,
        config.retrieval.recent_window_days,
        config.retrieval.title_preview_chars
    );

    println!();
    println!("💡 Next Steps:");
    println!("   • Use 'ticket-search embed' to compute ticket embeddings");
    println!("   • Use 'ticket-search query \"<text>\"' to search tickets");
    println!("   • Use 'ticket-search serve' to start the MCP server for AI assistants");

    Ok(())
}

/// Start the MCP server on stdio
#[inline]
pub async fn serve_mcp() -> Result<()> {
    let config = Config::load_default().context("Failed to load configuration")?;

    let provider = build_provider(&config);
    if let Ok(client) = OllamaClient::new(&config) {
        if let Err(e) = client.health_check() {
            warn!("Ollama is not healthy, semantic queries may fail: {:#}", e);
        }
    }

    let engine = Arc::new(
        Engine::load(&config, provider).context("Failed to initialize retrieval engine")?,
    );

    let server = McpServer::new(
        "ticket-search".to_string(),
        env!("CARGO_PKG_VERSION").to_string(),
    )
    .with_instructions("Support ticket search MCP server".to_string());
    register_ticket_tools(&server, &engine).await;
    let server = Arc::new(server);

    // stdout carries the protocol, so status goes to stderr
    eprintln!(
        "✅ MCP server ready with {} tickets: search_tickets, semantic_search, filter_tickets, list_tickets",
        engine.store().len()
    );
    eprintln!("Press Ctrl+C to stop the server");

    tokio::select! {
        result = Arc::clone(&server).serve_stdio() => {
            if let Err(e) = result {
                error!("MCP server error: {}", e);
                return Err(e);
            }
            info!("MCP server stopped normally");
        }
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\n📴 Received interrupt signal, shutting down...");
        }
    }

    Ok(())
}

/// Print an outcome as pretty JSON or as a short report
#[inline]
pub fn print_outcome(outcome: &QueryOutcome, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
        return Ok(());
    }

    println!("🔎 Strategy: {}", outcome.strategy);
    if !outcome.predicates_used.is_empty() {
        println!(
            "   Predicates: {}",
            serde_json::to_string(&outcome.predicates_used)?
        );
    }
    println!("   Results: {}", outcome.result_count);
    println!();

    for (result, preview) in outcome.results.iter().zip(&outcome.preview) {
        match result.score {
            Some(score) => println!("🎫 #{} {} ({:.3})", preview.id, preview.title, score),
            None => println!("🎫 #{} {}", preview.id, preview.title),
        }
        println!(
            "   {} | {} | {}",
            preview.category, preview.priority, preview.status
        );
    }

    if outcome.result_count > outcome.preview.len() {
        println!(
            "   … and {} more",
            outcome.result_count - outcome.preview.len()
        );
    }

    println!();
    println!("{}", outcome.summary);
    Ok(())
}
