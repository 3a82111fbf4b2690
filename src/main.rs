//! Velociraptor CLI
//!
//! Builds hierarchical summary trees for documents and serves search and
//! navigation over them.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;
use velociraptor::{
    config::Config,
    engine::{Direction, Velociraptor},
    llm::LlmClient,
    node::Node,
    search::{SearchHit, explain_results},
    store::FileStore,
};

type Engine = Velociraptor<FileStore, LlmClient, LlmClient>;

/// Velociraptor - hierarchical summary trees for document retrieval
#[derive(Parser)]
#[command(name = "velociraptor")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding stored trees (overrides config)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build, summarize, embed and store a document
    Process {
        /// Path to the document file (text, pages separated by form feeds)
        document: PathBuf,

        /// Document title (defaults to the file name)
        #[arg(short, long)]
        title: Option<String>,

        /// Maximum pages per chunk
        #[arg(long)]
        max_chunk_size: Option<usize>,

        /// Pages repeated between consecutive chunks
        #[arg(long)]
        overlap: Option<usize>,
    },

    /// Search stored documents
    Search {
        /// The search query
        query: String,

        /// Restrict the search to one document
        #[arg(short, long)]
        document: Option<String>,

        /// Number of results to return
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Minimum similarity
        #[arg(long)]
        threshold: Option<f32>,

        /// Print a numbered explanation instead of the result list
        #[arg(long)]
        explain: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Display the outline of a document
    Outline {
        document_id: String,

        /// Output as JSON instead of an indented list
        #[arg(long)]
        json: bool,
    },

    /// Show parent, children, siblings and path to root of a node
    Context { node_id: String },

    /// Move from a node
    Navigate {
        node_id: String,

        #[arg(value_enum)]
        direction: Move,
    },

    /// Find sections similar to a node
    Related {
        node_id: String,

        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// Show statistics for a document
    Stats { document_id: String },

    /// List stored documents
    List,

    /// Delete a stored document
    Delete { document_id: String },

    /// Test LLM connection
    Test,
}

#[derive(Clone, Copy, ValueEnum)]
enum Move {
    Parent,
    Children,
    NextSibling,
    PreviousSibling,
    NextLeaf,
    PreviousLeaf,
}

impl From<Move> for Direction {
    fn from(m: Move) -> Self {
        match m {
            Move::Parent => Direction::Parent,
            Move::Children => Direction::Children,
            Move::NextSibling => Direction::NextSibling,
            Move::PreviousSibling => Direction::PreviousSibling,
            Move::NextLeaf => Direction::NextLeaf,
            Move::PreviousLeaf => Direction::PreviousLeaf,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = Config::load().context("Failed to load configuration")?;
    if let Some(dir) = cli.data_dir {
        config.storage.data_dir = dir;
    }

    match cli.command {
        Commands::Process {
            document,
            title,
            max_chunk_size,
            overlap,
        } => {
            if let Some(size) = max_chunk_size {
                config.chunking.max_chunk_size = size;
            }
            if let Some(overlap) = overlap {
                config.chunking.overlap_pages = overlap;
            }
            cmd_process(&config, document, title).await
        }
        Commands::Search {
            query,
            document,
            top_k,
            threshold,
            explain,
            json,
        } => {
            let engine = open_engine(&config)?;
            let hits = engine
                .search(&query, document.as_deref(), top_k, threshold)
                .await;
            print_hits(&query, &hits, explain, json)
        }
        Commands::Outline { document_id, json } => {
            let engine = open_engine(&config)?;
            let outline = engine
                .document_outline(&document_id)
                .with_context(|| format!("No outline for document '{}'", document_id))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&outline)?);
            } else {
                print!("{}", outline.format());
            }
            Ok(())
        }
        Commands::Context { node_id } => {
            let engine = open_engine(&config)?;
            let context = engine
                .node_context(&node_id)
                .with_context(|| format!("Node '{}' not found", node_id))?;
            println!("{}", serde_json::to_string_pretty(&context)?);
            Ok(())
        }
        Commands::Navigate { node_id, direction } => {
            let engine = open_engine(&config)?;
            let nodes = engine.navigate(&node_id, direction.into());
            if nodes.is_empty() {
                println!("Nothing there.");
            }
            for node in &nodes {
                print_node(node);
            }
            Ok(())
        }
        Commands::Related { node_id, top_k } => {
            let engine = open_engine(&config)?;
            let hits = engine.related_sections(&node_id, top_k);
            print_hits(&node_id, &hits, false, false)
        }
        Commands::Stats { document_id } => {
            let engine = open_engine(&config)?;
            let stats = engine
                .document_stats(&document_id)
                .with_context(|| format!("Document '{}' not found", document_id))?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
        Commands::List => cmd_list(&config),
        Commands::Delete { document_id } => {
            let engine = open_engine(&config)?;
            if engine.delete_document(&document_id)? {
                println!("Deleted document {}", document_id);
            } else {
                println!("No document {}", document_id);
            }
            Ok(())
        }
        Commands::Test => cmd_test(&config).await,
    }
}

fn open_engine(config: &Config) -> Result<Engine> {
    let store = FileStore::open(&config.storage.data_dir, config.storage.format)
        .with_context(|| {
            format!(
                "Failed to open store at '{}'",
                config.storage.data_dir.display()
            )
        })?;
    let client = LlmClient::from_config(config);
    Velociraptor::new(config, store, client.clone(), client).context("Invalid configuration")
}

async fn cmd_process(config: &Config, document: PathBuf, title: Option<String>) -> Result<()> {
    config.validate_llm().context("Invalid configuration")?;
    let engine = open_engine(config)?;

    println!("Processing document: {}", document.display());
    println!("Using model: {}", config.llm.model);

    let start = Instant::now();
    let report = engine
        .process_document(&document, title.as_deref())
        .await
        .context("Failed to process document")?;

    println!("\nDocument processed:");
    println!("  Document ID:  {}", report.document_id);
    println!("  Title:        {}", report.title);
    println!("  Nodes:        {}", report.tree.total_nodes);
    println!("  Leaves:       {}", report.tree.leaf_nodes);
    println!("  Max depth:    {}", report.tree.max_depth);
    println!(
        "  Summaries:    {}/{}",
        report.summaries.nodes_with_summaries, report.summaries.total_nodes
    );
    println!(
        "  Embeddings:   {}/{} leaves",
        report.embeddings.leaves_with_embeddings, report.embeddings.leaf_nodes
    );
    println!("  Time:         {:.2?}", start.elapsed());

    Ok(())
}

fn cmd_list(config: &Config) -> Result<()> {
    let engine = open_engine(config)?;
    let docs = engine.list_documents();

    if docs.is_empty() {
        println!("No documents stored in {}", config.storage.data_dir.display());
        return Ok(());
    }

    println!("{:<38} {:>6}  Title", "Document ID", "Nodes");
    println!("{}", "─".repeat(60));
    for doc in docs {
        println!("{:<38} {:>6}  {}", doc.document_id, doc.node_count, doc.title);
    }

    Ok(())
}

fn print_node(node: &Node) {
    println!(
        "{} [{}] level {} ({})",
        node.id,
        node.page_range_label(),
        node.level,
        node.kind
    );
    if let Some(summary) = node.summary_text() {
        println!("    {}", summary);
    }
}

fn print_hits(query: &str, hits: &[SearchHit], explain: bool, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(hits)?);
        return Ok(());
    }
    if explain {
        print!("{}", explain_results(query, hits));
        return Ok(());
    }

    if hits.is_empty() {
        println!("No matching sections found.");
        return Ok(());
    }

    println!("Results:");
    println!("{}", "─".repeat(60));
    for (i, hit) in hits.iter().enumerate() {
        println!(
            "{:>2}. {} [{}] (similarity: {:.3})",
            i + 1,
            hit.node.id,
            hit.page_range,
            hit.similarity
        );
        println!("    {}", hit.preview);
        println!();
    }
    println!("{}", "─".repeat(60));

    Ok(())
}

async fn cmd_test(config: &Config) -> Result<()> {
    println!("Testing LLM connection...\n");

    println!("Configuration:");
    println!("  API Base:  {}", config.llm.api_base);
    println!("  Model:     {}", config.llm.model);
    println!(
        "  API Key:   {}...",
        config.llm.api_key.chars().take(8).collect::<String>()
    );
    println!("  Data dir:  {}", config.storage.data_dir.display());
    println!();

    if let Err(e) = config.validate_llm() {
        println!("Configuration error: {}", e);
        return Ok(());
    }

    let client = LlmClient::from_config(config);

    println!("Sending test request...");
    match client.test_connection().await {
        Ok(()) => {
            println!("Connection successful!");
        }
        Err(e) => {
            println!("Connection failed: {}", e);
        }
    }

    Ok(())
}
