use anyhow::{bail, Context, Result};
use chatdocs_ai::{RAGOrchestrator, Session};
use chatdocs_core::{
    extract_paths, init_tracing, AnswerWithSources, ChatDocsConfig, ConfigManager,
    ExtractionOutcome, PlainTextExtractor,
};
use chatdocs_vector::{ChunkStats, Chunker, ChunkerConfig};
use clap::{Parser, Subcommand};
use colored::Colorize;
use futures::StreamExt;
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

#[derive(Parser)]
#[command(name = "chatdocs")]
#[command(about = "ChatDocs - ask questions about your documents", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to ./.chatdocs.toml, then ~/.chatdocs/config.toml)
    #[arg(short, long, global = true, env = "CHATDOCS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index documents and answer questions read from stdin
    Chat {
        /// Text or Markdown files to chat with
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Write a default configuration file
    InitConfig {
        /// Where to write it (defaults to ~/.chatdocs/config.toml)
        #[arg(short, long)]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Show how documents would be chunked, without embedding anything
    Inspect {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::InitConfig { path, force } => handle_init_config(path, force),
        Commands::Chat { ref files } => match load_config(cli.config.as_ref()) {
            Ok(config) => handle_chat(config, files).await,
            Err(e) => Err(e),
        },
        Commands::Inspect { ref files } => match load_config(cli.config.as_ref()) {
            Ok(config) => handle_inspect(&config, files),
            Err(e) => Err(e),
        },
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> Result<ChatDocsConfig> {
    let manager = match path {
        Some(path) => ConfigManager::from_path(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => ConfigManager::load().context("Failed to load configuration")?,
    };
    let config = manager.into_config();
    init_tracing(&config.logging);
    Ok(config)
}

fn handle_init_config(path: Option<PathBuf>, force: bool) -> Result<()> {
    let path = match path {
        Some(path) => path,
        None => ConfigManager::user_config_path()
            .context("Could not determine the home directory; pass --path")?,
    };
    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    ConfigManager::create_default_config(&path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("{} {}", "Wrote".green().bold(), path.display());
    Ok(())
}

fn read_documents(files: &[PathBuf]) -> Result<ExtractionOutcome> {
    let outcome = extract_paths(&PlainTextExtractor, files);
    for skipped in &outcome.skipped {
        eprintln!(
            "{} {}: {}",
            "Skipped".yellow().bold(),
            skipped.name,
            skipped.reason
        );
    }
    if outcome.documents.is_empty() {
        bail!("None of the given files contained usable text");
    }
    Ok(outcome)
}

fn handle_inspect(config: &ChatDocsConfig, files: &[PathBuf]) -> Result<()> {
    let outcome = read_documents(files)?;
    let chunker = Chunker::new(ChunkerConfig::from(&config.chunking))?;
    let chunks = chunker.chunk_documents(&outcome.documents);

    for document in &outcome.documents {
        let count = chunks
            .iter()
            .filter(|c| c.source_document_id == document.id)
            .count();
        println!(
            "{}: {} chars, {} chunks",
            document.id.as_str().cyan().bold(),
            document.text.chars().count(),
            count.to_string().yellow()
        );
    }

    let stats = ChunkStats::from_chunks(outcome.documents.len(), &chunks);
    println!();
    println!("{}: {}", "Documents".cyan().bold(), stats.documents);
    println!("{}: {}", "Chunks".cyan().bold(), stats.chunks);
    println!(
        "{}: min {}, max {}, mean {:.1}",
        "Chunk length".cyan().bold(),
        stats.min_len,
        stats.max_len,
        stats.mean_len
    );
    if stats.oversized > 0 {
        println!("{}: {}", "Oversized".red().bold(), stats.oversized);
    }
    Ok(())
}

async fn handle_chat(config: ChatDocsConfig, files: &[PathBuf]) -> Result<()> {
    let outcome = read_documents(files)?;
    let rag = RAGOrchestrator::from_config(config).context("Failed to set up providers")?;
    let mut session = Session::new();

    let report = rag
        .build_index(&mut session, &outcome.documents)
        .await
        .context("Failed to build the index")?;
    info!("Session {} started", session.id());
    println!(
        "{} {} documents into {} chunks ({}-dimensional {} embeddings)",
        "Indexed".green().bold(),
        report.documents,
        report.indexed_chunks,
        report.dimension,
        rag.embedder().provider_name()
    );
    if !report.skipped_batches.is_empty() {
        eprintln!(
            "{} {} embedding batches could not be indexed",
            "Warning:".yellow().bold(),
            report.skipped_batches.len()
        );
    }
    println!(
        "Type a question, {} to forget the conversation, {} to exit.",
        "/clear".cyan(),
        "/quit".cyan()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{} ", ">".green().bold());
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        match question {
            "" => continue,
            "/quit" | "/exit" => break,
            "/clear" => {
                session.clear_memory();
                println!("{}", "Conversation cleared.".dimmed());
                continue;
            }
            _ => {}
        }

        match answer(&rag, &mut session, question).await {
            Ok(answer) => print_sources(&answer),
            Err(e) => eprintln!("\n{} {:#}", "Error:".red().bold(), e),
        }
    }
    Ok(())
}

/// Stream one answer to stdout as it arrives.
async fn answer(
    rag: &RAGOrchestrator,
    session: &mut Session,
    question: &str,
) -> Result<AnswerWithSources> {
    let mut turn = rag.begin_turn(session, question).await?;
    let mut stdout = std::io::stdout();
    while let Some(fragment) = turn.next().await {
        match fragment {
            Ok(text) => {
                write!(stdout, "{}", text)?;
                stdout.flush()?;
            }
            // finish_turn reports the failure
            Err(_) => break,
        }
    }
    writeln!(stdout)?;
    Ok(rag.finish_turn(session, turn).await?)
}

fn print_sources(answer: &AnswerWithSources) {
    if !answer.citations.is_empty() {
        println!("{}", "Citations:".cyan().bold());
        for (i, citation) in answer.citations.iter().enumerate() {
            println!("  [{}] {}", i + 1, citation);
        }
    }
    if !answer.sources.is_empty() {
        println!("{}", "Sources:".cyan().bold());
        for (i, source) in answer.sources.iter().enumerate() {
            println!(
                "  [{}] {} #{} ({})",
                i + 1,
                source.document_id,
                source.sequence_index,
                format!("{:.3}", source.score).yellow()
            );
        }
    }
}
