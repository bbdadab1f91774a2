use anyhow::Context;
use clap::{Parser, Subcommand};
use manual_qa_embed::{EmbeddingProvider, FastEmbedProvider, MockEmbeddingProvider};
use manual_qa_retriever::{
    CachePaths, Fingerprint, GroupDetector, IndexOutcome, ManualsData, Retriever, RetrieverConfig,
    SearchHit, fingerprint, simple_keyword_search,
};
use serde::Serialize;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::{Level, warn};

const MOCK_MODEL_NAME: &str = "mock-hash-384";
const MOCK_DIMENSION: usize = 384;
const PREVIEW_CHARS: usize = 240;

/// Search owner's manuals with semantic embeddings and keyword fallback.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for persisted indices (overrides the config file)
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Embedding model name (overrides the config file)
    #[arg(long)]
    model: Option<String>,

    /// Use deterministic hashing embeddings instead of a real model
    #[arg(long)]
    mock_embeddings: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Chunk plain-text manuals and write them as a manuals JSON file
    Ingest {
        /// Manuals JSON to create or extend
        #[arg(short, long)]
        output: PathBuf,
        /// A document as GROUP=PATH, e.g. "MG Astor=astor.txt"; repeatable
        #[arg(long = "doc", value_parser = parse_doc, required = true)]
        docs: Vec<(String, PathBuf)>,
        /// Words per chunk (overrides the config file)
        #[arg(long)]
        chunk_size: Option<usize>,
        /// Words shared by consecutive chunks (overrides the config file)
        #[arg(long)]
        overlap: Option<usize>,
    },
    /// Build the vector index for a manuals file, or confirm the cached one
    Index {
        /// Manuals JSON file
        manuals: PathBuf,
        /// Re-encode even if a cached index exists
        #[arg(long)]
        force_rebuild: bool,
        /// Cache key to use instead of the content fingerprint
        #[arg(long)]
        fingerprint: Option<String>,
    },
    /// Search the manuals
    Search {
        /// Manuals JSON file
        manuals: PathBuf,
        /// The question to search for
        query: String,
        /// Restrict results to one group
        #[arg(short, long)]
        group: Option<String>,
        /// Pick the group from the question when --group is not given
        #[arg(long)]
        detect_group: bool,
        /// Number of results
        #[arg(short = 'k', long, default_value_t = 5)]
        top_k: usize,
        /// Keyword search only; needs no embedding model
        #[arg(long, conflicts_with = "fallback")]
        keyword: bool,
        /// Fall back to keyword search when vector search finds nothing
        #[arg(long)]
        fallback: bool,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Print the content fingerprint of a manuals file
    Fingerprint {
        /// Manuals JSON file
        manuals: PathBuf,
    },
    /// Show corpus statistics and cache status
    Stats {
        /// Manuals JSON file
        manuals: PathBuf,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum OutputFormat {
    Summary,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "summary" => Ok(OutputFormat::Summary),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid format: {s}")),
        }
    }
}

fn parse_doc(s: &str) -> Result<(String, PathBuf), String> {
    match s.split_once('=') {
        Some((group, path)) if !group.trim().is_empty() && !path.is_empty() => {
            Ok((group.trim().to_string(), PathBuf::from(path)))
        }
        _ => Err(format!("expected GROUP=PATH, got '{s}'")),
    }
}

#[derive(Serialize)]
struct GroupStats {
    group: String,
    chunks: usize,
    words: usize,
}

#[derive(Serialize)]
struct CorpusStats {
    groups: Vec<GroupStats>,
    total_chunks: usize,
    fingerprint: String,
    model_name: String,
    cache_dir: PathBuf,
    cached_index: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let level = match args.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(args).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = load_config(&args)?;

    match args.command {
        Commands::Ingest {
            ref output,
            ref docs,
            chunk_size,
            overlap,
        } => {
            let mut chunking = config.chunking;
            if let Some(chunk_size) = chunk_size {
                chunking = chunking.with_chunk_size(chunk_size);
            }
            if let Some(overlap) = overlap {
                chunking = chunking.with_overlap(overlap);
            }

            let mut manuals = if output.exists() {
                ManualsData::from_json_file(output)?
            } else {
                ManualsData::new()
            };

            for (group, path) in docs {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                let count = manuals.insert_text(group.clone(), &text, &chunking)?;
                println!("{group}: {count} chunks from {}", path.display());
            }

            manuals.to_json_file(output)?;
            println!(
                "Wrote {} groups, {} chunks to {}",
                manuals.group_count(),
                manuals.total_chunks(),
                output.display()
            );
            Ok(())
        }
        Commands::Index {
            ref manuals,
            force_rebuild,
            ref fingerprint,
        } => {
            let manuals = ManualsData::from_json_file(manuals)?;
            let fingerprint = fingerprint.clone().map(Fingerprint::new).transpose()?;
            let retriever = Retriever::new(make_provider(&args, &config), config.clone())?;

            let outcome = retriever
                .ensure_index(
                    &manuals,
                    fingerprint,
                    None,
                    force_rebuild || config.force_rebuild,
                )
                .await?;

            match outcome {
                IndexOutcome::Empty => println!("No chunks to index"),
                IndexOutcome::Loaded { rows, index_path } => {
                    println!("Index up to date: {rows} rows at {}", index_path.display())
                }
                IndexOutcome::Built {
                    rows,
                    index_path,
                    persisted: true,
                } => println!("Built index: {rows} rows saved to {}", index_path.display()),
                IndexOutcome::Built {
                    rows,
                    persisted: false,
                    ..
                } => println!("Built index: {rows} rows (not saved, see log)"),
            }
            Ok(())
        }
        Commands::Search {
            ref manuals,
            ref query,
            ref group,
            detect_group,
            top_k,
            keyword,
            fallback,
            ref format,
        } => {
            let manuals = ManualsData::from_json_file(manuals)?;
            let group = match group {
                Some(group) => Some(group.clone()),
                None if detect_group => {
                    GroupDetector::new(manuals.group_names(), &config.group_aliases)
                        .detect(query)
                        .map(str::to_string)
                }
                None => None,
            };

            let hits = if keyword {
                simple_keyword_search(&manuals, query, group.as_deref(), top_k)
                    .into_iter()
                    .map(SearchHit::Keyword)
                    .collect()
            } else {
                vector_search(&args, config, &manuals, query, group.as_deref(), top_k, fallback)
                    .await?
            };

            print_hits(&hits, group.as_deref(), format)
        }
        Commands::Fingerprint { ref manuals } => {
            let manuals = ManualsData::from_json_file(manuals)?;
            println!("{}", fingerprint(&manuals));
            Ok(())
        }
        Commands::Stats {
            ref manuals,
            ref format,
        } => {
            let manuals = ManualsData::from_json_file(manuals)?;
            let model_name = model_name(&args, &config);
            let fp = fingerprint(&manuals);
            let stats = CorpusStats {
                groups: manuals
                    .groups()
                    .map(|(group, manual)| GroupStats {
                        group: group.to_string(),
                        chunks: manual.chunks.len(),
                        words: manual
                            .chunks
                            .iter()
                            .map(|c| c.end_word.saturating_sub(c.start_word))
                            .sum(),
                    })
                    .collect(),
                total_chunks: manuals.total_chunks(),
                cached_index: CachePaths::new(&model_name, &fp, &config.cache_dir).exists(),
                fingerprint: fp.to_string(),
                model_name,
                cache_dir: config.cache_dir.clone(),
            };

            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
                OutputFormat::Summary => {
                    println!("Corpus Statistics:");
                    for group in &stats.groups {
                        println!("  {}: {} chunks", group.group, group.chunks);
                    }
                    println!("  Total chunks: {}", stats.total_chunks);
                    println!("  Fingerprint: {}", stats.fingerprint);
                    println!("  Model: {}", stats.model_name);
                    println!(
                        "  Cached index in {}: {}",
                        stats.cache_dir.display(),
                        if stats.cached_index { "yes" } else { "no" }
                    );
                }
            }
            Ok(())
        }
    }
}

/// Build or load the index, then run a vector search.
///
/// When the embedding backend is unavailable and `fallback` is set, answers
/// with keyword search instead of failing.
async fn vector_search(
    args: &Args,
    config: RetrieverConfig,
    manuals: &ManualsData,
    query: &str,
    group: Option<&str>,
    top_k: usize,
    fallback: bool,
) -> anyhow::Result<Vec<SearchHit>> {
    let retriever = Retriever::new(make_provider(args, &config), config)?;

    let result = match retriever.load_or_build(manuals).await {
        Ok(_) if fallback => retriever.search_with_fallback(query, group, top_k).await,
        Ok(_) => retriever
            .search(query, group, top_k)
            .await
            .map(|hits| hits.into_iter().map(SearchHit::Vector).collect()),
        Err(e) => Err(e),
    };

    match result {
        Err(e) if fallback && e.is_configuration() => {
            warn!("Vector search unavailable ({e}), using keyword search");
            Ok(simple_keyword_search(manuals, query, group, top_k)
                .into_iter()
                .map(SearchHit::Keyword)
                .collect())
        }
        other => other.map_err(Into::into),
    }
}

fn print_hits(
    hits: &[SearchHit],
    group: Option<&str>,
    format: &OutputFormat,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(hits)?),
        OutputFormat::Summary => {
            if hits.is_empty() {
                match group {
                    Some(group) => println!("No results in {group}"),
                    None => println!("No results"),
                }
                return Ok(());
            }
            for (rank, hit) in hits.iter().enumerate() {
                let score = match hit {
                    SearchHit::Vector(v) => format!("distance {:.4}", v.distance),
                    SearchHit::Keyword(k) => format!("keyword score {}", k.score),
                };
                println!(
                    "{}. [{} #{}] {score}",
                    rank + 1,
                    hit.group(),
                    hit.chunk_index()
                );
                println!("   {}", preview(hit.text()));
            }
        }
    }
    Ok(())
}

fn preview(text: &str) -> String {
    let mut preview: String = text.chars().take(PREVIEW_CHARS).collect();
    if text.chars().nth(PREVIEW_CHARS).is_some() {
        preview.push_str("...");
    }
    preview
}

fn load_config(args: &Args) -> anyhow::Result<RetrieverConfig> {
    let mut config = match &args.config {
        Some(path) => RetrieverConfig::load(path)?,
        None => RetrieverConfig::default(),
    };
    if let Some(cache_dir) = &args.cache_dir {
        config = config.with_cache_dir(cache_dir);
    }
    if let Some(model) = &args.model {
        config.embed.model_name = model.clone();
    }
    config.validate()?;
    Ok(config)
}

fn model_name(args: &Args, config: &RetrieverConfig) -> String {
    if args.mock_embeddings {
        MOCK_MODEL_NAME.to_string()
    } else {
        config.embed.model_name.clone()
    }
}

fn make_provider(args: &Args, config: &RetrieverConfig) -> Arc<dyn EmbeddingProvider> {
    if args.mock_embeddings {
        Arc::new(MockEmbeddingProvider::new(MOCK_MODEL_NAME, MOCK_DIMENSION))
    } else {
        Arc::new(FastEmbedProvider::new(config.embed.clone()))
    }
}
