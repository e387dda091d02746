use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use docrank_core::config::{resolve_with_base, Config, Settings};
use docrank_core::{ChunkStatistics, DocumentLoader, SearchHit, SearchStrategy};
use docrank_embed::embedder_from_settings;
use docrank_hybrid::{load_index, save_index, Index, Ingestor, Retrieval, Retriever};
use docrank_vector::CorpusStore;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "Usage: docrank <command> [args...]

Commands:
  ingest [dir]                         chunk, embed and store every document in dir
  query \"<q>\" [--k N] [--source S] [--strategy semantic|lexical|hybrid]
  code <code>                          exact-code lookup in the reference document
  topic \"<topic>\" [source...]          rank candidates pooled from the given documents
  debug \"<q>\" [--k N]                  compare semantic, lexical and hybrid passes
  stats                                corpus statistics";

#[derive(Debug, Default)]
struct QueryArgs {
    text: Option<String>,
    k: Option<usize>,
    source: Option<String>,
    strategy: Option<SearchStrategy>,
    rest: Vec<String>,
}

fn flag_value<'a>(args: &'a [String], i: usize, flag: &str) -> Result<&'a str> {
    args.get(i + 1).map(String::as_str).ok_or_else(|| anyhow!("{flag} requires a value"))
}

fn parse_query_args(args: &[String]) -> Result<QueryArgs> {
    let mut out = QueryArgs::default();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--k" | "-k" => {
                let v = flag_value(args, i, "--k")?;
                out.k = Some(v.parse().map_err(|_| anyhow!("--k requires a number, got '{v}'"))?);
                i += 1;
            }
            "--source" | "-s" => {
                out.source = Some(flag_value(args, i, "--source")?.to_string());
                i += 1;
            }
            "--strategy" => {
                out.strategy = Some(flag_value(args, i, "--strategy")?.parse()?);
                i += 1;
            }
            other if other.starts_with('-') => bail!("unknown flag {other}"),
            other if out.text.is_none() => out.text = Some(other.to_string()),
            other => out.rest.push(other.to_string()),
        }
        i += 1;
    }
    Ok(out)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn print_retrieval(retrieval: &Retrieval) {
    println!("{}", retrieval.context);
    if !retrieval.is_empty() {
        println!("\nSources:");
        for citation in retrieval.citations() {
            println!("  {citation}");
        }
    }
}

fn print_hits(label: &str, hits: &[SearchHit]) {
    println!("\n{label}:");
    if hits.is_empty() {
        println!("  (none)");
    }
    for hit in hits {
        let preview: String = hit.content.chars().take(100).collect::<String>().replace('\n', " ");
        println!("  {:.4}  {}  {}", hit.score, hit.metadata.section, preview);
    }
}

async fn open_store(settings: &Settings) -> Result<CorpusStore> {
    let db_path = resolve_with_base(&env::current_dir()?, &settings.storage.db_path);
    std::fs::create_dir_all(&db_path)?;
    CorpusStore::open(&db_path, &settings.storage.table).await
}

async fn ingest(settings: &Settings, index: &Index, dir: Option<&String>) -> Result<()> {
    let base = env::current_dir()?;
    let dir: PathBuf = match dir {
        Some(d) => resolve_with_base(&base, d),
        None => resolve_with_base(&base, &settings.storage.docs_dir),
    };
    println!("Ingesting from {}", dir.display());
    let docs = DocumentLoader::new().load_dir(&dir)?;
    let store = open_store(settings).await?;
    let cache = store.vectors_by_hash(index.embedder().embedder_id()).await?;

    let pb = ProgressBar::new(docs.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} documents {msg}")?
            .progress_chars("#>-"),
    );
    let report = Ingestor::from_settings(settings).ingest_with_progress(index, &docs, &cache, |done, _| {
        pb.set_position(done as u64);
    });
    // A failed rebuild leaves the index as it was; the stored corpus is not rewritten.
    let report = match report {
        Ok(report) => {
            pb.finish_with_message("done");
            report
        }
        Err(e) => {
            pb.abandon_with_message("failed");
            return Err(e.into());
        }
    };

    let saved = save_index(index, &store).await?;
    println!(
        "Ingested {} documents into {} chunks ({} embedded, {} reused); saved {} rows",
        report.documents, report.chunks, report.embedded, report.reused_vectors, saved
    );
    for skipped in &report.skipped {
        println!("  skipped {}: {}", skipped.source, skipped.reason);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let mut args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() {
        eprintln!("{USAGE}");
        std::process::exit(1);
    }
    let cmd = args.remove(0);

    let config = Config::load().map_err(|e| {
        eprintln!("Error loading config: {e}");
        e
    })?;
    let settings = config.settings()?;
    let embedder = embedder_from_settings(&settings.embedding)?;
    let index = Arc::new(Index::new(embedder, settings.index.clone()));

    if cmd == "ingest" {
        return ingest(&settings, &index, args.first()).await;
    }

    let store = open_store(&settings).await?;
    let loaded = load_index(&index, &store).await?;
    info!(chunks = loaded, "corpus loaded");
    if loaded == 0 {
        eprintln!("Corpus is empty; run `docrank ingest <dir>` first.");
    }
    let retriever = Retriever::new(Arc::clone(&index), &settings);

    match cmd.as_str() {
        "query" => {
            let q = parse_query_args(&args)?;
            let text = q.text.ok_or_else(|| anyhow!("query requires a question"))?;
            let source = q.source.as_deref();
            let retrieval = match q.strategy {
                Some(strategy) => retriever.retrieve_with_strategy(&text, strategy, q.k, source).await?,
                None => retriever.retrieve(&text, q.k, source).await?,
            };
            print_retrieval(&retrieval);
        }
        "code" => {
            let code = args.first().ok_or_else(|| anyhow!("code requires a value"))?;
            print_retrieval(&retriever.retrieve_by_exact_code(code).await?);
        }
        "topic" => {
            let q = parse_query_args(&args)?;
            let topic = q.text.ok_or_else(|| anyhow!("topic requires a topic"))?;
            let sources: Vec<&str> = q.rest.iter().map(String::as_str).collect();
            print_retrieval(&retriever.retrieve_by_topic(&topic, &sources).await?);
        }
        "debug" => {
            let q = parse_query_args(&args)?;
            let text = q.text.ok_or_else(|| anyhow!("debug requires a question"))?;
            let report = retriever.debug_search(&text, q.k.unwrap_or(settings.retriever.default_k)).await?;
            println!("Query: {text}");
            println!("Classified as: {}", report.classified_as);
            if !report.embedding_available {
                println!("Embedding unavailable; semantic pass skipped");
            }
            print_hits("Semantic", &report.semantic);
            print_hits("Lexical", &report.lexical);
            print_hits("Hybrid", &report.hybrid);
        }
        "stats" => {
            let stats = index.stats();
            let chunk_stats = ChunkStatistics::from_chunks(index.snapshot().chunks());
            println!("Embedder:   {} (dim {})", stats.embedder_id, stats.dimension);
            println!("Chunks:     {}", stats.chunks);
            println!("Documents:  {}", stats.sources.len());
            println!(
                "Chunk size: avg {:.0}, min {}, max {}, total {} chars",
                chunk_stats.avg_chunk_size, chunk_stats.min_chunk_size, chunk_stats.max_chunk_size, chunk_stats.total_characters
            );
            for source in &stats.sources {
                println!("  {source}");
            }
        }
        _ => {
            eprintln!("Unknown command: {cmd}\n\n{USAGE}");
            std::process::exit(1);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn query_flags_parse_in_any_order() {
        let q = parse_query_args(&strings(&["--k", "3", "oil filter", "--strategy", "keyword", "-s", "fleet.md"])).unwrap();
        assert_eq!(q.text.as_deref(), Some("oil filter"));
        assert_eq!(q.k, Some(3));
        assert_eq!(q.source.as_deref(), Some("fleet.md"));
        assert_eq!(q.strategy, Some(SearchStrategy::Lexical));
    }

    #[test]
    fn extra_positionals_are_collected() {
        let q = parse_query_args(&strings(&["fuel policy", "policies.md", "handbook.md"])).unwrap();
        assert_eq!(q.rest, ["policies.md", "handbook.md"]);
    }

    #[test]
    fn bad_flags_are_errors() {
        assert!(parse_query_args(&strings(&["q", "--k"])).is_err());
        assert!(parse_query_args(&strings(&["q", "--k", "many"])).is_err());
        assert!(parse_query_args(&strings(&["q", "--bogus"])).is_err());
    }
}
