use std::fs;
use tempfile::TempDir;

use docrank_core::config::ChunkerSettings;
use docrank_core::{ChunkStatistics, DocumentLoader, Error, MarkdownChunker};

const GUIDE: &str = "# Fleet Guide

Read this before touching a vehicle.

## P0420

Catalyst system efficiency below threshold. Inspect the catalyst and the downstream oxygen sensor.

## Oil Change

Replace the oil filter every 5,000 miles. Use 5W-30 synthetic.
";

#[test]
fn load_dir_reads_markdown_and_text_sorted() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    fs::write(dir.join("b.md"), "# B\nbravo").unwrap();
    fs::write(dir.join("a.txt"), "# A\nalpha").unwrap();
    fs::write(dir.join("ignored.csv"), "x,y").unwrap();
    fs::create_dir(dir.join("nested")).unwrap();
    fs::write(dir.join("nested/c.md"), "# C\ncharlie").unwrap();

    let docs = DocumentLoader::new().load_dir(dir).expect("load");
    let names: Vec<&str> = docs.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, ["a.txt", "b.md", "c.md"]);
}

#[test]
fn load_dir_missing_directory_is_an_error() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("nope");
    assert!(matches!(DocumentLoader::new().load_dir(&missing), Err(Error::Io(_))));
}

#[test]
fn chunks_reproduce_sections_in_order() {
    let chunks = MarkdownChunker::default().chunk_document(GUIDE, "fleet.md").expect("chunks");
    let joined = chunks.iter().map(|c| c.content.as_str()).collect::<Vec<_>>().join("\n\n");
    let expected = GUIDE.trim().replace("\n\n\n", "\n\n");
    assert_eq!(joined, expected);
    assert!(chunks.iter().all(|c| c.metadata.source == "fleet.md"));
}

#[test]
fn chunk_sizes_respect_the_bound() {
    let mut doc = String::from("# Long\n");
    for i in 0..40 {
        doc.push_str(&format!("\nParagraph {i} talks about brake pads, rotors and calipers in detail.\n"));
    }
    let settings = ChunkerSettings { chunk_size: 300, min_chunk_size: 20, key_terms: 3 };
    let chunks = MarkdownChunker::new(settings).chunk_document(&doc, "long.md").expect("chunks");
    assert!(chunks.len() > 1);
    for c in &chunks {
        assert!(c.content.chars().count() <= 300, "chunk {} too large", c.id);
        assert_eq!(c.metadata.char_count, c.content.chars().count());
    }
    // Neighbouring chunks share exactly one paragraph.
    for pair in chunks.windows(2) {
        let last_block = pair[0].content.rsplit("\n\n").next().unwrap();
        assert!(pair[1].content.starts_with(last_block));
    }
    let stats = ChunkStatistics::from_chunks(&chunks);
    assert_eq!(stats.total_chunks, chunks.len());
    assert!(stats.max_chunk_size <= 300);
}
