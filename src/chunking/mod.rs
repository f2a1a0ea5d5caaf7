//! Splitting file content into embeddable chunks.
//!
//! Chunking is purely textual: spans are separated by blank lines and
//! capped at a configured line count, with no language awareness. Line
//! numbers are 1-based and inclusive so results map directly onto editor
//! locations.

use std::path::Path;

use crate::types::{Chunk, ChunkKind};

/// Turns one file's content into zero or more chunks.
pub trait ChunkExtractor: Send + Sync {
    fn extract(&self, path: &Path, content: &str, last_modified_utc: u64) -> Vec<Chunk>;
}

/// Blank-line span chunker with a hard line cap.
#[derive(Debug, Clone)]
pub struct SpanChunker {
    max_lines: usize,
}

impl SpanChunker {
    pub fn new(max_lines: usize) -> Self {
        Self {
            max_lines: max_lines.max(1),
        }
    }
}

impl ChunkExtractor for SpanChunker {
    fn extract(&self, path: &Path, content: &str, last_modified_utc: u64) -> Vec<Chunk> {
        let kind = kind_for_path(path);
        let lines: Vec<&str> = content.lines().collect();
        let mut chunks = Vec::new();

        let mut span_start = 0usize; // 0-based index of first line in span
        let mut cursor = 0usize;

        let mut flush = |start: usize, end: usize, chunks: &mut Vec<Chunk>| {
            // end is exclusive
            if start >= end {
                return;
            }
            let text = lines[start..end].join("\n");
            if text.trim().is_empty() {
                return;
            }
            let start_line = (start + 1) as u32;
            let end_line = end as u32;
            chunks.push(Chunk {
                id: format!("{}:{}-{}", path.display(), start_line, end_line),
                content: text,
                file_path: path.to_path_buf(),
                start_line,
                end_line,
                kind,
                last_modified_utc,
                weight: kind.importance_weight(),
            });
        };

        while cursor < lines.len() {
            let at_cap = cursor - span_start >= self.max_lines;
            let at_break = lines[cursor].trim().is_empty();

            if at_cap || at_break {
                flush(span_start, cursor, &mut chunks);
                // A blank line belongs to no chunk
                span_start = if at_break { cursor + 1 } else { cursor };
            }
            cursor += 1;
        }
        flush(span_start, lines.len(), &mut chunks);

        chunks
    }
}

/// Classify a file by extension and well-known manifest names.
fn kind_for_path(path: &Path) -> ChunkKind {
    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        let manifest = matches!(
            name,
            "Cargo.toml" | "package.json" | "pyproject.toml" | "go.mod" | "Makefile" | "Dockerfile"
        );
        if manifest {
            return ChunkKind::Config;
        }
    }
    match path.extension().and_then(|e| e.to_str()) {
        Some("md" | "rst" | "txt" | "adoc") => ChunkKind::Doc,
        Some("toml" | "yaml" | "yml" | "json" | "ini" | "cfg") => ChunkKind::Config,
        _ => ChunkKind::Code,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn extract(content: &str) -> Vec<Chunk> {
        SpanChunker::new(100).extract(&PathBuf::from("src/lib.rs"), content, 0)
    }

    #[test]
    fn test_blank_lines_separate_chunks() {
        let chunks = extract("fn a() {}\n\nfn b() {}\n");
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].content, "fn a() {}");
        assert_eq!(chunks[1].content, "fn b() {}");
    }

    #[test]
    fn test_line_numbers_are_one_based_inclusive() {
        let chunks = extract("line one\nline two\n\nline four\n");
        assert_eq!((chunks[0].start_line, chunks[0].end_line), (1, 2));
        assert_eq!((chunks[1].start_line, chunks[1].end_line), (4, 4));
    }

    #[test]
    fn test_long_span_is_split_at_cap() {
        let content = (0..10).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        let chunks = SpanChunker::new(4).extract(&PathBuf::from("big.rs"), &content, 0);

        assert_eq!(chunks.len(), 3);
        assert_eq!((chunks[0].start_line, chunks[0].end_line), (1, 4));
        assert_eq!((chunks[1].start_line, chunks[1].end_line), (5, 8));
        assert_eq!((chunks[2].start_line, chunks[2].end_line), (9, 10));
    }

    #[test]
    fn test_whitespace_only_spans_are_dropped() {
        let chunks = extract("   \n\t\n\nreal content\n");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "real content");
    }

    #[test]
    fn test_empty_file_yields_no_chunks() {
        assert!(extract("").is_empty());
    }

    #[test]
    fn test_kind_classification() {
        assert_eq!(kind_for_path(Path::new("src/main.rs")), ChunkKind::Code);
        assert_eq!(kind_for_path(Path::new("README.md")), ChunkKind::Doc);
        assert_eq!(kind_for_path(Path::new("Cargo.toml")), ChunkKind::Config);
        assert_eq!(kind_for_path(Path::new("deploy.yaml")), ChunkKind::Config);
    }

    #[test]
    fn test_chunk_ids_are_unique_per_span() {
        let chunks = extract("a\n\nb\n\nc\n");
        let mut ids: Vec<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
        ids.dedup();
        assert_eq!(ids.len(), 3);
    }
}
