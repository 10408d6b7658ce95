//! Chunk parser seam.
//!
//! Language-aware semantic parsers are external collaborators; the pipeline
//! only needs `parse(content, path) -> chunks`. `PlainChunker` is the
//! built-in fallback: fixed line windows with a character cap.

use serde::Serialize;

/// A parsed chunk ready for embedding.
#[derive(Debug, Clone, Serialize)]
pub struct SemanticChunk {
  pub content: String,
  /// Source path the chunk came from
  pub path: String,
  pub start_line: usize,
  pub end_line: usize,
}

pub trait ChunkParser: Send + Sync {
  fn parse(&self, content: &str, path: &str) -> Vec<SemanticChunk>;
}

/// Line-window chunker used when no semantic parser is wired in.
#[derive(Debug, Clone)]
pub struct PlainChunker {
  window_lines: usize,
  max_chars: usize,
}

impl PlainChunker {
  pub fn new(window_lines: usize, max_chars: usize) -> Self {
    Self {
      window_lines: window_lines.max(1),
      max_chars: max_chars.max(1),
    }
  }

  pub fn from_config(config: &lodestone_core::IndexingConfig) -> Self {
    Self::new(config.chunk_window_lines, config.max_chunk_chars)
  }
}

impl ChunkParser for PlainChunker {
  fn parse(&self, content: &str, path: &str) -> Vec<SemanticChunk> {
    let lines: Vec<&str> = content.lines().collect();
    if lines.is_empty() {
      return Vec::new();
    }

    let mut chunks = Vec::new();
    for (window_index, window) in lines.chunks(self.window_lines).enumerate() {
      let start_line = window_index * self.window_lines + 1;
      let mut text = window.join("\n");
      if text.trim().is_empty() {
        continue;
      }
      if text.len() > self.max_chars {
        // Truncate on a char boundary
        let mut cut = self.max_chars;
        while !text.is_char_boundary(cut) {
          cut -= 1;
        }
        text.truncate(cut);
      }
      chunks.push(SemanticChunk {
        content: text,
        path: path.to_string(),
        start_line,
        end_line: start_line + window.len() - 1,
      });
    }
    chunks
  }
}
