//! Source fetcher seam - materializes a source for the indexing pipeline.
//!
//! For git sources this shallow-clones the branch into a scoped temp
//! directory and walks it gitignore-aware. Crawler-backed fetchers for
//! llms.txt and website sources are external collaborators implementing
//! the same trait.

use std::{path::Path, time::Duration};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, trace, warn};

use crate::detect::SourceRef;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),
  #[error("git {command} failed: {stderr}")]
  Git { command: String, stderr: String },
  #[error("fetch deadline of {0:?} exceeded")]
  Timeout(Duration),
  #[error("Fetcher error: {0}")]
  Fetcher(String),
}

/// One file pulled out of a source.
#[derive(Debug, Clone)]
pub struct SourceFile {
  /// Path relative to the source root (or document URL for crawled sources)
  pub relative: String,
  pub content: String,
}

/// A materialized source, ready for the per-file indexing loop.
#[derive(Debug, Default)]
pub struct FetchedSource {
  pub files: Vec<SourceFile>,
  /// HEAD commit for git sources
  pub commit_hash: Option<String>,
}

#[async_trait]
pub trait SourceFetcher: Send + Sync {
  async fn fetch(&self, source: &SourceRef) -> Result<FetchedSource, FetchError>;
}

// ============================================================================
// Git fetcher
// ============================================================================

/// Fetches git sources with a shallow clone.
#[derive(Debug, Clone)]
pub struct GitSourceFetcher {
  binary: String,
  deadline: Duration,
  max_file_size: usize,
}

impl GitSourceFetcher {
  pub fn new(binary: impl Into<String>, deadline: Duration, max_file_size: usize) -> Self {
    Self {
      binary: binary.into(),
      deadline,
      max_file_size,
    }
  }

  pub fn from_config(git: &lodestone_core::GitConfig, indexing: &lodestone_core::IndexingConfig) -> Self {
    Self::new(
      git.binary.clone(),
      Duration::from_secs(git.fetch_timeout_secs),
      indexing.max_file_size,
    )
  }

  async fn run_git(&self, args: &[&str]) -> Result<String, FetchError> {
    let output = Command::new(&self.binary).args(args).output().await?;
    if !output.status.success() {
      return Err(FetchError::Git {
        command: args.first().copied().unwrap_or("git").to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
      });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
  }

  async fn clone_and_collect(&self, url: &str, branch: &str, dir: &Path) -> Result<FetchedSource, FetchError> {
    self
      .run_git(&[
        "clone",
        "--depth",
        "1",
        "--branch",
        branch,
        "--single-branch",
        "--no-tags",
        url,
        &dir.to_string_lossy(),
      ])
      .await?;

    let head = self
      .run_git(&["-C", &dir.to_string_lossy(), "rev-parse", "HEAD"])
      .await?
      .trim()
      .to_string();

    let files = collect_files(dir, self.max_file_size);
    debug!(url, branch, head = %head, files = files.len(), "Fetched git source");

    Ok(FetchedSource {
      files,
      commit_hash: Some(head),
    })
  }
}

#[async_trait]
impl SourceFetcher for GitSourceFetcher {
  async fn fetch(&self, source: &SourceRef) -> Result<FetchedSource, FetchError> {
    if !source.source_type.supports_diff() {
      return Err(FetchError::Fetcher(format!(
        "no crawler wired for source type of {}",
        source.url
      )));
    }

    let workdir = tempfile::TempDir::new()?;

    let result = tokio::time::timeout(
      self.deadline,
      self.clone_and_collect(&source.url, &source.branch, workdir.path()),
    )
    .await;

    // workdir drops here on every path
    match result {
      Ok(fetched) => fetched,
      Err(_) => Err(FetchError::Timeout(self.deadline)),
    }
  }
}

/// Walk a checkout gitignore-aware and read indexable files.
///
/// Skips hidden paths (including `.git/`), files over `max_file_size`, and
/// anything that is not valid UTF-8.
fn collect_files(root: &Path, max_file_size: usize) -> Vec<SourceFile> {
  let mut files = Vec::new();

  for entry in ignore::WalkBuilder::new(root).hidden(true).git_ignore(true).build() {
    let entry = match entry {
      Ok(e) => e,
      Err(e) => {
        warn!(error = %e, "Skipping unreadable entry during source walk");
        continue;
      }
    };

    if !entry.file_type().is_some_and(|t| t.is_file()) {
      continue;
    }

    let path = entry.path();
    if let Ok(metadata) = entry.metadata()
      && metadata.len() as usize > max_file_size
    {
      trace!(path = %path.display(), "Skipping oversized file");
      continue;
    }

    let Ok(content) = std::fs::read_to_string(path) else {
      // Binary or non-UTF8 content
      continue;
    };

    let relative = path
      .strip_prefix(root)
      .unwrap_or(path)
      .to_string_lossy()
      .replace('\\', "/");

    files.push(SourceFile { relative, content });
  }

  files.sort_by(|a, b| a.relative.cmp(&b.relative));
  files
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;

  #[test]
  fn test_collect_files_skips_hidden_and_oversized() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join(".git")).unwrap();
    std::fs::write(dir.path().join(".git/config"), "[core]").unwrap();
    std::fs::write(dir.path().join("small.rs"), "fn main() {}").unwrap();
    std::fs::write(dir.path().join("big.rs"), "x".repeat(100)).unwrap();
    std::fs::write(dir.path().join("binary.bin"), [0u8, 159, 146, 150]).unwrap();

    let files = collect_files(dir.path(), 50);
    let names: Vec<&str> = files.iter().map(|f| f.relative.as_str()).collect();
    assert_eq!(names, vec!["small.rs"]);
  }

  #[test]
  fn test_collect_files_relative_paths() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("src")).unwrap();
    std::fs::write(dir.path().join("src/lib.rs"), "pub fn f() {}").unwrap();

    let files = collect_files(dir.path(), 1024);
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].relative, "src/lib.rs");
  }

  #[tokio::test]
  async fn test_crawled_source_without_crawler_errors() {
    let fetcher = GitSourceFetcher::new("git", Duration::from_secs(5), 1024);
    let source = SourceRef {
      url: "https://docs.example.com".to_string(),
      branch: "main".to_string(),
      source_type: crate::domain::SourceType::Website,
      last_indexed_commit: None,
    };

    let err = fetcher.fetch(&source).await.unwrap_err();
    assert!(matches!(err, FetchError::Fetcher(_)));
  }
}
