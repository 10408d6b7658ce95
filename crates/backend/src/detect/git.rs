//! Git-backed change detection.
//!
//! Resolves the remote HEAD of a branch with a shallow clone into a
//! temporary directory. The directory is a scoped [`tempfile::TempDir`],
//! removed on every exit path. The whole check runs under a bounded
//! deadline; expiry is a detection failure, not a crash.

use std::{path::Path, time::Duration};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{ChangeDecision, ChangeDetector, SourceRef, short_hash};

/// Errors from git plumbing during detection
#[derive(Debug, thiserror::Error)]
pub enum DetectError {
  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),
  #[error("git {command} failed: {stderr}")]
  Git { command: String, stderr: String },
  #[error("detection deadline of {0:?} exceeded")]
  Timeout(Duration),
}

/// Change detector for git-hosted sources.
#[derive(Debug, Clone)]
pub struct GitChangeDetector {
  binary: String,
  deadline: Duration,
}

impl GitChangeDetector {
  pub fn new(binary: impl Into<String>, deadline: Duration) -> Self {
    Self {
      binary: binary.into(),
      deadline,
    }
  }

  pub fn from_config(config: &lodestone_core::GitConfig) -> Self {
    Self::new(config.binary.clone(), Duration::from_secs(config.detect_timeout_secs))
  }

  /// Shallow-clone `branch` of `url` and resolve HEAD to a commit hash.
  pub async fn resolve_head_commit(&self, url: &str, branch: &str) -> Result<String, DetectError> {
    let workdir = tempfile::TempDir::new()?;

    let result = tokio::time::timeout(self.deadline, self.clone_and_rev_parse(url, branch, workdir.path())).await;

    // workdir drops here on every path - success, git error, or timeout
    match result {
      Ok(resolved) => resolved,
      Err(_) => Err(DetectError::Timeout(self.deadline)),
    }
  }

  async fn clone_and_rev_parse(&self, url: &str, branch: &str, dir: &Path) -> Result<String, DetectError> {
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
      .await?;

    Ok(head.trim().to_string())
  }

  async fn run_git(&self, args: &[&str]) -> Result<String, DetectError> {
    let output = Command::new(&self.binary).args(args).output().await?;

    if !output.status.success() {
      return Err(DetectError::Git {
        command: args.first().copied().unwrap_or("git").to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
      });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
  }
}

#[async_trait]
impl ChangeDetector for GitChangeDetector {
  async fn needs_reindexing(&self, source: &SourceRef) -> ChangeDecision {
    if !source.source_type.supports_diff() {
      return ChangeDecision::reindex(None, "crawled source due for reindex");
    }

    let latest = match self.resolve_head_commit(&source.url, &source.branch).await {
      Ok(hash) => hash,
      Err(e) => {
        // Fail closed: a transient clone error must not trigger a reindex.
        warn!(url = %source.url, branch = %source.branch, error = %e, "Change detection failed");
        return ChangeDecision::skip(format!("change detection failed: {}", e));
      }
    };

    let decision = super::decide_git(source.last_indexed_commit.as_deref(), &latest);
    debug!(
      url = %source.url,
      head = %short_hash(&latest),
      needs_reindexing = decision.needs_reindexing,
      reason = %decision.reason,
      "Change detection resolved"
    );
    decision
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::SourceType;

  fn git_source(url: &str, last_commit: Option<&str>) -> SourceRef {
    SourceRef {
      url: url.to_string(),
      branch: "main".to_string(),
      source_type: SourceType::Git,
      last_indexed_commit: last_commit.map(String::from),
    }
  }

  #[tokio::test]
  async fn test_crawled_sources_always_due() {
    let detector = GitChangeDetector::new("git", Duration::from_secs(5));
    let source = SourceRef {
      url: "https://docs.example.com/llms.txt".to_string(),
      branch: "main".to_string(),
      source_type: SourceType::LlmsTxt,
      last_indexed_commit: None,
    };

    let decision = detector.needs_reindexing(&source).await;
    assert!(decision.needs_reindexing);
    assert!(decision.latest_ref.is_none());
  }

  #[tokio::test]
  async fn test_clone_failure_is_fail_closed() {
    let detector = GitChangeDetector::new("git", Duration::from_secs(30));
    // Local path that cannot exist - fails fast with no network involved
    let source = git_source("/nonexistent/lodestone-test-repo.git", Some("abc1234"));

    let decision = detector.needs_reindexing(&source).await;
    assert!(!decision.needs_reindexing, "git errors must not trigger a reindex");
    assert!(decision.reason.contains("change detection failed"));
  }

  #[tokio::test]
  async fn test_missing_binary_is_fail_closed() {
    let detector = GitChangeDetector::new("/nonexistent/git-binary", Duration::from_secs(5));
    let source = git_source("https://example.com/repo.git", None);

    let decision = detector.needs_reindexing(&source).await;
    assert!(!decision.needs_reindexing);
  }
}
