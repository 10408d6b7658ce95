//! Webhook trigger adapter.
//!
//! Push notifications arrive from GitHub, GitLab, or Bitbucket. Platform
//! selection is header-driven and modeled as a tagged enum; each variant
//! knows how to verify its delivery and extract a normalized [`PushInfo`]
//! from its payload shape.
//!
//! Non-actionable deliveries (tag pushes, branch deletions, empty pushes)
//! are legitimate no-ops answered with 200 + reason, not errors.

use axum::http::HeaderMap;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Serialize;
use serde_json::Value;
use sha2::Sha256;
use tracing::{debug, info, warn};

use super::{TriggerError, create_and_enqueue};
use crate::{
  domain::{IndexStatus, JobId, ProjectId, Trigger},
  queue::IndexQueue,
  store::{RecordStore, StoreError},
};

type HmacSha256 = Hmac<Sha256>;

// ============================================================================
// Platform detection
// ============================================================================

/// Git-hosting platform a webhook delivery came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookPlatform {
  GitHub,
  GitLab,
  Bitbucket,
}

impl WebhookPlatform {
  pub fn name(&self) -> &'static str {
    match self {
      WebhookPlatform::GitHub => "github",
      WebhookPlatform::GitLab => "gitlab",
      WebhookPlatform::Bitbucket => "bitbucket",
    }
  }

  /// Identify the platform from request headers and payload shape.
  ///
  /// Exactly one platform must match, and the payload must carry the
  /// platform's repository key; anything else is an invalid delivery.
  pub fn detect(headers: &HeaderMap, payload: &Value) -> Option<Self> {
    let mut matches = Vec::new();

    if header_eq(headers, "x-github-event", "push")
      && headers.contains_key("x-hub-signature-256")
      && payload.get("repository").is_some()
    {
      matches.push(WebhookPlatform::GitHub);
    }
    if header_eq(headers, "x-gitlab-event", "Push Hook")
      && headers.contains_key("x-gitlab-token")
      && payload.get("repository").is_some()
    {
      matches.push(WebhookPlatform::GitLab);
    }
    if header_eq(headers, "x-event-key", "repo:push") && payload.get("repo").is_some() {
      matches.push(WebhookPlatform::Bitbucket);
    }

    match matches.as_slice() {
      [platform] => Some(*platform),
      _ => None,
    }
  }

  /// Verify the delivery against the configured secret.
  ///
  /// With no secret configured, header presence (checked during detection)
  /// is sufficient. Bitbucket pushes carry no signature header.
  pub fn verify(&self, headers: &HeaderMap, body: &[u8], secret: Option<&str>) -> bool {
    let Some(secret) = secret else {
      return true;
    };

    match self {
      WebhookPlatform::GitHub => {
        let Some(signature) = header_str(headers, "x-hub-signature-256") else {
          return false;
        };
        let Some(hex_digest) = signature.strip_prefix("sha256=") else {
          return false;
        };
        let Ok(digest) = hex::decode(hex_digest) else {
          return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
          return false;
        };
        mac.update(body);
        mac.verify_slice(&digest).is_ok()
      }
      WebhookPlatform::GitLab => header_str(headers, "x-gitlab-token") == Some(secret),
      WebhookPlatform::Bitbucket => true,
    }
  }

  /// Extract normalized push information from the platform payload.
  pub fn extract(&self, payload: &Value) -> PushInfo {
    match self {
      WebhookPlatform::GitHub => extract_github(payload),
      WebhookPlatform::GitLab => extract_gitlab(payload),
      WebhookPlatform::Bitbucket => extract_bitbucket(payload),
    }
  }
}

fn header_eq(headers: &HeaderMap, name: &str, expected: &str) -> bool {
  header_str(headers, name) == Some(expected)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
  headers.get(name).and_then(|v| v.to_str().ok())
}

// ============================================================================
// Payload extraction
// ============================================================================

/// Normalized push information, common to all platforms.
#[derive(Debug, Clone)]
pub struct PushInfo {
  pub should_index: bool,
  /// Full commit hash
  pub full_commit: Option<String>,
  /// 7-character short hash
  pub commit: Option<String>,
  pub branch: Option<String>,
  pub author: Option<String>,
  /// Why the delivery is a no-op, when it is
  pub reason: Option<String>,
}

impl PushInfo {
  fn skip(reason: impl Into<String>) -> Self {
    Self {
      should_index: false,
      full_commit: None,
      commit: None,
      branch: None,
      author: None,
      reason: Some(reason.into()),
    }
  }

  fn push(full_commit: String, branch: Option<String>, author: Option<String>) -> Self {
    let commit = full_commit[..full_commit.len().min(7)].to_string();
    Self {
      should_index: true,
      full_commit: Some(full_commit),
      commit: Some(commit),
      branch,
      author,
      reason: None,
    }
  }
}

fn strip_ref(reference: &str) -> String {
  reference.strip_prefix("refs/heads/").unwrap_or(reference).to_string()
}

fn extract_github(payload: &Value) -> PushInfo {
  if payload.get("deleted").and_then(Value::as_bool) == Some(true) {
    return PushInfo::skip("Branch deleted");
  }

  let commits_empty = payload
    .get("commits")
    .and_then(Value::as_array)
    .is_none_or(|c| c.is_empty());
  if commits_empty {
    return PushInfo::skip("No commits in push");
  }

  let Some(full_commit) = payload
    .pointer("/head_commit/id")
    .and_then(Value::as_str)
    .map(String::from)
  else {
    return PushInfo::skip("No commits in push");
  };

  let branch = payload.get("ref").and_then(Value::as_str).map(strip_ref);
  let author = payload
    .pointer("/head_commit/author/name")
    .and_then(Value::as_str)
    .map(String::from);

  PushInfo::push(full_commit, branch, author)
}

fn extract_gitlab(payload: &Value) -> PushInfo {
  let commits = payload.get("commits").and_then(Value::as_array);
  let Some(commits) = commits.filter(|c| !c.is_empty()) else {
    return PushInfo::skip("No commits in push");
  };

  let Some(full_commit) = payload.get("checkout_sha").and_then(Value::as_str).map(String::from) else {
    return PushInfo::skip("No checkout SHA in push");
  };

  let branch = payload.get("ref").and_then(Value::as_str).map(strip_ref);
  let author = commits[0]
    .pointer("/author/name")
    .and_then(Value::as_str)
    .map(String::from);

  PushInfo::push(full_commit, branch, author)
}

fn extract_bitbucket(payload: &Value) -> PushInfo {
  let changes = payload.pointer("/push/changes").and_then(Value::as_array);
  let Some(change) = changes.and_then(|c| c.first()) else {
    return PushInfo::skip("No changes in push");
  };

  let new = change.get("new").filter(|n| !n.is_null());
  let Some(new) = new else {
    return PushInfo::skip("Tag push or branch deletion");
  };
  if new.get("type").and_then(Value::as_str) == Some("tag") {
    return PushInfo::skip("Tag push or branch deletion");
  }

  let Some(full_commit) = new.pointer("/target/hash").and_then(Value::as_str).map(String::from) else {
    return PushInfo::skip("Tag push or branch deletion");
  };

  let branch = new.get("name").and_then(Value::as_str).map(String::from);
  let author = new
    .pointer("/target/author/raw")
    .and_then(Value::as_str)
    .map(String::from);

  PushInfo::push(full_commit, branch, author)
}

// ============================================================================
// Handling
// ============================================================================

/// Errors surfaced to the webhook sender
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
  /// Invalid delivery - unknown platform or failed verification (HTTP 401)
  #[error("Invalid webhook: {0}")]
  Rejected(String),
  #[error("Project not found: {0}")]
  ProjectNotFound(ProjectId),
  #[error(transparent)]
  Store(StoreError),
}

/// Body of the HTTP response to the webhook sender.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookResponse {
  pub message: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub reason: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub commit: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub branch: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub author: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub job_id: Option<JobId>,
}

impl WebhookResponse {
  fn skipped(message: impl Into<String>, reason: Option<String>) -> Self {
    Self {
      message: message.into(),
      reason,
      commit: None,
      branch: None,
      author: None,
      job_id: None,
    }
  }
}

/// Handle an inbound webhook delivery for `project_id`.
pub async fn handle_webhook(
  store: &dyn RecordStore,
  queue: &IndexQueue,
  secret: Option<&str>,
  project_id: &ProjectId,
  headers: &HeaderMap,
  body: &[u8],
) -> Result<WebhookResponse, WebhookError> {
  let payload: Value =
    serde_json::from_slice(body).map_err(|e| WebhookError::Rejected(format!("malformed payload: {}", e)))?;

  let Some(platform) = WebhookPlatform::detect(headers, &payload) else {
    warn!(project_id = %project_id, "Webhook did not match exactly one platform");
    return Err(WebhookError::Rejected("unrecognized webhook platform".to_string()));
  };

  if !platform.verify(headers, body, secret) {
    warn!(project_id = %project_id, platform = platform.name(), "Webhook signature verification failed");
    return Err(WebhookError::Rejected("signature verification failed".to_string()));
  }

  let push = platform.extract(&payload);
  debug!(
    project_id = %project_id,
    platform = platform.name(),
    should_index = push.should_index,
    reason = ?push.reason,
    "Webhook classified"
  );

  if !push.should_index {
    // Legitimate no-op (tag push, branch deletion, empty push)
    return Ok(WebhookResponse::skipped("Webhook received", push.reason));
  }

  let mut project = match store.project(project_id).await {
    Ok(project) => project,
    Err(StoreError::ProjectNotFound(id)) => return Err(WebhookError::ProjectNotFound(id)),
    Err(e) => return Err(WebhookError::Store(e)),
  };

  if !project.webhook_enabled {
    return Err(WebhookError::Rejected("webhooks are disabled for this project".to_string()));
  }

  if project.index_status == IndexStatus::Indexing {
    return Ok(WebhookResponse::skipped(
      "indexing already in progress",
      Some("indexing already in progress".to_string()),
    ));
  }

  // Record delivery metadata before queueing
  project.last_webhook_at = Some(Utc::now());
  project.last_webhook_commit = push.commit.clone();
  project.last_webhook_branch = push.branch.clone();
  project.last_webhook_author = push.author.clone();
  store.upsert_project(project.clone()).await.map_err(WebhookError::Store)?;

  let branch = push
    .branch
    .clone()
    .unwrap_or_else(|| project.default_branch().to_string());

  match create_and_enqueue(store, queue, &project, branch, false, Trigger::Webhook).await {
    Ok(job) => {
      info!(project_id = %project_id, job_id = %job.id, platform = platform.name(), "Webhook indexing started");
      Ok(WebhookResponse {
        message: "Indexing started".to_string(),
        reason: None,
        commit: push.commit,
        branch: push.branch,
        author: push.author,
        job_id: Some(job.id),
      })
    }
    // A job slipped in between the status check and the create - same
    // answer the status check would have given.
    Err(TriggerError::AlreadyIndexing(_)) => Ok(WebhookResponse::skipped(
      "indexing already in progress",
      Some("indexing already in progress".to_string()),
    )),
    Err(TriggerError::Store(e)) => Err(WebhookError::Store(e)),
  }
}
