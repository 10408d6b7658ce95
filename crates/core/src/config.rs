//! Configuration system for lodestone.
//!
//! Config priority: explicit path (`LODESTONE_CONFIG`) > user
//! (~/.config/lodestone/config.toml) > built-in defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ============================================================================
// Server Configuration
// ============================================================================

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  /// Address the HTTP API binds to
  pub bind_addr: String,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      bind_addr: "127.0.0.1:7171".to_string(),
    }
  }
}

// ============================================================================
// Queue / Worker Configuration
// ============================================================================

/// Work queue and worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
  /// Number of concurrent indexing workers (0 = auto, capped at 4)
  pub worker_count: usize,

  /// Queue depth threshold; enqueues are never rejected, but crossing
  /// this logs a warning (default: 256)
  pub pending_warn_threshold: usize,
}

impl Default for QueueConfig {
  fn default() -> Self {
    Self {
      worker_count: 0,
      pending_warn_threshold: 256,
    }
  }
}

// ============================================================================
// Indexing Configuration
// ============================================================================

/// Indexing pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
  /// Maximum file size to index in bytes (default: 1MB)
  pub max_file_size: usize,

  /// Maximum chunk size in characters (default: 2000)
  pub max_chunk_chars: usize,

  /// Lines per chunk window for the plain chunker (default: 60)
  pub chunk_window_lines: usize,
}

impl Default for IndexingConfig {
  fn default() -> Self {
    Self {
      max_file_size: 1024 * 1024, // 1MB
      max_chunk_chars: 2000,
      chunk_window_lines: 60,
    }
  }
}

// ============================================================================
// Git Configuration
// ============================================================================

/// Git change-detection and clone configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitConfig {
  /// Path to the git executable (default: "git", resolved via PATH)
  pub binary: String,

  /// Deadline for a change-detection clone in seconds (default: 60)
  /// Expiry is treated as a detection failure, never a crash.
  pub detect_timeout_secs: u64,

  /// Deadline for a full indexing clone in seconds (default: 600)
  pub fetch_timeout_secs: u64,
}

impl Default for GitConfig {
  fn default() -> Self {
    Self {
      binary: "git".to_string(),
      detect_timeout_secs: 60,
      fetch_timeout_secs: 600,
    }
  }
}

// ============================================================================
// Webhook Configuration
// ============================================================================

/// Webhook endpoint configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
  /// Shared secret for signature verification.
  /// When set, GitHub deliveries must carry a valid `x-hub-signature-256`
  /// and GitLab deliveries a matching `x-gitlab-token`. When unset, header
  /// presence alone is required.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub secret: Option<String>,
}

// ============================================================================
// Embedding Configuration
// ============================================================================

/// Embedding provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
  /// Embedding endpoint URL (an Ollama-style `{model, input}` POST target)
  pub endpoint_url: String,

  /// Model name
  pub model: String,

  /// Embedding dimensions
  pub dimensions: usize,

  /// Maximum texts per embedding request (default: 64)
  pub max_batch_size: usize,

  /// Per-request timeout in seconds (default: 120)
  pub request_timeout_secs: u64,
}

impl Default for EmbeddingConfig {
  fn default() -> Self {
    Self {
      endpoint_url: "http://localhost:11434/api/embed".to_string(),
      model: "qwen3-embedding".to_string(),
      dimensions: 1024,
      max_batch_size: 64,
      request_timeout_secs: 120,
    }
  }
}

// ============================================================================
// Daemon Configuration
// ============================================================================

/// Daemon lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
  /// Log level: "off", "error", "warn", "info", "debug", "trace"
  #[serde(default = "default_log_level")]
  pub log_level: String,

  /// Log file rotation: "daily", "hourly", "never"
  #[serde(default = "default_log_rotation")]
  pub log_rotation: String,

  /// Maximum log file age in days (0 = keep forever)
  #[serde(default = "default_log_retention_days")]
  pub log_retention_days: u64,
}

fn default_log_level() -> String {
  "info".to_string()
}
fn default_log_rotation() -> String {
  "daily".to_string()
}
fn default_log_retention_days() -> u64 {
  7
}

impl Default for DaemonConfig {
  fn default() -> Self {
    Self {
      log_level: default_log_level(),
      log_rotation: default_log_rotation(),
      log_retention_days: default_log_retention_days(),
    }
  }
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration for the lodestone daemon
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  pub server: ServerConfig,
  pub queue: QueueConfig,
  pub indexing: IndexingConfig,
  pub git: GitConfig,
  pub webhook: WebhookConfig,
  pub embedding: EmbeddingConfig,
  pub daemon: DaemonConfig,
}

impl Config {
  /// Load configuration from the default locations.
  ///
  /// Checks `LODESTONE_CONFIG` first, then the user config file. Missing
  /// files fall back to defaults; a malformed file is logged and ignored
  /// rather than aborting the daemon.
  pub fn load() -> Self {
    if let Ok(path) = std::env::var("LODESTONE_CONFIG") {
      return Self::from_path(Path::new(&path));
    }

    let Some(path) = Self::user_config_path() else {
      return Self::default();
    };

    if path.exists() { Self::from_path(&path) } else { Self::default() }
  }

  /// Load configuration from an explicit path, falling back to defaults.
  pub fn from_path(path: &Path) -> Self {
    match std::fs::read_to_string(path) {
      Ok(content) => match toml::from_str(&content) {
        Ok(config) => config,
        Err(e) => {
          tracing::warn!(path = %path.display(), error = %e, "Malformed config file, using defaults");
          Self::default()
        }
      },
      Err(e) => {
        tracing::warn!(path = %path.display(), error = %e, "Failed to read config file, using defaults");
        Self::default()
      }
    }
  }

  /// Path to the user config file (~/.config/lodestone/config.toml)
  pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("lodestone").join("config.toml"))
  }

  /// Effective worker pool width.
  ///
  /// `worker_count = 0` auto-sizes from the CPU count, capped at 4 to
  /// bound concurrent clones and embedding load.
  pub fn effective_worker_count(&self, cpus: usize) -> usize {
    if self.queue.worker_count == 0 {
      cpus.clamp(1, 4)
    } else {
      self.queue.worker_count
    }
  }
}
