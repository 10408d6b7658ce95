//! Shared configuration and primitives for the lodestone daemon.

mod config;

pub use config::{
  Config, DaemonConfig, EmbeddingConfig, GitConfig, IndexingConfig, QueueConfig, ServerConfig, WebhookConfig,
};
