//! Domain types - core business entities
//!
//! Canonical record types for the orchestration engine. These are
//! independent of persistence and transport concerns; the store and the
//! HTTP layer both speak in these types.

pub mod docs;
pub mod job;
pub mod project;

pub use docs::{DocRepoId, DocumentationRepository, SourceType};
pub use job::{IndexingJob, JobId, JobStatus, Trigger};
pub use project::{IndexStatus, Project, ProjectId};
