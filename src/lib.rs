//! pgvault — PostgreSQL backup/restore orchestration for containers
//!
//! pgvault drives `pg_dump`/`psql` inside a Docker container or Kubernetes
//! pod, decides between full and incremental dumps, files every backup into a
//! semantically versioned catalog, and prunes old backups per retention
//! policy. All state is plain JSON under a single backup directory.

pub mod cli;
pub mod config;
pub mod error;
pub mod exec;
pub mod notify;
pub mod orchestrator;
pub mod storage;
pub mod strategy;
pub mod version;

pub use error::{VaultError, VaultResult};
