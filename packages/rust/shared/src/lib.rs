//! Shared types, error model, and configuration for Curator.
//!
//! This crate is the foundation depended on by all other Curator crates.
//! It provides:
//! - [`CuratorError`], the unified error type
//! - Domain types ([`PrNumber`], [`DisplayId`], [`Category`], [`ApprovalSnapshot`])
//! - Configuration ([`AppConfig`] and config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CloseConfig, DocumentConfig, IdentifyConfig, OutputConfig, PacingConfig,
    RepositoryConfig, SectionConfig, SectionsConfig, config_dir, config_file_path, init_config,
    load_config, load_config_from, require_token, resolve_token,
};
pub use error::{CuratorError, Result};
pub use types::{
    ApprovalSnapshot, Category, DisplayId, PrNumber, PullRequestMeta, PullRequestState,
    PullRequestStatus, ValidationStatus,
};
