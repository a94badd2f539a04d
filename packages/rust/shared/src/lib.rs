//! Shared types, error model, and configuration for Artemis.
//!
//! This crate is the foundation depended on by all other Artemis crates.
//! It provides:
//! - [`ArtemisError`]: the unified error type
//! - Domain types ([`FrontierEntry`], [`HarvestedPage`], [`InterventionRecord`], [`RetryPolicy`])
//! - Configuration ([`AppConfig`], the per-component runtime configs, config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CouncilConfig, DrainConfig, DrainSection, HarvestConfig, HarvestSection,
    LoomConfig, LoomSection, PriorityRuleConfig, StorageSection, USER_AGENT, WatchdogConfig,
    WatchdogSection, config_dir, config_file_path, expand_home, init_config, load_config,
    load_config_from,
};
pub use error::{ArtemisError, Result};
pub use types::{
    FrontierEntry, FrontierStatus, HarvestStats, HarvestedPage, InterventionRecord,
    InterventionStatus, NewFrontierEntry, PRIORITY_DEFAULT, PRIORITY_MAX, RetryPolicy,
};
