//! Seed expansion, recursive harvesting and the web plumbing they share.
//!
//! This crate provides:
//! - [`Loom`]: expands one seed page into scored frontier entries
//! - [`Harvester`]: depth-bounded, robots-compliant recursive crawl
//! - [`RobotsCache`]: per-origin robots.txt policies, fail-open
//! - [`Advisor`]: the advisory collaborator used for enrichment

pub mod advisor;
pub mod extract;
pub mod fetch;
pub mod harvester;
pub mod loom;
pub mod priority;
pub mod robots;
pub mod urls;

pub use advisor::{Advisor, CouncilAdvisor, DisabledAdvisor, EMPTY_VERDICT, ENRICHMENT_PLACEHOLDER};
pub use extract::{FLAW_CHECKS, PageExtract, extract_page};
pub use fetch::{FetchedBody, build_client};
pub use harvester::{CrawlState, HarvestReport, Harvester, StopReason};
pub use loom::{Loom, SowReport, collect_candidates};
pub use priority::{PriorityRule, PriorityRules};
pub use robots::{RobotsCache, RobotsTxt};
pub use urls::{normalize_url, validate_seed};
