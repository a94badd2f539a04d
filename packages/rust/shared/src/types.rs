//! Core domain types for the Artemis frontier and harvest log.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Highest priority a frontier entry can hold. Pivot forces promoted
/// siblings to this value.
pub const PRIORITY_MAX: u32 = 10;

/// Priority of a URL that matches no scoring rule.
pub const PRIORITY_DEFAULT: u32 = 1;

// ---------------------------------------------------------------------------
// FrontierStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of a frontier entry.
///
/// `pending → scanning → {archived | rejected | error}`; `error → dead-end`
/// via Pivot; a sibling `pending → queued` via Pivot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FrontierStatus {
    Pending,
    Queued,
    Scanning,
    Archived,
    Rejected,
    Error,
    DeadEnd,
}

impl FrontierStatus {
    /// Value stored in the `status` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Queued => "queued",
            Self::Scanning => "scanning",
            Self::Archived => "archived",
            Self::Rejected => "rejected",
            Self::Error => "error",
            Self::DeadEnd => "dead-end",
        }
    }

    /// Whether the entry is waiting to be claimed.
    pub fn is_claimable(&self) -> bool {
        matches!(self, Self::Pending | Self::Queued)
    }
}

impl fmt::Display for FrontierStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FrontierStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "queued" => Ok(Self::Queued),
            "scanning" => Ok(Self::Scanning),
            "archived" => Ok(Self::Archived),
            "rejected" => Ok(Self::Rejected),
            "error" => Ok(Self::Error),
            "dead-end" => Ok(Self::DeadEnd),
            other => Err(format!("unknown frontier status '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// FrontierEntry
// ---------------------------------------------------------------------------

/// A discovered URL in the persistent frontier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontierEntry {
    /// Globally unique key.
    pub url: String,
    /// Derived from URL content, or forced to [`PRIORITY_MAX`] by Pivot.
    pub priority_score: u32,
    /// Current lifecycle state.
    pub status: FrontierStatus,
    /// Seed the entry was discovered from; groups siblings for Pivot.
    pub source_origin: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A candidate row for insertion into the frontier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFrontierEntry {
    pub url: String,
    pub priority_score: u32,
    pub source_origin: String,
}

// ---------------------------------------------------------------------------
// HarvestedPage
// ---------------------------------------------------------------------------

/// Structured record extracted from one fetched page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarvestedPage {
    /// Normalized page URL (no fragment, no query).
    pub url: String,
    /// `<title>` text, or `"Untitled"`.
    pub title: String,
    /// `<meta name="description">` content, or empty.
    pub description: String,
    /// Deduplicated `mailto:` addresses in encounter order.
    pub emails: Vec<String>,
    /// Names of structural checks the page failed.
    pub structural_flaws: Vec<String>,
    /// Advisory text, present only when enrichment fired.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrichment: Option<String>,
    /// Distance from the call tree's root.
    pub depth: u32,
    pub captured_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// HarvestStats
// ---------------------------------------------------------------------------

/// Running totals shared across one harvest call tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestStats {
    pub pages: usize,
    pub emails: usize,
    pub flaws: usize,
    pub errors: usize,
}

// ---------------------------------------------------------------------------
// InterventionRecord
// ---------------------------------------------------------------------------

/// Outcome tag stored with each intervention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InterventionStatus {
    /// A sibling was promoted in place of the dead entry.
    SystemSaved,
    /// No sibling was available.
    NoAlternative,
}

impl InterventionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SystemSaved => "SYSTEM_SAVED",
            Self::NoAlternative => "NO_ALTERNATIVE",
        }
    }
}

/// One append-only entry in the intervention log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterventionRecord {
    pub timestamp: DateTime<Utc>,
    /// What the failing operation was doing.
    pub lost_context: String,
    /// Last error message before escalation.
    pub error_detected: String,
    /// Guidance text from the oracle.
    pub golden_path: String,
    /// URL promoted by Pivot, if any.
    pub pivot_target: Option<String>,
    pub status: InterventionStatus,
}

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// Bounded attempts with a linear backoff schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Always at least 1.
    pub max_attempts: u32,
    /// Wait after failed attempt `n` is `backoff_step * n`.
    pub backoff_step: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_step: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_step,
        }
    }

    /// Wait before the attempt following failed attempt `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff_step * attempt
    }
}
