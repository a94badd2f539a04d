//! Pivot: retire a failing frontier entry and promote a sibling.

use std::sync::Arc;

use tracing::{info, warn};

use artemis_shared::{FrontierStatus, Result};
use artemis_storage::{FrontierStore, PivotOutcome};

/// Reroutes the frontier away from a dead entry.
pub struct Pivot {
    store: Arc<dyn FrontierStore>,
}

impl Pivot {
    pub fn new(store: Arc<dyn FrontierStore>) -> Self {
        Self { store }
    }

    /// Record that `url` failed. Entries already `dead-end` or `error`
    /// are left alone.
    pub async fn mark_failed(&self, url: &str) -> Result<()> {
        let Some(entry) = self.store.get_entry(url).await? else {
            return Ok(());
        };
        if matches!(entry.status, FrontierStatus::DeadEnd | FrontierStatus::Error) {
            return Ok(());
        }
        self.store.set_status(url, FrontierStatus::Error).await
    }

    /// Mark `dead_url` as `dead-end` and queue one sibling at maximum
    /// priority, atomically. Returns the promoted URL.
    ///
    /// Never promotes `dead_url` itself. An entry that is already
    /// `dead-end`, or unknown, changes nothing and yields `None`.
    pub async fn execute_pivot(&self, dead_url: &str, reasoning: &str) -> Result<Option<String>> {
        match self.store.pivot(dead_url).await? {
            PivotOutcome::Promoted(url) => {
                info!(dead = %dead_url, promoted = %url, %reasoning, "pivoted to sibling");
                Ok(Some(url))
            }
            PivotOutcome::NoSibling => {
                info!(dead = %dead_url, %reasoning, "pivot found no sibling");
                Ok(None)
            }
            PivotOutcome::AlreadyDead => {
                info!(dead = %dead_url, "entry already dead-end, pivot skipped");
                Ok(None)
            }
            PivotOutcome::UnknownEntry => {
                warn!(dead = %dead_url, "pivot on unknown frontier entry");
                Ok(None)
            }
        }
    }
}
