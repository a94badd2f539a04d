//! Guidance Oracle: maps a failure to a remediation hint.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Remediation tag attached to guidance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GuidanceAction {
    /// The target is gone; look for an archived copy.
    RedirectToArchive,
    /// Move on to a different frontier entry.
    SwitchPriority,
}

/// Advice produced for a failing operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guidance {
    pub guidance: String,
    pub action: GuidanceAction,
}

impl Guidance {
    /// Used when the oracle does not answer in time.
    pub fn fallback() -> Self {
        Self {
            guidance: "Guidance unavailable; de-prioritize the stuck path and continue with a sibling."
                .into(),
            action: GuidanceAction::SwitchPriority,
        }
    }
}

/// Classify `error_text` into guidance. Pure.
pub fn advise(context: &str, error_text: &str) -> Guidance {
    let lower = error_text.to_ascii_lowercase();
    if lower.contains("404") || lower.contains("not found") {
        return Guidance {
            guidance: format!(
                "This branch is dead while {context}. Seek an archived mirror of the page."
            ),
            action: GuidanceAction::RedirectToArchive,
        };
    }

    Guidance {
        guidance: format!(
            "Repeated failures while {context}. De-prioritize the stuck path and move to a sibling."
        ),
        action: GuidanceAction::SwitchPriority,
    }
}

/// Anything that can answer with guidance. Callers bound it with a timeout.
#[async_trait]
pub trait GuidanceSource: Send + Sync {
    async fn guidance(&self, context: &str, error_text: &str) -> Guidance;
}

/// [`GuidanceSource`] backed by [`advise`].
#[derive(Debug, Default, Clone, Copy)]
pub struct Oracle;

#[async_trait]
impl GuidanceSource for Oracle {
    async fn guidance(&self, context: &str, error_text: &str) -> Guidance {
        advise(context, error_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_redirects_to_archive() {
        let g = advise("harvesting https://a.example/", "https://a.example/: HTTP 404 Not Found");
        assert_eq!(g.action, GuidanceAction::RedirectToArchive);

        let g = advise("x", "Page NOT FOUND");
        assert_eq!(g.action, GuidanceAction::RedirectToArchive);
    }

    #[test]
    fn everything_else_switches_priority() {
        let g = advise("x", "fetch timed out: operation timed out");
        assert_eq!(g.action, GuidanceAction::SwitchPriority);
        assert!(g.guidance.contains("x"));
    }

    #[test]
    fn advise_is_deterministic() {
        assert_eq!(advise("ctx", "HTTP 503"), advise("ctx", "HTTP 503"));
    }

    #[test]
    fn action_wire_format() {
        let json = serde_json::to_string(&GuidanceAction::RedirectToArchive).unwrap();
        assert_eq!(json, "\"REDIRECT_TO_ARCHIVE\"");
    }
}
