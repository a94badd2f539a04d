//! Recovery and orchestration for Artemis.
//!
//! This crate wraps harvests in the [`Watchdog`], reroutes the frontier
//! through [`Pivot`] when they keep failing, records every intervention,
//! and drains the frontier through the evaluation collaborators.

pub mod controller;
pub mod evaluation;
pub mod intervention;
pub mod oracle;
pub mod pivot;
pub mod watchdog;

pub use controller::{DrainController, DrainProgress, DrainReport, EntryOutcome, SilentProgress};
pub use evaluation::{
    CONTACT_PLACEHOLDER, CouncilEvaluator, Evaluation, Evaluator, LogNotifier, NOTIFY_THRESHOLD,
    Notifier,
};
pub use intervention::{InterventionLogger, LOG_FILE_NAME, render_markdown};
pub use oracle::{Guidance, GuidanceAction, GuidanceSource, Oracle, advise};
pub use pivot::Pivot;
pub use watchdog::{ESCALATION_AGENT, Escalation, Monitored, Watchdog};
