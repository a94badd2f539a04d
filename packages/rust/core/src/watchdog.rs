//! Bounded-retry wrapper with escalation to the Oracle and Pivot.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{instrument, warn};

use artemis_shared::{
    InterventionRecord, InterventionStatus, Result, RetryPolicy, WatchdogConfig,
};
use artemis_storage::FrontierStore;

use crate::intervention::InterventionLogger;
use crate::oracle::{Guidance, GuidanceSource, Oracle};
use crate::pivot::Pivot;

/// Agent tag carried by every escalation payload.
pub const ESCALATION_AGENT: &str = "WATCHDOG-ESCALATED";

/// Payload returned instead of an error once the threshold is reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Escalation {
    pub agent: &'static str,
    pub guidance: Guidance,
    /// URL promoted by Pivot, if any.
    pub new_target: Option<String>,
    pub attempts: u32,
    pub last_error: String,
}

/// Outcome of [`Watchdog::monitor`].
#[derive(Debug)]
pub enum Monitored<T> {
    Completed(T),
    Escalated(Escalation),
}

impl<T> Monitored<T> {
    pub fn is_escalated(&self) -> bool {
        matches!(self, Self::Escalated(_))
    }
}

pub struct Watchdog {
    policy: RetryPolicy,
    guidance_timeout: Duration,
    oracle: Arc<dyn GuidanceSource>,
    pivot: Pivot,
    logger: Arc<InterventionLogger>,
}

impl Watchdog {
    pub fn new(
        config: &WatchdogConfig,
        oracle: Arc<dyn GuidanceSource>,
        pivot: Pivot,
        logger: Arc<InterventionLogger>,
    ) -> Self {
        Self {
            policy: config.retry,
            guidance_timeout: config.guidance_timeout,
            oracle,
            pivot,
            logger,
        }
    }

    /// Standard wiring: the built-in [`Oracle`], a [`Pivot`] over `store`
    /// and a logger in the configured intervention directory.
    pub fn from_config(config: &WatchdogConfig, store: Arc<dyn FrontierStore>) -> Self {
        Self::new(
            config,
            Arc::new(Oracle),
            Pivot::new(store),
            Arc::new(InterventionLogger::new(config.intervention_dir.clone())),
        )
    }

    pub fn failure_threshold(&self) -> u32 {
        self.policy.max_attempts
    }

    /// Run `operation` until it succeeds or fails `threshold` times.
    ///
    /// The Nth consecutive failure escalates: guidance is requested under a
    /// timeout, Pivot reroutes `entry_url`, an intervention is recorded and
    /// an [`Escalation`] is returned. Errors that are not retryable are
    /// returned at once without counting; otherwise only Pivot or logger
    /// failures are surfaced as errors.
    #[instrument(skip_all, fields(entry = %entry_url))]
    pub async fn monitor<T, F, Fut>(
        &self,
        mut operation: F,
        context: &str,
        entry_url: &str,
    ) -> Result<Monitored<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempts = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(Monitored::Completed(value)),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    attempts += 1;
                    if attempts >= self.policy.max_attempts {
                        return self
                            .escalate(context, &e.to_string(), entry_url, attempts)
                            .await
                            .map(Monitored::Escalated);
                    }
                    warn!(attempt = attempts, error = %e, "monitored operation failed");
                    let delay = self.policy.delay_after(attempts);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }

    async fn escalate(
        &self,
        context: &str,
        last_error: &str,
        entry_url: &str,
        attempts: u32,
    ) -> Result<Escalation> {
        warn!(attempts, error = %last_error, "failure threshold reached, escalating");

        let guidance = match tokio::time::timeout(
            self.guidance_timeout,
            self.oracle.guidance(context, last_error),
        )
        .await
        {
            Ok(guidance) => guidance,
            Err(_) => {
                warn!("guidance timed out, using fallback");
                Guidance::fallback()
            }
        };

        self.pivot.mark_failed(entry_url).await?;
        let new_target = self.pivot.execute_pivot(entry_url, &guidance.guidance).await?;

        let record = InterventionRecord {
            timestamp: Utc::now(),
            lost_context: context.to_string(),
            error_detected: last_error.to_string(),
            golden_path: guidance.guidance.clone(),
            pivot_target: new_target.clone(),
            status: if new_target.is_some() {
                InterventionStatus::SystemSaved
            } else {
                InterventionStatus::NoAlternative
            },
        };
        self.logger.record(&record).await?;

        Ok(Escalation {
            agent: ESCALATION_AGENT,
            guidance,
            new_target,
            attempts,
            last_error: last_error.to_string(),
        })
    }
}
