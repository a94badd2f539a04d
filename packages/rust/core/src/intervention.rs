//! Append-only intervention log.
//!
//! Each record is appended as one JSON line to `interventions.jsonl` and
//! rendered as a standalone Markdown artifact. Prior lines are never
//! rewritten.

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use artemis_shared::{ArtemisError, InterventionRecord, Result};

/// File name of the JSON Lines log inside the intervention directory.
pub const LOG_FILE_NAME: &str = "interventions.jsonl";

/// Writes intervention records under one directory.
pub struct InterventionLogger {
    dir: PathBuf,
    append_lock: Mutex<()>,
}

impl InterventionLogger {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            append_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn log_path(&self) -> PathBuf {
        self.dir.join(LOG_FILE_NAME)
    }

    /// Append `record` and write its artifact. Returns the artifact path.
    pub async fn record(&self, record: &InterventionRecord) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| ArtemisError::io(&self.dir, e))?;

        let mut line = serde_json::to_string(record)
            .map_err(|e| ArtemisError::validation(format!("unserializable intervention: {e}")))?;
        line.push('\n');

        let log_path = self.log_path();
        {
            let _guard = self.append_lock.lock().await;
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_path)
                .await
                .map_err(|e| ArtemisError::io(&log_path, e))?;
            file.write_all(line.as_bytes())
                .await
                .map_err(|e| ArtemisError::io(&log_path, e))?;
            file.flush().await.map_err(|e| ArtemisError::io(&log_path, e))?;
        }

        let artifact = self.dir.join(format!(
            "INTERVENTION_{}_{}.md",
            record.timestamp.timestamp_millis(),
            Uuid::now_v7()
        ));
        tokio::fs::write(&artifact, render_markdown(record))
            .await
            .map_err(|e| ArtemisError::io(&artifact, e))?;

        info!(
            status = record.status.as_str(),
            pivot_target = record.pivot_target.as_deref().unwrap_or("-"),
            artifact = %artifact.display(),
            "intervention recorded"
        );
        Ok(artifact)
    }
}

/// Human-readable form of one record.
pub fn render_markdown(record: &InterventionRecord) -> String {
    format!(
        "# Intervention\n\n\
         **Date:** {}\n\
         **Status:** {}\n\n\
         ## Lost context\n\n\
         > {}\n\n\
         **Error:** {}\n\n\
         ## Guidance\n\n\
         {}\n\n\
         **Rerouted to:** {}\n",
        record.timestamp.to_rfc3339(),
        record.status.as_str(),
        record.lost_context,
        record.error_detected,
        record.golden_path,
        record.pivot_target.as_deref().unwrap_or("no alternative"),
    )
}
