//! Gerenciador de erros do processo.
//!
//! Coleta registros estruturados, apenas acrescentados, que os jobs consultam
//! para decidir se já estão em erro.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use super::watchdog::WatchdogError;
use crate::logger::{DiagnosticLog, LogLevel, render_chain};

/// Identifica o job que originou um registro.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobRef {
    pub id: String,
    pub kind: &'static str,
}

impl JobRef {
    pub fn new(id: impl Into<String>, kind: &'static str) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }
}

/// Um registro de erro.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub message: String,
    /// Cadeia de causas renderizada, quando houver.
    pub source: Option<String>,
    pub job: Option<JobRef>,
    /// Locator do comando de origem.
    pub command: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ErrorRecord {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
            job: None,
            command: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_job(mut self, job: &JobRef) -> Self {
        self.job = Some(job.clone());
        self
    }

    pub fn with_command(mut self, locator: impl Into<String>) -> Self {
        self.command = Some(locator.into());
        self
    }

    pub fn with_source(mut self, source: &(dyn std::error::Error + 'static)) -> Self {
        self.source = Some(render_chain(source));
        self
    }

    pub fn timeout_failed_to_start(err: &WatchdogError, job: &JobRef) -> Self {
        Self::new(format!(
            "{} {}: the timeout watchdog failed to start",
            job.kind, job.id
        ))
        .with_job(job)
        .with_source(err)
    }

    pub fn job_run_failed(job: &JobRef, reason: &str) -> Self {
        Self::new(format!("{} {} failed: {reason}", job.kind, job.id)).with_job(job)
    }

    pub fn job_timed_out(job: &JobRef, timeout: Duration) -> Self {
        Self::new(format!(
            "{} {} timed out after {}s without activity",
            job.kind,
            job.id,
            timeout.as_secs_f64()
        ))
        .with_job(job)
    }

    fn render(&self) -> String {
        let mut text = self.message.clone();
        if let Some(job) = &self.job {
            text.push_str(&format!("\nJob: {} ({})", job.id, job.kind));
        }
        if let Some(command) = &self.command {
            text.push_str(&format!("\nCommand: {command}"));
        }
        if let Some(source) = &self.source {
            text.push_str(&format!("\nSource: {source}"));
        }
        text
    }
}

/// Coletor de registros compartilhado pelo processo. Clonar é barato.
#[derive(Clone, Default)]
pub struct ErrorManager {
    records: Arc<Mutex<Vec<ErrorRecord>>>,
    log: Option<Arc<DiagnosticLog>>,
}

impl ErrorManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Espelha cada registro no log geral.
    pub fn with_log(mut self, log: Arc<DiagnosticLog>) -> Self {
        self.log = Some(log);
        self
    }

    pub fn add(&self, record: ErrorRecord) {
        tracing::error!(
            job = record.job.as_ref().map(|j| j.id.as_str()),
            "{}",
            record.message
        );
        if let Some(log) = &self.log {
            log.write(LogLevel::Normal, &record.render());
        }
        self.records.lock().push(record);
    }

    pub fn records(&self) -> Vec<ErrorRecord> {
        self.records.lock().clone()
    }

    pub fn records_for(&self, job_id: &str) -> Vec<ErrorRecord> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.job.as_ref().is_some_and(|j| j.id == job_id))
            .cloned()
            .collect()
    }

    pub fn has_errors_for(&self, job_id: &str) -> bool {
        self.records
            .lock()
            .iter()
            .any(|r| r.job.as_ref().is_some_and(|j| j.id == job_id))
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
