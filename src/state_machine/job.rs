use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::state::JobState;
use crate::work::ErrorRecord;

/// Snapshot of a job handed to its requestor with every report.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkReport {
    pub job_id: String,
    pub kind: &'static str,
    pub state: JobState,
    /// Aggregate progress, 0 to 100, never decreasing.
    pub percent: u8,
    pub bytes_complete: u64,
    pub bytes_total: u64,
    /// Set on the one report that concludes the job.
    pub terminal: bool,
    pub last_action: DateTime<Utc>,
}

/// UI callback chosen by whoever created the job. The requestor decides where
/// and when to invoke it.
pub type UpdateUi = Arc<dyn Fn(&WorkReport) + Send + Sync>;

/// Receives intermediate and terminal reports from a job.
///
/// The terminal report (`report.terminal == true`) arrives exactly once per
/// job and is the only success/failure channel.
pub trait Requestor<P>: Send + Sync {
    fn work_report(&self, update_ui: &UpdateUi, report: &WorkReport, payload: &P);
}

/// Structured audit record produced once a job has concluded.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub job_id: String,
    pub kind: String,
    pub state: String,
    pub percent: u8,
    pub bytes_complete: u64,
    pub bytes_total: u64,
    pub errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: i64,
}

impl AuditRecord {
    /// Build an audit record from the terminal report of a job and the error
    /// records posted for it.
    pub fn from_report(
        report: &WorkReport,
        started_at: DateTime<Utc>,
        errors: &[ErrorRecord],
    ) -> Self {
        let now = Utc::now();
        Self {
            job_id: report.job_id.clone(),
            kind: report.kind.to_string(),
            state: report.state.to_string(),
            percent: report.percent,
            bytes_complete: report.bytes_complete,
            bytes_total: report.bytes_total,
            errors: errors.iter().map(|e| e.message.clone()).collect(),
            started_at,
            completed_at: now,
            duration_ms: (now - started_at).num_milliseconds(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::work::{ErrorRecord, JobRef};

    fn report(state: JobState) -> WorkReport {
        WorkReport {
            job_id: "job-1".into(),
            kind: "DownloadAssetJob",
            state,
            percent: 100,
            bytes_complete: 10,
            bytes_total: 10,
            terminal: true,
            last_action: Utc::now(),
        }
    }

    #[test]
    fn audit_record_from_finished_report() {
        let record =
            AuditRecord::from_report(&report(JobState::ACTIVE | JobState::FINISHED), Utc::now(), &[]);
        assert_eq!(record.job_id, "job-1");
        assert_eq!(record.kind, "DownloadAssetJob");
        assert_eq!(record.state, "ACTIVE|FINISHED");
        assert!(record.errors.is_empty());
        assert!(record.duration_ms >= 0);
    }

    #[test]
    fn audit_record_lists_error_messages() {
        let job = JobRef::new("job-1", "DownloadAssetJob");
        let errors = vec![ErrorRecord::job_run_failed(&job, "meta fetch refused")];
        let record = AuditRecord::from_report(&report(JobState::ERROR), Utc::now(), &errors);
        assert_eq!(record.state, "ERROR");
        assert_eq!(record.errors.len(), 1);
        assert!(record.errors[0].contains("meta fetch refused"));
    }

    #[test]
    fn audit_record_serializes_to_json() {
        let record = AuditRecord::from_report(&report(JobState::ABORTED), Utc::now(), &[]);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["state"], "ABORTED");
        assert_eq!(json["bytes_total"], 10);
    }
}
