use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use super::errors::ErrorManager;
use super::job::{Capture, JobCore, JobHandle, Outcome};
use crate::asset::{AssetServer, DataAssetReply, FullAsset, MetaAssetReply};
use crate::command::Command;
use crate::events::{FailureCause, HandlerResult, Observer};
use crate::state_machine::{JobState, Requestor, UpdateUi};
use crate::transport::{Direction, Progress};

/// Downloads one asset: its meta data first, then its content.
pub struct DownloadAssetJob {
    core: JobCore<FullAsset>,
    server: AssetServer,
    payload: FullAsset,
}

impl DownloadAssetJob {
    pub const KIND: &'static str = "DownloadAssetJob";

    pub fn new(
        server: AssetServer,
        asset_id: Uuid,
        timeout: Duration,
        errors: ErrorManager,
        requestor: Arc<dyn Requestor<FullAsset>>,
        update_ui: UpdateUi,
    ) -> Self {
        Self {
            core: JobCore::new(Self::KIND, timeout, errors, requestor, update_ui),
            server,
            payload: FullAsset::new(asset_id),
        }
    }

    pub fn id(&self) -> &str {
        &self.core.job().id
    }

    pub fn handle(&self) -> JobHandle {
        self.core.handle()
    }

    pub fn state(&self) -> JobState {
        self.core.state()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.core.started_at()
    }

    pub fn payload(&self) -> &FullAsset {
        &self.payload
    }

    pub fn into_payload(self) -> FullAsset {
        self.payload
    }

    pub fn progress_attachments(&self) -> usize {
        self.core.progress_attachments()
    }

    /// Run the job to a terminal state on the calling task. The requestor
    /// receives the terminal report before this returns.
    pub async fn run(mut self) -> Self {
        self.execute().await;
        self.core.conclude(&self.payload);
        self
    }

    async fn execute(&mut self) {
        if !self.core.begin() || self.core.is_error() || !self.core.start_watchdog() {
            return;
        }
        info!(job = %self.id(), asset = %self.payload.id, "downloading asset");

        let meta = match Command::<MetaAssetReply>::get_meta_asset(&self.server, self.payload.id) {
            Ok(command) => command,
            Err(err) => return self.core.fail_with("cannot build meta asset command", &err),
        };
        let locator = meta.target().to_string();
        let mut capture = Capture::default();
        if let Err(err) = meta.execute(&self.server.options(), &mut capture).await {
            return self.core.fail_with("meta asset subscriber failed", &err);
        }
        match capture.outcome {
            Outcome::Complete(reply) => {
                self.payload.data.version = reply.meta.version;
                self.payload.data.bytes_total = reply.meta.length;
                self.payload.meta = Some(reply.meta);
            }
            other => return self.core.fail_exchange(&locator, "meta asset fetch", other),
        }

        if !self.core.checkpoint() {
            return;
        }

        let Some(meta) = self.payload.meta.clone() else {
            return self.core.fail("meta asset missing after fetch");
        };
        let data = match Command::<DataAssetReply>::get_data_asset(&self.server, &meta) {
            Ok(command) => command,
            Err(err) => return self.core.fail_with("cannot build data asset command", &err),
        };
        let locator = data.target().to_string();
        self.core.attach_progress();
        let mut progress = DataProgress {
            core: &mut self.core,
            payload: &mut self.payload,
            capture: Capture::default(),
        };
        let result = data.execute(&self.server.options(), &mut progress).await;
        let outcome = progress.capture.outcome;
        self.core.detach_progress();
        if let Err(err) = result {
            return self.core.fail_with("data asset subscriber failed", &err);
        }
        match outcome {
            Outcome::Complete(reply) => {
                let received = reply.content.len() as u64;
                self.payload.data.content = reply.content;
                self.payload.data.bytes_complete = received;
                if received != meta.length {
                    return self.core.fail(&format!(
                        "data asset length mismatch: expected {} bytes, received {received}",
                        meta.length
                    ));
                }
            }
            other => return self.core.fail_exchange(&locator, "data asset fetch", other),
        }

        if !self.core.checkpoint() {
            return;
        }
        self.core.finish();
    }
}

/// Feeds received bytes of the data fetch into the job's progress.
struct DataProgress<'a> {
    core: &'a mut JobCore<FullAsset>,
    payload: &'a mut FullAsset,
    capture: Capture<DataAssetReply>,
}

impl Observer<DataAssetReply> for DataProgress<'_> {
    fn on_progress(&mut self, progress: &Progress) -> HandlerResult {
        if progress.direction != Direction::Receive {
            self.core.update_last_action();
            return Ok(());
        }
        self.payload.data.bytes_complete += progress.packet_size as u64;
        let (complete, total) = (
            self.payload.data.bytes_complete,
            self.payload.data.bytes_total,
        );
        self.core.update_progress(self.payload, complete, total);
        Ok(())
    }

    fn on_complete(&mut self, reply: &DataAssetReply) -> HandlerResult {
        self.capture.on_complete(reply)
    }

    fn on_error(&mut self, message: &str, cause: &FailureCause) -> HandlerResult {
        self.capture.on_error(message, cause)
    }

    fn on_timeout(&mut self) -> HandlerResult {
        self.capture.on_timeout()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::model::fixtures;
    use crate::asset::testing;
    use crate::transport::mock::{Scripted, ScriptedTransport};
    use crate::work::job::testing::{Reports, no_ui};
    use parking_lot::Mutex;

    const CONTENT: &[u8] = b"%PDF-1.7 twenty bytes";

    fn meta_body(id: Uuid, length: u64) -> String {
        serde_json::to_string(&fixtures::meta(id, length)).unwrap()
    }

    fn job(
        transport: Arc<ScriptedTransport>,
        id: Uuid,
        errors: ErrorManager,
    ) -> (DownloadAssetJob, Arc<Reports<FullAsset>>) {
        let reports = Arc::new(Reports::default());
        let job = DownloadAssetJob::new(
            testing::server(transport),
            id,
            Duration::from_secs(30),
            errors,
            reports.clone(),
            no_ui(),
        );
        (job, reports)
    }

    #[tokio::test]
    async fn reachable_asset_finishes_with_full_payload() {
        let id = Uuid::new_v4();
        let transport = ScriptedTransport::new()
            .route(
                &format!("/api/meta/{id}"),
                Scripted::json(200, meta_body(id, CONTENT.len() as u64)),
            )
            .route(&format!("/api/data/{id}"), Scripted::bytes(CONTENT))
            .into_arc();
        let (job, reports) = job(transport, id, ErrorManager::new());

        let job = job.run().await;

        assert_eq!(job.state(), JobState::ACTIVE | JobState::FINISHED);
        let terminal = reports.terminal();
        assert_eq!(terminal.len(), 1);
        let (report, payload) = &terminal[0];
        assert_eq!(report.percent, 100);
        assert_eq!(payload.data.bytes_complete, payload.data.bytes_total);
        assert_eq!(&payload.data.content[..], CONTENT);
        assert!(payload.is_complete());
        assert_eq!(job.progress_attachments(), 1);
    }

    #[tokio::test]
    async fn intermediate_progress_is_monotone_and_below_100() {
        let id = Uuid::new_v4();
        let transport = ScriptedTransport::new()
            .route(
                &format!("/api/meta/{id}"),
                Scripted::json(200, meta_body(id, CONTENT.len() as u64)),
            )
            .route(&format!("/api/data/{id}"), Scripted::bytes(CONTENT))
            .into_arc();
        let (job, reports) = job(transport, id, ErrorManager::new());
        job.run().await;

        let percents = reports.intermediate_percents();
        assert!(!percents.is_empty());
        assert!(percents.windows(2).all(|w| w[0] <= w[1]));
        assert!(percents.iter().all(|p| *p < 100));
        let all = reports.reports.lock();
        assert!(all.last().unwrap().0.terminal);
    }

    #[tokio::test]
    async fn meta_failure_ends_in_error_without_data_progress() {
        let id = Uuid::new_v4();
        let transport = ScriptedTransport::new()
            .route(&format!("/api/meta/{id}"), Scripted::Fail("connection refused".into()))
            .into_arc();
        let errors = ErrorManager::new();
        let (job, reports) = job(transport.clone(), id, errors.clone());

        let job = job.run().await;

        assert!(job.state().is_error());
        assert!(!job.state().is_finished());
        assert_eq!(job.progress_attachments(), 0);
        assert_eq!(reports.terminal().len(), 1);
        assert_eq!(reports.reports.lock().len(), 1);
        assert_eq!(transport.request_count(), 1);
        let records = errors.records_for(job.id());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message.matches("connection refused").count(), 1);
        assert!(
            records[0]
                .source
                .as_deref()
                .is_some_and(|source| source.contains("connection refused"))
        );
        assert_eq!(
            records[0].command.as_deref(),
            Some(format!("http://assets.test/api/meta/{id}").as_str())
        );
    }

    #[tokio::test]
    async fn abort_between_fetches_skips_the_data_fetch() {
        let id = Uuid::new_v4();
        let handle_slot: Arc<Mutex<Option<JobHandle>>> = Arc::new(Mutex::new(None));
        let slot = handle_slot.clone();
        let transport = ScriptedTransport::new()
            .route(
                &format!("/api/meta/{id}"),
                Scripted::json(200, meta_body(id, CONTENT.len() as u64)),
            )
            .route(&format!("/api/data/{id}"), Scripted::bytes(CONTENT))
            .on_request(move |request| {
                if request.url.path().contains("/meta/") {
                    if let Some(handle) = slot.lock().as_ref() {
                        handle.abort();
                    }
                }
            })
            .into_arc();
        let (job, reports) = job(transport.clone(), id, ErrorManager::new());
        *handle_slot.lock() = Some(job.handle());

        let job = job.run().await;

        assert!(job.state().is_aborted());
        assert!(!job.state().is_finished());
        assert_eq!(reports.terminal().len(), 1);
        assert_eq!(transport.requested_paths(), vec![format!("/api/meta/{id}")]);
        assert_eq!(job.progress_attachments(), 0);
    }

    #[tokio::test]
    async fn short_content_is_a_length_mismatch() {
        let id = Uuid::new_v4();
        let transport = ScriptedTransport::new()
            .route(&format!("/api/meta/{id}"), Scripted::json(200, meta_body(id, 64)))
            .route(&format!("/api/data/{id}"), Scripted::bytes(CONTENT))
            .into_arc();
        let errors = ErrorManager::new();
        let (job, reports) = job(transport, id, errors.clone());

        let job = job.run().await;

        assert!(job.state().is_error());
        assert_eq!(reports.terminal().len(), 1);
        assert!(errors.records()[0].message.contains("length mismatch"));
    }

    #[tokio::test]
    async fn data_timeout_ends_in_error() {
        let id = Uuid::new_v4();
        let transport = ScriptedTransport::new()
            .route(
                &format!("/api/meta/{id}"),
                Scripted::json(200, meta_body(id, CONTENT.len() as u64)),
            )
            .route(&format!("/api/data/{id}"), Scripted::Timeout(Direction::Receive))
            .into_arc();
        let (job, reports) = job(transport, id, ErrorManager::new());

        let job = job.run().await;

        assert!(job.state().is_error());
        assert!(!job.state().is_timed_out());
        assert_eq!(reports.terminal().len(), 1);
        assert_eq!(job.progress_attachments(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_job_is_timed_out_by_the_watchdog() {
        let id = Uuid::new_v4();
        let transport = ScriptedTransport::new()
            .route(
                &format!("/api/meta/{id}"),
                Scripted::Delay(
                    Duration::from_secs(45),
                    Box::new(Scripted::json(200, meta_body(id, CONTENT.len() as u64))),
                ),
            )
            .route(&format!("/api/data/{id}"), Scripted::bytes(CONTENT))
            .into_arc();
        let errors = ErrorManager::new();
        let (job, reports) = job(transport.clone(), id, errors.clone());

        let job = job.run().await;

        assert!(job.state().is_timed_out());
        assert!(job.state().is_error());
        assert_eq!(reports.terminal().len(), 1);
        assert_eq!(transport.request_count(), 1);
        assert!(errors.records()[0].message.contains("timed out after 30s"));
    }

    #[tokio::test]
    async fn second_run_issues_no_second_report() {
        let id = Uuid::new_v4();
        let transport = ScriptedTransport::new()
            .route(
                &format!("/api/meta/{id}"),
                Scripted::json(200, meta_body(id, CONTENT.len() as u64)),
            )
            .route(&format!("/api/data/{id}"), Scripted::bytes(CONTENT))
            .into_arc();
        let (job, reports) = job(transport.clone(), id, ErrorManager::new());

        let job = job.run().await.run().await;

        assert!(job.state().is_finished());
        assert_eq!(reports.terminal().len(), 1);
        assert_eq!(transport.request_count(), 2);
    }
}
