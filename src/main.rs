mod cli;
mod ui;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use bytes::Bytes;
use clap::Parser;
use parking_lot::Mutex;
use tracing::info;

use cli::{Cli, Command};
use dmsnet::asset::AssetServer;
use dmsnet::config::DmsConfig;
use dmsnet::logger::{DiagnosticLog, init_tracing};
use dmsnet::state_machine::{AuditRecord, JobState};
use dmsnet::storage::{
    Database, EngineMethod, EngineRequest, GetAllGroups, Group, PutAttachment,
    PutAttachmentReply, Server, ViewReply,
};
use dmsnet::transport::{HttpTransport, Transport};
use dmsnet::wire::WirePayload;
use dmsnet::work::{DownloadAssetJob, ErrorManager, FetchDocumentJob, JobHandle};
use ui::TerminalRequestor;

/// Logs geral e de rede, abertos apenas quando `log_dir` está configurado.
struct Logs {
    general: Option<Arc<DiagnosticLog>>,
    network: Option<Arc<DiagnosticLog>>,
}

impl Logs {
    fn open(dir: Option<&Path>) -> Result<Self> {
        let Some(dir) = dir else {
            return Ok(Self {
                general: None,
                network: None,
            });
        };
        std::fs::create_dir_all(dir)
            .with_context(|| format!("cannot create log directory {}", dir.display()))?;
        Ok(Self {
            general: Some(Arc::new(DiagnosticLog::open(dir.join("general.log"))?)),
            network: Some(Arc::new(DiagnosticLog::open(dir.join("network.log"))?)),
        })
    }

    fn close(&self) {
        for log in self.general.iter().chain(self.network.iter()) {
            log.close();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = DmsConfig::load_from(&cli.config, |key| std::env::var(key).ok())?;
    let logs = Logs::open(config.log_dir.as_deref())?;

    let mut transport = HttpTransport::new()?;
    if let Some(log) = &logs.network {
        transport = transport.with_network_log(Arc::clone(log));
    }
    let transport: Arc<dyn Transport> = Arc::new(transport);

    let mut errors = ErrorManager::new();
    if let Some(log) = &logs.general {
        errors = errors.with_log(Arc::clone(log));
    }

    let result = run(cli.command, &config, transport, errors).await;
    logs.close();
    result
}

async fn run(
    command: Command,
    config: &DmsConfig,
    transport: Arc<dyn Transport>,
    errors: ErrorManager,
) -> Result<()> {
    match command {
        Command::Get { id } => {
            let ui = Arc::new(TerminalRequestor::start(&format!("fetching {id}")));
            let job = FetchDocumentJob::new(
                database(config, transport)?,
                id,
                config.job_timeout(),
                errors.clone(),
                ui.clone(),
                ui.update_ui(),
            );
            let watcher = abort_on_ctrl_c(job.handle());
            let job = job.run().await;
            watcher.abort();

            audit(&ui, job.started_at(), job.id(), &errors);
            if let Some(document) = &job.payload().document {
                let encoded = WirePayload::Document(document).encode("utf-8")?;
                println!("{}", String::from_utf8_lossy(&encoded));
            }
            ensure_finished(job.state())
        }

        Command::Groups => {
            let ui = TerminalRequestor::start("listing groups");
            let mut request: EngineRequest<ViewReply> = EngineRequest::new();
            let failure = track_failure(&mut request);
            let groups = collect_groups(&mut request);
            let phases = Arc::new(ui);
            let on_phase = Arc::clone(&phases);
            request.subscribe_phase_changed(move |_, phase, start| {
                on_phase.phase(phase, start);
                Ok(())
            });

            GetAllGroups::new(database(config, transport)?)
                .execute(&mut request)
                .await?;

            let failure = failure.lock().take();
            phases.outcome(failure.is_none(), failure.as_deref().unwrap_or("groups listed"));
            if let Some(message) = failure {
                bail!(message);
            }
            for group in groups.lock().iter() {
                println!("{}: {}", group.name, group.members.join(", "));
            }
            Ok(())
        }

        Command::Attach {
            document,
            name,
            file,
            content_type,
        } => {
            let content = std::fs::read(&file)
                .with_context(|| format!("cannot read {}", file.display()))?;
            let ui = Arc::new(TerminalRequestor::start(&format!("attaching {name}")));
            let mut request: EngineRequest<PutAttachmentReply> = EngineRequest::new();
            let failure = track_failure(&mut request);
            let on_phase = Arc::clone(&ui);
            request.subscribe_phase_changed(move |_, phase, start| {
                on_phase.phase(phase, start);
                Ok(())
            });
            let revision = capture_revision(&mut request);

            PutAttachment::new(
                database(config, transport)?,
                document.as_str(),
                name.as_str(),
                content_type,
                Bytes::from(content),
            )
            .execute(&mut request)
            .await?;

            if let Some(message) = failure.lock().take() {
                ui.outcome(false, &message);
                bail!(message);
            }
            let revision = revision.lock().take().unwrap_or_default();
            ui.outcome(true, &format!("{name} attached to {document} at {revision}"));
            Ok(())
        }

        Command::Download { asset, out } => {
            let server = AssetServer::new(
                &config.asset_url,
                config.timeout(),
                config.buffer_size,
                transport,
            )?;
            let ui = Arc::new(TerminalRequestor::start(&format!("downloading {asset}")));
            let job = DownloadAssetJob::new(
                server,
                asset,
                config.job_timeout(),
                errors.clone(),
                ui.clone(),
                ui.update_ui(),
            );
            let watcher = abort_on_ctrl_c(job.handle());
            let job = job.run().await;
            watcher.abort();

            audit(&ui, job.started_at(), job.id(), &errors);
            ensure_finished(job.state())?;
            let path = job.payload().save(&out)?;
            info!(path = %path.display(), "asset saved");
            println!("{}", path.display());
            Ok(())
        }
    }
}

fn database(config: &DmsConfig, transport: Arc<dyn Transport>) -> Result<Database> {
    let server = Server::new(
        &config.storage_url,
        config.timeout(),
        config.buffer_size,
        transport,
    )?;
    Ok(Arc::new(server).database(config.database.as_str()))
}

/// Registra subscribers de erro e timeout que guardam a primeira falha.
fn track_failure<R>(request: &mut EngineRequest<R>) -> Arc<Mutex<Option<String>>> {
    let failure = Arc::new(Mutex::new(None));
    let on_error = Arc::clone(&failure);
    let on_timeout = Arc::clone(&failure);
    request
        .events()
        .subscribe_error(move |message, cause| {
            on_error
                .lock()
                .get_or_insert_with(|| format!("{message} ({cause})"));
            Ok(())
        })
        .subscribe_timeout(move || {
            on_timeout
                .lock()
                .get_or_insert_with(|| "the server did not answer in time".to_string());
            Ok(())
        });
    failure
}

fn collect_groups(request: &mut EngineRequest<ViewReply>) -> Arc<Mutex<Vec<Group>>> {
    let groups = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&groups);
    request.events().subscribe_complete(move |reply: &ViewReply| {
        sink.lock().extend(reply.groups()?);
        Ok(())
    });
    groups
}

fn capture_revision(
    request: &mut EngineRequest<PutAttachmentReply>,
) -> Arc<Mutex<Option<String>>> {
    let revision = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&revision);
    request
        .events()
        .subscribe_complete(move |reply: &PutAttachmentReply| {
            *sink.lock() = Some(reply.rev.clone());
            Ok(())
        });
    revision
}

fn abort_on_ctrl_c(handle: JobHandle) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.abort();
        }
    })
}

fn audit(
    ui: &TerminalRequestor,
    started_at: chrono::DateTime<chrono::Utc>,
    job_id: &str,
    errors: &ErrorManager,
) {
    if let Some(report) = ui.terminal_report() {
        let record = AuditRecord::from_report(&report, started_at, &errors.records_for(job_id));
        ui.print_audit(&record);
    }
}

fn ensure_finished(state: JobState) -> Result<()> {
    if !state.is_finished() {
        bail!("job ended in state {state}");
    }
    Ok(())
}
