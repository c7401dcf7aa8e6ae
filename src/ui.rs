//! Interface de terminal do dmsnet: barra de progresso e saída colorida.
//!
//! Usa as crates `indicatif` para o progresso e `console` para estilização
//! com cores. O [`TerminalRequestor`] recebe os relatórios dos jobs e
//! acompanha visualmente a execução no terminal.

use std::sync::Arc;
use std::time::Duration;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};
use parking_lot::Mutex;

use dmsnet::state_machine::{AuditRecord, Requestor, Terminal, UpdateUi, WorkReport};
use dmsnet::storage::EnginePhase;
use dmsnet::wire::{WireError, WirePayload};

/// Requestor de terminal para jobs e engine methods.
///
/// Exibe uma barra com o percentual agregado durante a execução e mensagens
/// coloridas para sucesso (verde), falha (vermelho) e abort (amarelo).
pub struct TerminalRequestor {
    // Barra de progresso do indicatif.
    pb: ProgressBar,
    green: Style,
    red: Style,
    yellow: Style,
    // Último relatório terminal recebido.
    terminal: Mutex<Option<WorkReport>>,
}

impl TerminalRequestor {
    /// Inicia a barra com a descrição da operação.
    pub fn start(description: &str) -> Self {
        let pb = ProgressBar::new(100);
        pb.set_style(
            ProgressStyle::with_template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos:>3}% {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        pb.set_message(description.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
            terminal: Mutex::new(None),
        }
    }

    /// Ação de UI entregue aos jobs: move a barra para o percentual do
    /// relatório e mostra o estado.
    pub fn update_ui(&self) -> UpdateUi {
        let pb = self.pb.clone();
        Arc::new(move |report: &WorkReport| {
            pb.set_position(u64::from(report.percent));
            pb.set_message(format!("{} {}", report.kind, report.state));
        })
    }

    /// Mostra a fase atual de um engine method.
    pub fn phase(&self, phase: EnginePhase, start: bool) {
        let marker = if start { "▶" } else { "…" };
        self.pb.set_message(format!("{marker} {phase}"));
    }

    pub fn terminal_report(&self) -> Option<WorkReport> {
        self.terminal.lock().clone()
    }

    /// Finaliza a barra e exibe o resultado final do job.
    pub fn complete(&self, report: &WorkReport) {
        self.pb.finish_and_clear();
        match report.state.terminal() {
            Some(Terminal::Finished) => {
                println!("  {} {} finished", self.green.apply_to("✓"), report.kind);
            }
            Some(Terminal::Aborted) => {
                println!("  {} {} aborted", self.yellow.apply_to("■"), report.kind);
            }
            Some(Terminal::Error) | None => {
                println!(
                    "  {} {} failed ({})",
                    self.red.apply_to("✗"),
                    report.kind,
                    report.state
                );
            }
        }
    }

    /// Finaliza a barra com uma mensagem de sucesso ou falha livre.
    pub fn outcome(&self, ok: bool, message: &str) {
        self.pb.finish_and_clear();
        if ok {
            println!("  {} {message}", self.green.apply_to("✓"));
        } else {
            println!("  {} {message}", self.red.apply_to("✗"));
        }
    }

    /// Imprime o registro de auditoria formatado em JSON com estilo colorido.
    pub fn print_audit(&self, record: &AuditRecord) {
        let style = if record.errors.is_empty() {
            &self.green
        } else {
            &self.red
        };
        println!();
        println!("{}", style.apply_to("─── Audit Record ───"));
        let encoded = serde_json::to_value(record)
            .map_err(WireError::from)
            .and_then(|value| WirePayload::Generic(&value).encode("utf-8"));
        match encoded {
            Ok(bytes) => println!("{}", String::from_utf8_lossy(&bytes)),
            Err(err) => println!("{}", self.red.apply_to(format!("audit record unavailable: {err}"))),
        }
    }
}

impl<P> Requestor<P> for TerminalRequestor {
    fn work_report(&self, update_ui: &UpdateUi, report: &WorkReport, _payload: &P) {
        update_ui(report);
        if report.terminal {
            *self.terminal.lock() = Some(report.clone());
            self.complete(report);
        }
    }
}
