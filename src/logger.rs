//! Registro de diagnóstico e configuração do `tracing`.
//!
//! O [`DiagnosticLog`] grava registros de quatro linhas (separador, nível,
//! timestamp e mensagem) em modo append. O arquivo é aberto na criação e
//! liberado de forma determinística por [`DiagnosticLog::close`] ou no `Drop`.

use std::error::Error as StdError;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use chrono::Local;
use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;

const SEPARATOR: &str = "------------------------------------------------------------------------------------------------------------------";

/// Nível de um registro de diagnóstico.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Normal,
    Debug,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Normal => write!(f, "Normal"),
            LogLevel::Debug => write!(f, "Debug"),
        }
    }
}

/// Log append-only com registros de quatro linhas.
///
/// Escritas concorrentes são serializadas pelo mutex, então um registro
/// nunca é intercalado com outro.
pub struct DiagnosticLog {
    // `None` depois do fechamento.
    writer: Mutex<Option<BufWriter<File>>>,
}

impl DiagnosticLog {
    /// Abre (ou cria) o arquivo em modo append e grava "Logging started.".
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        let log = Self {
            writer: Mutex::new(Some(BufWriter::new(file))),
        };
        log.write(LogLevel::Debug, "Logging started.");
        Ok(log)
    }

    /// Grava um registro. Falhas de I/O são reportadas ao `tracing` e não
    /// interrompem o chamador.
    pub fn write(&self, level: LogLevel, message: &str) {
        let mut guard = self.writer.lock();
        let Some(writer) = guard.as_mut() else {
            return;
        };
        if let Err(err) = write_record(writer, level, message) {
            tracing::warn!(error = %err, "failed to write diagnostic record");
        }
    }

    pub fn is_open(&self) -> bool {
        self.writer.lock().is_some()
    }

    /// Grava "Logging stopped." e libera o arquivo. Chamadas repetidas não
    /// têm efeito.
    pub fn close(&self) {
        let mut guard = self.writer.lock();
        if let Some(mut writer) = guard.take() {
            if let Err(err) = write_record(&mut writer, LogLevel::Debug, "Logging stopped.") {
                tracing::warn!(error = %err, "failed to write closing record");
            }
        }
    }
}

impl Drop for DiagnosticLog {
    fn drop(&mut self) {
        self.close();
    }
}

fn write_record(writer: &mut impl Write, level: LogLevel, message: &str) -> io::Result<()> {
    writeln!(writer, "{SEPARATOR}")?;
    writeln!(writer, "Level: {level}")?;
    writeln!(writer, "Timestamp: {}", Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))?;
    writeln!(writer, "Message: {message}")?;
    writer.flush()
}

/// Renderiza um erro e toda a sua cadeia de causas, uma por linha, com
/// indentação crescente.
pub fn render_chain(err: &(dyn StdError + 'static)) -> String {
    let mut out = err.to_string();
    let mut indent = String::from("\t");
    let mut source = err.source();
    while let Some(cause) = source {
        out.push('\n');
        out.push_str(&indent);
        out.push_str("caused by: ");
        out.push_str(&cause.to_string());
        indent.push('\t');
        source = cause.source();
    }
    out
}

/// Inicializa o subscriber do `tracing`. `RUST_LOG` tem precedência sobre o
/// nível padrão escolhido por `verbose`.
pub fn init_tracing(verbose: bool) {
    let default = if verbose { "dmsnet=debug" } else { "dmsnet=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn records_are_four_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("general.log");
        let log = DiagnosticLog::open(&path).unwrap();
        log.write(LogLevel::Normal, "document fetched");
        log.close();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        // started + message + stopped
        assert_eq!(lines.len(), 12);
        assert_eq!(lines[4], SEPARATOR);
        assert_eq!(lines[5], "Level: Normal");
        assert!(lines[6].starts_with("Timestamp: "));
        assert_eq!(lines[7], "Message: document fetched");
        assert_eq!(lines[11], "Message: Logging stopped.");
    }

    #[test]
    fn close_is_idempotent_and_silences_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("general.log");
        let log = DiagnosticLog::open(&path).unwrap();
        log.close();
        log.close();
        log.write(LogLevel::Normal, "ignored");
        assert!(!log.is_open());

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.matches("Logging stopped.").count(), 1);
        assert!(!contents.contains("ignored"));
    }

    #[test]
    fn drop_releases_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("general.log");
        {
            let _log = DiagnosticLog::open(&path).unwrap();
        }
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("Logging stopped."));
    }

    #[test]
    fn open_appends_to_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("general.log");
        DiagnosticLog::open(&path).unwrap().close();
        DiagnosticLog::open(&path).unwrap().close();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.matches("Logging started.").count(), 2);
    }

    #[test]
    fn concurrent_writers_never_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("general.log");
        let log = Arc::new(DiagnosticLog::open(&path).unwrap());

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let log = log.clone();
                std::thread::spawn(move || {
                    for i in 0..25 {
                        log.write(LogLevel::Normal, &format!("writer {t} record {i}"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        log.close();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        for record in lines.chunks(4) {
            assert_eq!(record[0], SEPARATOR);
            assert!(record[1].starts_with("Level: "));
            assert!(record[2].starts_with("Timestamp: "));
            assert!(record[3].starts_with("Message: "));
        }
    }

    #[derive(Debug, thiserror::Error)]
    #[error("fetch failed")]
    struct FetchFailed(#[source] io::Error);

    #[test]
    fn render_chain_walks_sources() {
        let err = FetchFailed(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
        assert_eq!(render_chain(&err), "fetch failed\n\tcaused by: refused");
    }
}
