//! Configuração do dmsnet carregada a partir de `dmsnet.toml`.
//!
//! A struct [`DmsConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! As variáveis de ambiente `DMSNET_STORAGE_URL` e `DMSNET_ASSET_URL` têm
//! precedência sobre o arquivo.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::DmsError;

pub const CONFIG_FILE: &str = "dmsnet.toml";
pub const STORAGE_URL_ENV: &str = "DMSNET_STORAGE_URL";
pub const ASSET_URL_ENV: &str = "DMSNET_ASSET_URL";

/// Maior inatividade aceita para um job: um dia.
pub const MAX_JOB_TIMEOUT_SECS: u64 = 24 * 60 * 60;

/// Configuração de nível superior carregada de `dmsnet.toml`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DmsConfig {
    /// URL base do servidor de armazenamento (CouchDB).
    #[serde(default = "default_storage_url")]
    pub storage_url: String,

    /// Banco de dados de documentos.
    #[serde(default = "default_database")]
    pub database: String,

    /// URL base do servidor de assets.
    #[serde(default = "default_asset_url")]
    pub asset_url: String,

    /// Timeout de envio e de recepção de cada troca, em milissegundos.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Tamanho dos buffers de envio e recepção, em bytes.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Tempo máximo de inatividade de um job antes do watchdog falhá-lo.
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,

    /// Diretório dos logs geral e de rede. Sem ele, nenhum log é gravado.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

fn default_storage_url() -> String {
    "http://localhost:5984/".to_string()
}

fn default_database() -> String {
    "dms".to_string()
}

fn default_asset_url() -> String {
    "http://localhost:8080/assets/".to_string()
}

// 30s por troca.
fn default_timeout_ms() -> u64 {
    30_000
}

fn default_buffer_size() -> usize {
    8 * 1024
}

fn default_job_timeout_secs() -> u64 {
    30
}

impl Default for DmsConfig {
    fn default() -> Self {
        Self {
            storage_url: default_storage_url(),
            database: default_database(),
            asset_url: default_asset_url(),
            timeout_ms: default_timeout_ms(),
            buffer_size: default_buffer_size(),
            job_timeout_secs: default_job_timeout_secs(),
            log_dir: None,
        }
    }
}

impl DmsConfig {
    /// Carrega a configuração de `path`, usando os defaults se o arquivo não
    /// existir. `env` resolve as variáveis de ambiente.
    pub fn load_from(
        path: &Path,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, DmsError> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<DmsConfig>(&contents)?
        } else {
            Self::default()
        };

        if let Some(url) = env(STORAGE_URL_ENV).filter(|v| !v.is_empty()) {
            config.storage_url = url;
        }
        if let Some(url) = env(ASSET_URL_ENV).filter(|v| !v.is_empty()) {
            config.asset_url = url;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), DmsError> {
        if self.timeout_ms == 0 {
            return Err(DmsError::Config("timeout_ms must be greater than zero".into()));
        }
        if self.buffer_size == 0 {
            return Err(DmsError::Config("buffer_size must be greater than zero".into()));
        }
        if self.job_timeout_secs == 0 {
            return Err(DmsError::Config(
                "job_timeout_secs must be greater than zero".into(),
            ));
        }
        if self.job_timeout_secs > MAX_JOB_TIMEOUT_SECS {
            return Err(DmsError::Config(format!(
                "job_timeout_secs must not exceed {MAX_JOB_TIMEOUT_SECS}"
            )));
        }
        if self.database.is_empty() {
            return Err(DmsError::Config("database must not be empty".into()));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn default_config_values() {
        let config = DmsConfig::default();
        assert_eq!(config.database, "dms");
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.job_timeout(), Duration::from_secs(30));
        assert_eq!(config.buffer_size, 8192);
        assert!(config.log_dir.is_none());
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            database = "contracts"
            timeout_ms = 1500
        "#;
        let config: DmsConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.database, "contracts");
        assert_eq!(config.timeout_ms, 1500);
        assert_eq!(config.storage_url, "http://localhost:5984/");
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = DmsConfig::load_from(&dir.path().join(CONFIG_FILE), no_env).unwrap();
        assert_eq!(config, DmsConfig::default());
    }

    #[test]
    fn environment_overrides_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "storage_url = \"http://file:5984/\"\nlog_dir = \"logs\"\n").unwrap();

        let config = DmsConfig::load_from(&path, |key| {
            (key == STORAGE_URL_ENV).then(|| "http://env:5984/".to_string())
        })
        .unwrap();
        assert_eq!(config.storage_url, "http://env:5984/");
        assert_eq!(config.asset_url, "http://localhost:8080/assets/");
        assert_eq!(config.log_dir, Some(PathBuf::from("logs")));
    }

    #[test]
    fn zero_timeouts_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "job_timeout_secs = 0\n").unwrap();
        let err = DmsConfig::load_from(&path, no_env).unwrap_err();
        assert!(matches!(err, DmsError::Config(_)));
    }

    #[test]
    fn job_timeout_above_one_day_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let over = MAX_JOB_TIMEOUT_SECS + 1;
        std::fs::write(&path, format!("job_timeout_secs = {over}\n")).unwrap();
        let err = DmsConfig::load_from(&path, no_env).unwrap_err();
        assert!(matches!(err, DmsError::Config(ref m) if m.contains("job_timeout_secs")));

        std::fs::write(&path, format!("job_timeout_secs = {MAX_JOB_TIMEOUT_SECS}\n")).unwrap();
        assert!(DmsConfig::load_from(&path, no_env).is_ok());
    }

    #[test]
    fn malformed_file_is_a_toml_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "timeout_ms = \"soon\"\n").unwrap();
        let err = DmsConfig::load_from(&path, no_env).unwrap_err();
        assert!(matches!(err, DmsError::Toml(_)));
    }
}
