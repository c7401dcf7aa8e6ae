//! Interface de linha de comando do dmsnet baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (get, groups, attach,
//! download) e flags globais (--config, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use uuid::Uuid;

/// dmsnet: cliente do armazenamento de documentos e do servidor de assets.
#[derive(Debug, Parser)]
#[command(name = "dmsnet", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho do arquivo de configuração.
    #[arg(long, global = true, default_value = dmsnet::config::CONFIG_FILE)]
    pub config: PathBuf,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Busca um documento pelo id.
    Get {
        /// Id do documento.
        id: String,
    },

    /// Lista os grupos cadastrados.
    Groups,

    /// Anexa um arquivo à revisão atual de um documento.
    Attach {
        /// Id do documento.
        document: String,

        /// Nome do anexo.
        name: String,

        /// Arquivo a enviar.
        file: PathBuf,

        /// Content type do anexo.
        #[arg(long, default_value = "application/octet-stream")]
        content_type: String,
    },

    /// Baixa um asset (meta e dados).
    Download {
        /// Id do asset.
        asset: Uuid,

        /// Diretório de destino.
        #[arg(long, short, default_value = ".")]
        out: PathBuf,
    },
}
