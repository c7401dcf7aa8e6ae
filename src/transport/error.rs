//! Tipos de erro da camada de transporte.
//!
//! [`TransportError`] distingue timeout (condição terminal própria, nunca
//! um erro de rede comum) das falhas de conexão e de protocolo.

use thiserror::Error;

use super::Direction;

/// Erros que podem ocorrer durante uma troca com o servidor.
#[derive(Debug, Error)]
pub enum TransportError {
    /// O prazo de envio ou de recebimento expirou.
    #[error("{0} timed out")]
    Timeout(Direction),

    /// Não foi possível estabelecer a conexão (DNS, conexão recusada).
    #[error("connection failed: {0}")]
    Connect(String),

    /// Falha de rede subjacente reportada pelo `reqwest`.
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),

    /// Falha de um transporte que não é HTTP (ex.: transportes de teste).
    #[error("exchange failed: {0}")]
    Other(String),
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout(_))
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout(Direction::Receive)
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else {
            TransportError::Network(err)
        }
    }
}
