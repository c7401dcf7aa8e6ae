//! dmsnet: client pipeline for a CouchDB-backed document store and an
//! asset-transfer server.
//!
//! Jobs drive engine methods and transactions, which issue commands over a
//! [`transport::Transport`]. Data flows down, events flow up.

pub mod asset;
pub mod command;
pub mod config;
pub mod error;
pub mod events;
pub mod logger;
pub mod state_machine;
pub mod storage;
pub mod transport;
pub mod wire;
pub mod work;

pub use error::DmsError;
