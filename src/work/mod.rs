//! Work layer: jobs, their watchdog and the process-wide error manager.

mod document;
mod download;
mod errors;
mod job;
mod watchdog;

pub use document::{DocumentPayload, FetchDocumentJob};
pub use download::DownloadAssetJob;
pub use errors::{ErrorManager, ErrorRecord, JobRef};
pub use job::{Capture, JobCore, JobHandle, Outcome};
pub use watchdog::{Watchdog, WatchdogError};
