use serde::Serialize;
use tracing::{info, warn};

use crate::error::GraceError;
use crate::filter::LinkRecord;
use crate::layout::ensure_dir;
use crate::transfer::Transfer;

#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchReport {
    pub downloaded: Vec<String>,
    pub failed: Vec<FailedTransfer>,
    pub planned: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedTransfer {
    pub url: String,
    pub destination: String,
    pub error: String,
}

/// Transfers each record in turn; one failure never stops the queue.
pub fn dispatch<T: Transfer + ?Sized>(
    transfer: &T,
    records: &[LinkRecord],
    dry_run: bool,
) -> DispatchReport {
    let mut report = DispatchReport::default();
    for record in records {
        if dry_run {
            report.planned.push(record.destination.to_string());
            continue;
        }
        match transfer_one(transfer, record) {
            Ok(()) => {
                info!(destination = %record.destination, "downloaded");
                report.downloaded.push(record.destination.to_string());
            }
            Err(err) => {
                warn!(url = %record.url, error = %err, "transfer failed");
                report.failed.push(FailedTransfer {
                    url: record.url.clone(),
                    destination: record.destination.to_string(),
                    error: err.to_string(),
                });
            }
        }
    }
    report
}

fn transfer_one<T: Transfer + ?Sized>(transfer: &T, record: &LinkRecord) -> Result<(), GraceError> {
    if let Some(parent) = record.destination.parent() {
        ensure_dir(parent)?;
    }
    transfer.fetch_object(&record.url, record.destination.as_std_path())
}
