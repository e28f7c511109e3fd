//! Download progress reporting.
//!
//! The fetcher emits one [`TransferProgress`] after every chunk it writes.
//! Reports are purely observational; a reporter cannot influence or fail
//! the transfer.

use log::debug;

const MIB: u64 = 1024 * 1024;

/// Snapshot of a transfer after a chunk has been written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    /// Bytes written to disk so far.
    pub transferred: u64,
    /// Total size announced by the server, when known.
    pub total: Option<u64>,
}

impl TransferProgress {
    /// Whole-number percentage complete, when the total is known.
    ///
    /// Returns `None` for unknown or zero totals.
    ///
    /// # Examples
    ///
    /// ```
    /// use dataset_provisioner::artefact::progress::TransferProgress;
    ///
    /// let halfway = TransferProgress { transferred: 50, total: Some(200) };
    /// assert_eq!(halfway.percent(), Some(25));
    ///
    /// let unknown = TransferProgress { transferred: 50, total: None };
    /// assert_eq!(unknown.percent(), None);
    /// ```
    #[must_use]
    pub fn percent(&self) -> Option<u64> {
        let total = self.total?;
        self.transferred.saturating_mul(100).checked_div(total)
    }
}

/// Receiver for progress snapshots.
///
/// Implemented for any `Fn(TransferProgress)` closure, which is the
/// easiest way to observe a transfer in tests.
pub trait ProgressReporter {
    /// Observe one progress snapshot.
    fn report(&self, progress: TransferProgress);
}

impl<F> ProgressReporter for F
where
    F: Fn(TransferProgress),
{
    fn report(&self, progress: TransferProgress) {
        self(progress);
    }
}

/// Default reporter: writes each snapshot to the `log` facade at debug
/// level.
///
/// With a known total the line carries a percentage; otherwise it counts
/// up the bytes received.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl ProgressReporter for LogProgress {
    fn report(&self, progress: TransferProgress) {
        debug!("{}", describe(progress));
    }
}

/// Render a snapshot as a short human-readable line.
fn describe(progress: TransferProgress) -> String {
    let done = whole_mib(progress.transferred);
    match (progress.total, progress.percent()) {
        (Some(total), Some(percent)) => {
            format!("downloaded {done} / {} MiB ({percent}%)", whole_mib(total))
        }
        _ => format!("downloaded {done} MiB ({} bytes)", progress.transferred),
    }
}

fn whole_mib(bytes: u64) -> u64 {
    bytes.checked_div(MIB).unwrap_or_default()
}
