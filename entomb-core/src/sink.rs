//! Transaction sinks (`spec.md` §9 Design Note 5): the teacher's dual legacy/modern
//! code paths are modeled here as subscribers to transaction events rather than as a
//! branch the session takes in its hot path. A legacy-compat sink (or any other
//! observer — progress bars, audit logs) implements this trait; the session never
//! checks whether one is registered before doing its own work.

use entomb_exec::{InstallRequest, TransactionReport};
use entomb_types::PackageId;

/// Notified of transaction progress. Every method has a no-op default so a sink only
/// needs to implement the events it cares about.
pub trait TransactionSink {
    /// Called once a package has been placed and recorded.
    fn on_installed(&mut self, _request: &InstallRequest) {}

    /// Called once a package's content and record have been removed.
    fn on_removed(&mut self, _id: PackageId) {}

    /// Called after the whole transaction has committed.
    fn on_finished(&mut self, _report: &TransactionReport) {}
}

/// The sink used when the caller registers none; observes nothing.
#[derive(Debug, Default)]
pub struct NullSink;

impl TransactionSink for NullSink {}
