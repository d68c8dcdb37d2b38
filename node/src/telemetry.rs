//! Metric names emitted by the registry, selector, and scheduler.
//!
//! Recorded through the `metrics` facade; without an installed recorder
//! they are no-ops.

use metrics::{describe_counter, describe_gauge};

pub const ANNOUNCEMENTS_WRITTEN: &str = "expertmesh_announcements_written_total";
pub const ANNOUNCEMENTS_REJECTED: &str = "expertmesh_announcements_rejected_total";
pub const ANNOUNCEMENTS_EXPIRED: &str = "expertmesh_announcements_expired_total";
pub const STORE_FAILURES: &str = "expertmesh_store_failures_total";
pub const QUERIES_RANKED: &str = "expertmesh_queries_ranked_total";
pub const SWEEPS_COMPLETED: &str = "expertmesh_sweeps_completed_total";
pub const LIVE_ENTRIES: &str = "expertmesh_registry_entries";

/// Register descriptions with the installed recorder.
pub fn describe_metrics() {
    describe_counter!(ANNOUNCEMENTS_WRITTEN, "Announcement entries written by upserts");
    describe_counter!(ANNOUNCEMENTS_REJECTED, "Announcement batches rejected as invalid");
    describe_counter!(ANNOUNCEMENTS_EXPIRED, "Announcement entries removed by expiry sweeps");
    describe_counter!(STORE_FAILURES, "Failed write-through operations to the store");
    describe_counter!(QUERIES_RANKED, "Similarity rankings computed");
    describe_counter!(SWEEPS_COMPLETED, "Expiry sweeps run by the scheduler");
    describe_gauge!(LIVE_ENTRIES, "Announcement entries held in memory");
}
