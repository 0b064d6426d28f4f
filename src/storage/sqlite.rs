//! Shared connection handling for the `SQLite` stores.

use crate::Error;
use rusqlite::Connection;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

/// Helper to acquire the connection mutex with poison recovery.
///
/// If the mutex is poisoned by a panic in a previous critical section, the
/// inner connection is still structurally valid (every write runs inside a
/// transaction), so recover it and log a warning instead of cascading the
/// failure.
pub fn acquire_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("SQLite mutex was poisoned, recovering");
            metrics::counter!("skipfuse_mutex_poison_recovery_total").increment(1);
            poisoned.into_inner()
        },
    }
}

/// Configures a `SQLite` connection for concurrent analysis workers.
///
/// - **WAL mode**: concurrent readers alongside a single writer
/// - **NORMAL synchronous**: balances durability with performance
/// - **`busy_timeout`**: waits up to 5 seconds on lock contention instead
///   of failing immediately
pub fn configure_connection(conn: &Connection) {
    // pragma_update results are ignored - journal_mode returns a string
    // like "wal" which would otherwise surface as a spurious error, and
    // in-memory databases report "memory" instead of "wal"
    let _ = conn.pragma_update(None, "journal_mode", "WAL");
    let _ = conn.pragma_update(None, "synchronous", "NORMAL");
    let _ = conn.pragma_update(None, "busy_timeout", "5000");
}

/// Records count and latency metrics for one store operation.
pub fn record_operation_metrics(operation: &'static str, start: Instant, status: &'static str) {
    metrics::counter!(
        "skipfuse_store_operations_total",
        "operation" => operation,
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        "skipfuse_store_operation_duration_ms",
        "operation" => operation,
        "status" => status
    )
    .record(start.elapsed().as_secs_f64() * 1000.0);
}

/// Maps a rusqlite error into [`Error::OperationFailed`] for `operation`.
pub fn op_failed(operation: &str, e: &rusqlite::Error) -> Error {
    Error::OperationFailed {
        operation: operation.to_string(),
        cause: e.to_string(),
    }
}
