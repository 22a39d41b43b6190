//! Per-client session state consumed by the execution framework: timeout
//! budget, cooperative cancellation, fan-out pool, and tuning flags.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use shrike_common::config::ServerConfig;
use shrike_common::error::{ExecError, ShrikeResult};

use crate::pool::WorkerPool;

/// Last-statement fan-out observability snapshot.
#[derive(Debug, Clone, Default)]
pub struct FanoutStats {
    pub workers: usize,
    pub merged_rows: usize,
    pub update_count: u64,
    /// Per-target latency: (target description, micros).
    pub per_worker_latency_us: Vec<(String, u64)>,
    pub total_latency_us: u64,
}

pub struct Session {
    pool: Arc<WorkerPool>,
    /// 0 = no timeout.
    query_timeout: Duration,
    cancel: AtomicBool,
    statement_started: Mutex<Option<Instant>>,
    last_stats: Mutex<FanoutStats>,
    pub merge_union_pushdown: bool,
    pub insert_worker_limit: usize,
    pub insert_flush_rows: usize,
}

impl Session {
    pub fn new(pool: Arc<WorkerPool>, config: &ServerConfig) -> Self {
        Self {
            pool,
            query_timeout: Duration::from_millis(config.query_timeout_ms),
            cancel: AtomicBool::new(false),
            statement_started: Mutex::new(None),
            last_stats: Mutex::new(FanoutStats::default()),
            merge_union_pushdown: config.merge_union_pushdown,
            insert_worker_limit: config.insert_worker_limit,
            insert_flush_rows: config.insert_flush_rows,
        }
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Mark the start of a statement; the timeout budget runs from here.
    /// Also clears a cancel flag left over from the previous statement.
    pub fn begin_statement(&self) {
        *self.statement_started.lock() = Some(Instant::now());
        self.cancel.store(false, Ordering::SeqCst);
    }

    /// The shared fan-out deadline, if a query timeout is configured.
    pub fn deadline(&self) -> Option<Instant> {
        if self.query_timeout.is_zero() {
            return None;
        }
        let started = self.statement_started.lock().unwrap_or_else(Instant::now);
        Some(started + self.query_timeout)
    }

    pub fn query_timeout_ms(&self) -> u64 {
        self.query_timeout.as_millis() as u64
    }

    /// Request cooperative cancellation. Observed at the next checkpoint
    /// (pre-submission or post-collection); running workers are not
    /// preempted.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn check_canceled(&self) -> ShrikeResult<()> {
        if self.cancel.load(Ordering::SeqCst) {
            Err(ExecError::Canceled.into())
        } else {
            Ok(())
        }
    }

    pub fn record_stats(&self, stats: FanoutStats) {
        *self.last_stats.lock() = stats;
    }

    pub fn last_stats(&self) -> FanoutStats {
        self.last_stats.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(timeout_ms: u64) -> Session {
        let cfg = ServerConfig {
            query_timeout_ms: timeout_ms,
            ..ServerConfig::default()
        };
        Session::new(Arc::new(WorkerPool::new(2, 8)), &cfg)
    }

    #[test]
    fn test_no_deadline_without_timeout() {
        let s = session(0);
        s.begin_statement();
        assert!(s.deadline().is_none());
    }

    #[test]
    fn test_deadline_runs_from_statement_start() {
        let s = session(5000);
        s.begin_statement();
        let d = s.deadline().unwrap();
        let remaining = d.saturating_duration_since(Instant::now());
        assert!(remaining <= Duration::from_millis(5000));
        assert!(remaining > Duration::from_millis(4000));
    }

    #[test]
    fn test_cancel_flag_roundtrip() {
        let s = session(0);
        s.begin_statement();
        assert!(s.check_canceled().is_ok());
        s.cancel();
        assert!(s.check_canceled().is_err());
        // A new statement clears the stale flag.
        s.begin_statement();
        assert!(s.check_canceled().is_ok());
    }
}
