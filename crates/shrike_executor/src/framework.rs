//! The synchronous fan-out / parallel-join core: submit one task per
//! destination to the session's bounded pool, wait for all of them under a
//! single shared deadline, and aggregate.

use std::sync::mpsc;
use std::time::Instant;

use shrike_common::error::{ExecError, ShrikeResult, SqlError};

use crate::backend::QueryResult;
use crate::cursor::{Cursor, MemoryCursor, MergedCursor};
use crate::session::{FanoutStats, Session};
use crate::worker::{BatchUpdateWorker, QueryWorker, UpdateWorker};

/// Two-phase statement lifecycle: `prepare` once (idempotent), then one of
/// the three verbs a connected session can invoke.
pub trait Executor {
    fn prepare(&mut self, session: &Session) -> ShrikeResult<()>;

    fn update(&mut self, _session: &Session) -> ShrikeResult<u64> {
        Err(SqlError::Unsupported("statement does not produce an update count".into()).into())
    }

    fn query(&mut self, _session: &Session) -> ShrikeResult<Box<dyn Cursor>> {
        Err(SqlError::Unsupported("statement does not produce a result set".into()).into())
    }

    fn explain(&self, session: &Session) -> ShrikeResult<String>;
}

/// An update-producing work item; single and batch workers fan out the same
/// way.
pub enum AnyUpdateWorker {
    Single(UpdateWorker),
    Batch(BatchUpdateWorker),
}

impl AnyUpdateWorker {
    fn run(&self) -> ShrikeResult<u64> {
        match self {
            AnyUpdateWorker::Single(w) => w.run(),
            AnyUpdateWorker::Batch(w) => w.run(),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            AnyUpdateWorker::Single(w) => w.describe(),
            AnyUpdateWorker::Batch(w) => w.describe(),
        }
    }
}

impl From<UpdateWorker> for AnyUpdateWorker {
    fn from(w: UpdateWorker) -> Self {
        AnyUpdateWorker::Single(w)
    }
}

impl From<BatchUpdateWorker> for AnyUpdateWorker {
    fn from(w: BatchUpdateWorker) -> Self {
        AnyUpdateWorker::Batch(w)
    }
}

/// Submit every task to the session pool and wait for all of them.
///
/// The joint wait is bounded by the session's remaining query timeout:
/// exceeding it fails the whole batch, not one worker. Cancellation is
/// checked before submission and again after collection, so a cooperative
/// cancel raised mid-flight by another thread is observed promptly.
/// The first failure in submission order wins; later failures are dropped
/// (a known design simplification — in-flight workers on other shards are
/// neither compensated nor retried).
fn fan_out<T: Send + 'static>(
    session: &Session,
    tasks: Vec<(String, Box<dyn FnOnce() -> ShrikeResult<T> + Send + 'static>)>,
) -> ShrikeResult<(Vec<T>, Vec<(String, u64)>)> {
    session.check_canceled()?;

    let total = tasks.len();
    let deadline = session.deadline();
    let (tx, rx) = mpsc::channel::<(usize, u64, ShrikeResult<T>)>();
    let mut labels = Vec::with_capacity(total);

    for (index, (label, task)) in tasks.into_iter().enumerate() {
        labels.push(label);
        let tx = tx.clone();
        session.pool().submit(Box::new(move || {
            let started = Instant::now();
            let result = task();
            let micros = started.elapsed().as_micros() as u64;
            // Receiver may be gone after a batch timeout; nothing to do.
            let _ = tx.send((index, micros, result));
        }))?;
    }
    drop(tx);

    let mut slots: Vec<Option<ShrikeResult<T>>> = (0..total).map(|_| None).collect();
    let mut latencies: Vec<(String, u64)> = Vec::with_capacity(total);
    let mut completed = 0usize;
    let mut timeout_failure = None;

    while completed < total {
        let received = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    Err(mpsc::RecvTimeoutError::Timeout)
                } else {
                    rx.recv_timeout(deadline - now)
                }
            }
            None => rx
                .recv()
                .map_err(|_| mpsc::RecvTimeoutError::Disconnected),
        };
        match received {
            Ok((index, micros, result)) => {
                latencies.push((labels[index].clone(), micros));
                slots[index] = Some(result);
                completed += 1;
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                timeout_failure = Some(ExecError::Timeout {
                    timeout_ms: session.query_timeout_ms(),
                    completed,
                    total,
                });
                break;
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                return Err(ExecError::PoolShutdown.into());
            }
        }
    }

    // Post-collection checkpoint: a cancel that raced the fan-out wins over
    // whatever the workers produced.
    session.check_canceled()?;

    if let Some(timeout) = timeout_failure {
        tracing::warn!(
            completed,
            total,
            timeout_ms = session.query_timeout_ms(),
            "fan-out batch timed out"
        );
        return Err(timeout.into());
    }

    let mut collected = Vec::with_capacity(total);
    for slot in slots {
        match slot.expect("all slots filled when no timeout") {
            Ok(value) => collected.push(value),
            Err(e) => return Err(e),
        }
    }
    Ok((collected, latencies))
}

/// Fan out update workers and sum their update counts. Any worker failure
/// aborts the whole statement with that worker's error.
pub fn invoke_update_workers(
    session: &Session,
    workers: Vec<AnyUpdateWorker>,
) -> ShrikeResult<u64> {
    let started = Instant::now();
    let worker_count = workers.len();
    let tasks: Vec<(String, Box<dyn FnOnce() -> ShrikeResult<u64> + Send>)> = workers
        .into_iter()
        .map(|w| {
            let label = w.describe();
            (
                label,
                Box::new(move || w.run()) as Box<dyn FnOnce() -> ShrikeResult<u64> + Send>,
            )
        })
        .collect();
    let (counts, latencies) = fan_out(session, tasks)?;
    let total: u64 = counts.iter().sum();
    session.record_stats(FanoutStats {
        workers: worker_count,
        merged_rows: 0,
        update_count: total,
        per_worker_latency_us: latencies,
        total_latency_us: started.elapsed().as_micros() as u64,
    });
    Ok(total)
}

/// Fan out query workers. One worker's result passes through untouched;
/// several are composed into a [`MergedCursor`] visited in submission
/// order.
pub fn invoke_query_workers(
    session: &Session,
    workers: Vec<QueryWorker>,
) -> ShrikeResult<Box<dyn Cursor>> {
    if workers.is_empty() {
        return Ok(Box::new(MemoryCursor::empty(Vec::new())));
    }
    let started = Instant::now();
    let worker_count = workers.len();
    let tasks: Vec<(String, Box<dyn FnOnce() -> ShrikeResult<QueryResult> + Send>)> = workers
        .into_iter()
        .map(|w| {
            let label = w.describe();
            (
                label,
                Box::new(move || w.run()) as Box<dyn FnOnce() -> ShrikeResult<QueryResult> + Send>,
            )
        })
        .collect();
    let (results, latencies) = fan_out(session, tasks)?;
    let merged_rows: usize = results.iter().map(|r| r.rows.len()).sum();
    session.record_stats(FanoutStats {
        workers: worker_count,
        merged_rows,
        update_count: 0,
        per_worker_latency_us: latencies,
        total_latency_us: started.elapsed().as_micros() as u64,
    });

    let mut cursors: Vec<Box<dyn Cursor>> = results
        .into_iter()
        .map(|r| Box::new(MemoryCursor::new(r.columns, r.rows)) as Box<dyn Cursor>)
        .collect();
    if cursors.len() == 1 {
        Ok(cursors.pop().expect("one cursor"))
    } else {
        Ok(Box::new(MergedCursor::new(cursors)))
    }
}

/// Textual plan for diagnostics: one sub-plan per worker.
pub fn explain_workers(descriptions: &[String]) -> String {
    let mut out = String::new();
    if descriptions.len() <= 1 {
        out.push_str("SINGLE_EXECUTION");
        for d in descriptions {
            out.push_str("\n    ");
            out.push_str(d);
        }
    } else {
        out.push_str("MULTIPLE_EXECUTION");
        for d in descriptions {
            out.push_str("\n    ");
            out.push_str(d);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use shrike_common::config::ServerConfig;
    use shrike_common::error::ShrikeError;
    use std::sync::Arc;
    use std::time::Duration;

    fn session(timeout_ms: u64) -> Session {
        let cfg = ServerConfig {
            query_timeout_ms: timeout_ms,
            ..ServerConfig::default()
        };
        Session::new(Arc::new(crate::pool::WorkerPool::new(4, 32)), &cfg)
    }

    fn task<T: Send + 'static>(
        label: &str,
        f: impl FnOnce() -> ShrikeResult<T> + Send + 'static,
    ) -> (String, Box<dyn FnOnce() -> ShrikeResult<T> + Send + 'static>) {
        (label.to_string(), Box::new(f))
    }

    #[test]
    fn test_fan_out_collects_in_submission_order() {
        let s = session(0);
        s.begin_statement();
        let tasks = vec![
            task("a", || {
                std::thread::sleep(Duration::from_millis(30));
                Ok(1u64)
            }),
            task("b", || Ok(2u64)),
            task("c", || Ok(3u64)),
        ];
        let (out, latencies) = fan_out(&s, tasks).unwrap();
        assert_eq!(out, vec![1, 2, 3]);
        assert_eq!(latencies.len(), 3);
    }

    #[test]
    fn test_first_error_in_submission_order_wins() {
        let s = session(0);
        s.begin_statement();
        let tasks = vec![
            task("a", || Ok(1u64)),
            task("b", || {
                Err(ExecError::WorkerFailed {
                    node: "s1.t".into(),
                    message: "boom-b".into(),
                }
                .into())
            }),
            task("c", || {
                Err(ExecError::WorkerFailed {
                    node: "s2.t".into(),
                    message: "boom-c".into(),
                }
                .into())
            }),
        ];
        let err = fan_out(&s, tasks).unwrap_err();
        assert!(err.to_string().contains("boom-b"));
    }

    #[test]
    fn test_shared_deadline_bounds_the_batch() {
        let s = session(60);
        s.begin_statement();
        let tasks = vec![
            task("fast", || Ok(1u64)),
            task("slow", || {
                std::thread::sleep(Duration::from_millis(500));
                Ok(2u64)
            }),
        ];
        let err = fan_out(&s, tasks).unwrap_err();
        assert!(matches!(
            err,
            ShrikeError::Exec(ExecError::Timeout { total: 2, .. })
        ));
    }

    #[test]
    fn test_cancel_observed_after_collection() {
        let s = Arc::new(session(0));
        s.begin_statement();
        let s2 = s.clone();
        let tasks = vec![task("a", move || {
            s2.cancel();
            Ok(1u64)
        })];
        let err = fan_out(&s, tasks).unwrap_err();
        assert!(matches!(err, ShrikeError::Exec(ExecError::Canceled)));
    }

    #[test]
    fn test_cancel_observed_before_submission() {
        let s = session(0);
        s.begin_statement();
        s.cancel();
        let tasks = vec![task("a", || Ok(1u64))];
        let err = fan_out(&s, tasks).unwrap_err();
        assert!(matches!(err, ShrikeError::Exec(ExecError::Canceled)));
    }

    #[test]
    fn test_explain_shapes() {
        assert_eq!(explain_workers(&[]), "SINGLE_EXECUTION");
        let single = explain_workers(&["s0.t :: SELECT 1".to_string()]);
        assert!(single.starts_with("SINGLE_EXECUTION\n    s0.t"));
        let multi = explain_workers(&["a".to_string(), "b".to_string()]);
        assert!(multi.starts_with("MULTIPLE_EXECUTION\n    a\n    b"));
    }
}
