use thiserror::Error;

/// Convenience alias for `Result<T, ShrikeError>`.
pub type ShrikeResult<T> = Result<T, ShrikeError>;

/// Error classification for retry/escalation decisions.
///
/// - `UserError`   — bad SQL, unknown table, unsupported combination
/// - `Transient`   — fan-out timeout, pool saturation; client MAY retry
/// - `InternalBug` — should never happen; triggers alert + diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UserError,
    Transient,
    InternalBug,
}

/// Top-level error type that all crate-specific errors convert into.
#[derive(Error, Debug)]
pub enum ShrikeError {
    #[error("Rule error: {0}")]
    Rule(#[from] RuleError),

    #[error("Routing error: {0}")]
    Routing(#[from] RoutingError),

    #[error("Execution error: {0}")]
    Exec(#[from] ExecError),

    #[error("SQL error: {0}")]
    Sql(#[from] SqlError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Rule-evaluation errors: always fatal to the statement, never retried,
/// surfaced with the offending algorithm name for operator diagnosis.
#[derive(Error, Debug)]
pub enum RuleError {
    #[error(
        "partition algorithm '{algorithm}' returned index {index}, \
         valid range is [0, {node_count})"
    )]
    PartitionOutOfRange {
        algorithm: String,
        index: i64,
        node_count: usize,
    },

    #[error("partition algorithm '{algorithm}' selected no partitions for a fixed value set")]
    EmptyPartition { algorithm: String },

    #[error(
        "partition algorithm '{algorithm}' does not implement the {capability} capability \
         required by table rule '{table}'"
    )]
    MissingCapability {
        algorithm: String,
        capability: &'static str,
        table: String,
    },

    #[error("unknown partition algorithm '{0}'")]
    UnknownAlgorithm(String),

    #[error("partition algorithm '{algorithm}' rejected property '{property}': {reason}")]
    BadProperty {
        algorithm: String,
        property: String,
        reason: String,
    },
}

/// Routing infeasibility: no candidate nodes, or an inconsistent fold.
/// Indicates a configuration gap or an unreachable-predicate query.
#[derive(Error, Debug)]
pub enum RoutingError {
    #[error("no target nodes selected for table '{table}'")]
    NoNodesSelected { table: String },

    #[error("no candidate route found for multi-table query")]
    NoCandidateRoute,

    #[error(
        "cannot fold nodes into one push-down group: '{left}' and '{right}' \
         disagree on {field}"
    )]
    InconsistentGroup {
        left: String,
        right: String,
        field: &'static str,
    },
}

/// Fan-out execution failures. The first worker error aborts the whole
/// statement; a joint-wait timeout is distinguishable from a backend error.
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("worker on node '{node}' failed: {message}")]
    WorkerFailed { node: String, message: String },

    #[error("fan-out timed out after {timeout_ms}ms ({completed} of {total} workers done)")]
    Timeout {
        timeout_ms: u64,
        completed: usize,
        total: usize,
    },

    #[error("statement canceled by session")]
    Canceled,

    #[error("worker pool is shut down")]
    PoolShutdown,

    #[error("backend error on shard '{shard}': {message}")]
    Backend { shard: String, message: String },
}

/// Statement-shape errors detected at prepare time.
#[derive(Error, Debug)]
pub enum SqlError {
    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("unknown column '{column}' in table '{table}'")]
    UnknownColumn { table: String, column: String },

    #[error("unsupported feature: {0}")]
    Unsupported(String),

    #[error("column count mismatch: {expected} columns, {got} values")]
    ColumnCountMismatch { expected: usize, got: usize },
}

/// Configuration load-time errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("duplicate shard name '{0}'")]
    DuplicateShard(String),

    #[error("duplicate table rule for '{0}'")]
    DuplicateTable(String),

    #[error("table '{table}' references unknown shard '{shard}'")]
    UnknownShard { table: String, shard: String },

    #[error("table '{table}': {reason}")]
    InvalidRule { table: String, reason: String },

    #[error("parse error: {0}")]
    Parse(String),
}

// ── ShrikeError classification & helpers ─────────────────────────────────────

impl ShrikeError {
    /// Classify this error for retry/escalation decisions.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ShrikeError::Sql(_) => ErrorKind::UserError,
            ShrikeError::Config(_) => ErrorKind::UserError,
            ShrikeError::Exec(ExecError::Timeout { .. }) => ErrorKind::Transient,
            ShrikeError::Exec(ExecError::Canceled) => ErrorKind::UserError,
            ShrikeError::Exec(ExecError::PoolShutdown) => ErrorKind::Transient,
            ShrikeError::Exec(ExecError::Backend { .. }) => ErrorKind::UserError,
            ShrikeError::Exec(ExecError::WorkerFailed { .. }) => ErrorKind::UserError,
            // A rule violation or an empty route means broken configuration
            // or a partitioner bug — surfaced loudly, never retried.
            ShrikeError::Rule(_) => ErrorKind::InternalBug,
            ShrikeError::Routing(_) => ErrorKind::InternalBug,
            ShrikeError::Internal(_) => ErrorKind::InternalBug,
        }
    }

    pub fn is_user_error(&self) -> bool {
        matches!(self.kind(), ErrorKind::UserError)
    }

    pub fn is_transient(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transient)
    }

    pub fn is_internal_bug(&self) -> bool {
        matches!(self.kind(), ErrorKind::InternalBug)
    }

    /// Map to a MySQL error number for the wire protocol layer.
    pub fn mysql_errno(&self) -> u16 {
        match self {
            ShrikeError::Sql(SqlError::UnknownTable(_)) => 1146, // ER_NO_SUCH_TABLE
            ShrikeError::Sql(SqlError::UnknownColumn { .. }) => 1054, // ER_BAD_FIELD_ERROR
            ShrikeError::Sql(SqlError::Unsupported(_)) => 1235, // ER_NOT_SUPPORTED_YET
            ShrikeError::Sql(SqlError::ColumnCountMismatch { .. }) => 1136, // ER_WRONG_VALUE_COUNT_ON_ROW
            ShrikeError::Exec(ExecError::Timeout { .. }) => 3024, // ER_QUERY_TIMEOUT
            ShrikeError::Exec(ExecError::Canceled) => 1317,     // ER_QUERY_INTERRUPTED
            ShrikeError::Exec(_) => 1105,                       // ER_UNKNOWN_ERROR
            ShrikeError::Config(_) => 1105,
            ShrikeError::Rule(_) | ShrikeError::Routing(_) | ShrikeError::Internal(_) => 1815, // ER_INTERNAL_ERROR
        }
    }

    /// Map to a SQLSTATE string for the wire protocol layer.
    pub fn sql_state(&self) -> &'static str {
        match self {
            ShrikeError::Sql(SqlError::UnknownTable(_)) => "42S02",
            ShrikeError::Sql(SqlError::UnknownColumn { .. }) => "42S22",
            ShrikeError::Sql(SqlError::Unsupported(_)) => "0A000",
            ShrikeError::Sql(_) => "42000",
            ShrikeError::Exec(ExecError::Timeout { .. }) => "HY008",
            ShrikeError::Exec(ExecError::Canceled) => "70100",
            ShrikeError::Exec(_) => "HY000",
            _ => "HY000",
        }
    }

    /// Add context to the message, preserving the error variant where the
    /// variant carries classification (teacher pattern: context never
    /// downgrades an error's class).
    pub fn with_context(self, ctx: impl Into<String>) -> Self {
        let ctx = ctx.into();
        match self {
            ShrikeError::Internal(msg) => ShrikeError::Internal(format!("{ctx}: {msg}")),
            other => ShrikeError::Internal(format!("{ctx}: {other}")),
        }
    }

    /// Emit a structured log entry for internal-bug errors. Called once at
    /// the statement boundary before the error is returned to the client.
    pub fn log_if_internal(&self) {
        if self.is_internal_bug() {
            tracing::error!(
                errno = self.mysql_errno(),
                sql_state = self.sql_state(),
                "internal routing/execution failure: {self}"
            );
        }
    }
}

/// Add context to a Result.
/// Usage: `route(rule, arg).ctx("stage=prepare")?`
pub trait ErrorContext<T> {
    fn ctx(self, context: &str) -> Result<T, ShrikeError>;
    fn ctx_with(self, f: impl FnOnce() -> String) -> Result<T, ShrikeError>;
}

impl<T, E: Into<ShrikeError>> ErrorContext<T> for Result<T, E> {
    fn ctx(self, context: &str) -> Result<T, ShrikeError> {
        self.map_err(|e| e.into().with_context(context))
    }
    fn ctx_with(self, f: impl FnOnce() -> String) -> Result<T, ShrikeError> {
        self.map_err(|e| e.into().with_context(f()))
    }
}

#[cfg(test)]
mod error_classification {
    use super::*;

    // ── ErrorKind classification ─────────────────────────────────────────

    #[test]
    fn test_unknown_table_is_user_error() {
        let e = ShrikeError::Sql(SqlError::UnknownTable("orders".into()));
        assert_eq!(e.kind(), ErrorKind::UserError);
        assert!(e.is_user_error());
        assert!(!e.is_transient());
    }

    #[test]
    fn test_rule_violation_is_internal_bug() {
        let e = ShrikeError::Rule(RuleError::PartitionOutOfRange {
            algorithm: "mod".into(),
            index: 5,
            node_count: 3,
        });
        assert_eq!(e.kind(), ErrorKind::InternalBug);
        assert!(e.is_internal_bug());
    }

    #[test]
    fn test_timeout_is_transient() {
        let e = ShrikeError::Exec(ExecError::Timeout {
            timeout_ms: 100,
            completed: 1,
            total: 3,
        });
        assert_eq!(e.kind(), ErrorKind::Transient);
        assert_eq!(e.mysql_errno(), 3024);
        assert_eq!(e.sql_state(), "HY008");
    }

    #[test]
    fn test_canceled_maps_to_query_interrupted() {
        let e = ShrikeError::Exec(ExecError::Canceled);
        assert_eq!(e.mysql_errno(), 1317);
        assert_eq!(e.sql_state(), "70100");
    }

    // ── Message content ──────────────────────────────────────────────────

    #[test]
    fn test_out_of_range_names_algorithm_and_value() {
        let e = RuleError::PartitionOutOfRange {
            algorithm: "acme.BrokenHash".into(),
            index: 5,
            node_count: 3,
        };
        let msg = e.to_string();
        assert!(msg.contains("acme.BrokenHash"));
        assert!(msg.contains('5'));
        assert!(msg.contains('3'));
    }

    #[test]
    fn test_missing_capability_names_table() {
        let e = RuleError::MissingCapability {
            algorithm: "mod".into(),
            capability: "multi-column",
            table: "orders".into(),
        };
        assert!(e.to_string().contains("orders"));
        assert!(e.to_string().contains("multi-column"));
    }

    // ── ErrorContext trait ───────────────────────────────────────────────

    #[test]
    fn test_error_context_trait_ctx() {
        let result: Result<(), SqlError> = Err(SqlError::UnknownTable("t".into()));
        let err = result.ctx("stage=prepare").unwrap_err();
        assert!(err.to_string().contains("stage=prepare"));
    }

    #[test]
    fn test_error_context_ok_passthrough() {
        let result: Result<i32, SqlError> = Ok(7);
        assert_eq!(result.ctx("unused").unwrap(), 7);
    }

    // ── From conversions ─────────────────────────────────────────────────

    #[test]
    fn test_from_routing_error() {
        let e: ShrikeError = RoutingError::NoNodesSelected { table: "t".into() }.into();
        assert!(matches!(e, ShrikeError::Routing(_)));
        assert_eq!(e.mysql_errno(), 1815);
    }
}
