//! Shared foundation for the ShrikeDB sharding middleware: the error
//! taxonomy, the scalar [`datum::Datum`] value type, and the configuration
//! model consumed at startup.

pub mod config;
pub mod datum;
pub mod error;

pub use config::{MemberConfig, NodeSpec, ServerConfig, ShardConfig, ShrikeConfig, TableKind,
    TableRuleConfig};
pub use datum::{Datum, Row};
pub use error::{ConfigError, ErrorContext, ErrorKind, ExecError, RoutingError, RuleError,
    ShrikeError, ShrikeResult, SqlError};
