use async_trait::async_trait;
use thiserror::Error;

use crate::profiles::{BackendKind, ConnectionProfile};

/// Driver-boundary failure. Adapters flatten their library errors into
/// this; the dispatcher classifies it by phase (connect vs execute).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct BackendError {
    message: String,
}

impl BackendError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Caller-supplied connect-time configuration. The core treats this as
/// opaque input; it owns no storage for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectOptions {
    pub auto_commit: bool,
}

/// A single result cell. NULL and the empty string both display blank
/// but are never conflated internally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellValue {
    Null,
    Text(String),
}

impl CellValue {
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn display(&self) -> &str {
        match self {
            Self::Null => "",
            Self::Text(value) => value,
        }
    }

    /// Tooltip rendering keeps NULL distinguishable from "".
    #[must_use]
    pub fn tooltip(&self) -> &str {
        match self {
            Self::Null => "NULL",
            Self::Text(value) => value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineRow {
    pub cells: Vec<CellValue>,
}

impl EngineRow {
    #[must_use]
    pub fn new(cells: Vec<CellValue>) -> Self {
        Self { cells }
    }
}

/// Normalized result of one executed statement. Adapters must deliver
/// this shape regardless of whether their driver hands back name-keyed
/// records or positional tuples.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueryOutput {
    pub columns: Vec<String>,
    pub rows: Vec<EngineRow>,
    /// Backend-reported total; may exceed what a bounded view renders.
    pub row_count: u64,
}

/// A live, backend-bound engine owning exactly one connection handle.
/// An execute failure leaves the engine usable for the next statement;
/// teardown happens only through `close`.
#[async_trait]
pub trait QueryEngine: Send + std::fmt::Debug {
    fn kind(&self) -> BackendKind;

    async fn execute(&mut self, sql: &str) -> Result<QueryOutput, BackendError>;

    /// Idempotent. Closing an already-closed engine returns `Ok(false)`.
    async fn close(&mut self) -> Result<bool, BackendError>;
}

/// Constructor capability, one implementation per backend kind. Never
/// returns a partially connected engine.
#[async_trait]
pub trait EngineConnector: Send + Sync {
    async fn connect(
        &self,
        profile: &ConnectionProfile,
        options: ConnectOptions,
    ) -> Result<Box<dyn QueryEngine>, BackendError>;
}
