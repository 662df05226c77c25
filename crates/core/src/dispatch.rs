use thiserror::Error;
use tracing::{error, info, warn};

use crate::annotation;
use crate::engine::{BackendError, ConnectOptions, QueryEngine};
use crate::history::{unix_timestamp_millis, FileQueryHistory, HistoryOutcome, HistoryRecord};
use crate::profiles::{BackendKind, ProfileStore};
use crate::registry::{EngineRegistry, RegistryError};
use crate::render::{render, ResultView};
use crate::settings::{Settings, DEFAULT_RENDER_CAP};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no profile annotation found in query text")]
    InvalidQuery,
    #[error("query addresses more than one profile: {}", names.join(", "))]
    AmbiguousProfile { names: Vec<String> },
    #[error("no profile named `{name}` exists in the profile catalog")]
    UnknownProfile { name: String },
    #[error("no connector is registered for backend kind `{kind}`")]
    UnsupportedBackend { kind: BackendKind },
    #[error("failed to connect profile `{name}`: {source}")]
    Connection {
        name: String,
        #[source]
        source: BackendError,
    },
    #[error("query failed on profile `{name}`: {source}")]
    Execution {
        name: String,
        #[source]
        source: BackendError,
    },
}

impl From<RegistryError> for DispatchError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::UnknownProfile { name } => Self::UnknownProfile { name },
            RegistryError::UnsupportedBackend { kind } => Self::UnsupportedBackend { kind },
            RegistryError::Connect { name, source } => Self::Connection { name, source },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSettings {
    pub render_cap: usize,
    pub auto_commit: bool,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            render_cap: DEFAULT_RENDER_CAP,
            auto_commit: false,
        }
    }
}

impl From<Settings> for DispatchSettings {
    fn from(settings: Settings) -> Self {
        Self {
            render_cap: settings.render_cap,
            auto_commit: settings.auto_commit,
        }
    }
}

/// Orchestrates annotation parsing, catalog lookup, engine
/// get-or-create and execution into a bounded result view. One dispatch
/// runs to completion at a time; retrying after a failure is simply
/// re-invoking `dispatch`.
#[derive(Debug)]
pub struct Dispatcher<S: ProfileStore> {
    registry: EngineRegistry,
    store: S,
    settings: DispatchSettings,
    history: Option<FileQueryHistory>,
}

impl<S: ProfileStore> Dispatcher<S> {
    #[must_use]
    pub fn new(registry: EngineRegistry, store: S, settings: DispatchSettings) -> Self {
        Self {
            registry,
            store,
            settings,
            history: None,
        }
    }

    #[must_use]
    pub fn with_history(mut self, history: FileQueryHistory) -> Self {
        self.history = Some(history);
        self
    }

    #[must_use]
    pub fn registry(&self) -> &EngineRegistry {
        &self.registry
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn dispatch(&mut self, text: &str) -> Result<ResultView, DispatchError> {
        let normalized = annotation::normalize_input(text);
        let scan = annotation::scan(&normalized);
        info!(profiles = ?scan.distinct_names, "scanned query annotations");

        if scan.distinct_names.len() > 1 {
            let names = scan.distinct_names.iter().cloned().collect::<Vec<_>>();
            warn!(?names, "query addresses more than one profile");
            return Err(DispatchError::AmbiguousProfile { names });
        }
        let Some(occurrence) = scan.single_target().cloned() else {
            warn!("query carries no profile annotation");
            return Err(DispatchError::InvalidQuery);
        };

        // Only the first occurrence is stripped; a duplicate annotation
        // of the same profile stays in the residual text.
        let sql = annotation::strip_occurrence(&normalized, &occurrence);
        let profile_name = occurrence.name;
        let host = self
            .store
            .profile(&profile_name)
            .map(|profile| profile.host.clone());

        let options = ConnectOptions {
            auto_commit: self.settings.auto_commit,
        };
        let engine = self
            .registry
            .get_or_create(&profile_name, &self.store, options)
            .await?;
        let backend = engine.kind();

        match engine.execute(&sql).await {
            Ok(output) => {
                info!(
                    profile = %profile_name,
                    rows = output.row_count,
                    "query executed"
                );
                self.record_history(HistoryRecord {
                    timestamp_unix_ms: unix_timestamp_millis(),
                    profile_name,
                    backend,
                    host,
                    sql,
                    outcome: HistoryOutcome::Succeeded,
                    total_rows: Some(output.row_count),
                    error: None,
                });
                Ok(render(output, self.settings.render_cap))
            }
            Err(source) => {
                // The engine stays cached; an execute failure is local
                // and the connection is assumed still usable.
                error!(profile = %profile_name, %source, "query execution failed");
                self.record_history(HistoryRecord {
                    timestamp_unix_ms: unix_timestamp_millis(),
                    profile_name: profile_name.clone(),
                    backend,
                    host,
                    sql,
                    outcome: HistoryOutcome::Failed,
                    total_rows: None,
                    error: Some(source.to_string()),
                });
                Err(DispatchError::Execution {
                    name: profile_name,
                    source,
                })
            }
        }
    }

    /// Eviction hook for profile edit/removal: the next dispatch to the
    /// name reconnects against the current catalog entry.
    pub async fn invalidate_profile(&mut self, name: &str) -> bool {
        self.registry.remove(name).await
    }

    pub async fn shutdown(&mut self) {
        self.registry.close_all().await;
    }

    fn record_history(&self, record: HistoryRecord) {
        let Some(history) = &self.history else {
            return;
        };
        if let Err(history_error) = history.append(&record) {
            warn!(%history_error, "failed to append history record");
        }
    }
}
