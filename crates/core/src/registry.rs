use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::engine::{BackendError, ConnectOptions, EngineConnector, QueryEngine};
use crate::profiles::{normalize_profile_name, BackendKind, ProfileStore};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no profile named `{name}` exists in the profile catalog")]
    UnknownProfile { name: String },
    #[error("no connector is registered for backend kind `{kind}`")]
    UnsupportedBackend { kind: BackendKind },
    #[error("failed to connect profile `{name}`: {source}")]
    Connect {
        name: String,
        #[source]
        source: BackendError,
    },
}

/// Cache of at most one live engine per profile name, plus the
/// constructor table keyed by backend kind. Mutated only through
/// `get_or_create` and `remove` on a single `&mut` control flow, so it
/// needs no interior locking; embedding in a concurrent context means
/// wrapping the whole registry, which preserves the one-engine rule.
#[derive(Default)]
pub struct EngineRegistry {
    connectors: HashMap<BackendKind, Arc<dyn EngineConnector>>,
    engines: HashMap<String, Box<dyn QueryEngine>>,
}

impl fmt::Debug for EngineRegistry {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("EngineRegistry")
            .field("connectors", &self.connectors.keys().collect::<Vec<_>>())
            .field("engines", &self.engines.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl EngineRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_connector(&mut self, kind: BackendKind, connector: Arc<dyn EngineConnector>) {
        self.connectors.insert(kind, connector);
    }

    #[must_use]
    pub fn has_connector(&self, kind: BackendKind) -> bool {
        self.connectors.contains_key(&kind)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.engines.contains_key(&normalize_profile_name(name))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.engines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Box<dyn QueryEngine>> {
        self.engines.get_mut(&normalize_profile_name(name))
    }

    /// Cache probe, then on miss: catalog lookup, connector lookup,
    /// connect, insert. A failed connect caches nothing, so the next
    /// call retries from scratch.
    pub async fn get_or_create(
        &mut self,
        name: &str,
        store: &dyn ProfileStore,
        options: ConnectOptions,
    ) -> Result<&mut Box<dyn QueryEngine>, RegistryError> {
        let key = normalize_profile_name(name);
        match self.engines.entry(key) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let name = entry.key().clone();
                let Some(profile) = store.profile(&name) else {
                    return Err(RegistryError::UnknownProfile { name });
                };
                let Some(connector) = self.connectors.get(&profile.backend) else {
                    return Err(RegistryError::UnsupportedBackend {
                        kind: profile.backend,
                    });
                };

                let engine = connector
                    .connect(profile, options)
                    .await
                    .map_err(|source| RegistryError::Connect {
                        name: name.clone(),
                        source,
                    })?;
                info!(profile = %name, backend = %profile.backend, "engine connected");
                Ok(entry.insert(engine))
            }
        }
    }

    /// Closes and evicts an engine. Invoked only by explicit lifecycle
    /// events (profile edit/removal, shutdown), never by a query
    /// failure. Returns whether an engine was present.
    pub async fn remove(&mut self, name: &str) -> bool {
        let key = normalize_profile_name(name);
        let Some(mut engine) = self.engines.remove(&key) else {
            return false;
        };
        if let Err(error) = engine.close().await {
            warn!(profile = %key, %error, "failed to close evicted engine");
        }
        true
    }

    pub async fn close_all(&mut self) {
        let names = self.engines.keys().cloned().collect::<Vec<_>>();
        for name in names {
            self.remove(&name).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use async_trait::async_trait;

    use super::{EngineRegistry, RegistryError};
    use crate::engine::{
        BackendError, ConnectOptions, EngineConnector, QueryEngine, QueryOutput,
    };
    use crate::profiles::{BackendKind, ConnectionProfile, ProfileStore};

    #[derive(Debug, Default)]
    struct FakeCatalog {
        profiles: Vec<ConnectionProfile>,
    }

    impl ProfileStore for FakeCatalog {
        fn profile(&self, name: &str) -> Option<&ConnectionProfile> {
            let normalized = crate::profiles::normalize_profile_name(name);
            self.profiles
                .iter()
                .find(|profile| profile.name == normalized)
        }
    }

    #[derive(Debug, Default)]
    struct FakeConnector {
        connect_calls: Arc<AtomicUsize>,
        fail_connects: AtomicUsize,
    }

    #[derive(Debug)]
    struct FakeEngine {
        closed: bool,
    }

    #[async_trait]
    impl QueryEngine for FakeEngine {
        fn kind(&self) -> BackendKind {
            BackendKind::MySql
        }

        async fn execute(&mut self, _sql: &str) -> Result<QueryOutput, BackendError> {
            Ok(QueryOutput::default())
        }

        async fn close(&mut self) -> Result<bool, BackendError> {
            if self.closed {
                return Ok(false);
            }
            self.closed = true;
            Ok(true)
        }
    }

    #[async_trait]
    impl EngineConnector for FakeConnector {
        async fn connect(
            &self,
            _profile: &ConnectionProfile,
            _options: ConnectOptions,
        ) -> Result<Box<dyn QueryEngine>, BackendError> {
            if self.fail_connects.load(Ordering::Relaxed) > 0 {
                self.fail_connects.fetch_sub(1, Ordering::Relaxed);
                return Err(BackendError::new("connect refused"));
            }
            self.connect_calls.fetch_add(1, Ordering::Relaxed);
            Ok(Box::new(FakeEngine { closed: false }))
        }
    }

    fn catalog_with(profiles: Vec<ConnectionProfile>) -> FakeCatalog {
        FakeCatalog { profiles }
    }

    fn mysql_profile(name: &str) -> ConnectionProfile {
        ConnectionProfile::new(name, BackendKind::MySql, "127.0.0.1", "root")
    }

    #[tokio::test]
    async fn unknown_profile_is_rejected_and_not_cached() {
        let mut registry = EngineRegistry::new();
        registry.register_connector(BackendKind::MySql, Arc::new(FakeConnector::default()));
        let catalog = catalog_with(Vec::new());

        let err = registry
            .get_or_create("ghost", &catalog, ConnectOptions::default())
            .await
            .expect_err("lookup should fail");
        assert!(matches!(err, RegistryError::UnknownProfile { .. }));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn missing_connector_is_a_typed_error() {
        let mut registry = EngineRegistry::new();
        let catalog = catalog_with(vec![ConnectionProfile::new(
            "pg",
            BackendKind::PostgreSql,
            "127.0.0.1",
            "postgres",
        )]);

        let err = registry
            .get_or_create("pg", &catalog, ConnectOptions::default())
            .await
            .expect_err("connector lookup should fail");
        assert!(matches!(
            err,
            RegistryError::UnsupportedBackend {
                kind: BackendKind::PostgreSql
            }
        ));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn second_lookup_reuses_cached_engine() {
        let connector = Arc::new(FakeConnector::default());
        let connect_calls = Arc::clone(&connector.connect_calls);
        let mut registry = EngineRegistry::new();
        registry.register_connector(BackendKind::MySql, connector);
        let catalog = catalog_with(vec![mysql_profile("devdb")]);

        registry
            .get_or_create("devdb", &catalog, ConnectOptions::default())
            .await
            .expect("first connect should succeed");
        registry
            .get_or_create("devdb", &catalog, ConnectOptions::default())
            .await
            .expect("cache hit should succeed");

        assert_eq!(connect_calls.load(Ordering::Relaxed), 1);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn annotation_case_never_causes_a_cache_miss() {
        let connector = Arc::new(FakeConnector::default());
        let connect_calls = Arc::clone(&connector.connect_calls);
        let mut registry = EngineRegistry::new();
        registry.register_connector(BackendKind::MySql, connector);
        let catalog = catalog_with(vec![mysql_profile("devdb")]);

        registry
            .get_or_create("devdb", &catalog, ConnectOptions::default())
            .await
            .expect("connect should succeed");
        registry
            .get_or_create("DevDB", &catalog, ConnectOptions::default())
            .await
            .expect("case-variant lookup should hit the cache");

        assert_eq!(connect_calls.load(Ordering::Relaxed), 1);
        assert!(registry.contains("DEVDB"));
    }

    #[tokio::test]
    async fn failed_connect_caches_nothing_and_allows_retry() {
        let connector = Arc::new(FakeConnector {
            connect_calls: Arc::new(AtomicUsize::new(0)),
            fail_connects: AtomicUsize::new(1),
        });
        let connect_calls = Arc::clone(&connector.connect_calls);
        let mut registry = EngineRegistry::new();
        registry.register_connector(BackendKind::MySql, connector);
        let catalog = catalog_with(vec![mysql_profile("devdb")]);

        let err = registry
            .get_or_create("devdb", &catalog, ConnectOptions::default())
            .await
            .expect_err("first connect should fail");
        assert!(matches!(err, RegistryError::Connect { .. }));
        assert!(registry.is_empty());

        registry
            .get_or_create("devdb", &catalog, ConnectOptions::default())
            .await
            .expect("retry should connect from scratch");
        assert_eq!(connect_calls.load(Ordering::Relaxed), 1);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn remove_closes_and_evicts() {
        let mut registry = EngineRegistry::new();
        registry.register_connector(BackendKind::MySql, Arc::new(FakeConnector::default()));
        let catalog = catalog_with(vec![mysql_profile("devdb")]);

        registry
            .get_or_create("devdb", &catalog, ConnectOptions::default())
            .await
            .expect("connect should succeed");
        assert!(registry.remove("devdb").await);
        assert!(registry.is_empty());
        assert!(!registry.remove("devdb").await);
    }

    #[tokio::test]
    async fn close_all_drains_the_cache() {
        let mut registry = EngineRegistry::new();
        registry.register_connector(BackendKind::MySql, Arc::new(FakeConnector::default()));
        let catalog = catalog_with(vec![mysql_profile("a"), mysql_profile("b")]);

        registry
            .get_or_create("a", &catalog, ConnectOptions::default())
            .await
            .expect("connect a should succeed");
        registry
            .get_or_create("b", &catalog, ConnectOptions::default())
            .await
            .expect("connect b should succeed");

        registry.close_all().await;
        assert!(registry.is_empty());
    }
}
