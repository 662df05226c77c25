pub mod mysql;
pub mod postgres;

use std::sync::Arc;

use xpqe_core::profiles::BackendKind;
use xpqe_core::registry::EngineRegistry;

/// Registers one connector per supported backend kind. New backends
/// plug in here; nothing else in the engine switches on a kind.
pub fn register_default_connectors(registry: &mut EngineRegistry) {
    registry.register_connector(BackendKind::MySql, Arc::new(mysql::MysqlConnector));
    registry.register_connector(BackendKind::PostgreSql, Arc::new(postgres::PostgresConnector));
}

#[must_use]
pub fn default_registry() -> EngineRegistry {
    let mut registry = EngineRegistry::new();
    register_default_connectors(&mut registry);
    registry
}
