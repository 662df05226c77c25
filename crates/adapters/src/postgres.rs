use async_trait::async_trait;
use tokio_postgres::{Client, Config, NoTls, SimpleQueryMessage};
use tracing::{info, warn};
use xpqe_core::engine::{
    BackendError, CellValue, ConnectOptions, EngineConnector, EngineRow, QueryEngine, QueryOutput,
};
use xpqe_core::profiles::{BackendKind, ConnectionProfile};

/// Connects PostgreSQL-kind profiles. Unlike MySQL, a database name is
/// mandatory at connect time.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresConnector;

#[async_trait]
impl EngineConnector for PostgresConnector {
    async fn connect(
        &self,
        profile: &ConnectionProfile,
        options: ConnectOptions,
    ) -> Result<Box<dyn QueryEngine>, BackendError> {
        let database = profile
            .database
            .as_deref()
            .map(str::trim)
            .filter(|database| !database.is_empty())
            .ok_or_else(|| {
                BackendError::new(format!(
                    "profile `{}` has no database; postgresql requires one at connect time",
                    profile.name
                ))
            })?;

        let mut config = Config::new();
        config
            .host(&profile.host)
            .port(profile.port)
            .user(&profile.user)
            .dbname(database);
        if let Some(password) = &profile.password {
            config.password(password);
        }

        let (client, connection) = config.connect(NoTls).await.map_err(to_backend_error)?;
        let profile_name = profile.name.clone();
        tokio::spawn(async move {
            if let Err(error) = connection.await {
                warn!(profile = %profile_name, %error, "postgresql connection task ended");
            }
        });

        info!(profile = %profile.name, host = %profile.host, "postgresql session established");
        Ok(Box::new(PostgresEngine {
            client: Some(client),
            auto_commit: options.auto_commit,
            in_transaction: false,
        }))
    }
}

#[derive(Debug)]
pub struct PostgresEngine {
    client: Option<Client>,
    auto_commit: bool,
    /// With autocommit off the engine keeps a psycopg2-style implicit
    /// transaction open; a failed statement rolls it back so the
    /// session stays usable for the next query.
    in_transaction: bool,
}

#[async_trait]
impl QueryEngine for PostgresEngine {
    fn kind(&self) -> BackendKind {
        BackendKind::PostgreSql
    }

    async fn execute(&mut self, sql: &str) -> Result<QueryOutput, BackendError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| BackendError::new("postgresql connection is closed"))?;

        if !self.auto_commit && !self.in_transaction {
            client
                .batch_execute("BEGIN")
                .await
                .map_err(to_backend_error)?;
            self.in_transaction = true;
        }

        match client.simple_query(sql).await {
            Ok(messages) => Ok(output_from_messages(messages)),
            Err(error) => {
                if self.in_transaction {
                    if let Err(rollback_error) = client.batch_execute("ROLLBACK").await {
                        warn!(%rollback_error, "failed to roll back aborted transaction");
                    }
                    self.in_transaction = false;
                }
                Err(to_backend_error(error))
            }
        }
    }

    async fn close(&mut self) -> Result<bool, BackendError> {
        // Dropping the client terminates the connection task.
        Ok(self.client.take().is_some())
    }
}

/// Rows arrive as positional tuples; column names come from the row
/// description message, not the rows themselves.
fn output_from_messages(messages: Vec<SimpleQueryMessage>) -> QueryOutput {
    let mut columns: Vec<String> = Vec::new();
    let mut rows = Vec::new();
    let mut reported_count: Option<u64> = None;

    for message in messages {
        match message {
            SimpleQueryMessage::RowDescription(description) => {
                columns = description
                    .iter()
                    .map(|column| column.name().to_string())
                    .collect();
            }
            SimpleQueryMessage::Row(row) => {
                let cells = (0..row.len())
                    .map(|index| match row.get(index) {
                        Some(value) => CellValue::text(value),
                        None => CellValue::Null,
                    })
                    .collect::<Vec<_>>();
                rows.push(EngineRow::new(cells));
            }
            SimpleQueryMessage::CommandComplete(count) => {
                reported_count = Some(count);
            }
            _ => {}
        }
    }

    let row_count = reported_count.unwrap_or(rows.len() as u64);
    QueryOutput {
        columns,
        rows,
        row_count,
    }
}

fn to_backend_error(error: tokio_postgres::Error) -> BackendError {
    BackendError::new(error.to_string())
}
