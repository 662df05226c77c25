use async_trait::async_trait;
use mysql_async::prelude::Queryable;
use mysql_async::{Conn, OptsBuilder, Row, Value};
use tracing::info;
use xpqe_core::engine::{
    BackendError, CellValue, ConnectOptions, EngineConnector, EngineRow, QueryEngine, QueryOutput,
};
use xpqe_core::profiles::{BackendKind, ConnectionProfile};

/// Connects MySQL-kind profiles. A database name is optional; without
/// one the session is server-wide.
#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlConnector;

#[async_trait]
impl EngineConnector for MysqlConnector {
    async fn connect(
        &self,
        profile: &ConnectionProfile,
        options: ConnectOptions,
    ) -> Result<Box<dyn QueryEngine>, BackendError> {
        let mut conn = Conn::new(opts_from_profile(profile))
            .await
            .map_err(to_backend_error)?;

        let flag = u8::from(options.auto_commit);
        conn.query_drop(format!("SET autocommit = {flag}"))
            .await
            .map_err(to_backend_error)?;

        info!(profile = %profile.name, host = %profile.host, "mysql session established");
        Ok(Box::new(MysqlEngine { conn: Some(conn) }))
    }
}

#[derive(Debug)]
pub struct MysqlEngine {
    conn: Option<Conn>,
}

#[async_trait]
impl QueryEngine for MysqlEngine {
    fn kind(&self) -> BackendKind {
        BackendKind::MySql
    }

    async fn execute(&mut self, sql: &str) -> Result<QueryOutput, BackendError> {
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| BackendError::new("mysql connection is closed"))?;

        let mut result = conn.query_iter(sql).await.map_err(to_backend_error)?;
        // The text protocol sends column metadata with the rows, so the
        // names come straight off the result set.
        let columns = result
            .columns()
            .map(|columns| {
                columns
                    .iter()
                    .map(|column| column.name_str().into_owned())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        let driver_rows: Vec<Row> = result.collect().await.map_err(to_backend_error)?;

        let rows = driver_rows
            .into_iter()
            .map(row_to_engine_row)
            .collect::<Vec<_>>();
        let row_count = rows.len() as u64;

        Ok(QueryOutput {
            columns,
            rows,
            row_count,
        })
    }

    async fn close(&mut self) -> Result<bool, BackendError> {
        match self.conn.take() {
            Some(conn) => {
                conn.disconnect().await.map_err(to_backend_error)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

fn opts_from_profile(profile: &ConnectionProfile) -> OptsBuilder {
    let mut builder = OptsBuilder::default()
        .ip_or_hostname(profile.host.clone())
        .tcp_port(profile.port)
        .user(Some(profile.user.clone()));

    if let Some(password) = &profile.password {
        builder = builder.pass(Some(password.clone()));
    }

    if let Some(database) = &profile.database {
        builder = builder.db_name(Some(database.clone()));
    }

    builder
}

fn row_to_engine_row(row: Row) -> EngineRow {
    let cells = row
        .unwrap()
        .into_iter()
        .map(mysql_value_to_cell)
        .collect::<Vec<_>>();
    EngineRow::new(cells)
}

fn mysql_value_to_cell(value: Value) -> CellValue {
    match value {
        Value::NULL => CellValue::Null,
        Value::Bytes(bytes) => CellValue::text(String::from_utf8_lossy(&bytes).into_owned()),
        Value::Int(value) => CellValue::text(value.to_string()),
        Value::UInt(value) => CellValue::text(value.to_string()),
        Value::Float(value) => CellValue::text(value.to_string()),
        Value::Double(value) => CellValue::text(value.to_string()),
        Value::Date(year, month, day, hour, minute, second, micros) => CellValue::text(format!(
            "{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}.{micros:06}"
        )),
        Value::Time(is_negative, days, hours, minutes, seconds, micros) => {
            let sign = if is_negative { "-" } else { "" };
            CellValue::text(format!(
                "{sign}{days:03} {hours:02}:{minutes:02}:{seconds:02}.{micros:06}"
            ))
        }
    }
}

fn to_backend_error(error: mysql_async::Error) -> BackendError {
    BackendError::new(error.to_string())
}
