use xpqe_adapters::mysql::MysqlConnector;
use xpqe_adapters::postgres::PostgresConnector;
use xpqe_core::engine::{ConnectOptions, EngineConnector, QueryEngine};
use xpqe_core::profiles::{BackendKind, ConnectionProfile};

fn integration_enabled(flag: &str) -> bool {
    matches!(std::env::var(flag).ok().as_deref(), Some("1"))
}

fn env_or(name: &str, fallback: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| fallback.to_string())
}

fn mysql_profile() -> ConnectionProfile {
    let mut profile = ConnectionProfile::new(
        "adapters-integration",
        BackendKind::MySql,
        env_or("XPQE_TEST_MYSQL_HOST", "127.0.0.1"),
        env_or("XPQE_TEST_MYSQL_USER", "root"),
    );
    profile.port = env_or("XPQE_TEST_MYSQL_PORT", "3306")
        .parse()
        .unwrap_or(3306);
    profile.password = std::env::var("XPQE_TEST_MYSQL_PASSWORD").ok();
    profile
}

fn postgres_profile() -> ConnectionProfile {
    let mut profile = ConnectionProfile::new(
        "adapters-integration",
        BackendKind::PostgreSql,
        env_or("XPQE_TEST_PG_HOST", "127.0.0.1"),
        env_or("XPQE_TEST_PG_USER", "postgres"),
    );
    profile.port = env_or("XPQE_TEST_PG_PORT", "5432").parse().unwrap_or(5432);
    profile.database = Some(env_or("XPQE_TEST_PG_DATABASE", "postgres"));
    profile.password = std::env::var("XPQE_TEST_PG_PASSWORD").ok();
    profile
}

#[tokio::test(flavor = "current_thread")]
async fn mysql_connect_execute_and_idempotent_close() {
    if !integration_enabled("XPQE_RUN_MYSQL_INTEGRATION") {
        return;
    }

    let mut engine = MysqlConnector
        .connect(&mysql_profile(), ConnectOptions { auto_commit: true })
        .await
        .expect("mysql connect should succeed");

    let output = engine
        .execute("SELECT 1 AS one, NULL AS missing")
        .await
        .expect("query should succeed");
    assert_eq!(output.columns, ["one".to_string(), "missing".to_string()]);
    assert_eq!(output.row_count, 1);
    assert_eq!(output.rows[0].cells[0].display(), "1");
    assert!(output.rows[0].cells[1].is_null());

    // An execute failure must leave the engine usable.
    engine
        .execute("SELEC nonsense")
        .await
        .expect_err("malformed statement should fail");
    engine
        .execute("SELECT 2")
        .await
        .expect("engine should survive a failed statement");

    assert!(engine.close().await.expect("close should succeed"));
    assert!(!engine.close().await.expect("second close should be a no-op"));
}

#[tokio::test(flavor = "current_thread")]
async fn postgres_connect_execute_and_idempotent_close() {
    if !integration_enabled("XPQE_RUN_PG_INTEGRATION") {
        return;
    }

    let mut engine = PostgresConnector
        .connect(&postgres_profile(), ConnectOptions { auto_commit: true })
        .await
        .expect("postgres connect should succeed");

    let output = engine
        .execute("SELECT 1 AS one, NULL AS missing")
        .await
        .expect("query should succeed");
    assert_eq!(output.columns, ["one".to_string(), "missing".to_string()]);
    assert_eq!(output.row_count, 1);
    assert_eq!(output.rows[0].cells[0].display(), "1");
    assert!(output.rows[0].cells[1].is_null());

    engine
        .execute("SELEC nonsense")
        .await
        .expect_err("malformed statement should fail");
    engine
        .execute("SELECT 2")
        .await
        .expect("engine should survive a failed statement");

    assert!(engine.close().await.expect("close should succeed"));
    assert!(!engine.close().await.expect("second close should be a no-op"));
}
