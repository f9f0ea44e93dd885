//! Runs against a live PostgreSQL when `PGSQL_TEST_DATABASE` is set. The
//! other `PGSQL_*` variables default to a local server.

use agent::Error;
use agent::tools::{ColumnDescriptor, PgSqlConfig, PgSqlTool};
use serde_json::json;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{Connection, Executor};
use std::time::Duration;

fn test_config() -> Option<PgSqlConfig> {
    let database = std::env::var("PGSQL_TEST_DATABASE").ok()?;
    let var = |name: &str, default: &str| std::env::var(name).unwrap_or(default.to_string());

    Some(PgSqlConfig {
        host: var("PGSQL_HOST", "localhost"),
        port: var("PGSQL_PORT", "5432").parse().expect("PGSQL_PORT is a port"),
        username: var("PGSQL_USERNAME", "postgres"),
        password: var("PGSQL_PASSWORD", ""),
        database,
    })
}

async fn open_connections(conn: &mut PgConnection) -> i64 {
    sqlx::query_scalar("SELECT count(*) FROM pg_stat_activity WHERE datname = current_database()")
        .fetch_one(conn)
        .await
        .expect("count connections")
}

async fn admin(config: &PgSqlConfig) -> PgConnection {
    let options = PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.username)
        .password(&config.password)
        .database(&config.database);

    PgConnection::connect_with(&options)
        .await
        .expect("connect to test database")
}

#[tokio::test]
async fn test_live_database() {
    let Some(config) = test_config() else {
        eprintln!("PGSQL_TEST_DATABASE not set, skipping");
        return;
    };

    let users = format!("research_users_{}", std::process::id());
    let orders = format!("research_orders_{}", std::process::id());
    let mood = format!("research_mood_{}", std::process::id());
    let positive = format!("research_positive_{}", std::process::id());

    let mut conn = admin(&config).await;
    conn.execute(
        format!(
            "DROP TABLE IF EXISTS {users}, {orders};
             DROP TYPE IF EXISTS {mood};
             DROP DOMAIN IF EXISTS {positive};
             CREATE TYPE {mood} AS ENUM ('happy', 'sad');
             CREATE DOMAIN {positive} AS int4 CHECK (VALUE > 0);
             CREATE TABLE {users} (id int4, email text);
             CREATE TABLE {orders} (
                 id int8, user_id int4, total float8, paid bool,
                 amount numeric(12, 2), note varchar(20), tags text[],
                 quantity {positive}, feeling {mood}
             );
             INSERT INTO {users} VALUES (1, 'ada@example.com'), (2, NULL);
             INSERT INTO {orders} VALUES
                 (10, 1, 9.5, true, 1234567890.25, 'gift', ARRAY['a', NULL, 'c'], 3, 'happy');"
        )
        .as_str(),
    )
    .await
    .expect("create fixtures");

    let pgsql = PgSqlTool::new(&config);

    let tables = pgsql.find_tables().await.expect("find tables");
    assert!(tables.contains(&users));
    assert!(tables.contains(&orders));

    let columns = pgsql.find_columns(&users).await.expect("find columns");
    assert_eq!(
        columns,
        vec![
            ColumnDescriptor {
                column_name: "id".to_string(),
                column_data_type: "integer".to_string(),
            },
            ColumnDescriptor {
                column_name: "email".to_string(),
                column_data_type: "text".to_string(),
            },
        ]
    );

    assert!(matches!(
        pgsql.find_columns("no_such_table").await,
        Err(Error::TableNotFound(_))
    ));
    assert!(matches!(
        pgsql.find_columns(&format!("{users}'; DROP TABLE {orders}; --")).await,
        Err(Error::TableNotFound(_))
    ));

    let rows = pgsql
        .run_query(&format!("SELECT id, email FROM {users} ORDER BY id"))
        .await
        .expect("select");
    assert_eq!(
        serde_json::to_value(&rows).expect("rows serialize"),
        json!([
            {"id": 1, "email": "ada@example.com"},
            {"id": 2, "email": null},
        ])
    );

    // columns keep select-list order, not alphabetical order
    let rows = pgsql
        .run_query(&format!(
            "SELECT note, amount, tags, quantity, feeling, paid, id FROM {orders}"
        ))
        .await
        .expect("select orders");
    assert_eq!(rows.len(), 1);
    assert_eq!(
        rows[0].keys().collect::<Vec<_>>(),
        vec!["note", "amount", "tags", "quantity", "feeling", "paid", "id"]
    );
    assert_eq!(
        serde_json::to_value(&rows[0]).expect("row serializes"),
        json!({
            "note": "gift",
            "amount": "1234567890.25",
            "tags": ["a", null, "c"],
            "quantity": 3,
            "feeling": "happy",
            "paid": true,
            "id": 10,
        })
    );

    assert!(matches!(
        pgsql
            .run_query(&format!("INSERT INTO {users} VALUES (3, 'x') RETURNING id"))
            .await,
        Err(Error::DatabaseError(_))
    ));
    assert!(matches!(
        pgsql.run_query(&format!("UPDATE {users} SET email = 'x'")).await,
        Err(Error::DatabaseError(_))
    ));

    let count: i64 = sqlx::query_scalar(format!("SELECT count(*) FROM {users}").as_str())
        .fetch_one(&mut conn)
        .await
        .expect("count");
    assert_eq!(count, 2);

    // still there after the injection attempt above
    assert!(pgsql.find_tables().await.expect("find tables").contains(&orders));

    // every call closes its connection, failed ones included
    let before = open_connections(&mut conn).await;
    for _ in 0..3 {
        pgsql.find_tables().await.expect("find tables");
        pgsql.find_columns(&users).await.expect("find columns");
        pgsql
            .run_query(&format!("SELECT * FROM {users}"))
            .await
            .expect("select");
        assert!(pgsql.run_query("SELECT * FROM nope").await.is_err());
        assert!(
            pgsql
                .run_query(&format!("INSERT INTO {users} VALUES (4, 'y')"))
                .await
                .is_err()
        );
        assert!(pgsql.find_columns("nope").await.is_err());
    }

    let mut after = open_connections(&mut conn).await;
    for _ in 0..10 {
        if after == before {
            break;
        }
        // backends exit shortly after the client hangs up
        tokio::time::sleep(Duration::from_millis(100)).await;
        after = open_connections(&mut conn).await;
    }
    assert_eq!(after, before);

    conn.execute(format!("DROP TABLE {users}, {orders}; DROP TYPE {mood}; DROP DOMAIN {positive}").as_str())
        .await
        .expect("drop fixtures");
    conn.close().await.expect("close");
}
