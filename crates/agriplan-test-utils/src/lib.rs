//! Shared test utilities for agriplan integration tests.
//!
//! One PostgreSQL server per test binary; every test gets its own freshly
//! migrated database on it.
//!
//! The server comes from `AGRIPLAN_TEST_PG_URL` when that is set (for CI
//! jobs that run a postgres service), otherwise from a testcontainers
//! `postgres` container started on first use.

use std::time::Duration;

use chrono::NaiveDate;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use testcontainers::ContainerAsync;
use testcontainers::ImageExt;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;
use uuid::Uuid;

use agriplan_db::models::{Field, NewField};
use agriplan_db::pool;
use agriplan_db::queries::fields;

/// Server root URL plus the container that backs it, if any.
struct PgServer {
    root_url: String,
    _container: Option<ContainerAsync<Postgres>>,
}

static PG_SERVER: OnceCell<PgServer> = OnceCell::const_new();

async fn start_server() -> PgServer {
    if let Ok(url) = std::env::var("AGRIPLAN_TEST_PG_URL") {
        return PgServer {
            root_url: url.trim_end_matches('/').to_owned(),
            _container: None,
        };
    }

    let container = Postgres::default()
        .with_tag("18")
        .start()
        .await
        .expect("failed to start PostgreSQL container");
    let host = container.get_host().await.expect("failed to get host");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("failed to get mapped port");

    PgServer {
        root_url: format!("postgresql://postgres:postgres@{host}:{port}"),
        _container: Some(container),
    }
}

/// Root URL of the shared server, without a database name.
pub async fn pg_url() -> &'static str {
    &PG_SERVER.get_or_init(start_server).await.root_url
}

async fn maintenance_pool() -> PgPool {
    let url = format!("{}/postgres", pg_url().await);
    PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&url)
        .await
        .expect("failed to connect to maintenance database")
}

/// Create a uniquely named database with all migrations applied.
///
/// Returns `(pool, db_name)`; pass `db_name` to [`drop_test_db`] at the end
/// of the test.
pub async fn create_test_db() -> (PgPool, String) {
    let db_name = format!("agriplan_test_{}", Uuid::new_v4().simple());

    let maint = maintenance_pool().await;
    maint
        .execute(format!("CREATE DATABASE {db_name}").as_str())
        .await
        .unwrap_or_else(|e| panic!("failed to create test database {db_name}: {e}"));
    maint.close().await;

    let url = format!("{}/{db_name}", pg_url().await);
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&url)
        .await
        .unwrap_or_else(|e| panic!("failed to connect to test database {db_name}: {e}"));

    pool::run_migrations(&pool)
        .await
        .expect("migrations should succeed");

    (pool, db_name)
}

/// Drop a database created by [`create_test_db`], terminating any
/// connections still attached to it.
pub async fn drop_test_db(db_name: &str) {
    let maint = maintenance_pool().await;

    let terminate = format!(
        "SELECT pg_terminate_backend(pid) \
         FROM pg_stat_activity \
         WHERE datname = '{db_name}' AND pid <> pg_backend_pid()"
    );
    let _ = maint.execute(terminate.as_str()).await;
    let _ = maint
        .execute(format!("DROP DATABASE IF EXISTS {db_name}").as_str())
        .await;
    maint.close().await;
}

/// A 10-rai loam new-planting field planted on 2025-01-01.
pub fn sample_new_field() -> NewField {
    NewField {
        owner_id: "farmer-1".to_owned(),
        variety: "KK3".to_owned(),
        crop_type: "new_plant".to_owned(),
        area_rai: 10.0,
        province: "Khon Kaen".to_owned(),
        district: "Nam Phong".to_owned(),
        soil_texture: "loam".to_owned(),
        irrigation_source: "pond".to_owned(),
        pump_m3h: Some(40.0),
        planting_date: NaiveDate::from_ymd_opt(2025, 1, 1).expect("valid date"),
    }
}

/// Insert [`sample_new_field`] and return the stored row.
pub async fn insert_sample_field(pool: &PgPool) -> Field {
    fields::insert_field(pool, &sample_new_field())
        .await
        .expect("insert sample field")
}
