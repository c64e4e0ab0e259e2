//! Shared test utilities for storymap database tests.
//!
//! One PostgreSQL server is shared per test binary; every [`TestDb`] gets a
//! freshly migrated database of its own inside it.
//!
//! - **`STORYMAP_TEST_PG_URL`** set: connect to that server directly.
//! - Otherwise a `postgres` container is started via testcontainers on
//!   first use and kept alive for the rest of the binary.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use testcontainers::ContainerAsync;
use testcontainers::ImageExt;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;
use uuid::Uuid;

use storymap_db::models::{Activity, Project, Workflow};
use storymap_db::pool;
use storymap_db::queries::{projects, workflows};

struct SharedServer {
    base_url: String,
    _container: Option<ContainerAsync<Postgres>>,
}

static SERVER: OnceCell<SharedServer> = OnceCell::const_new();

async fn start_server() -> SharedServer {
    if let Ok(url) = std::env::var("STORYMAP_TEST_PG_URL") {
        return SharedServer {
            base_url: url.trim_end_matches('/').to_owned(),
            _container: None,
        };
    }

    let container = Postgres::default()
        .with_tag("17")
        .start()
        .await
        .expect("failed to start PostgreSQL container");
    let host = container.get_host().await.expect("failed to get host");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("failed to get mapped port");

    SharedServer {
        base_url: format!("postgresql://postgres:postgres@{host}:{port}"),
        _container: Some(container),
    }
}

async fn maintenance_pool() -> PgPool {
    let server = SERVER.get_or_init(start_server).await;
    PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&format!("{}/postgres", server.base_url))
        .await
        .expect("failed to connect to maintenance database")
}

/// A uniquely named, migrated database. Call [`TestDb::drop_db`] at the end
/// of the test.
pub struct TestDb {
    pub pool: PgPool,
    pub name: String,
}

impl TestDb {
    /// Create and migrate a new database.
    pub async fn create() -> Self {
        let maint = maintenance_pool().await;
        let name = format!("storymap_test_{}", Uuid::new_v4().simple());
        maint
            .execute(format!("CREATE DATABASE {name}").as_str())
            .await
            .unwrap_or_else(|e| panic!("failed to create temp database {name}: {e}"));
        maint.close().await;

        let server = SERVER.get_or_init(start_server).await;
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&format!("{}/{name}", server.base_url))
            .await
            .unwrap_or_else(|e| panic!("failed to connect to temp database {name}: {e}"));

        pool::run_migrations(&pool)
            .await
            .expect("migrations should succeed");

        Self { pool, name }
    }

    /// Close the pool, terminate stray connections and drop the database.
    pub async fn drop_db(self) {
        self.pool.close().await;
        let maint = maintenance_pool().await;
        let terminate = format!(
            "SELECT pg_terminate_backend(pid) FROM pg_stat_activity \
             WHERE datname = '{}' AND pid <> pg_backend_pid()",
            self.name
        );
        let _ = maint.execute(terminate.as_str()).await;
        let _ = maint
            .execute(format!("DROP DATABASE IF EXISTS {}", self.name).as_str())
            .await;
        maint.close().await;
    }
}

/// Seed a project with one workflow holding one activity.
///
/// Returns `(project, workflow, activity)`.
pub async fn seed_project(pool: &PgPool) -> (Project, Workflow, Activity) {
    let project = projects::insert_project(pool, &Project::new(Uuid::new_v4(), "Seed project"))
        .await
        .expect("insert project");

    let workflow = Workflow {
        id: Uuid::new_v4(),
        project_id: project.id,
        title: "Checkout".into(),
        description: None,
        build_state: None,
        position: 0,
    };
    workflows::insert_workflow(pool, &workflow)
        .await
        .expect("insert workflow");

    let activity = Activity {
        id: Uuid::new_v4(),
        workflow_id: workflow.id,
        title: "Pay".into(),
        color: None,
        position: 0,
    };
    workflows::insert_activity(pool, &activity)
        .await
        .expect("insert activity");

    (project, workflow, activity)
}
