use anyhow::{Context, Result};
use clap::Args;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::telemetry::{self};
use crate::telemetry::ops::init::Phase as InitPhase;

#[derive(Args)]
pub struct InitCmd {}

/// Connect and apply any pending migrations (idempotent).
pub async fn init_db(dsn: &str) -> Result<PgPool> {
    let log = telemetry::init();
    let _g = log.root_span().entered();

    let pool = {
        let _s = log.span(&InitPhase::Connect).entered();
        PgPoolOptions::new()
            .max_connections(5)
            .connect(dsn)
            .await
            .context("connect to database")?
    };

    {
        let _s = log.span(&InitPhase::Migrate).entered();
        sqlx::migrate!().run(&pool).await.context("apply migrations")?;
    }

    log.info("✅ Database initialized");
    Ok(pool)
}

pub async fn run(dsn: &str, _args: InitCmd) -> Result<()> {
    let _pool = init_db(dsn).await?;
    if telemetry::config::json_mode() {
        telemetry::init().result(&serde_json::json!({ "initialized": true }))?;
    }
    Ok(())
}
