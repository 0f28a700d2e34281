//! Database access: connection pool, geometry codec, and row types.

pub mod geometry;
pub mod models;

use anyhow::{Context, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

use crate::db::models::FamilyRow;
use crate::types::BoothId;

/// Build the shared pool used by the worker loops and the HTTP surface
/// (spec §5: "bounded size, with connect timeout and idle timeout").
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Some(Duration::from_secs(300)))
        .connect(database_url)
        .await
        .context("[db] failed to connect to DATABASE_URL")
}

/// Load the families attached to a resolved set of in-scope booths (spec
/// §4.2's input: "in-scope families").
pub async fn load_families(pool: &PgPool, booth_ids: &[BoothId]) -> Result<Vec<FamilyRow>> {
    let families: Vec<FamilyRow> = sqlx::query_as(
        "select id, election_id, booth_id, member_count, latitude, longitude from families where booth_id = any($1)",
    )
    .bind(booth_ids)
    .fetch_all(pool)
    .await
    .context("[db] failed to load families for scope")?;
    Ok(families)
}
