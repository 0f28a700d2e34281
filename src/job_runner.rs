//! C12 — Job runner (spec §4.12). Polls for queued jobs, leases one with
//! `for update skip locked`, computes the next version, dispatches to the
//! engine, and records success or failure.

use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::Strategy;
use crate::db::models::SegmentationJobRow;
use crate::engine;
use crate::error::LeaseError;
use crate::types::{ElectionId, JobId, NodeId};

struct LeasedJob {
    id: JobId,
    election_id: ElectionId,
    node_id: NodeId,
}

/// Select the oldest queued `auto_segment` job, skipping rows another
/// worker already holds, then flip it to `running` only if it is still
/// `queued` (spec §4.12 steps 1–2).
async fn lease_next_job(pool: &PgPool) -> Result<Option<LeasedJob>> {
    let mut tx = pool.begin().await?;

    let candidate: Option<(Uuid,)> = sqlx::query_as(
        "select id from segmentation_jobs \
         where job_type = 'auto_segment' and status = 'queued' \
         order by created_at asc limit 1 for update skip locked",
    )
    .fetch_optional(&mut *tx)
    .await?;

    let Some((job_id,)) = candidate else {
        tx.commit().await?;
        return Ok(None);
    };

    let updated: Option<SegmentationJobRow> = sqlx::query_as(
        "update segmentation_jobs set status = 'running', started_at = now() \
         where id = $1 and status = 'queued' \
         returning id, election_id, node_id, job_type, status, version, name, description, \
                   created_at, started_at, completed_at, result",
    )
    .bind(job_id)
    .fetch_optional(&mut *tx)
    .await?;

    tx.commit().await?;

    match updated {
        Some(row) => Ok(Some(LeasedJob { id: row.id, election_id: row.election_id, node_id: row.node_id })),
        None => Err(LeaseError(job_id).into()),
    }
}

/// `max(existing version + 1, 1)` over prior segments/jobs for this node
/// (spec §4.12 step 3).
async fn next_version(pool: &PgPool, node_id: NodeId) -> Result<i32> {
    let (max_version,): (Option<i32>,) = sqlx::query_as(
        "select max(version) from ( \
           select version from segments where node_id = $1 \
           union all \
           select version from segmentation_jobs where node_id = $1 and status = 'completed' \
         ) as versions",
    )
    .bind(node_id)
    .fetch_one(pool)
    .await?;
    Ok(max_version.unwrap_or(0).max(0) + 1)
}

async fn mark_completed(pool: &PgPool, job_id: JobId, version: i32, result: &crate::db::models::EngineResult) -> Result<()> {
    sqlx::query(
        "update segmentation_jobs set status = 'completed', completed_at = now(), version = $2, result = $3 \
         where id = $1",
    )
    .bind(job_id)
    .bind(version)
    .bind(serde_json::to_value(result)?)
    .execute(pool)
    .await?;
    Ok(())
}

/// Outside the engine's own transaction: mark the job failed and write an
/// exception row (spec §4.12 step 6).
async fn mark_failed(pool: &PgPool, election_id: ElectionId, job_id: JobId, message: &str) -> Result<()> {
    let error_id = Uuid::new_v4();

    sqlx::query("update segmentation_jobs set status = 'failed', completed_at = now() where id = $1")
        .bind(job_id)
        .execute(pool)
        .await?;

    let metadata = crate::db::models::ExceptionMetadata {
        job_id,
        reason: Some("JOB_FAILED".to_string()),
        message: Some(message.to_string()),
        error_id: Some(error_id),
    };

    sqlx::query(
        "insert into exceptions (election_id, entity, severity, type, metadata) \
         values ($1, 'segment', 'high', 'job_failure', $2)",
    )
    .bind(election_id)
    .bind(serde_json::to_value(&metadata)?)
    .execute(pool)
    .await?;

    Ok(())
}

/// Run one poll-lease-dispatch cycle. Returns `true` if a job was found
/// (whether it succeeded or failed), `false` if the queue was empty.
pub async fn run_once(pool: &PgPool, strategy: Strategy) -> Result<bool> {
    let leased = match lease_next_job(pool).await {
        Ok(Some(job)) => job,
        Ok(None) => return Ok(false),
        Err(e) if e.downcast_ref::<LeaseError>().is_some() => {
            warn!("{e}");
            return Ok(false);
        }
        Err(e) => return Err(e),
    };

    info!(job_id = %leased.id, node_id = %leased.node_id, "leased segmentation job");

    let version = next_version(pool, leased.node_id).await.context("[job_runner] computing next version")?;

    let mut tx = pool.begin().await?;
    let outcome = engine::run(pool, &mut tx, leased.id, leased.election_id, leased.node_id, version, strategy).await;

    match outcome {
        Ok(result) => {
            tx.commit().await?;
            mark_completed(pool, leased.id, version, &result).await?;
            info!(job_id = %leased.id, run_hash = %result.run_hash, "segmentation job completed");
        }
        Err(e) => {
            tx.rollback().await.ok();
            error!(job_id = %leased.id, error = %e, "segmentation job failed");
            mark_failed(pool, leased.election_id, leased.id, &e.to_string()).await?;
        }
    }

    Ok(true)
}

/// One runner loop: poll at `poll_interval` until `shutdown` fires.
pub async fn run_loop(pool: PgPool, strategy: Strategy, poll_interval: Duration, mut shutdown: tokio::sync::watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        match run_once(&pool, strategy).await {
            Ok(true) => continue,
            Ok(false) => {}
            Err(e) => error!("job runner cycle failed: {e}"),
        }

        tokio::select! {
            _ = tokio::time::sleep(poll_interval) => {}
            _ = shutdown.changed() => {}
        }
    }
}
