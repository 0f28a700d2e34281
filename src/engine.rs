//! C11 — Dispatcher (spec §4.11). Runs the configured strategy's full
//! pipeline inside a single transaction and returns the timed result.

use std::collections::HashMap;
use std::time::Instant;

use sqlx::{PgPool, Postgres, Transaction};

use crate::boundary::compute_parent_boundary;
use crate::config::Strategy;
use crate::db::models::EngineResult;
use crate::error::{EngineError, InputError};
use crate::geohash_engine::build_geohash_segments;
use crate::grid::{build_adaptive_grid, Cell};
use crate::persistence::{compute_run_hash, insert_segments, purge_draft_segments, write_audit_trail};
use crate::region::{build_neighbor_map, grow_regions};
use crate::scope::resolve_scope;
use crate::segment_builder::{build_segments, BuiltSegment};
use crate::types::{ElectionId, FamilyId, JobId, NodeId};
use crate::units::{build_atomic_units, AtomicUnit};
use crate::validator::{validate_post_commit, validate_pre_commit};

fn run_grid_strategy(units: &[AtomicUnit]) -> Result<Vec<BuiltSegment>, EngineError> {
    let boundary = compute_parent_boundary(units)?;
    let grid = build_adaptive_grid(&boundary.polygon, units.len(), boundary.area_m2);
    let assignments = crate::assign::assign_units_to_cells(units, &grid)?;
    let neighbor_map = build_neighbor_map(&grid);
    let growth = grow_regions(&grid, &assignments, &neighbor_map);

    let cells_by_id: HashMap<u32, &Cell> = grid.cells.iter().map(|c| (c.id, c)).collect();
    Ok(build_segments(&growth.regions, &cells_by_id, &assignments)?)
}

fn run_geohash_strategy(units: &[AtomicUnit]) -> Result<Vec<BuiltSegment>, EngineError> {
    Ok(build_geohash_segments(units)?)
}

/// Run C1 through C10 inside `tx`, returning the engine result. The caller
/// owns the transaction boundary and commits or rolls back around this call.
pub async fn run(
    pool: &PgPool,
    tx: &mut Transaction<'_, Postgres>,
    job_id: JobId,
    election_id: ElectionId,
    node_id: NodeId,
    version: i32,
    strategy: Strategy,
) -> Result<EngineResult, EngineError> {
    let total_start = Instant::now();

    let scope = resolve_scope(pool, election_id, node_id).await.map_err(anyhow_to_engine_error)?;
    if scope.voters.is_empty() {
        return Err(InputError::NoVoters.into());
    }

    let families = crate::db::load_families(pool, &scope.booth_ids).await.map_err(anyhow_to_engine_error)?;
    let units = build_atomic_units(&families, &scope.voters)?;
    let expected_total_voters: i64 = units.iter().map(|u| u.voter_count).sum();
    let in_scope_families: Vec<FamilyId> = units.iter().map(|u| u.id).collect();

    let algorithm_start = Instant::now();
    let built_segments = match strategy {
        Strategy::GridBased => run_grid_strategy(&units)?,
        Strategy::GeoHash => run_geohash_strategy(&units)?,
    };
    let algorithm_ms = algorithm_start.elapsed().as_millis() as u64;

    validate_pre_commit(&built_segments, expected_total_voters)?;

    let db_write_start = Instant::now();
    purge_draft_segments(tx, node_id).await.map_err(crate::error::PersistenceError::Database)?;
    let segment_ids = insert_segments(tx, election_id, node_id, version, strategy.tag(), &built_segments)
        .await
        .map_err(anyhow_to_engine_error)?;

    validate_post_commit(&built_segments, &in_scope_families)?;

    write_audit_trail(tx, job_id, election_id, &segment_ids, &built_segments)
        .await
        .map_err(anyhow_to_engine_error)?;
    let db_write_ms = db_write_start.elapsed().as_millis() as u64;

    let run_hash = compute_run_hash(&built_segments);
    let total_ms = total_start.elapsed().as_millis() as u64;

    Ok(EngineResult {
        segment_count: built_segments.len(),
        voter_count: expected_total_voters,
        family_count: in_scope_families.len() as i64,
        algorithm_ms,
        db_write_ms,
        total_ms,
        run_hash,
    })
}

/// `resolve_scope` and the persistence helpers surface plain `anyhow::Error`
/// (their failure modes are DB/IO errors, not part of the typed taxonomy);
/// fold them into the dispatcher's error type as a database error.
fn anyhow_to_engine_error(e: anyhow::Error) -> EngineError {
    match e.downcast::<sqlx::Error>() {
        Ok(db_err) => db_err.into(),
        Err(e) => match e.downcast::<crate::error::ScopeError>() {
            Ok(scope_err) => scope_err.into(),
            Err(e) => EngineError::Algorithm(crate::error::AlgorithmError::GeometryBuildFailed(e.to_string())),
        },
    }
}
