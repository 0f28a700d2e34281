//! C10 — Persistence & audit (spec §4.10). Everything here runs inside the
//! caller's transaction; nothing commits on its own.

use md5::{Digest, Md5};
use serde_json::json;
use sqlx::{Postgres, Transaction};

use crate::db::geometry::{point_to_ewkb, polygon_to_ewkb};
use crate::db::models::{NewSegment, SegmentMetadata};
use crate::segment_builder::BuiltSegment;
use crate::types::{ElectionId, FamilyId, JobId, NodeId};
use crate::validator::exception_flags;

/// Ten-entry color palette, indexed `i mod 10` (spec §4.10 step 2).
const SEGMENT_COLORS: [&str; 10] = [
    "#e6194b", "#3cb44b", "#ffe119", "#4363d8", "#f58231", "#911eb4", "#46f0f0", "#f032e6", "#bcf60c", "#fabebe",
];

const MEMBER_CHUNK_SIZE: usize = 5000;

/// Delete prior `draft` segments (and their members) for this node — the
/// idempotence mechanism for re-runs (spec §4.10 step 1).
pub async fn purge_draft_segments(tx: &mut Transaction<'_, Postgres>, node_id: NodeId) -> sqlx::Result<()> {
    sqlx::query(
        "delete from segment_members where segment_id in \
         (select id from segments where node_id = $1 and status = 'draft')",
    )
    .bind(node_id)
    .execute(&mut **tx)
    .await?;

    sqlx::query("delete from segments where node_id = $1 and status = 'draft'")
        .bind(node_id)
        .execute(&mut **tx)
        .await?;

    Ok(())
}

fn to_new_segment(
    election_id: ElectionId,
    node_id: NodeId,
    version: i32,
    algorithm: &'static str,
    index: usize,
    built: &BuiltSegment,
    exception_kind: Option<&'static str>,
) -> anyhow::Result<NewSegment> {
    let metadata = SegmentMetadata {
        node_id,
        version,
        segment_code: built.segment_code.clone(),
        algorithm,
        exception: exception_kind.map(|_| true),
        exception_type: exception_kind,
        requires_manual_review: exception_kind.map(|_| true),
    };

    Ok(NewSegment {
        election_id,
        node_id,
        version,
        display_name: built.segment_code.clone(),
        color: SEGMENT_COLORS[index % SEGMENT_COLORS.len()].to_string(),
        centroid_point_ewkb: point_to_ewkb(built.centroid)?,
        boundary_ewkb: polygon_to_ewkb(&built.geometry)?,
        geometry_ewkb: polygon_to_ewkb(&built.geometry)?,
        total_voters: built.total_voters,
        total_families: built.family_ids.len() as i64,
        metadata: serde_json::to_value(&metadata)?,
        family_ids: built.family_ids.clone(),
    })
}

/// Bulk-insert the new segments (step 2) and their members in chunks of
/// 5000 (step 3). Returns the inserted segment ids in the same order as
/// `segments`, so callers can line them up with `BuiltSegment`s for audit.
pub async fn insert_segments(
    tx: &mut Transaction<'_, Postgres>,
    election_id: ElectionId,
    node_id: NodeId,
    version: i32,
    algorithm: &'static str,
    built_segments: &[BuiltSegment],
) -> anyhow::Result<Vec<uuid::Uuid>> {
    let flags = exception_flags(built_segments);
    let mut inserted_ids = Vec::with_capacity(built_segments.len());

    for (index, built) in built_segments.iter().enumerate() {
        let exception_kind = flags.get(&built.segment_code).copied();
        let new_segment =
            to_new_segment(election_id, node_id, version, algorithm, index, built, exception_kind)?;

        let (segment_id,): (uuid::Uuid,) = sqlx::query_as(
            "insert into segments \
             (election_id, node_id, version, display_name, color, status, centroid, boundary, geometry, \
              total_voters, total_families, metadata) \
             values ($1, $2, $3, $4, $5, 'draft', \
              st_setsrid(st_geomfromwkb($6), 4326), st_setsrid(st_geomfromwkb($7), 4326), \
              st_setsrid(st_geomfromwkb($8), 4326), $9, $10, $11) \
             returning id",
        )
        .bind(new_segment.election_id)
        .bind(new_segment.node_id)
        .bind(new_segment.version)
        .bind(&new_segment.display_name)
        .bind(&new_segment.color)
        .bind(&new_segment.centroid_point_ewkb)
        .bind(&new_segment.boundary_ewkb)
        .bind(&new_segment.geometry_ewkb)
        .bind(new_segment.total_voters)
        .bind(new_segment.total_families)
        .bind(&new_segment.metadata)
        .fetch_one(&mut **tx)
        .await?;

        for chunk in new_segment.family_ids.chunks(MEMBER_CHUNK_SIZE) {
            let segment_ids = vec![segment_id; chunk.len()];
            sqlx::query(
                "insert into segment_members (segment_id, family_id) \
                 select * from unnest($1::uuid[], $2::uuid[])",
            )
            .bind(&segment_ids)
            .bind(chunk)
            .execute(&mut **tx)
            .await?;
        }

        inserted_ids.push(segment_id);
    }

    Ok(inserted_ids)
}

/// One `audit_batch` per job, one `audit_movement` per created segment
/// (step 4).
pub async fn write_audit_trail(
    tx: &mut Transaction<'_, Postgres>,
    job_id: JobId,
    election_id: ElectionId,
    segment_ids: &[uuid::Uuid],
    built_segments: &[BuiltSegment],
) -> anyhow::Result<()> {
    let (batch_id,): (uuid::Uuid,) = sqlx::query_as(
        "insert into audit_batches (election_id, batch_type, description, total_changes, status) \
         values ($1, 'segmentation', $2, $3, 'applied') returning id",
    )
    .bind(election_id)
    .bind(format!("segmentation run for job {job_id}"))
    .bind(segment_ids.len() as i64)
    .fetch_one(&mut **tx)
    .await?;

    for (segment_id, built) in segment_ids.iter().zip(built_segments) {
        let new_data = json!({
            "segment_code": built.segment_code,
            "total_voters": built.total_voters,
            "total_families": built.family_ids.len(),
        });
        sqlx::query(
            "insert into audit_movements (batch_id, action, entity_type, entity_id, new_data) \
             values ($1, 'create', 'segment', $2, $3)",
        )
        .bind(batch_id)
        .bind(segment_id)
        .bind(new_data)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

/// MD5 over the sorted, comma-joined family ids attached to the new segments
/// (spec §4.10 step 5). Identical inputs always produce the identical hash.
pub fn compute_run_hash(built_segments: &[BuiltSegment]) -> String {
    let mut family_ids: Vec<FamilyId> = built_segments.iter().flat_map(|s| s.family_ids.iter().copied()).collect();
    family_ids.sort();
    let joined = family_ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(",");

    let mut hasher = Md5::new();
    hasher.update(joined.as_bytes());
    hex::encode(hasher.finalize())
}
