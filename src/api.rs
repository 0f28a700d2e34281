//! C13/C15 — minimal HTTP surface (spec §4/§2 expanded component C15). Thin:
//! every handler delegates to the DB or to C1–C12 and renders JSON.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::geometry::{point_from_ewkb, polygon_from_ewkb};
use crate::types::{ElectionId, JobStatus, NodeId};

#[derive(Clone)]
pub struct ApiState {
    pub pool: PgPool,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/jobs", post(create_job))
        .route("/jobs/:id", get(get_job))
        .route("/nodes/:id/segments", get(get_segments))
        .route("/nodes/:id/reports", post(trigger_report))
        .route("/exceptions", get(get_exceptions))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
struct CreateJobRequest {
    election_id: ElectionId,
    node_id: NodeId,
    version_name: Option<String>,
    version_description: Option<String>,
    #[allow(dead_code)]
    created_by: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateJobResponse {
    id: Uuid,
    status: &'static str,
}

async fn create_job(
    State(state): State<ApiState>,
    Json(body): Json<CreateJobRequest>,
) -> Result<Json<CreateJobResponse>, (StatusCode, String)> {
    let (id,): (Uuid,) = sqlx::query_as(
        "insert into segmentation_jobs (election_id, node_id, job_type, status, version, name, description) \
         values ($1, $2, 'auto_segment', 'queued', 0, $3, $4) returning id",
    )
    .bind(body.election_id)
    .bind(body.node_id)
    .bind(body.version_name)
    .bind(body.version_description)
    .fetch_one(&state.pool)
    .await
    .map_err(internal_error)?;

    Ok(Json(CreateJobResponse { id, status: JobStatus::Queued.as_str() }))
}

async fn get_job(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let row: Option<crate::db::models::SegmentationJobRow> = sqlx::query_as(
        "select id, election_id, node_id, job_type, status, version, name, description, \
                created_at, started_at, completed_at, result \
         from segmentation_jobs where id = $1",
    )
    .bind(id)
    .fetch_optional(&state.pool)
    .await
    .map_err(internal_error)?;

    let row = row.ok_or((StatusCode::NOT_FOUND, "job not found".to_string()))?;
    Ok(Json(json!({
        "id": row.id,
        "election_id": row.election_id,
        "node_id": row.node_id,
        "status": row.status,
        "version": row.version,
        "name": row.name,
        "description": row.description,
        "created_at": row.created_at,
        "started_at": row.started_at,
        "completed_at": row.completed_at,
        "result": row.result,
    })))
}

#[derive(Debug, Deserialize)]
struct SegmentsQuery {
    version: Option<i32>,
}

async fn get_segments(
    State(state): State<ApiState>,
    Path(node_id): Path<Uuid>,
    Query(query): Query<SegmentsQuery>,
) -> Result<Json<Vec<Value>>, (StatusCode, String)> {
    #[derive(sqlx::FromRow)]
    struct Row {
        id: Uuid,
        display_name: String,
        color: String,
        total_voters: i64,
        total_families: i64,
        metadata: Value,
        centroid: Vec<u8>,
        boundary: Vec<u8>,
        geometry: Vec<u8>,
    }

    let rows: Vec<Row> = sqlx::query_as(
        "select id, display_name, color, total_voters, total_families, metadata, \
                st_asbinary(centroid) as centroid, st_asbinary(boundary) as boundary, st_asbinary(geometry) as geometry \
         from segments where node_id = $1 and status = 'draft' \
           and ($2::int is null or version = $2) \
         order by display_name",
    )
    .bind(node_id)
    .bind(query.version)
    .fetch_all(&state.pool)
    .await
    .map_err(internal_error)?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let centroid = point_from_ewkb(&row.centroid).map_err(internal_error_anyhow)?;
        let boundary = polygon_from_ewkb(&row.boundary).map_err(internal_error_anyhow)?;
        let geometry = polygon_from_ewkb(&row.geometry).map_err(internal_error_anyhow)?;
        use geo::{Area, BoundingRect};
        let bbox = geometry.bounding_rect();
        out.push(json!({
            "id": row.id,
            "display_name": row.display_name,
            "color": row.color,
            "total_voters": row.total_voters,
            "total_families": row.total_families,
            "metadata": row.metadata,
            "centroid": { "lng": centroid.x(), "lat": centroid.y() },
            "boundary_geojson": geo_to_geojson(&boundary),
            "geometry_geojson": geo_to_geojson(&geometry),
            "area_m2": geometry.unsigned_area(),
            "bbox": bbox.map(|r| json!([r.min().x, r.min().y, r.max().x, r.max().y])),
        }));
    }
    Ok(Json(out))
}

fn geo_to_geojson(poly: &geo::Polygon<f64>) -> Value {
    let ring_to_coords = |ring: &geo::LineString<f64>| -> Value {
        ring.coords().map(|c| json!([c.x, c.y])).collect()
    };
    let mut rings: Vec<Value> = vec![ring_to_coords(poly.exterior())];
    rings.extend(poly.interiors().iter().map(ring_to_coords));
    json!({ "type": "Polygon", "coordinates": rings })
}

#[derive(Debug, Deserialize)]
struct ExceptionsQuery {
    job_id: Option<Uuid>,
}

async fn get_exceptions(
    State(state): State<ApiState>,
    Query(query): Query<ExceptionsQuery>,
) -> Result<Json<Vec<Value>>, (StatusCode, String)> {
    #[derive(sqlx::FromRow)]
    struct Row {
        id: Uuid,
        election_id: Uuid,
        entity: String,
        severity: String,
        #[sqlx(rename = "type")]
        kind: String,
        metadata: Value,
    }

    let rows: Vec<Row> = sqlx::query_as(
        "select id, election_id, entity, severity, type, metadata from exceptions \
         where $1::uuid is null or metadata->>'job_id' = $1::text",
    )
    .bind(query.job_id)
    .fetch_all(&state.pool)
    .await
    .map_err(internal_error)?;

    Ok(Json(
        rows.into_iter()
            .map(|r| {
                json!({
                    "id": r.id,
                    "election_id": r.election_id,
                    "entity": r.entity,
                    "severity": r.severity,
                    "type": r.kind,
                    "metadata": r.metadata,
                })
            })
            .collect(),
    ))
}

/// Trigger stub: PDF generation runs out of process in this crate.
async fn trigger_report(Path(node_id): Path<Uuid>) -> (StatusCode, Json<Value>) {
    (
        StatusCode::ACCEPTED,
        Json(json!({ "node_id": node_id, "note": "report generation is out of process for this service" })),
    )
}

fn internal_error(e: sqlx::Error) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

fn internal_error_anyhow(e: anyhow::Error) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}
