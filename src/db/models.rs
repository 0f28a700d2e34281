//! Row types for the tables this crate reads and writes (spec §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct HierarchyLevelRow {
    pub id: Uuid,
    pub election_id: Uuid,
    pub name: String,
    pub depth: i32,
}

#[derive(Debug, Clone, FromRow)]
pub struct HierarchyNodeRow {
    pub id: Uuid,
    pub election_id: Uuid,
    pub level_id: Uuid,
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Clone, FromRow)]
pub struct BoothRow {
    pub id: Uuid,
    pub election_id: Uuid,
    pub node_id: Uuid,
    pub booth_number: i32,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, FromRow)]
pub struct VoterRow {
    pub id: Uuid,
    pub election_id: Uuid,
    pub booth_id: Uuid,
    pub family_id: Uuid,
    pub full_name: String,
    pub epic_number: Option<String>,
    pub age: Option<i32>,
    pub gender: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct FamilyRow {
    pub id: Uuid,
    pub election_id: Uuid,
    pub booth_id: Uuid,
    pub member_count: i32,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, FromRow)]
pub struct SegmentationJobRow {
    pub id: Uuid,
    pub election_id: Uuid,
    pub node_id: Uuid,
    pub job_type: String,
    pub status: String,
    pub version: i32,
    pub name: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<Value>,
}

/// A fully-assembled segment ready for insertion (geometry already encoded).
#[derive(Debug, Clone)]
pub struct NewSegment {
    pub election_id: Uuid,
    pub node_id: Uuid,
    pub version: i32,
    pub display_name: String,
    pub color: String,
    pub centroid_point_ewkb: Vec<u8>,
    pub boundary_ewkb: Vec<u8>,
    pub geometry_ewkb: Vec<u8>,
    pub total_voters: i64,
    pub total_families: i64,
    pub metadata: Value,
    pub family_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentMetadata {
    pub node_id: Uuid,
    pub version: i32,
    pub segment_code: String,
    pub algorithm: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requires_manual_review: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineResult {
    pub segment_count: usize,
    pub voter_count: i64,
    pub family_count: i64,
    pub algorithm_ms: u64,
    pub db_write_ms: u64,
    pub total_ms: u64,
    pub run_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExceptionMetadata {
    pub job_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_id: Option<Uuid>,
}
