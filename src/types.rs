//! Opaque identifiers and small shared value types (spec §3).

use uuid::Uuid;

pub type ElectionId = Uuid;
pub type NodeId = Uuid;
pub type BoothId = Uuid;
pub type VoterId = Uuid;
/// A family id also serves as the id of its atomic unit — families are the
/// indivisible unit of movement (spec §9).
pub type FamilyId = Uuid;
pub type JobId = Uuid;
pub type SegmentId = Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScopeKind {
    Constituency,
    Booth,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "queued" => Some(JobStatus::Queued),
            "running" => Some(JobStatus::Running),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

/// A single round lon/lat coordinate pair, as stored for voters/families.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LngLat {
    pub lng: f64,
    pub lat: f64,
}

impl From<LngLat> for geo::Point<f64> {
    fn from(p: LngLat) -> Self {
        geo::Point::new(p.lng, p.lat)
    }
}
