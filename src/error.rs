//! Typed error taxonomy for the segmentation engine (spec §7).
//!
//! Each enum below is one error *kind* family from the taxonomy. The engine
//! and runner compose these into `anyhow::Error` at transaction/job
//! boundaries, the same way `openmander`'s `Map`/`MapLayer` accessors wrap a
//! missing-layer condition in `anyhow!("[Map] ...")`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScopeError {
    #[error("[scope] node level does not match a known constituency or booth kind")]
    UnknownScope,
    #[error("[scope] no booths found for the given scope")]
    BoothNotFound,
    #[error("[scope] in-scope booths span more than one constituency")]
    BoundaryViolation,
}

#[derive(Debug, Error)]
pub enum InputError {
    #[error("[input] scope has no voters")]
    NoVoters,
    #[error("[input] scope has no atomic units (families)")]
    NoUnits,
    #[error("[input] could not compute a parent boundary")]
    NoBoundary,
}

#[derive(Debug, Error)]
pub enum AlgorithmError {
    #[error("[algorithm] {0} unit(s) could not be assigned to a cell")]
    AssignmentFailed(usize),
    #[error("[algorithm] failed to build segment geometry: {0}")]
    GeometryBuildFailed(String),
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("[validation] segment {0} has zero voters")]
    EmptySegment(String),
    #[error("[validation] total segment voters {actual} does not match in-scope voters {expected}")]
    VoterCountMismatch { expected: i64, actual: i64 },
    #[error("[validation] family {0} appears in more than one segment")]
    DuplicateVoter(uuid::Uuid),
    #[error("[validation] family {0} is not attached to any segment")]
    UnassignedFamily(uuid::Uuid),
    #[error("[validation] segments {0} and {1} have overlapping interiors")]
    InteriorOverlap(String, String),
    #[error("[validation] segment {0} has invalid geometry")]
    InvalidGeometry(String),
    #[error("[validation] segment {0} has empty geometry")]
    EmptyGeometry(String),
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("[persistence] database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// The lease vanished between select and update; the worker should simply
/// continue polling. Not surfaced as an exception.
#[derive(Debug, Error)]
#[error("[lease] job {0} vanished before the lease could be taken")]
pub struct LeaseError(pub uuid::Uuid);

/// Top-level error produced by the engine (C11) inside the job transaction.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Scope(#[from] ScopeError),
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Algorithm(#[from] AlgorithmError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl From<sqlx::Error> for EngineError {
    fn from(e: sqlx::Error) -> Self {
        EngineError::Persistence(PersistenceError::Database(e))
    }
}
