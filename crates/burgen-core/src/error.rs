//! Build failure taxonomy.
//!
//! Structural failures (missing horizon, no gates, no canal course) propagate
//! to the nearest retry boundary. Local synthesis failures (a lot below its
//! area threshold, a degenerate building footprint) are absorbed inside their
//! component by falling back to a coarser shape and never appear here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    /// A blueprint with `size == 0` is a placeholder and cannot be built.
    #[error("blueprint has size 0 and cannot be built")]
    EmptyBlueprint,

    /// The patch set has no outer boundary to extract.
    #[error("no horizon: patch set has no outer boundary")]
    NoHorizon,

    /// The outer boundary has too few vertices to place the requested feature.
    #[error("horizon too short: {0} vertices")]
    ShortHorizon(usize),

    /// No admissible gate vertex survived filtering, or every candidate failed.
    #[error("no viable gate vertices on the curtain wall")]
    NoGates,

    /// The canal builder exhausted every candidate entry/exit pair.
    #[error("no valid canal course")]
    NoCourse,

    /// The citadel patch collapsed to a degenerate shape.
    #[error("degenerate citadel shape")]
    DegenerateCitadel,

    /// A planar-graph contract violation: disconnected face set, non-adjacent
    /// vertex chain, or a broken half-edge cycle.
    #[error("invalid topology: {0}")]
    InvalidTopology(&'static str),

    /// Pathfinding found no route between two required vertices.
    #[error("no path between required vertices")]
    NoPath,

    /// A bounded retry loop ran out of attempts; `source` is the failure
    /// from the final attempt.
    #[error("retry budget exhausted in stage `{stage}`")]
    Exhausted {
        stage: &'static str,
        #[source]
        source: Box<BuildError>,
    },
}

pub type Result<T> = std::result::Result<T, BuildError>;
