//! Core domain model for galley: generation requests, units and skeletons,
//! progress math, and the stored artifact shape. No IO and no async; the
//! pipeline and store crates build on top of these types.

pub mod artifact;
pub mod progress;
pub mod request;
pub mod unit;

pub use artifact::{new_artifact_id, now_rfc3339, Artifact, ArtifactUnit};
pub use progress::{anchored_percentage, AnchorRange, ProgressState};
pub use request::{GenerationKind, GenerationRequest, KeyScheme, RequestError};
pub use unit::{skeletons, Unit, UnitStatus};
