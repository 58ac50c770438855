pub mod checkpoint;
pub mod sample;
pub mod validate;
pub mod wpt;

pub use checkpoint::{artifact_ref, target_slug, ArtifactRef, CheckpointEntry, RunSet};
pub use sample::{Sample, SampleKind, Target};
pub use validate::{validate_report, ValidationError, REQUIRED_METRICS};
pub use wpt::{poll_wait_units, PollResponse, PollStatus, SubmitResponse, TracePayload};
